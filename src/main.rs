use anyhow::Result;
use clap::Parser;
use scholarai::account::AccountUpdate;
use scholarai::commands::{
    self, SearchArgs,
    config::{Config, ConfigOverrides},
    services::Services,
};
use scholarai::gap_analysis::{DEFAULT_RECENT_JOBS, GapAnalysisRequest};
use scholarai::job::{CancelHandle, DEFAULT_MAX_ATTEMPTS};
use scholarai::runtime::RealRuntime;
use scholarai::websearch::WebSearchRequest;
use std::path::PathBuf;

/// scholarai - command-line client for the ScholarAI research platform
///
/// Signs in, runs literature web searches and research gap analyses.
/// The session (access token and refresh cookie) is kept in a file between
/// runs, and expired tokens are refreshed transparently.
///
/// Examples:
///   scholarai login --email ada@example.com --password ...
///   scholarai search --project p-1 "graph neural networks" "drug discovery"
#[derive(Parser, Debug)]
#[command(author, version = env!("SCHOLARAI_VERSION"), about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Deployment: dev, docker or prod [env: SCHOLARAI_ENV]
    #[arg(long = "env", value_name = "ENV", global = true)]
    pub environment: Option<String>,

    /// Core API base URL (overrides the per-environment default)
    #[arg(long = "api-url", value_name = "URL", global = true)]
    pub api_url: Option<String>,

    /// AI service base URL used by gap analysis [env: SCHOLARAI_AI_API_URL]
    #[arg(long = "ai-api-url", value_name = "URL", global = true)]
    pub ai_api_url: Option<String>,

    /// Session file, by default <config dir>/scholarai/session.json
    /// [env: SCHOLARAI_SESSION_FILE]
    #[arg(long = "session-file", value_name = "PATH", global = true)]
    pub session_file: Option<PathBuf>,

    /// Base interval between search polls, in milliseconds
    /// [env: SCHOLARAI_POLL_INTERVAL_MS]
    #[arg(long = "poll-interval-ms", value_name = "MS", global = true)]
    pub poll_interval_ms: Option<u64>,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Sign in and store the session
    Login(CredentialsArgs),

    /// Create an account
    Register(CredentialsArgs),

    /// Sign out and forget the session
    Logout,

    /// Show the signed-in user
    Whoami,

    /// Email a password reset code
    ForgotPassword(ForgotPasswordArgs),

    /// Set a new password with a reset code
    ResetPassword(ResetPasswordArgs),

    /// Start a web search and wait for the papers (Ctrl-C cancels)
    Search(SearchCommandArgs),

    /// Show the state of a web search
    SearchStatus(SearchStatusArgs),

    /// List previous web searches
    History,

    /// Check the web search service
    Health,

    /// Show the account profile
    Account,

    /// Change account profile fields
    UpdateAccount(UpdateAccountArgs),

    /// Upload a new profile image
    UploadProfileImage(UploadProfileImageArgs),

    /// Remove the profile image
    DeleteProfileImage,

    /// Find research gaps around a seed paper (Ctrl-C cancels)
    GapAnalysis(GapAnalysisArgs),

    /// List recent gap analysis jobs
    GapJobs(GapJobsArgs),

    /// Check the gap analysis service
    GapHealth,

    /// Describe the gap analysis service
    GapInfo,
}

#[derive(clap::Args, Debug)]
pub struct CredentialsArgs {
    #[arg(long)]
    pub email: String,

    #[arg(long, env = "SCHOLARAI_PASSWORD", hide_env_values = true)]
    pub password: String,
}

#[derive(clap::Args, Debug)]
pub struct ForgotPasswordArgs {
    #[arg(long)]
    pub email: String,
}

#[derive(clap::Args, Debug)]
pub struct ResetPasswordArgs {
    #[arg(long)]
    pub email: String,

    /// Code received by email
    #[arg(long)]
    pub code: String,

    #[arg(long, env = "SCHOLARAI_NEW_PASSWORD", hide_env_values = true)]
    pub new_password: String,
}

#[derive(clap::Args, Debug)]
pub struct SearchCommandArgs {
    /// Project the papers are collected for
    #[arg(long = "project", value_name = "ID")]
    pub project_id: String,

    #[arg(long, default_value = "Computer Science")]
    pub domain: String,

    #[arg(long, default_value_t = 10)]
    pub batch_size: u32,

    /// Give up after this many polls
    #[arg(long, default_value_t = DEFAULT_MAX_ATTEMPTS)]
    pub max_attempts: u32,

    /// Search terms
    #[arg(value_name = "TERM", required = true)]
    pub terms: Vec<String>,
}

#[derive(clap::Args, Debug)]
pub struct SearchStatusArgs {
    /// Correlation id printed by `search`
    #[arg(value_name = "ID")]
    pub correlation_id: String,
}

#[derive(clap::Args, Debug)]
pub struct GapAnalysisArgs {
    /// URL of the seed paper
    #[arg(value_name = "URL")]
    pub url: String,

    #[arg(long)]
    pub max_papers: Option<u32>,

    #[arg(long)]
    pub validation_threshold: Option<u32>,
}

#[derive(clap::Args, Debug)]
pub struct GapJobsArgs {
    #[arg(long, default_value_t = DEFAULT_RECENT_JOBS)]
    pub limit: u32,
}

#[derive(clap::Args, Debug)]
pub struct UploadProfileImageArgs {
    /// Image file to upload
    #[arg(value_name = "FILE")]
    pub path: PathBuf,
}

#[derive(clap::Args, Debug)]
pub struct UpdateAccountArgs {
    #[arg(long)]
    pub full_name: Option<String>,
    #[arg(long)]
    pub institution: Option<String>,
    #[arg(long)]
    pub department: Option<String>,
    #[arg(long)]
    pub position: Option<String>,
    #[arg(long)]
    pub bio: Option<String>,
    #[arg(long)]
    pub website_url: Option<String>,
    #[arg(long)]
    pub google_scholar_url: Option<String>,
    #[arg(long)]
    pub linkedin_url: Option<String>,
    #[arg(long)]
    pub github_url: Option<String>,
    #[arg(long)]
    pub facebook_url: Option<String>,
    #[arg(long)]
    pub orcid_id: Option<String>,
    #[arg(long)]
    pub address_line1: Option<String>,
    #[arg(long)]
    pub address_line2: Option<String>,
    #[arg(long)]
    pub city: Option<String>,
    #[arg(long)]
    pub state_province_region: Option<String>,
    #[arg(long)]
    pub postal_code: Option<String>,
    #[arg(long)]
    pub country: Option<String>,
    #[arg(long)]
    pub language_preference: Option<String>,
    #[arg(long)]
    pub timezone: Option<String>,
}

impl From<UpdateAccountArgs> for AccountUpdate {
    fn from(args: UpdateAccountArgs) -> Self {
        AccountUpdate {
            full_name: args.full_name,
            institution: args.institution,
            department: args.department,
            position: args.position,
            bio: args.bio,
            website_url: args.website_url,
            google_scholar_url: args.google_scholar_url,
            linkedin_url: args.linkedin_url,
            github_url: args.github_url,
            facebook_url: args.facebook_url,
            orcid_id: args.orcid_id,
            address_line1: args.address_line1,
            address_line2: args.address_line2,
            city: args.city,
            state_province_region: args.state_province_region,
            postal_code: args.postal_code,
            country: args.country,
            language_preference: args.language_preference,
            timezone: args.timezone,
        }
    }
}

/// Cancel handle fired by Ctrl-C.
fn cancel_on_ctrl_c() -> CancelHandle {
    let cancel = CancelHandle::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("Cancelling...");
            on_signal.cancel();
        }
    });
    cancel
}

async fn run(cli: Cli) -> Result<()> {
    let runtime = RealRuntime;
    let overrides = ConfigOverrides {
        environment: cli.environment,
        api_url: cli.api_url,
        ai_api_url: cli.ai_api_url,
        session_file: cli.session_file,
        poll_interval_ms: cli.poll_interval_ms,
    };
    let config = Config::load(&runtime, overrides)?;
    let services = Services::new(RealRuntime, &config)?;

    match cli.command {
        Commands::Login(args) => commands::login(&services, &args.email, &args.password).await,
        Commands::Register(args) => {
            commands::register(&services, &args.email, &args.password).await
        }
        Commands::Logout => commands::logout(&services).await,
        Commands::Whoami => commands::whoami(&services),
        Commands::ForgotPassword(args) => commands::forgot_password(&services, &args.email).await,
        Commands::ResetPassword(args) => {
            commands::reset_password(&services, &args.email, &args.code, &args.new_password).await
        }
        Commands::Search(args) => {
            let search = SearchArgs {
                request: WebSearchRequest {
                    project_id: args.project_id,
                    domain: args.domain,
                    query_terms: args.terms,
                    batch_size: args.batch_size,
                },
                max_attempts: args.max_attempts,
            };
            commands::search(&services, &search, &cancel_on_ctrl_c()).await
        }
        Commands::SearchStatus(args) => {
            commands::search_status(&services, &args.correlation_id).await
        }
        Commands::History => commands::history(&services).await,
        Commands::Health => commands::health(&services).await,
        Commands::GapAnalysis(args) => {
            let request = GapAnalysisRequest {
                url: args.url,
                max_papers: args.max_papers,
                validation_threshold: args.validation_threshold,
            };
            commands::gap_analysis(&services, &request, &cancel_on_ctrl_c()).await
        }
        Commands::GapJobs(args) => commands::gap_jobs(&services, args.limit).await,
        Commands::GapHealth => commands::gap_health(&services).await,
        Commands::GapInfo => commands::gap_info(&services).await,
        Commands::Account => commands::show_account(&services).await,
        Commands::UpdateAccount(args) => {
            commands::update_account(&services, &AccountUpdate::from(args)).await
        }
        Commands::UploadProfileImage(args) => {
            commands::upload_profile_image(&services, &runtime, &args.path).await
        }
        Commands::DeleteProfileImage => commands::delete_profile_image(&services).await,
    }
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        log::debug!("{:?}", e);
        eprintln!("Error: {}", commands::describe_error(&e));
        std::process::exit(1);
    }
}
