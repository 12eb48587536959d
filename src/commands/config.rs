use anyhow::{Context, Result, bail};
use log::debug;
use std::path::PathBuf;
use std::time::Duration;

use crate::runtime::Runtime;

pub const DEFAULT_DEV_API_URL: &str = "http://localhost:8080";
pub const DEFAULT_DOCKER_API_URL: &str = "http://docker-core-app-1:8080";
pub const DEFAULT_AI_API_URL: &str = "http://localhost:8000";
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;

/// Deployment the CLI talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    #[default]
    Dev,
    Docker,
    Prod,
}

impl Environment {
    /// Unknown names fall back to `Dev`.
    pub fn parse(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "docker" => Environment::Docker,
            "prod" | "production" => Environment::Prod,
            _ => Environment::Dev,
        }
    }
}

/// Values given on the command line. Anything left `None` is looked up in
/// the environment, then defaulted.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub environment: Option<String>,
    pub api_url: Option<String>,
    pub ai_api_url: Option<String>,
    pub session_file: Option<PathBuf>,
    pub poll_interval_ms: Option<u64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub environment: Environment,
    pub api_url: String,
    pub ai_api_url: String,
    pub session_file: PathBuf,
    pub poll_interval: Duration,
}

impl Config {
    #[tracing::instrument(skip(runtime))]
    pub fn load<R: Runtime>(runtime: &R, overrides: ConfigOverrides) -> Result<Self> {
        let env = |key: &str| runtime.env_var(key).ok().filter(|v| !v.trim().is_empty());

        let environment = overrides
            .environment
            .or_else(|| env("SCHOLARAI_ENV"))
            .map(|name| Environment::parse(&name))
            .unwrap_or_default();

        let api_url = match overrides.api_url {
            Some(url) => url,
            None => match environment {
                Environment::Dev => {
                    env("SCHOLARAI_DEV_API_URL").unwrap_or_else(|| DEFAULT_DEV_API_URL.to_string())
                }
                Environment::Docker => env("SCHOLARAI_DOCKER_BACKEND_URL")
                    .unwrap_or_else(|| DEFAULT_DOCKER_API_URL.to_string()),
                Environment::Prod => match env("SCHOLARAI_API_BASE_URL") {
                    Some(url) => url,
                    None => bail!("SCHOLARAI_API_BASE_URL must be set in the prod environment"),
                },
            },
        };

        let ai_api_url = overrides
            .ai_api_url
            .or_else(|| env("SCHOLARAI_AI_API_URL"))
            .unwrap_or_else(|| DEFAULT_AI_API_URL.to_string());

        let session_file = match overrides
            .session_file
            .or_else(|| env("SCHOLARAI_SESSION_FILE").map(PathBuf::from))
        {
            Some(path) => path,
            None => runtime
                .config_dir()
                .context("Cannot determine the config directory; use --session-file")?
                .join("scholarai")
                .join("session.json"),
        };

        let poll_interval_ms = match overrides.poll_interval_ms {
            Some(ms) => ms,
            None => match env("SCHOLARAI_POLL_INTERVAL_MS") {
                Some(raw) => raw
                    .trim()
                    .parse()
                    .with_context(|| format!("Invalid SCHOLARAI_POLL_INTERVAL_MS: {}", raw))?,
                None => DEFAULT_POLL_INTERVAL_MS,
            },
        };

        let config = Config {
            environment,
            api_url: api_url.trim_end_matches('/').to_string(),
            ai_api_url: ai_api_url.trim_end_matches('/').to_string(),
            session_file,
            poll_interval: Duration::from_millis(poll_interval_ms),
        };
        debug!("Loaded config: {:?}", config);
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::MockRuntime;
    use std::collections::HashMap;
    use std::env::VarError;
    use std::path::Path;

    fn runtime_with(vars: &[(&str, &str)]) -> MockRuntime {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();

        let mut runtime = MockRuntime::new();
        runtime
            .expect_env_var()
            .returning(move |key| vars.get(key).cloned().ok_or(VarError::NotPresent));
        runtime
            .expect_config_dir()
            .returning(|| Some(PathBuf::from("/home/ada/.config")));
        runtime
    }

    #[test]
    fn test_defaults() {
        let config = Config::load(&runtime_with(&[]), ConfigOverrides::default()).unwrap();

        assert_eq!(config.environment, Environment::Dev);
        assert_eq!(config.api_url, "http://localhost:8080");
        assert_eq!(config.ai_api_url, "http://localhost:8000");
        assert_eq!(
            config.session_file,
            Path::new("/home/ada/.config/scholarai/session.json")
        );
        assert_eq!(config.poll_interval, Duration::from_millis(1000));
    }

    #[test]
    fn test_docker_environment() {
        let runtime = runtime_with(&[("SCHOLARAI_ENV", "docker")]);
        let config = Config::load(&runtime, ConfigOverrides::default()).unwrap();
        assert_eq!(config.environment, Environment::Docker);
        assert_eq!(config.api_url, "http://docker-core-app-1:8080");

        let runtime = runtime_with(&[
            ("SCHOLARAI_ENV", "docker"),
            ("SCHOLARAI_DOCKER_BACKEND_URL", "http://core:9090/"),
        ]);
        let config = Config::load(&runtime, ConfigOverrides::default()).unwrap();
        assert_eq!(config.api_url, "http://core:9090");
    }

    #[test]
    fn test_prod_requires_base_url() {
        let runtime = runtime_with(&[("SCHOLARAI_ENV", "prod")]);
        let err = Config::load(&runtime, ConfigOverrides::default()).unwrap_err();
        assert!(err.to_string().contains("SCHOLARAI_API_BASE_URL"));

        let runtime = runtime_with(&[
            ("SCHOLARAI_ENV", "prod"),
            ("SCHOLARAI_API_BASE_URL", "https://api.scholarai.example"),
        ]);
        let config = Config::load(&runtime, ConfigOverrides::default()).unwrap();
        assert_eq!(config.api_url, "https://api.scholarai.example");
    }

    #[test]
    fn test_unknown_environment_is_dev() {
        assert_eq!(Environment::parse("staging"), Environment::Dev);
        assert_eq!(Environment::parse(" PROD "), Environment::Prod);
    }

    #[test]
    fn test_overrides_win_over_environment() {
        let runtime = runtime_with(&[
            ("SCHOLARAI_ENV", "prod"),
            ("SCHOLARAI_AI_API_URL", "http://ai-from-env"),
            ("SCHOLARAI_POLL_INTERVAL_MS", "250"),
        ]);
        let overrides = ConfigOverrides {
            environment: Some("dev".to_string()),
            api_url: Some("http://flag:1234/".to_string()),
            ai_api_url: None,
            session_file: Some(PathBuf::from("/tmp/s.json")),
            poll_interval_ms: Some(10),
        };

        let config = Config::load(&runtime, overrides).unwrap();
        assert_eq!(config.environment, Environment::Dev);
        assert_eq!(config.api_url, "http://flag:1234");
        assert_eq!(config.ai_api_url, "http://ai-from-env");
        assert_eq!(config.session_file, Path::new("/tmp/s.json"));
        assert_eq!(config.poll_interval, Duration::from_millis(10));
    }

    #[test]
    fn test_invalid_poll_interval() {
        let runtime = runtime_with(&[("SCHOLARAI_POLL_INTERVAL_MS", "soon")]);
        assert!(Config::load(&runtime, ConfigOverrides::default()).is_err());
    }

    #[test]
    fn test_no_config_dir_without_session_file() {
        let mut runtime = MockRuntime::new();
        runtime
            .expect_env_var()
            .returning(|_| Err(VarError::NotPresent));
        runtime.expect_config_dir().returning(|| None);

        let err = Config::load(&runtime, ConfigOverrides::default()).unwrap_err();
        assert!(err.to_string().contains("--session-file"));
    }
}
