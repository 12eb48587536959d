use anyhow::{Context, Result, bail};
use log::info;

use crate::job::{CancelHandle, Job, JobStatus};
use crate::websearch::{Paper, WebSearchRequest, papers};

use super::services::Services;

/// What to search for and how long to wait.
#[derive(Debug, Clone)]
pub struct SearchArgs {
    pub request: WebSearchRequest,
    pub max_attempts: u32,
}

fn progress_step(status: &JobStatus) -> &'static str {
    match status {
        JobStatus::Submitted | JobStatus::Pending => "Scanning arXiv repository...",
        JobStatus::Processing | JobStatus::Running => {
            "Querying Semantic Scholar & filtering results..."
        }
        JobStatus::Completed => "Enriching metadata & finalizing papers...",
        _ => "Analyzing results...",
    }
}

fn format_paper(paper: &Paper) -> String {
    let mut line = paper.title.clone();

    let year = paper
        .publication_date
        .as_deref()
        .and_then(|d| d.get(..4))
        .filter(|y| y.chars().all(|c| c.is_ascii_digit()));
    let venue = paper.venue.as_deref().filter(|v| !v.is_empty());
    match (venue, year) {
        (Some(venue), Some(year)) => line.push_str(&format!(" ({}, {})", venue, year)),
        (Some(venue), None) => line.push_str(&format!(" ({})", venue)),
        (None, Some(year)) => line.push_str(&format!(" ({})", year)),
        (None, None) => {}
    }

    if !paper.authors.is_empty() {
        let names: Vec<&str> = paper.authors.iter().map(|a| a.name.as_str()).collect();
        line.push_str(&format!("\n    {}", names.join(", ")));
    }
    if let Some(count) = paper.citation_count {
        line.push_str(&format!("\n    cited by {}", count));
    }
    line
}

fn print_job(job: &Job) -> Result<()> {
    println!("{}  {}", job.id().unwrap_or("-"), job.status);
    if job.status.is_success() {
        let found = papers(job)?;
        println!("{} papers found", found.len());
        for paper in &found {
            println!("  - {}", format_paper(paper));
        }
    } else if matches!(job.status, JobStatus::Failed | JobStatus::Cancelled) {
        println!("  {}", job.failure_message());
    }
    Ok(())
}

/// Starts a search and waits for its papers.
#[tracing::instrument(skip(services, cancel))]
pub async fn search(services: &Services, args: &SearchArgs, cancel: &CancelHandle) -> Result<()> {
    if args.request.query_terms.is_empty() {
        bail!("At least one query term is required");
    }

    let correlation_id = services.websearch.initiate(&args.request).await?;
    println!("Search started ({})", correlation_id);

    let job = services
        .websearch
        .poll_until_complete(
            &correlation_id,
            args.max_attempts,
            |attempt, status| println!("[{}] {} {}", attempt, status, progress_step(status)),
            cancel,
        )
        .await
        .with_context(|| format!("Search {}", correlation_id))?;

    info!("Search {} completed", correlation_id);
    print_job(&job)
}

/// Shows the current state of one search without waiting.
#[tracing::instrument(skip(services))]
pub async fn search_status(services: &Services, correlation_id: &str) -> Result<()> {
    let job = services.websearch.poll_results(correlation_id).await?;
    print_job(&job)
}

#[tracing::instrument(skip(services))]
pub async fn history(services: &Services) -> Result<()> {
    let jobs = services.websearch.history().await?;
    if jobs.is_empty() {
        println!("No searches yet.");
        return Ok(());
    }
    for job in &jobs {
        let count = papers(job).map(|p| p.len()).unwrap_or(0);
        println!("{}  {:<10}  {} papers", job.id().unwrap_or("-"), job.status, count);
    }
    Ok(())
}

pub async fn health(services: &Services) -> Result<()> {
    if !services.websearch.health().await {
        bail!("Web search service is DOWN");
    }
    println!("Web search service is UP");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::websearch::Author;

    #[test]
    fn test_format_paper_full() {
        let paper = Paper {
            title: "Attention Is All You Need".to_string(),
            publication_date: Some("2017-06-12".to_string()),
            venue: Some("NeurIPS".to_string()),
            authors: vec![
                Author {
                    name: "Vaswani".to_string(),
                    affiliation: None,
                },
                Author {
                    name: "Shazeer".to_string(),
                    affiliation: None,
                },
            ],
            citation_count: Some(120000),
            ..Paper::default()
        };

        assert_eq!(
            format_paper(&paper),
            "Attention Is All You Need (NeurIPS, 2017)\n    Vaswani, Shazeer\n    cited by 120000"
        );
    }

    #[test]
    fn test_format_paper_minimal() {
        let paper = Paper {
            title: "Untitled".to_string(),
            publication_date: Some("n/a".to_string()),
            ..Paper::default()
        };
        assert_eq!(format_paper(&paper), "Untitled");
    }

    #[test]
    fn test_progress_step_for_unknown_status() {
        assert_eq!(
            progress_step(&JobStatus::Other("ENRICHING".to_string())),
            "Analyzing results..."
        );
    }
}
