use anyhow::Result;

use crate::gap_analysis::{GapAnalysisRequest, GapAnalysisResult};
use crate::job::{CancelHandle, Job};

use super::services::Services;

fn print_result(result: &GapAnalysisResult) {
    println!("Gap analysis {} for {}", result.request_id, result.seed_paper_url);

    if let Some(summary) = &result.executive_summary {
        if !summary.frontier_overview.is_empty() {
            println!();
            println!("{}", summary.frontier_overview);
        }
        for insight in &summary.key_insights {
            println!("  * {}", insight);
        }
    }

    println!();
    println!("{} validated gaps", result.validated_gaps.len());
    for gap in &result.validated_gaps {
        println!(
            "  - {} [{}] confidence {:.2}",
            gap.gap_title, gap.category, gap.confidence_score
        );
        if !gap.description.is_empty() {
            println!("    {}", gap.description);
        }
    }

    if !result.next_steps.is_empty() {
        println!();
        println!("Next steps:");
        for step in &result.next_steps {
            println!("  - {}", step);
        }
    }
}

/// Runs a full gap analysis for a seed paper and prints the findings.
#[tracing::instrument(skip(services, cancel))]
pub async fn gap_analysis(
    services: &Services,
    request: &GapAnalysisRequest,
    cancel: &CancelHandle,
) -> Result<()> {
    let result = services
        .gap_analysis
        .run(
            request,
            |attempt, status| match attempt {
                0 => println!("Submitted ({})", status),
                n => println!("[{}] {}", n, status),
            },
            cancel,
        )
        .await?;
    print_result(&result);
    Ok(())
}

fn text_field<'a>(job: &'a Job, name: &str) -> Option<&'a str> {
    job.field(name).and_then(|v| v.as_str())
}

/// Lists the AI service's most recent gap analysis jobs.
#[tracing::instrument(skip(services))]
pub async fn gap_jobs(services: &Services, limit: u32) -> Result<()> {
    let jobs = services.gap_analysis.recent_jobs(limit).await?;
    if jobs.is_empty() {
        println!("No gap analysis jobs");
        return Ok(());
    }
    for job in &jobs {
        println!(
            "{:<38} {:<10} {}",
            job.id().unwrap_or("-"),
            job.status,
            text_field(job, "created_at").unwrap_or("")
        );
    }
    Ok(())
}

#[tracing::instrument(skip(services))]
pub async fn gap_health(services: &Services) -> Result<()> {
    let health = services.gap_analysis.health().await?;
    println!("{} {} {}", health.service, health.version, health.status);
    println!(
        "  jobs: {} running (max {}), {} total",
        health.running_jobs, health.max_concurrent_jobs, health.total_jobs
    );
    if !health.features.is_empty() {
        println!("  features: {}", health.features.join(", "));
    }
    Ok(())
}

#[tracing::instrument(skip(services))]
pub async fn gap_info(services: &Services) -> Result<()> {
    let info = services.gap_analysis.info().await?;
    println!("{}", info.service_name);
    if !info.description.is_empty() {
        println!("{}", info.description);
    }
    if !info.supported_domains.is_empty() {
        println!();
        println!("Domains: {}", info.supported_domains.join(", "));
    }
    if !info.processing_phases.is_empty() {
        println!();
        println!("Phases:");
        for phase in &info.processing_phases {
            println!("  - {}", phase);
        }
    }
    Ok(())
}
