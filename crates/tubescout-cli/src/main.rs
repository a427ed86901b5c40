//! TubeScout command-line interface.

mod app;
mod handlers;
mod scheduler;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde_json::json;
use tracing_subscriber::EnvFilter;

use tubescout_analysis::{export, AnalysisStore};
use tubescout_core::{AnalysisConfig, AnalysisStatus};
use tubescout_queue::{queues, JobOptions, JobState};
use tubescout_youtube::{LIST_COST, SEARCH_COST};

use crate::app::App;

#[derive(Parser)]
#[command(name = "tubescout", about = "YouTube channel discovery and outlier analysis")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run one analysis end to end and print the qualifying outliers.
    Analyze {
        /// Search queries used to discover candidate channels.
        #[arg(short, long, required = true, num_args = 1..)]
        query: Vec<String>,
        /// Competitor channel ids whose recent uploads seed the exclusion list.
        #[arg(short = 'x', long = "exclude")]
        exclude: Vec<String>,
        /// Write the results as CSV to this path.
        #[arg(long)]
        csv: Option<PathBuf>,
    },
    /// Run the job workers and maintenance schedule until interrupted.
    Worker,
    /// Show quota usage and API cost settings.
    Quota,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Analyze { query, exclude, csv } => analyze(query, exclude, csv).await,
        Command::Worker => worker().await,
        Command::Quota => quota(),
    }
}

async fn analyze(
    queries: Vec<String>,
    exclude: Vec<String>,
    csv: Option<PathBuf>,
) -> anyhow::Result<()> {
    let app = App::build()?;
    app.orchestrator.start();

    let config = AnalysisConfig::from_app(&app.config, exclude, queries);
    let analysis_id = app.pipeline.submit(config).await?;

    let mut events = app.pipeline.reporter().subscribe();
    let progress = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            if event.analysis_id == analysis_id {
                tracing::info!(stage = %event.stage, percent = event.percent, "progress");
            }
        }
    });

    let mut handle = app.orchestrator.enqueue(
        queues::ANALYSIS,
        handlers::ANALYSIS_RUN,
        json!({ "analysis_id": analysis_id.to_string() }),
        JobOptions::default(),
    )?;
    let state = handle.wait_until_finished().await;
    progress.abort();
    app.orchestrator.shutdown().await;

    let analysis = app
        .store
        .get(analysis_id)
        .await?
        .context("analysis record missing after run")?;

    if state != JobState::Completed || analysis.status != AnalysisStatus::Completed {
        anyhow::bail!(
            "analysis finished as {}: {}",
            analysis.status,
            analysis.error.as_deref().unwrap_or("no error recorded")
        );
    }

    let summary = analysis.summary;
    println!(
        "scanned {} channels ({} qualified), {} videos ({} excluded): {} outliers",
        summary.channels_scanned,
        summary.channels_qualified,
        summary.videos_scanned,
        summary.videos_excluded,
        summary.outliers_found,
    );
    for result in &analysis.results {
        println!(
            "{:>8.1}x  fit {:>4.1}  {} / {} ({} views, {} subs{})",
            result.outlier_score,
            result.brand_fit_score,
            result.channel_title,
            result.video_title,
            result.view_count,
            result.subscriber_count,
            result
                .detected_game
                .as_deref()
                .map(|game| format!(", {game}"))
                .unwrap_or_default(),
        );
    }

    if let Some(path) = csv {
        let stamp = analysis.completed_at.unwrap_or_else(chrono::Utc::now);
        std::fs::write(&path, export::to_csv(&analysis.results, stamp))
            .with_context(|| format!("failed to write {}", path.display()))?;
        println!("wrote {} rows to {}", analysis.results.len(), path.display());
    }
    Ok(())
}

async fn worker() -> anyhow::Result<()> {
    let app = App::build()?;
    app.orchestrator.start();

    // Keep the handle alive; dropping it stops the cron schedule.
    let _scheduler = scheduler::build_scheduler(Arc::clone(&app.orchestrator)).await?;

    tracing::info!("worker running; press Ctrl-C to stop");
    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down");
    app.orchestrator.shutdown().await;
    Ok(())
}

fn quota() -> anyhow::Result<()> {
    let app = App::build()?;
    let ledger = app.client.quota();
    println!("daily quota limit:  {}", ledger.daily_limit());
    println!("remaining today:    {}", ledger.remaining());
    println!("search cost:        {SEARCH_COST} units per query");
    println!("list cost:          {LIST_COST} unit per call");
    println!(
        "cache TTLs:         channel {}s, videos {}s, search {}s",
        app.config.cache_channel_ttl_secs,
        app.config.cache_videos_ttl_secs,
        app.config.cache_search_ttl_secs,
    );
    Ok(())
}
