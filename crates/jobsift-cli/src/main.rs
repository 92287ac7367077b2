use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use jobsift_rules::prefilter::evaluate_title;
use jobsift_rules::scoring::score_text;
use jobsift_rules::Ruleset;
use jobsift_sync::{report_daily_markdown, SyncConfig, SyncPipeline};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "jobsift-cli")]
#[command(about = "Classify and score junior IT job postings")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run the pipeline once over every enabled source.
    Sync,
    /// Delete postings and trend records past retention.
    Cleanup,
    /// Print a Markdown summary of recent runs.
    Report {
        #[arg(long, default_value_t = 5)]
        runs: usize,
    },
    /// Score a single posting and print the breakdown as JSON.
    Score {
        #[arg(long)]
        title: String,
        #[arg(long, default_value = "")]
        description: String,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    let json = std::env::var("JOBSIFT_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    if json {
        let _ = builder.json().try_init();
    } else {
        let _ = builder.try_init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();
    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Sync) {
        Commands::Sync => {
            let pipeline = SyncPipeline::new(SyncConfig::from_env())?;
            let summary = pipeline.run_once().await?;
            println!(
                "sync complete: run_id={} fetched={} new={} accepted={} rejected={} notified={}",
                summary.run_id,
                summary.fetched_records,
                summary.fresh,
                summary.accepted,
                summary.rejected,
                summary.notified
            );
            if let Some(dir) = &summary.reports_dir {
                println!("reports: {dir}");
            }
        }
        Commands::Cleanup => {
            let cleanup = jobsift_sync::run_cleanup_from_env().await?;
            println!(
                "cleanup complete: current={} previous={} rejected={} daily_trends={} monthly_trends={}",
                cleanup.current,
                cleanup.previous,
                cleanup.rejected,
                cleanup.daily_trends,
                cleanup.monthly_trends
            );
        }
        Commands::Report { runs } => {
            let config = SyncConfig::from_env();
            let markdown = report_daily_markdown(runs, Some(config.workspace_root))?;
            println!("{markdown}");
        }
        Commands::Score { title, description } => {
            let config = SyncConfig::from_env();
            let rules_dir = config.rules_dir.is_dir().then_some(config.rules_dir.as_path());
            let ruleset = Ruleset::load(rules_dir).context("compiling ruleset")?;
            let breakdown = score_text(&ruleset, &title, &description);
            let output = serde_json::json!({
                "title": title,
                "prefilter": evaluate_title(ruleset.signals(), &title).map(|r| r.to_string()),
                "score": breakdown.score,
                "tier": breakdown.tier,
                "breakdown": breakdown,
            });
            println!(
                "{}",
                serde_json::to_string_pretty(&output).context("serializing score")?
            );
        }
    }

    Ok(())
}
