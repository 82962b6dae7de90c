use alpha_loop_orchestrator::{
    events::tracing_sink, JobOrchestrator, OrchestratorConfig, RunOptions, RunStatus,
};
use clap::Parser;
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// One orchestration run: every scheduled dashboard, then the aggregate report.
#[derive(Debug, Parser)]
#[command(name = "orchestrator", version, about)]
struct Cli {
    /// Only run this dashboard (repeatable)
    #[arg(long = "app", value_name = "ID")]
    apps: Vec<String>,

    /// Skip every model call
    #[arg(long)]
    no_ai: bool,

    /// JSON config file (overrides ALPHA_LOOP_CONFIG)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Where artifacts are written
    #[arg(long, value_name = "DIR")]
    output_dir: Option<PathBuf>,

    /// Clear cached entries (all, or those under PREFIX) and exit
    #[arg(long, value_name = "PREFIX", num_args = 0..=1, default_missing_value = "")]
    clear_cache: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => {
            let mut config = OrchestratorConfig::from_file(path)?;
            config.apply_overrides(|name| std::env::var(name).ok())?;
            config
        }
        None => OrchestratorConfig::load()?,
    };
    if let Some(dir) = cli.output_dir {
        config.output_dir = dir;
    }
    config.validate()?;

    let orchestrator = JobOrchestrator::from_config(&config, tracing_sink())?;

    if let Some(prefix) = cli.clear_cache {
        let prefix = Some(prefix.as_str()).filter(|p| !p.is_empty());
        let removed = orchestrator.cache().clear(prefix);
        info!("🧹 Cleared {} cache entries", removed);
        return Ok(());
    }

    info!("🚀 Alpha Loop orchestrator starting");
    info!("📁 Output: {}", config.output_dir.display());

    let summary = orchestrator
        .run(RunOptions {
            only: cli.apps,
            disable_ai: cli.no_ai,
        })
        .await?;

    match summary.status {
        RunStatus::Completed => info!("✅ Run {} completed", summary.run_id),
        RunStatus::CompletedWithFailures => {
            warn!("⚠️  Run {} completed with failures", summary.run_id)
        }
    }
    info!(
        "🧭 Net signal {:?} ({}), decision: {}",
        summary.report.net_signal.signal,
        summary.report.net_signal.score,
        summary.report.decision_tree.action
    );

    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
