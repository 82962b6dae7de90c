use alpha_loop_orchestrator::{
    api::start_server, events::tracing_sink, JobOrchestrator, OrchestratorConfig,
};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Load .env, config file and overrides
    let config = OrchestratorConfig::load()?;

    let api_port: u16 = std::env::var("PORT")
        .or_else(|_| std::env::var("API_PORT"))
        .unwrap_or_else(|_| "8080".to_string())
        .parse()?;

    info!("🚀 Alpha Loop Orchestrator - API Server");
    info!("📍 Port: {}", api_port);
    info!("📁 Output: {}", config.output_dir.display());

    let orchestrator = Arc::new(JobOrchestrator::from_config(&config, tracing_sink())?);

    info!("✅ Orchestrator initialized ({} dashboards)", orchestrator.dashboards().len());
    info!("📡 Starting API server...");

    start_server(orchestrator, api_port).await?;

    Ok(())
}
