use ashare_analyst::{
    agent::AnalystAgent,
    api::start_server,
    config::AgentConfig,
    execution::ActionExecutor,
    llm::{GeminiClient, LanguageModel},
    tools::create_default_registry,
};
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    // Load environment variables
    dotenv::dotenv().ok();

    let config = AgentConfig::from_env().map_err(|e| {
        eprintln!("⚠️  {}", e);
        eprintln!("📌 See .env.example for setup instructions");
        e
    })?;

    info!("🚀 A-Share Analyst Agent - API Server");
    info!("📍 Port: {}", config.api_port);

    // Create components
    let model: Arc<dyn LanguageModel> = Arc::new(GeminiClient::from_config(&config));
    let registry = create_default_registry(&config, model.clone())?;
    let agent = Arc::new(AnalystAgent::new(
        model,
        ActionExecutor::new(registry),
        &config,
    ));

    info!("✅ Agent initialized");
    info!("📡 Starting API server...");

    start_server(agent, config.api_port).await?;

    Ok(())
}
