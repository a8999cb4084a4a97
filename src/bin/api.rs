use finance_assistant::{
    agents::AgentServices,
    api::{start_server, ApiState},
    config::Settings,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Load .env and environment variables
    let settings = Settings::load()?;

    if settings.llm.api_key.is_empty() {
        warn!("GROQ_API_KEY not set in .env, chat answers will be fallback messages");
    }

    info!("Finance Assistant - API Server");
    info!("Port: {}", settings.port);

    let services = AgentServices::from_settings(&settings).await?;
    info!(
        documents = services.retriever.len().await,
        mode = ?services.retriever.mode(),
        market = services.market.name(),
        "Services initialized"
    );

    start_server(ApiState::from(&services), &settings.host, settings.port).await?;

    Ok(())
}
