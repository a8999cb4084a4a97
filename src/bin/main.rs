use clap::{Parser, Subcommand, ValueEnum};
use finance_assistant::{
    agents::{run_agent, AgentServices},
    config::{AgentKind, Settings},
    orchestrator::{self, AgentClient},
};
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "agents", about = "Finance assistant agent services")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the orchestrator that fans out to the agents
    Orchestrator,
    /// Run a single agent service
    Agent {
        #[arg(value_enum)]
        kind: Kind,
    },
    /// Run every agent and the orchestrator in one process
    All,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Kind {
    Api,
    Scraping,
    Retriever,
    Analysis,
    Language,
    Voice,
}

impl From<Kind> for AgentKind {
    fn from(kind: Kind) -> Self {
        match kind {
            Kind::Api => AgentKind::Api,
            Kind::Scraping => AgentKind::Scraping,
            Kind::Retriever => AgentKind::Retriever,
            Kind::Analysis => AgentKind::Analysis,
            Kind::Language => AgentKind::Language,
            Kind::Voice => AgentKind::Voice,
        }
    }
}

async fn run_orchestrator(settings: &Settings) -> finance_assistant::Result<()> {
    let client = Arc::new(AgentClient::from_settings(settings)?);
    finance_assistant::agents::serve(
        orchestrator::router(client),
        "orchestrator",
        &settings.host,
        settings.port,
    )
    .await
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing (respects RUST_LOG, defaults to info)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let settings = Settings::load()?;

    match cli.command {
        Command::Orchestrator => run_orchestrator(&settings).await?,
        Command::Agent { kind } => {
            let kind = AgentKind::from(kind);
            let services = AgentServices::from_settings(&settings).await?;
            run_agent(kind, &services, &settings).await?;
        }
        Command::All => {
            let services = Arc::new(AgentServices::from_settings(&settings).await?);
            let settings = Arc::new(settings);
            let mut tasks = JoinSet::new();

            for kind in AgentKind::ALL {
                let services = services.clone();
                let settings = settings.clone();
                tasks.spawn(async move {
                    run_agent(kind, &services, &settings)
                        .await
                        .map_err(|e| (kind.name(), e))
                });
            }
            {
                let settings = settings.clone();
                tasks.spawn(async move {
                    run_orchestrator(&settings)
                        .await
                        .map_err(|e| ("orchestrator", e))
                });
            }

            info!(services = AgentKind::ALL.len() + 1, "All services started");

            // any service exiting brings the process down
            if let Some(joined) = tasks.join_next().await {
                match joined {
                    Ok(Ok(())) => info!("Service stopped"),
                    Ok(Err((service, e))) => {
                        error!(service, "Service failed: {}", e);
                        return Err(e.into());
                    }
                    Err(e) => return Err(e.into()),
                }
            }
        }
    }

    Ok(())
}
