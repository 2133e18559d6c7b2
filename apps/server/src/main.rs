use anyhow::Context;
use chatwire_auth::{Identity, JwtAuthenticator};
use chatwire_config::load as load_config;
use chatwire_gateway::create_router;
use chatwire_runtime::{shutdown_signal, telemetry, BackendServices};
use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "chatwire-server")]
#[command(about = "Chatwire realtime chat backend (serves by default)")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, PartialEq, Eq, Subcommand)]
enum Commands {
    /// Start the HTTP and WebSocket server
    Serve,
    /// Mint a development bearer token signed with the configured secret
    Token {
        #[arg(long)]
        user_id: i64,
        #[arg(long, default_value_t = 1)]
        role_id: i64,
        #[arg(long)]
        company_id: Option<i64>,
        #[arg(long)]
        department_id: Option<i64>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => run_server().await,
        Commands::Token {
            user_id,
            role_id,
            company_id,
            department_id,
        } => {
            let identity = Identity::new(user_id, role_id).with_tenant(company_id, department_id);
            mint_token(&identity)
        }
    }
}

async fn run_server() -> anyhow::Result<()> {
    telemetry::init_tracing().context("failed to initialise tracing")?;

    info!("starting Chatwire backend");

    let config = load_config().context("failed to load configuration")?;

    let services = BackendServices::initialise(&config)
        .await
        .context("failed to initialise backend services")?;

    let app = create_router(services.gateway_state());

    let address = format!("{}:{}", config.http.address, config.http.port);
    let listener = TcpListener::bind(&address)
        .await
        .with_context(|| format!("failed to bind http listener on {address}"))?;

    info!(%address, "http server listening");

    // stopping the coordinator closes every socket so the server can drain
    let coordinator = services.coordinator().clone();
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            let _ = coordinator.shutdown().await;
        })
        .await;

    services.shutdown().await;
    served.context("http server error")?;

    info!("backend shut down");
    Ok(())
}

fn mint_token(identity: &Identity) -> anyhow::Result<()> {
    let config = load_config().context("failed to load configuration")?;
    let authenticator = JwtAuthenticator::from_config(&config.auth);

    let token = authenticator
        .issue(identity)
        .context("failed to issue token")?;
    println!("{token}");
    Ok(())
}
