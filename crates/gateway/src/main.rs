use std::sync::Arc;

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use mur_domain::agent::AgentStore;
use mur_domain::config::{AuthType, Config, EnvKind, StoresType};
use mur_domain::session::SessionStore;
use mur_domain::user::UserStore;
use mur_gateway::api;
use mur_gateway::api::auth::{AuthHandler, NoopAuthHandler};
use mur_gateway::runtime::runners::{EchoRunner, RunnerRegistry};
use mur_gateway::runtime::service::SessionService;
use mur_gateway::state::AppState;
use mur_runtime::tasks::BackgroundTaskService;
use mur_store::{MemoryAgentStore, MemorySessionStore, MemoryUserStore};
use mur_stream::emitter::MemoryEventEmitter;
use mur_stream::store::MemoryEventStore;

#[derive(Parser)]
#[command(name = "murmur", about = "Conversational agent session server")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Start the server (the default when no subcommand is given).
    Serve,
    /// Print the version.
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        None | Some(Command::Serve) => {
            let config = Config::from_env().context("loading configuration")?;
            init_tracing(&config);
            run_server(Arc::new(config)).await
        }
        Some(Command::Version) => {
            println!("murmur {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

/// Structured logging; JSON outside development.
fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone()));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if config.env == EnvKind::Development {
        builder.init();
    } else {
        builder.json().init();
    }
}

async fn run_server(config: Arc<Config>) -> anyhow::Result<()> {
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "murmur starting");

    // ── Stores ───────────────────────────────────────────────────────
    let (users, agents, sessions): (
        Arc<dyn UserStore>,
        Arc<dyn AgentStore>,
        Arc<dyn SessionStore>,
    ) = match config.stores_type {
        StoresType::NanodbMemory => (
            Arc::new(MemoryUserStore::new()),
            Arc::new(MemoryAgentStore::new()),
            Arc::new(MemorySessionStore::new()),
        ),
    };
    tracing::info!("in-memory document stores ready");

    // ── Streaming ────────────────────────────────────────────────────
    let emitter = Arc::new(MemoryEventEmitter::new(Arc::new(MemoryEventStore::new())));
    tracing::info!("event emitter ready");

    // ── Background tasks ─────────────────────────────────────────────
    let tasks = Arc::new(BackgroundTaskService::new());
    tracing::info!("background task service ready");

    // ── Runners ──────────────────────────────────────────────────────
    let mut registry = RunnerRegistry::new();
    registry.register("echo", Arc::new(EchoRunner::new(sessions.clone())));
    tracing::info!(runners = registry.len(), "runner registry ready");

    // ── Session service ──────────────────────────────────────────────
    let session_service = Arc::new(SessionService::new(
        sessions.clone(),
        tasks.clone(),
        Arc::new(registry),
        emitter.clone(),
    ));

    // ── Auth ─────────────────────────────────────────────────────────
    let auth: Arc<dyn AuthHandler> = match config.auth_type {
        AuthType::Noop => Arc::new(NoopAuthHandler::new(users.clone())),
    };
    tracing::info!("noop auth handler ready");

    let state = AppState {
        config: config.clone(),
        users,
        agents,
        sessions,
        emitter: emitter.clone(),
        session_service,
        tasks: tasks.clone(),
        auth,
    };
    let app = api::router(state);

    // ── Bind ─────────────────────────────────────────────────────────
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding to {addr}"))?;
    tracing::info!(addr = %addr, "murmur listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("axum server error")?;

    // Teardown mirrors startup in reverse: stop the producers, then the
    // fan-out.
    tasks.cancel_all("server-shutdown").await;
    emitter.stop().await;
    tracing::info!("murmur stopped");
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}
