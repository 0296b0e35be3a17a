//! Barista server binary.
//!
//! Starts a realtime session over the in-memory transport, optionally replays
//! a scripted conversation into it, and serves the transcript and event log
//! over HTTP with graceful shutdown on SIGTERM/SIGINT.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use barista_observe::EventLog;
use barista_server::config::{self, Config};
use barista_server::replay::{self, ReplayScript};
use barista_server::{app, AppState};
use barista_session::{ChannelConnector, SessionManager, SessionObserver};
use barista_types::SessionStatus;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

/// Logs what the embedding application would otherwise surface in its UI.
struct LogObserver;

impl SessionObserver for LogObserver {
    fn on_connection_change(&self, status: SessionStatus) {
        tracing::info!(%status, "session connection changed");
    }

    fn on_agent_handoff(&self, agent: &str) {
        tracing::info!(agent, "conversation handed off");
    }
}

fn resolve_config_path() -> (Option<String>, &'static str) {
    if let Some(path) = std::env::args()
        .nth(1)
        .filter(|value| !value.trim().is_empty())
    {
        return (Some(path), "cli-arg");
    }

    if let Ok(path) = std::env::var("BARISTA_CONFIG_PATH") {
        if !path.trim().is_empty() {
            return (Some(path), "env-var");
        }
    }

    (None, "default")
}

fn init_tracing(config: &Config) {
    let filter =
        EnvFilter::try_new(&config.logging.level).unwrap_or_else(|_| EnvFilter::new("info"));

    if config.logging.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let (resolved_config_path, config_source) = resolve_config_path();
    let selected_config_path = resolved_config_path.as_deref().or(Some("config.toml"));

    let config = config::load_config(selected_config_path)?;
    init_tracing(&config);

    tracing::info!(
        source = config_source,
        path = selected_config_path.unwrap_or("<none>"),
        "resolved startup configuration path"
    );

    let connector = ChannelConnector::new(config.session.event_buffer);
    let session = SessionManager::builder(
        connector.clone(),
        config.session.clone(),
        EventLog::new(config.observe.capacity),
    )
    .observer(Arc::new(LogObserver))
    .build();
    session.connect().await?;

    if let Some(path) = &config.replay.script {
        let script = ReplayScript::load(path)?;
        let pacing = Duration::from_millis(config.replay.pacing_ms);
        let session = session.clone();
        tokio::spawn(async move {
            if let Err(e) = replay::run(&session, &connector, &script, pacing).await {
                tracing::error!("replay aborted: {}", e);
            }
        });
    }

    let addr = SocketAddr::new(config.server.host, config.server.port);
    tracing::info!(%addr, "starting barista server");

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app(AppState::new(session.clone())))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    session.disconnect();
    tracing::info!("barista server shut down");
    Ok(())
}

/// Waits for a SIGINT (Ctrl+C) or SIGTERM signal for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => { tracing::info!("received SIGINT, initiating graceful shutdown"); }
        () = terminate => { tracing::info!("received SIGTERM, initiating graceful shutdown"); }
    }
}
