use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use webchat::connector::api::controller::AskController;
use webchat::connector::api::{router, Container, ContainerConfig};
use webchat::connector::OpenAiCompletionClient;
use webchat::domain::{API_KEY_VAR, DEFAULT_MODEL, DEFAULT_TEMPERATURE};
use webchat::{Commands, ContextMode};

const MAX_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Parser)]
#[command(name = "webchat")]
#[command(author, version, about = "Browser chat front end for a hosted language model", long_about = None)]
struct Cli {
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Model identifier sent with every completion request
    #[arg(long, global = true, default_value = DEFAULT_MODEL)]
    model: String,

    #[arg(long, global = true, default_value_t = DEFAULT_TEMPERATURE)]
    temperature: f32,

    /// Ask for whole replies instead of streamed deltas
    #[arg(long, global = true)]
    no_stream: bool,

    /// Upper bound on one turn, in seconds
    #[arg(long, global = true, default_value_t = 60)]
    timeout_secs: u64,

    /// Send the session's earlier turns along with each new message
    #[arg(long, global = true)]
    thread_history: bool,

    /// Answer with a local echo service instead of calling the API
    #[arg(long, global = true)]
    mock_llm: bool,

    #[command(subcommand)]
    command: Commands,
}

impl Cli {
    fn container_config(&self) -> ContainerConfig {
        ContainerConfig {
            api_key: std::env::var(API_KEY_VAR).ok(),
            base_url: OpenAiCompletionClient::configured_base_url(),
            model: self.model.clone(),
            temperature: self.temperature,
            stream: !self.no_stream,
            turn_timeout: Duration::from_secs(self.timeout_secs),
            context_mode: if self.thread_history {
                ContextMode::FullHistory
            } else {
                ContextMode::SingleTurn
            },
            mock_llm: self.mock_llm,
            ..ContainerConfig::default()
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env file is fine; the environment may already be set.
    let dotenv = dotenvy::dotenv();

    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match dotenv {
        Ok(path) => debug!("Loaded environment from {}", path.display()),
        Err(e) if e.not_found() => debug!("No .env file found"),
        Err(e) => warn!("Failed to load .env: {}", e),
    }

    let container = Arc::new(Container::new(cli.container_config())?);

    match cli.command {
        Commands::Serve {
            port,
            public,
            session_ttl_secs,
        } => serve(container, port, public, Duration::from_secs(session_ttl_secs)).await,
        Commands::Ask { question } => {
            let mut stdout = std::io::stdout();
            AskController::new(&container).ask(&question, &mut stdout).await
        }
    }
}

async fn serve(container: Arc<Container>, port: u16, public: bool, session_ttl: Duration) -> Result<()> {
    let host = if public { "0.0.0.0" } else { "127.0.0.1" };
    let listener = tokio::net::TcpListener::bind((host, port)).await?;
    info!(
        "{} listening on http://{} (model {})",
        container.title(),
        listener.local_addr()?,
        container.pipeline().model_id()
    );

    let shutdown = CancellationToken::new();
    let sweeper = tokio::spawn(sweep_idle_sessions(
        Arc::clone(&container),
        session_ttl,
        shutdown.clone(),
    ));

    axum::serve(listener, router(container))
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for ctrl-c: {}", e);
            }
            info!("Shutting down");
        })
        .await?;

    shutdown.cancel();
    sweeper.await?;
    Ok(())
}

/// Periodically forget sessions idle for longer than `ttl`.
async fn sweep_idle_sessions(container: Arc<Container>, ttl: Duration, shutdown: CancellationToken) {
    let period = (ttl / 4).clamp(Duration::from_secs(1), MAX_SWEEP_INTERVAL);
    let mut interval = tokio::time::interval(period);
    let sessions = container.sessions_use_case();

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = interval.tick() => {
                if let Err(e) = sessions.sweep(ttl).await {
                    warn!("Session sweep failed: {}", e);
                }
            }
        }
    }
}

#[cfg(test)]
mod cli_tests {
    use super::*;

    #[test]
    fn serve_defaults() {
        let cli = Cli::try_parse_from(["webchat", "serve"]).unwrap();
        match cli.command {
            Commands::Serve {
                port,
                public,
                session_ttl_secs,
            } => {
                assert_eq!(port, 8501);
                assert!(!public);
                assert_eq!(session_ttl_secs, 3600);
            }
            other => panic!("unexpected command: {other:?}"),
        }
        assert_eq!(cli.model, "gpt-4o");
        assert_eq!(cli.temperature, 0.0);
        assert_eq!(cli.timeout_secs, 60);
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "webchat",
            "ask",
            "hello",
            "--mock-llm",
            "--no-stream",
            "--thread-history",
        ])
        .unwrap();

        let config = cli.container_config();
        assert!(config.mock_llm);
        assert!(!config.stream);
        assert_eq!(config.context_mode, ContextMode::FullHistory);
    }

    #[test]
    fn ask_requires_question() {
        assert!(Cli::try_parse_from(["webchat", "ask"]).is_err());
    }
}
