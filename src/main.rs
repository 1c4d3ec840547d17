//! invision: camera-driven object announcer and text reader
//!
//! `invision run` starts the daemon:
//! - Mode coordinator on a dedicated thread, owning camera and speech
//! - IPC server for `invision ctl` and other clients
//! - Headless presentation sink that drains rendered frames
//!
//! SIGINT and SIGTERM are handled as an exit request, so speech is
//! flushed and the camera released before the process ends.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tokio::sync::{broadcast, mpsc};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use invision::config::Config;
use invision::events::PresentationEvent;
use invision::ipc::{Client, Request, Response, Server};
use invision::lifecycle::ShutdownSignal;
use invision::presentation::PresentationSink;
use invision::state::{ControlCommand, Mode, ModeCoordinator};

/// How long the sink gets to see the final `Exited` event
const SINK_DRAIN: Duration = Duration::from_secs(1);

#[derive(Parser)]
#[command(name = "invision")]
#[command(about = "An eye for the blind: announces objects and reads text aloud")]
#[command(version)]
struct Cli {
    /// Path to the config file (defaults to ~/.config/invision/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the daemon in the foreground
    Run {
        /// Mode to start immediately (object or text)
        #[arg(long)]
        mode: Option<Mode>,
    },

    /// Send a command to a running daemon
    Ctl {
        #[command(subcommand)]
        command: CtlCommand,
    },
}

#[derive(Subcommand, Clone, Copy)]
enum CtlCommand {
    /// Start object detection
    Object,
    /// Start text reading
    Text,
    /// Stop the running mode
    Stop,
    /// Shut the daemon down
    Exit,
    /// Print the daemon status as JSON
    Status,
    /// Check the daemon is reachable
    Ping,
}

impl CtlCommand {
    fn request(self) -> Request {
        match self {
            Self::Object => Request::StartMode {
                mode: Mode::ObjectDetection,
            },
            Self::Text => Request::StartMode {
                mode: Mode::TextReading,
            },
            Self::Stop => Request::Stop,
            Self::Exit => Request::Exit,
            Self::Status => Request::GetStatus,
            Self::Ping => Request::Ping,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level)),
        )
        .init();

    let config = Config::load(cli.config.as_deref()).context("failed to load configuration")?;

    match cli.command {
        Some(Commands::Ctl { command }) => ctl(&config, command).await,
        Some(Commands::Run { mode }) => run_daemon(config, mode).await,
        None => run_daemon(config, None).await,
    }
}

async fn run_daemon(config: Config, initial_mode: Option<Mode>) -> Result<()> {
    info!(version = env!("CARGO_PKG_VERSION"), "invision starting");

    config.ensure_dirs()?;
    info!(?config.socket_path, ?config.log_file, "configuration loaded");

    // Coordinator and loops -> presentation sink and IPC subscribers
    let (event_tx, _event_rx) = broadcast::channel::<PresentationEvent>(256);
    let sink = PresentationSink::new(event_tx.subscribe(), config.preview_path.clone());
    let sink_task = tokio::spawn(sink.run());

    // IPC server and signal handler -> coordinator
    let (command_tx, command_rx) = mpsc::channel(32);

    let coordinator = ModeCoordinator::from_config(&config, event_tx.clone())?;
    if let Some(mode) = initial_mode {
        command_tx.send(ControlCommand::Start(mode)).await?;
    }

    let coordinator_thread = std::thread::Builder::new()
        .name("mode-coordinator".to_string())
        .spawn(move || coordinator.run(command_rx))
        .context("failed to spawn coordinator thread")?;
    let mut coordinator_done = tokio::task::spawn_blocking(move || coordinator_thread.join());

    let server = Server::new(&config.socket_path, command_tx.clone(), event_tx.clone())?;
    let shutdown = ShutdownSignal::new();

    info!("daemon initialized, entering main loop");

    let mut joined = None;
    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                error!(?e, "IPC server error");
            }
        }

        result = shutdown.wait() => {
            match result {
                Ok(()) => info!("shutdown signal received"),
                Err(e) => error!(?e, "failed to install signal handlers"),
            }
        }

        // Exit requested over IPC
        result = &mut coordinator_done => {
            joined = Some(result);
        }
    }

    info!("shutting down...");
    server.shutdown().await;

    let joined = match joined {
        Some(joined) => joined,
        None => {
            // Already gone if the coordinator exited on its own
            let _ = command_tx.send(ControlCommand::Exit).await;
            coordinator_done.await
        }
    };

    match joined {
        Ok(Ok(report)) => {
            if !report.speech_drained {
                warn!("speech did not finish within the exit grace period");
            }
            if !report.loop_finished {
                warn!("perception loop did not finish within the exit grace period");
            }
        }
        Ok(Err(_)) => error!("mode coordinator panicked"),
        Err(e) => error!(?e, "failed to join mode coordinator"),
    }

    if tokio::time::timeout(SINK_DRAIN, sink_task).await.is_err() {
        warn!("presentation sink did not observe exit");
    }

    info!("invision stopped");
    Ok(())
}

async fn ctl(config: &Config, command: CtlCommand) -> Result<()> {
    let mut client = Client::connect(&config.socket_path)
        .await
        .context("is the daemon running? start it with `invision run`")?;

    match client.request(&command.request()).await? {
        Response::Status(status) => println!("{}", serde_json::to_string_pretty(&status)?),
        Response::Pong => println!("pong"),
        Response::Ack => println!("ok"),
        Response::Error { code, message } => bail!("{code}: {message}"),
        other => bail!("unexpected response: {other:?}"),
    }

    Ok(())
}
