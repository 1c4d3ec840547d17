//! Unix domain socket server for IPC
//!
//! Provides request-response control of the coordinator. A client that
//! subscribes stops sending requests and receives state events until it
//! disconnects or the daemon exits.

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, error, info, warn};

use super::protocol::{read_message, write_message, DaemonStatus, Request, Response};
use crate::events::{PresentationEvent, StateEvent};
use crate::state::{ControlCommand, Mode};

/// What a connection handler needs to serve requests
#[derive(Clone)]
struct Handles {
    commands: mpsc::Sender<ControlCommand>,
    events: broadcast::Sender<PresentationEvent>,
    start_time: Instant,
}

/// IPC Server handling client connections
pub struct Server {
    socket_path: PathBuf,
    listener: UnixListener,
    handles: Handles,
    shutdown_tx: broadcast::Sender<()>,
}

impl Server {
    /// Bind the socket, replacing a stale one
    pub fn new(
        socket_path: &Path,
        commands: mpsc::Sender<ControlCommand>,
        events: broadcast::Sender<PresentationEvent>,
    ) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = socket_path.parent() {
            std::fs::create_dir_all(parent).context("failed to create socket directory")?;
        }

        // Remove stale socket if it exists
        if socket_path.exists() {
            std::fs::remove_file(socket_path).context("failed to remove stale socket")?;
        }

        let listener = UnixListener::bind(socket_path).context("failed to bind Unix socket")?;

        // Set socket permissions to owner-only (0600)
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(socket_path, std::fs::Permissions::from_mode(0o600))?;
        }

        let (shutdown_tx, _) = broadcast::channel(1);

        info!(?socket_path, "IPC server listening");

        Ok(Self {
            socket_path: socket_path.to_owned(),
            listener,
            handles: Handles {
                commands,
                events,
                start_time: Instant::now(),
            },
            shutdown_tx,
        })
    }

    /// Run the server, accepting connections
    pub async fn run(&self) -> Result<()> {
        loop {
            match self.listener.accept().await {
                Ok((stream, _addr)) => {
                    debug!("client connected");
                    let handles = self.handles.clone();
                    let mut shutdown_rx = self.shutdown_tx.subscribe();

                    tokio::spawn(async move {
                        tokio::select! {
                            result = Self::handle_client(stream, handles) => {
                                if let Err(e) = result {
                                    warn!(?e, "client handler error");
                                }
                            }
                            _ = shutdown_rx.recv() => {
                                debug!("client handler shutting down");
                            }
                        }
                    });
                }
                Err(e) => {
                    error!(?e, "accept error");
                }
            }
        }
    }

    /// Handle a single client connection
    async fn handle_client(mut stream: UnixStream, handles: Handles) -> Result<()> {
        loop {
            let Some(request) = read_message::<_, Request>(&mut stream)
                .await
                .context("failed to read request")?
            else {
                debug!("client disconnected");
                return Ok(());
            };

            debug!(?request, "received request");

            if request == Request::Subscribe {
                // Subscribe before confirming so no event between the two is lost
                let events = handles.events.subscribe();
                write_message(&mut stream, &Response::Subscribed).await?;
                debug!("client subscribed to notifications");
                return Self::stream_events(stream, events).await;
            }

            let response = Self::process_request(request, &handles).await;
            write_message(&mut stream, &response).await?;
        }
    }

    /// Forward state events until the client goes away or the daemon exits
    async fn stream_events(
        mut stream: UnixStream,
        mut events: broadcast::Receiver<PresentationEvent>,
    ) -> Result<()> {
        loop {
            match events.recv().await {
                Ok(PresentationEvent::State(event)) => {
                    let exited = event == StateEvent::Exited;
                    write_message(&mut stream, &Response::Event { event }).await?;
                    if exited {
                        return Ok(());
                    }
                }
                Ok(PresentationEvent::Frame(_)) => {}
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(skipped = n, "subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return Ok(()),
            }
        }
    }

    /// Process a request and return a response
    async fn process_request(request: Request, handles: &Handles) -> Response {
        let command = match request {
            Request::Ping => return Response::Pong,
            Request::Subscribe => return Response::Subscribed,
            Request::GetStatus => return Self::status(handles).await,
            Request::StartMode { mode: Mode::Idle } => {
                return Response::error("invalid_mode", "cannot start the idle mode; use stop");
            }
            Request::StartMode { mode } => {
                info!(?mode, "mode start requested via IPC");
                ControlCommand::Start(mode)
            }
            Request::Stop => ControlCommand::Stop,
            Request::Exit => ControlCommand::Exit,
        };

        match handles.commands.send(command).await {
            Ok(()) => Response::Ack,
            Err(_) => Response::error("unavailable", "coordinator has shut down"),
        }
    }

    async fn status(handles: &Handles) -> Response {
        let (reply_tx, reply_rx) = oneshot::channel();
        if handles
            .commands
            .send(ControlCommand::Status(reply_tx))
            .await
            .is_err()
        {
            return Response::error("unavailable", "coordinator has shut down");
        }

        match reply_rx.await {
            Ok(coordinator) => Response::Status(DaemonStatus::new(
                handles.start_time.elapsed().as_secs(),
                coordinator,
            )),
            Err(_) => Response::error("unavailable", "coordinator has shut down"),
        }
    }

    /// Gracefully shutdown the server
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());

        // Remove socket file
        if self.socket_path.exists() {
            if let Err(e) = std::fs::remove_file(&self.socket_path) {
                warn!(?e, "failed to remove socket file");
            }
        }

        info!("IPC server shutdown complete");
    }
}
