//! Client side of the control socket, used by `invision ctl`

use std::path::Path;

use anyhow::{Context, Result};
use tokio::net::UnixStream;

use super::protocol::{read_message, write_message, Request, Response};

/// A single connection to a running daemon
pub struct Client {
    stream: UnixStream,
}

impl Client {
    pub async fn connect(socket_path: &Path) -> Result<Self> {
        let stream = UnixStream::connect(socket_path)
            .await
            .with_context(|| format!("failed to connect to {}", socket_path.display()))?;
        Ok(Self { stream })
    }

    /// Send a request and wait for its response
    pub async fn request(&mut self, request: &Request) -> Result<Response> {
        write_message(&mut self.stream, request).await?;
        self.next_response()
            .await?
            .context("daemon closed the connection")
    }

    /// Next message from the daemon; `None` once it hangs up
    pub async fn next_response(&mut self) -> Result<Option<Response>> {
        read_message(&mut self.stream).await
    }
}
