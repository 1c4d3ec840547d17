//! IPC module for controlling a running daemon

mod client;
mod protocol;
mod server;

pub use client::Client;
pub use protocol::{read_message, write_message, DaemonStatus, Request, Response, MAX_MESSAGE_LEN};
pub use server::Server;
