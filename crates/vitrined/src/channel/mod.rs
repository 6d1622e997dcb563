//! Duplex channels to connected screens.
//!
//! The registry and the connection lifecycle only see the `Channel` and
//! `Receiver` traits, so the websocket transport can be swapped for an
//! in-memory one in tests.
//!
//! Send and receive report failure as values. A failed send is the signal
//! to drop the channel, never a reason to unwind.

pub mod memory;
mod ws;

pub use ws::{split_websocket, WsChannel, WsReceiver};

use std::fmt;

use async_trait::async_trait;

/// Process-unique identity of one accepted connection.
///
/// A reconnecting client gets a fresh id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelId(u64);

impl ChannelId {
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ch-{}", self.0)
    }
}

/// Outbound half of a connection.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Identity used for duplicate detection and removal.
    fn id(&self) -> ChannelId;

    /// Sends one text frame.
    async fn send(&self, text: &str) -> Result<(), ChannelError>;

    /// Closes the channel. Closing twice is not an error.
    async fn close(&self) -> Result<(), ChannelError>;
}

/// Inbound half of a connection.
#[async_trait]
pub trait Receiver: Send {
    /// Waits for the next inbound message.
    ///
    /// `Ok(None)` means the peer closed the connection cleanly.
    async fn receive(&mut self) -> Result<Option<String>, ChannelError>;
}

/// Transport failures on a channel.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChannelError {
    #[error("Channel closed")]
    Closed,

    #[error("Send failed: {0}")]
    Send(String),

    #[error("Receive failed: {0}")]
    Receive(String),

    #[error("Send timed out")]
    Timeout,
}
