//! Registry of connected screens.
//!
//! The registry owns the set of live channels and delivers broadcasts to
//! them. Every operation runs inside one exclusive section, so a broadcast
//! sees a consistent membership: channels added while it runs wait for it
//! to finish and do not receive that message.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐   add/remove   ┌──────────────────┐
//! │ConnectionHandler │───────────────▶│ ChannelRegistry  │
//! │  (per screen)    │                │                  │
//! └──────────────────┘                │ Vec<Arc<dyn      │
//!                                     │     Channel>>    │
//! ┌──────────────────┐   broadcast    │                  │
//! │  DisplayStore    │───────────────▶│                  │
//! └──────────────────┘                └────────┬─────────┘
//!                                              │ send (bounded by timeout)
//!                                              ▼
//!                                       every screen
//! ```
//!
//! # Failure Isolation
//!
//! A channel whose send fails or times out is removed and closed before the
//! broadcast moves on. The remaining channels still receive the message. A
//! removed channel is closed even if the caller gives up on the operation
//! halfway. Close errors on an
//! already broken channel are logged and ignored.
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()` or `.expect()` in production code
//! - Transport failures are values, never unwinds

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::channel::{Channel, ChannelError, ChannelId};

/// Upper bound on a single send during a broadcast.
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(5);

/// Result of one broadcast.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Channels that accepted the message.
    pub delivered: usize,

    /// Channels removed because their send failed or timed out.
    pub dropped: Vec<ChannelId>,
}

impl BroadcastReport {
    /// Number of channels the broadcast was attempted on.
    pub fn attempted(&self) -> usize {
        self.delivered + self.dropped.len()
    }
}

/// The set of live screen channels.
pub struct ChannelRegistry {
    channels: Mutex<Vec<Arc<dyn Channel>>>,
    send_timeout: Duration,
}

impl ChannelRegistry {
    /// Creates an empty registry with the default send timeout.
    pub fn new() -> Self {
        Self::with_send_timeout(DEFAULT_SEND_TIMEOUT)
    }

    /// Creates an empty registry whose sends are bounded by `send_timeout`.
    pub fn with_send_timeout(send_timeout: Duration) -> Self {
        Self {
            channels: Mutex::new(Vec::new()),
            send_timeout,
        }
    }

    /// Registers a channel.
    ///
    /// Returns false if a channel with the same id is already registered.
    pub async fn add(&self, channel: Arc<dyn Channel>) -> bool {
        let mut channels = self.channels.lock().await;
        let id = channel.id();
        if channels.iter().any(|c| c.id() == id) {
            debug!(channel = %id, "Channel already registered");
            return false;
        }
        channels.push(channel);
        debug!(channel = %id, total = channels.len(), "Channel registered");
        true
    }

    /// Unregisters and closes a channel.
    ///
    /// Returns false if the channel was not registered, in which case it is
    /// not closed again.
    pub async fn remove(&self, id: ChannelId) -> bool {
        let removed = {
            let mut channels = self.channels.lock().await;
            channels
                .iter()
                .position(|c| c.id() == id)
                .map(|index| Unregistered::new(channels.remove(index), self.send_timeout))
        };

        match removed {
            Some(channel) => {
                debug!(channel = %id, "Channel unregistered");
                channel.close().await;
                true
            }
            None => false,
        }
    }

    /// Sends `message` to every registered channel.
    ///
    /// Holds the exclusive section for the whole traversal. A channel that
    /// fails is removed and closed before the next channel is tried.
    pub async fn broadcast(&self, message: &str) -> BroadcastReport {
        let mut report = BroadcastReport::default();
        let mut channels = self.channels.lock().await;
        let mut index = 0;

        while let Some(channel) = channels.get(index).cloned() {
            let id = channel.id();
            let outcome = match timeout(self.send_timeout, channel.send(message)).await {
                Ok(result) => result,
                Err(_) => Err(ChannelError::Timeout),
            };

            match outcome {
                Ok(()) => {
                    report.delivered += 1;
                    index += 1;
                }
                Err(e) => {
                    debug!(channel = %id, error = %e, "Dropping channel after failed send");
                    let failed = Unregistered::new(channels.remove(index), self.send_timeout);
                    report.dropped.push(id);
                    failed.close().await;
                }
            }
        }
        drop(channels);

        debug!(
            delivered = report.delivered,
            dropped = report.dropped.len(),
            "Broadcast complete"
        );
        report
    }

    /// Unregisters and closes every channel. Returns how many were closed.
    pub async fn close_all(&self) -> usize {
        let drained: Vec<Unregistered> = {
            let mut channels = self.channels.lock().await;
            channels
                .drain(..)
                .map(|channel| Unregistered::new(channel, self.send_timeout))
                .collect()
        };

        let count = drained.len();
        for channel in drained {
            channel.close().await;
        }
        if count > 0 {
            info!(count, "Closed all channels");
        }
        count
    }

    /// Number of registered channels.
    pub async fn len(&self) -> usize {
        self.channels.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.channels.lock().await.is_empty()
    }

    pub async fn contains(&self, id: ChannelId) -> bool {
        self.channels.lock().await.iter().any(|c| c.id() == id)
    }

    /// Ids of the registered channels in registration order.
    pub async fn ids(&self) -> Vec<ChannelId> {
        self.channels.lock().await.iter().map(|c| c.id()).collect()
    }
}

impl Default for ChannelRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// A channel taken out of the registry that still has to be closed.
///
/// If it is dropped before `close` completes, the close runs on a background
/// task instead. A removed channel is therefore always closed.
struct Unregistered {
    channel: Option<Arc<dyn Channel>>,
    close_timeout: Duration,
}

impl Unregistered {
    fn new(channel: Arc<dyn Channel>, close_timeout: Duration) -> Self {
        Self {
            channel: Some(channel),
            close_timeout,
        }
    }

    async fn close(mut self) {
        if let Some(channel) = self.channel.as_ref() {
            close_quietly(channel.as_ref(), self.close_timeout).await;
        }
        self.channel = None;
    }
}

impl Drop for Unregistered {
    fn drop(&mut self) {
        let Some(channel) = self.channel.take() else {
            return;
        };
        let close_timeout = self.close_timeout;
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    close_quietly(channel.as_ref(), close_timeout).await;
                });
            }
            Err(_) => warn!(channel = %channel.id(), "No runtime left to close channel"),
        }
    }
}

async fn close_quietly(channel: &dyn Channel, close_timeout: Duration) {
    let id = channel.id();
    match timeout(close_timeout, channel.close()).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => debug!(channel = %id, error = %e, "Ignoring close error"),
        Err(_) => debug!(channel = %id, "Close timed out"),
    }
}

// ============================================================================
// Tests
// ============================================================================
