//! Per-screen connection lifecycle.
//!
//! Each accepted websocket gets one `ConnectionHandler`, which:
//! - Registers the channel with the registry
//! - Pushes the current display state (or a heartbeat) once per iteration
//! - Waits for any inbound message as a liveness signal
//! - Pauses for the push interval plus a random jitter
//! - Deregisters the channel when anything goes wrong
//!
//! The handler never propagates transport errors. Every exit path ends in
//! exactly one `ChannelRegistry::remove`, which is a no-op when a broadcast
//! already dropped the channel.
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Send and receive failures are matched, never unwrapped

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use vitrine_protocol::PushMessage;

use crate::channel::{Channel, ChannelError, Receiver};
use crate::config::{Config, PushMode};
use crate::display::DisplayStore;

/// Timing and payload settings shared by every connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LifecycleSettings {
    pub push_mode: PushMode,
    pub push_interval: Duration,
    pub push_jitter: Duration,
    pub send_timeout: Duration,

    /// `None` waits for the peer indefinitely
    pub idle_timeout: Option<Duration>,
}

impl Default for LifecycleSettings {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for LifecycleSettings {
    fn from(config: &Config) -> Self {
        Self {
            push_mode: config.push_mode,
            push_interval: config.push_interval(),
            push_jitter: config.push_jitter(),
            send_timeout: config.send_timeout(),
            idle_timeout: config.idle_timeout(),
        }
    }
}

/// Why a connection ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    /// The peer closed the connection
    PeerClosed,

    /// A push to the peer failed or timed out
    SendFailed,

    /// Reading the peer's liveness message failed
    ReceiveFailed,

    /// The peer sent nothing within the idle timeout
    IdleTimeout,

    /// The server is shutting down
    Shutdown,

    /// The push payload could not be serialized
    Encode,
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::PeerClosed => "peer closed",
            Self::SendFailed => "send failed",
            Self::ReceiveFailed => "receive failed",
            Self::IdleTimeout => "idle timeout",
            Self::Shutdown => "shutdown",
            Self::Encode => "encode failed",
        };
        f.write_str(text)
    }
}

/// Drives one screen connection from registration to removal.
pub struct ConnectionHandler<R: Receiver> {
    channel: Arc<dyn Channel>,
    receiver: R,
    display: Arc<DisplayStore>,
    settings: LifecycleSettings,
    cancel_token: CancellationToken,
}

impl<R: Receiver> ConnectionHandler<R> {
    pub fn new(
        channel: Arc<dyn Channel>,
        receiver: R,
        display: Arc<DisplayStore>,
        settings: LifecycleSettings,
        cancel_token: CancellationToken,
    ) -> Self {
        Self {
            channel,
            receiver,
            display,
            settings,
            cancel_token,
        }
    }

    /// Runs the connection until the peer leaves, a transport call fails or
    /// the server shuts down.
    pub async fn run(mut self) -> DisconnectReason {
        let id = self.channel.id();
        let registry = Arc::clone(self.display.registry());

        registry.add(Arc::clone(&self.channel)).await;
        info!(channel = %id, "Screen connected");

        let reason = self.serve().await;

        registry.remove(id).await;
        info!(channel = %id, reason = %reason, "Screen disconnected");
        reason
    }

    async fn serve(&mut self) -> DisconnectReason {
        let id = self.channel.id();

        loop {
            let payload = match self.payload().await {
                Ok(payload) => payload,
                Err(e) => {
                    warn!(channel = %id, error = %e, "Failed to encode push message");
                    return DisconnectReason::Encode;
                }
            };

            let sent = tokio::select! {
                _ = self.cancel_token.cancelled() => return DisconnectReason::Shutdown,
                result = timeout(self.settings.send_timeout, self.channel.send(&payload)) => {
                    result.unwrap_or(Err(ChannelError::Timeout))
                }
            };
            if let Err(e) = sent {
                debug!(channel = %id, error = %e, "Push failed");
                return DisconnectReason::SendFailed;
            }

            if let Some(reason) = self.await_peer().await {
                return reason;
            }

            let pause = self.pause();
            tokio::select! {
                _ = self.cancel_token.cancelled() => return DisconnectReason::Shutdown,
                _ = sleep(pause) => {}
            }
        }
    }

    /// Waits for one inbound message. Returns a reason when the loop must end.
    async fn await_peer(&mut self) -> Option<DisconnectReason> {
        let id = self.channel.id();
        let idle_timeout = self.settings.idle_timeout;
        let receiver = &mut self.receiver;
        let cancel_token = &self.cancel_token;

        let received = async {
            match idle_timeout {
                Some(limit) => timeout(limit, receiver.receive()).await.ok(),
                None => Some(receiver.receive().await),
            }
        };

        let outcome = tokio::select! {
            _ = cancel_token.cancelled() => return Some(DisconnectReason::Shutdown),
            outcome = received => outcome,
        };

        match outcome {
            None => {
                debug!(channel = %id, "Peer idle past timeout");
                Some(DisconnectReason::IdleTimeout)
            }
            Some(Ok(Some(_))) => None,
            Some(Ok(None)) => Some(DisconnectReason::PeerClosed),
            Some(Err(e)) => {
                debug!(channel = %id, error = %e, "Receive failed");
                Some(DisconnectReason::ReceiveFailed)
            }
        }
    }

    async fn payload(&self) -> Result<String, serde_json::Error> {
        match self.settings.push_mode {
            PushMode::State => {
                let state = self.display.current().await;
                PushMessage::update(&state).encode()
            }
            PushMode::Heartbeat => PushMessage::heartbeat().encode(),
        }
    }

    fn pause(&self) -> Duration {
        let jitter_ms = u64::try_from(self.settings.push_jitter.as_millis()).unwrap_or(u64::MAX);
        let extra = if jitter_ms == 0 {
            0
        } else {
            rand::rng().random_range(0..=jitter_ms)
        };
        self.settings.push_interval + Duration::from_millis(extra)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::memory::memory_connection;
    use crate::channel::ChannelId;
    use crate::registry::ChannelRegistry;
    use vitrine_catalog::ObjectCatalog;
    use vitrine_core::DisplayState;

    fn settings() -> LifecycleSettings {
        LifecycleSettings {
            push_mode: PushMode::State,
            push_interval: Duration::from_millis(1000),
            push_jitter: Duration::ZERO,
            send_timeout: Duration::from_secs(5),
            idle_timeout: None,
        }
    }

    fn display() -> Arc<DisplayStore> {
        Arc::new(DisplayStore::new(
            DisplayState::nothing(),
            Arc::new(ChannelRegistry::new()),
        ))
    }

    #[tokio::test(start_paused = true)]
    async fn test_pushes_state_until_peer_closes() {
        let display = display();
        let (channel, receiver, mut peer) = memory_connection(ChannelId::new(1));
        let handler = ConnectionHandler::new(
            channel.clone(),
            receiver,
            Arc::clone(&display),
            settings(),
            CancellationToken::new(),
        );
        let task = tokio::spawn(handler.run());

        let first = peer.recv().await.unwrap();
        assert_eq!(first, r#"{"object_name":"nothing","prob":0.0}"#);
        assert!(display.registry().contains(ChannelId::new(1)).await);

        peer.say("ping");
        let second = peer.recv().await.unwrap();
        assert_eq!(second, first);

        peer.hang_up();
        assert_eq!(task.await.unwrap(), DisconnectReason::PeerClosed);
        assert!(display.registry().is_empty().await);
        assert_eq!(channel.close_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_push_reflects_latest_update() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("apple_1")).unwrap();
        let catalog = ObjectCatalog::scan(dir.path());

        let display = display();
        let (channel, receiver, mut peer) = memory_connection(ChannelId::new(1));
        let handler = ConnectionHandler::new(
            channel,
            receiver,
            Arc::clone(&display),
            settings(),
            CancellationToken::new(),
        );
        let task = tokio::spawn(handler.run());

        peer.recv().await.unwrap();
        display.update("apple", 0.5, &catalog).await.unwrap();
        // The broadcast itself
        assert_eq!(
            peer.recv().await.unwrap(),
            r#"{"object_name":"apple","prob":0.5}"#
        );

        peer.say("ping");
        assert_eq!(
            peer.recv().await.unwrap(),
            r#"{"object_name":"apple","prob":0.5}"#
        );

        peer.hang_up();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_mode() {
        let display = display();
        let (channel, receiver, mut peer) = memory_connection(ChannelId::new(1));
        let handler = ConnectionHandler::new(
            channel,
            receiver,
            display,
            LifecycleSettings {
                push_mode: PushMode::Heartbeat,
                ..settings()
            },
            CancellationToken::new(),
        );
        let task = tokio::spawn(handler.run());

        assert_eq!(peer.recv().await.unwrap(), r#"{"type":"heartbeat"}"#);
        peer.hang_up();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_failure_deregisters() {
        let display = display();
        let (channel, receiver, _peer) = memory_connection(ChannelId::new(1));
        channel.fail_sends(true);
        let handler = ConnectionHandler::new(
            channel.clone(),
            receiver,
            Arc::clone(&display),
            settings(),
            CancellationToken::new(),
        );

        assert_eq!(handler.run().await, DisconnectReason::SendFailed);
        assert!(display.registry().is_empty().await);
        assert_eq!(channel.close_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_receive_failure_deregisters() {
        let display = display();
        let (channel, receiver, mut peer) = memory_connection(ChannelId::new(1));
        let handler = ConnectionHandler::new(
            channel.clone(),
            receiver,
            Arc::clone(&display),
            settings(),
            CancellationToken::new(),
        );
        let task = tokio::spawn(handler.run());

        peer.recv().await.unwrap();
        peer.break_connection("connection reset");

        assert_eq!(task.await.unwrap(), DisconnectReason::ReceiveFailed);
        assert!(display.registry().is_empty().await);
        assert!(channel.is_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_peer_times_out() {
        let display = display();
        let (channel, receiver, mut peer) = memory_connection(ChannelId::new(1));
        let handler = ConnectionHandler::new(
            channel,
            receiver,
            Arc::clone(&display),
            LifecycleSettings {
                idle_timeout: Some(Duration::from_secs(30)),
                ..settings()
            },
            CancellationToken::new(),
        );
        let task = tokio::spawn(handler.run());

        peer.recv().await.unwrap();
        assert_eq!(task.await.unwrap(), DisconnectReason::IdleTimeout);
        assert!(display.registry().is_empty().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_ends_connection() {
        let display = display();
        let token = CancellationToken::new();
        let (channel, receiver, mut peer) = memory_connection(ChannelId::new(1));
        let handler = ConnectionHandler::new(
            channel.clone(),
            receiver,
            Arc::clone(&display),
            settings(),
            token.clone(),
        );
        let task = tokio::spawn(handler.run());

        peer.recv().await.unwrap();
        token.cancel();

        assert_eq!(task.await.unwrap(), DisconnectReason::Shutdown);
        assert!(display.registry().is_empty().await);
        assert_eq!(channel.close_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_channel_dropped_by_broadcast_closes_once() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("apple_1")).unwrap();
        let catalog = ObjectCatalog::scan(dir.path());

        let display = display();
        let (channel, receiver, mut peer) = memory_connection(ChannelId::new(1));
        let handler = ConnectionHandler::new(
            channel.clone(),
            receiver,
            Arc::clone(&display),
            settings(),
            CancellationToken::new(),
        );
        let task = tokio::spawn(handler.run());
        peer.recv().await.unwrap();

        channel.fail_sends(true);
        let outcome = display.update("apple", 0.1, &catalog).await.unwrap();
        assert_eq!(outcome.report.dropped, vec![ChannelId::new(1)]);
        assert_eq!(channel.close_calls(), 1);

        // The handler notices on its next push and its own remove is a no-op
        peer.say("ping");
        assert_eq!(task.await.unwrap(), DisconnectReason::SendFailed);
        assert_eq!(channel.close_calls(), 1);
    }

    #[test]
    fn test_pause_includes_bounded_jitter() {
        let (channel, receiver, _peer) = memory_connection(ChannelId::new(1));
        let handler = ConnectionHandler::new(
            channel,
            receiver,
            display(),
            LifecycleSettings {
                push_jitter: Duration::from_millis(200),
                ..settings()
            },
            CancellationToken::new(),
        );

        for _ in 0..50 {
            let pause = handler.pause();
            assert!(pause >= Duration::from_millis(1000));
            assert!(pause <= Duration::from_millis(1200));
        }
    }

    #[test]
    fn test_settings_from_config() {
        let config = Config {
            push_mode: PushMode::Heartbeat,
            idle_timeout_secs: 0,
            ..Config::default()
        };
        let settings = LifecycleSettings::from(&config);
        assert_eq!(settings.push_mode, PushMode::Heartbeat);
        assert_eq!(settings.idle_timeout, None);
        assert_eq!(settings.push_interval, Duration::from_millis(1000));
    }
}
