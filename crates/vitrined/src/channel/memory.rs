//! In-memory channel transport.
//!
//! Behaves like a websocket from the server's point of view but is driven
//! by a `MemoryPeer` held by the caller. Failures and stalls can be injected
//! to exercise the registry's isolation guarantees.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::{Channel, ChannelError, ChannelId, Receiver};

/// Sending side of an in-memory connection.
pub struct MemoryChannel {
    id: ChannelId,
    outbox: mpsc::UnboundedSender<String>,
    fail_sends: AtomicBool,
    stall_sends: AtomicBool,
    closed: AtomicBool,
    close_calls: AtomicUsize,
}

impl MemoryChannel {
    /// Makes every later send fail (or succeed again).
    pub fn fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::Release);
    }

    /// Makes every later send hang until cancelled.
    pub fn stall_sends(&self, stall: bool) {
        self.stall_sends.store(stall, Ordering::Release);
    }

    /// Returns true once `close` has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Number of times `close` was called.
    pub fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::Acquire)
    }
}

#[async_trait]
impl Channel for MemoryChannel {
    fn id(&self) -> ChannelId {
        self.id
    }

    async fn send(&self, text: &str) -> Result<(), ChannelError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(ChannelError::Closed);
        }
        if self.fail_sends.load(Ordering::Acquire) {
            return Err(ChannelError::Send("injected failure".to_string()));
        }
        if self.stall_sends.load(Ordering::Acquire) {
            std::future::pending::<()>().await;
        }
        self.outbox
            .send(text.to_string())
            .map_err(|_| ChannelError::Closed)
    }

    async fn close(&self) -> Result<(), ChannelError> {
        self.close_calls.fetch_add(1, Ordering::AcqRel);
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}

/// Receiving side of an in-memory connection.
pub struct MemoryReceiver {
    inbound: mpsc::UnboundedReceiver<Result<String, ChannelError>>,
}

#[async_trait]
impl Receiver for MemoryReceiver {
    async fn receive(&mut self) -> Result<Option<String>, ChannelError> {
        match self.inbound.recv().await {
            Some(Ok(text)) => Ok(Some(text)),
            Some(Err(e)) => Err(e),
            None => Ok(None),
        }
    }
}

/// The remote end of an in-memory connection.
pub struct MemoryPeer {
    outbox: mpsc::UnboundedReceiver<String>,
    inbound: Option<mpsc::UnboundedSender<Result<String, ChannelError>>>,
}

impl MemoryPeer {
    /// Waits for the next message the server sent.
    pub async fn recv(&mut self) -> Option<String> {
        self.outbox.recv().await
    }

    /// Returns an already delivered message, if any.
    pub fn try_recv(&mut self) -> Option<String> {
        self.outbox.try_recv().ok()
    }

    /// Sends a keepalive message to the server.
    pub fn say(&self, text: &str) {
        if let Some(inbound) = &self.inbound {
            let _ = inbound.send(Ok(text.to_string()));
        }
    }

    /// Makes the server's next receive fail.
    pub fn break_connection(&self, reason: &str) {
        if let Some(inbound) = &self.inbound {
            let _ = inbound.send(Err(ChannelError::Receive(reason.to_string())));
        }
    }

    /// Closes the inbound direction, as a disconnecting client would.
    pub fn hang_up(&mut self) {
        self.inbound = None;
    }
}

/// Creates a channel whose sent messages land in the returned receiver.
pub fn memory_channel(id: ChannelId) -> (Arc<MemoryChannel>, mpsc::UnboundedReceiver<String>) {
    let (outbox_tx, outbox_rx) = mpsc::unbounded_channel();
    let channel = MemoryChannel {
        id,
        outbox: outbox_tx,
        fail_sends: AtomicBool::new(false),
        stall_sends: AtomicBool::new(false),
        closed: AtomicBool::new(false),
        close_calls: AtomicUsize::new(0),
    };
    (Arc::new(channel), outbox_rx)
}

/// Creates a full duplex in-memory connection.
pub fn memory_connection(id: ChannelId) -> (Arc<MemoryChannel>, MemoryReceiver, MemoryPeer) {
    let (channel, outbox) = memory_channel(id);
    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
    (
        channel,
        MemoryReceiver {
            inbound: inbound_rx,
        },
        MemoryPeer {
            outbox,
            inbound: Some(inbound_tx),
        },
    )
}
