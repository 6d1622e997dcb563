//! Websocket transport for `Channel` and `Receiver`.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::sync::Mutex;

use super::{Channel, ChannelError, ChannelId, Receiver};

/// Splits an upgraded socket into its registrable sender and its receiver.
pub fn split_websocket(socket: WebSocket, id: ChannelId) -> (WsChannel, WsReceiver) {
    let (sink, stream) = socket.split();
    (
        WsChannel {
            id,
            sink: Mutex::new(sink),
            closed: AtomicBool::new(false),
        },
        WsReceiver { stream },
    )
}

/// Write half of a websocket.
///
/// Concurrent senders (broadcasts and the connection's own pushes) are
/// serialized by the sink mutex, so frames never interleave.
pub struct WsChannel {
    id: ChannelId,
    sink: Mutex<SplitSink<WebSocket, Message>>,
    closed: AtomicBool,
}

#[async_trait]
impl Channel for WsChannel {
    fn id(&self) -> ChannelId {
        self.id
    }

    async fn send(&self, text: &str) -> Result<(), ChannelError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(ChannelError::Closed);
        }
        let mut sink = self.sink.lock().await;
        sink.send(Message::Text(text.to_owned().into()))
            .await
            .map_err(|e| ChannelError::Send(e.to_string()))
    }

    async fn close(&self) -> Result<(), ChannelError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let mut sink = self.sink.lock().await;
        sink.close()
            .await
            .map_err(|e| ChannelError::Send(e.to_string()))
    }
}

/// Read half of a websocket.
pub struct WsReceiver {
    stream: SplitStream<WebSocket>,
}

#[async_trait]
impl Receiver for WsReceiver {
    async fn receive(&mut self) -> Result<Option<String>, ChannelError> {
        while let Some(frame) = self.stream.next().await {
            match frame {
                Ok(Message::Text(text)) => return Ok(Some(text.as_str().to_owned())),
                Ok(Message::Binary(bytes)) => {
                    return Ok(Some(String::from_utf8_lossy(&bytes).into_owned()));
                }
                // Control frames are answered by the transport itself
                Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => continue,
                Ok(Message::Close(_)) => return Ok(None),
                Err(e) => return Err(ChannelError::Receive(e.to_string())),
            }
        }
        Ok(None)
    }
}
