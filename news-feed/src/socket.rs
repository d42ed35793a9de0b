//! One WebSocket client session bridged to the broadcast hub.
//!
//! The read side relays client text to every other connected client; the write
//! side drains the client's outbound queue, coalescing whatever is pending
//! into one frame.

use crate::hub::{ClientId, HubHandle};
use axum::extract::ws::{Message, WebSocket};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval_at, timeout, Instant};
use tracing::{debug, warn};

pub const MAX_MESSAGE_BYTES: usize = 512;
pub const WRITE_WAIT: Duration = Duration::from_secs(10);
pub const PONG_WAIT: Duration = Duration::from_secs(60);
/// Must stay below `PONG_WAIT`.
pub const PING_PERIOD: Duration = Duration::from_secs(54);

pub async fn serve_client(socket: WebSocket, hub: HubHandle) {
    let (id, queue) = match hub.register().await {
        Ok(registered) => registered,
        Err(e) => {
            warn!("Refusing WebSocket client: {}", e);
            return;
        }
    };
    debug!("WebSocket client {} connected", id);

    let (sender, receiver) = socket.split();
    tokio::select! {
        _ = write_loop(id, sender, queue) => {}
        _ = read_loop(id, receiver, &hub) => {}
    }

    if let Err(e) = hub.unregister(id).await {
        debug!("Unregister of client {} skipped: {}", id, e);
    }
    debug!("WebSocket client {} disconnected", id);
}

async fn read_loop(id: ClientId, mut receiver: SplitStream<WebSocket>, hub: &HubHandle) {
    loop {
        // Any frame, pongs included, resets the deadline.
        let frame = match timeout(PONG_WAIT, receiver.next()).await {
            Ok(frame) => frame,
            Err(_) => {
                debug!("Client {} silent for {:?}", id, PONG_WAIT);
                return;
            }
        };
        match frame {
            Some(Ok(Message::Text(text))) => {
                let message = sanitize(text.as_str());
                if message.is_empty() {
                    continue;
                }
                if hub.relay(id, message).await.is_err() {
                    return;
                }
            }
            Some(Ok(Message::Close(_))) | None => return,
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                warn!("WebSocket error on client {}: {}", id, e);
                return;
            }
        }
    }
}

async fn write_loop(id: ClientId, mut sender: SplitSink<WebSocket, Message>, mut queue: mpsc::Receiver<String>) {
    let mut ping = interval_at(Instant::now() + PING_PERIOD, PING_PERIOD);
    loop {
        let frame = tokio::select! {
            message = queue.recv() => match message {
                Some(first) => Message::Text(coalesce(first, &mut queue).into()),
                None => {
                    // The hub dropped this client.
                    let _ = timeout(WRITE_WAIT, sender.send(Message::Close(None))).await;
                    return;
                }
            },
            _ = ping.tick() => Message::Ping(Default::default()),
        };

        match timeout(WRITE_WAIT, sender.send(frame)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                debug!("Write to client {} failed: {}", id, e);
                return;
            }
            Err(_) => {
                warn!("Write to client {} timed out", id);
                return;
            }
        }
    }
}

/// `first` plus everything already queued behind it, newline-joined.
pub fn coalesce(first: String, queue: &mut mpsc::Receiver<String>) -> String {
    let mut frame = first;
    while let Ok(next) = queue.try_recv() {
        frame.push('\n');
        frame.push_str(&next);
    }
    frame
}

/// Cap at `MAX_MESSAGE_BYTES`, flatten newlines, trim.
pub fn sanitize(text: &str) -> String {
    let mut end = text.len().min(MAX_MESSAGE_BYTES);
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    text[..end].replace(['\n', '\r'], " ").trim().to_string()
}
