//! Network transport adapter: typed frames out, best-effort delivery.
//!
//! Game logic never touches the WebSocket library directly. Each connection
//! is represented by a [`ConnectionHandle`] wrapping an unbounded channel of
//! serialized JSON frames; a per-socket writer task drains the channel into
//! the actual sink. A failed send is logged and swallowed so one dead peer
//! never blocks a broadcast to the others.

use crate::game::Game;
use crate::utils::timestamp_ms;
use log::{debug, warn};
use shared::ServerFrame;
use tokio::sync::mpsc;

/// Cheap-clone send capability for one connected client.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: u64,
    tx: mpsc::UnboundedSender<String>,
}

impl ConnectionHandle {
    pub fn new(id: u64, tx: mpsc::UnboundedSender<String>) -> Self {
        Self { id, tx }
    }

    /// Creates a handle together with the receiving end the socket writer
    /// task drains.
    pub fn channel(id: u64) -> (Self, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { id, tx }, rx)
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Queues a frame for delivery. Fire-and-forget: a closed peer is
    /// logged at debug level and otherwise ignored.
    pub fn send(&self, frame: &ServerFrame) {
        match serde_json::to_string(frame) {
            Ok(json) => {
                if self.tx.send(json).is_err() {
                    debug!("connection {} gone, dropping outbound frame", self.id);
                }
            }
            Err(e) => warn!("failed to serialize frame for connection {}: {}", self.id, e),
        }
    }
}

/// Sends a typed error frame with a millisecond timestamp.
pub fn send_error(conn: &ConnectionHandle, message: &str) {
    conn.send(&ServerFrame::Error {
        message: message.to_string(),
        timestamp: timestamp_ms(),
    });
}

/// Sends the current state snapshot to every client registered on the game.
pub fn broadcast_state(game: &Game) {
    let frame = ServerFrame::GameState {
        data: game.snapshot(),
    };
    for client in game.clients.values() {
        client.conn.send(&frame);
    }
}

/// Sends the full static geometry plus state, used for (re)initialization
/// after a reset or restart.
pub fn broadcast_setup(game: &Game) {
    let frame = ServerFrame::GameSetup {
        data: game.setup_snapshot(),
    };
    for client in game.clients.values() {
        client.conn.send(&frame);
    }
}
