// Copyright 2026 Daniel Pelikan
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Event queue between session workers and the controller.
//!
//! Any number of workers push; one controller drains. The queue is the only
//! place where worker output is serialized, so the order the controller sees
//! is the order events were pushed.

use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::bluetooth::{
    ConnectError, CorrelationId, DiscoveredDevice, IoError, PeerInfo, TextMessage,
};

/// Events emitted by a session.
#[derive(Debug)]
pub enum SessionEvent {
    /// Device discovery began.
    DiscoveryStarted,
    /// Devices found by a discovery run.
    DiscoveryResult { devices: Vec<DiscoveredDevice> },
    /// Device discovery finished.
    DiscoveryComplete,
    /// Link established.
    ConnectionMade { peer: PeerInfo },
    /// A connect attempt failed.
    ConnectionFailed { cause: ConnectError, comment: String },
    /// An established link broke.
    ConnectionLost { cause: IoError },
    /// The link was closed on request.
    Disconnected { comment: String },
    /// A text message arrived from the peer.
    MessageReceived { message: TextMessage },
    /// An outbound write reached the transport.
    WriteSucceeded { id: CorrelationId },
    /// An outbound write failed.
    WriteFailed { id: CorrelationId, cause: IoError },
    /// Informational progress.
    Note { note: String },
    /// A non-fatal error.
    Error { comment: String, cause: anyhow::Error },
}

impl SessionEvent {
    /// Stable name for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::DiscoveryStarted => "discovery_started",
            Self::DiscoveryResult { .. } => "discovery_result",
            Self::DiscoveryComplete => "discovery_complete",
            Self::ConnectionMade { .. } => "connection_made",
            Self::ConnectionFailed { .. } => "connection_failed",
            Self::ConnectionLost { .. } => "connection_lost",
            Self::Disconnected { .. } => "disconnected",
            Self::MessageReceived { .. } => "message_received",
            Self::WriteSucceeded { .. } => "write_succeeded",
            Self::WriteFailed { .. } => "write_failed",
            Self::Note { .. } => "note",
            Self::Error { .. } => "error",
        }
    }

    pub(crate) fn note(note: impl Into<String>) -> Self {
        Self::Note { note: note.into() }
    }

    pub(crate) fn error(comment: impl Into<String>, cause: impl Into<anyhow::Error>) -> Self {
        Self::Error {
            comment: comment.into(),
            cause: cause.into(),
        }
    }
}

/// Create a connected sender/receiver pair.
pub fn event_queue() -> (EventSender, EventReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (EventSender { tx }, EventReceiver { rx })
}

/// Producer handle. Cheap to clone; one per worker.
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: mpsc::UnboundedSender<SessionEvent>,
}

impl EventSender {
    /// Queue an event. Never blocks.
    pub fn push(&self, event: SessionEvent) {
        trace!("Event queued: {}", event.kind());
        if let Err(e) = self.tx.send(event) {
            debug!("Event dropped, controller gone: {}", e.0.kind());
        }
    }
}

/// Consumer handle held by the controller.
#[derive(Debug)]
pub struct EventReceiver {
    rx: mpsc::UnboundedReceiver<SessionEvent>,
}

impl EventReceiver {
    /// Wait for at least one event, then return everything queued.
    ///
    /// Returns an empty batch only once every sender has been dropped.
    pub async fn wait_and_drain(&mut self) -> Vec<SessionEvent> {
        let Some(first) = self.rx.recv().await else {
            return Vec::new();
        };
        let mut batch = vec![first];
        while let Ok(event) = self.rx.try_recv() {
            batch.push(event);
        }
        batch
    }

    /// Return everything queued without waiting.
    pub fn try_drain(&mut self) -> Vec<SessionEvent> {
        let mut batch = Vec::new();
        while let Ok(event) = self.rx.try_recv() {
            batch.push(event);
        }
        batch
    }
}
