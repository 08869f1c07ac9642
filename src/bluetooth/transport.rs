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

//! Capability traits the session uses to reach the radio.
//!
//! The session never touches sockets directly. It asks a [`Transport`] for a
//! [`Link`] in one of two roles and then moves bytes through the link's
//! [`Stream`]. Cancellation is done by dropping the pending future, so
//! implementations must release their resources on drop.

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use super::error::{ConnectError, IoError};

/// Service identity advertised by the server and looked up by the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceId {
    pub uuid: Uuid,
    pub name: String,
}

impl ServiceId {
    pub fn new(uuid: Uuid, name: impl Into<String>) -> Self {
        Self {
            uuid,
            name: name.into(),
        }
    }
}

/// Identity of the remote end of a link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerInfo {
    pub address: String,
    pub channel: u8,
}

impl fmt::Display for PeerInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (channel {})", self.address, self.channel)
    }
}

/// A device seen during discovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredDevice {
    pub address: String,
    pub name: Option<String>,
}

/// An established connection.
pub struct Link {
    pub stream: Arc<dyn Stream>,
    pub peer: PeerInfo,
}

impl fmt::Debug for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Link").field("peer", &self.peer).finish()
    }
}

/// Establishes links.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Advertise `service` and wait for a single peer to connect.
    async fn listen_for_server(&self, service: &ServiceId) -> Result<Link, ConnectError>;

    /// Look up `service` on `address` and connect to it.
    async fn connect_to_peer(&self, address: &str, service: &ServiceId)
        -> Result<Link, ConnectError>;

    /// Scan for nearby devices for `duration`.
    async fn discover(&self, duration: Duration) -> Result<Vec<DiscoveredDevice>, ConnectError>;
}

/// Bidirectional byte stream.
///
/// All methods take `&self`; the receive loop and any number of writers
/// share one stream concurrently.
#[async_trait]
pub trait Stream: Send + Sync {
    async fn send(&self, data: &[u8]) -> Result<(), IoError>;

    /// Read up to `max_bytes`. An empty result means the peer closed.
    async fn recv(&self, max_bytes: usize) -> Result<Vec<u8>, IoError>;

    /// Close the stream. Blocked `send`/`recv` calls fail with
    /// [`IoError::Closed`].
    async fn close(&self);
}
