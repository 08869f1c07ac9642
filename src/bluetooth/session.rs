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

//! Connection lifecycle for a single peer.
//!
//! A [`Session`] moves through `None -> Connecting -> Connected -> None`.
//! Every blocking operation runs on a tracked tokio task and reports back
//! through the event queue; the calling thread only ever sees misuse errors.

use futures::FutureExt;
use parking_lot::Mutex;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::error::{ConnectError, IoError, SessionError};
use super::protocol::{
    normalize_phone_number, MessageReassembler, TextMessage, CONTACT_PLACEHOLDER,
    DEFAULT_MAX_MESSAGE_LEN,
};
use super::transport::{PeerInfo, ServiceId, Stream, Transport};
use crate::events::{event_queue, EventReceiver, EventSender, SessionEvent};

/// Default service UUID shared with the phone app.
pub const DEFAULT_SERVICE_UUID: Uuid = Uuid::from_u128(0x56abddf0_d4d2_45c7_9b2b_7837582d436f);

/// Default advertised service name.
pub const DEFAULT_SERVICE_NAME: &str = "TerminalTexting";

/// Handle matching an asynchronous write result to its submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CorrelationId(pub u64);

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    None,
    Connecting,
    Connected,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::None => "None",
            SessionState::Connecting => "Connecting",
            SessionState::Connected => "Connected",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which side initiated the link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Server,
    Client,
}

/// Settings consumed by a session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub service: ServiceId,
    /// Maximum bytes requested per `recv`.
    pub recv_buffer_size: usize,
    /// Longest inbound message body accepted.
    pub max_message_len: usize,
    pub discovery_duration: Duration,
    /// Contact name written on outbound messages.
    pub contact_placeholder: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            service: ServiceId::new(DEFAULT_SERVICE_UUID, DEFAULT_SERVICE_NAME),
            recv_buffer_size: 1024,
            max_message_len: DEFAULT_MAX_MESSAGE_LEN,
            discovery_duration: Duration::from_secs(8),
            contact_placeholder: CONTACT_PLACEHOLDER.to_string(),
        }
    }
}

/// Mutable session state, guarded by one lock.
struct Inner {
    state: SessionState,
    role: Option<Role>,
    stream: Option<Arc<dyn Stream>>,
    peer: Option<PeerInfo>,
    /// Canceled by disconnect/stop; replaced on each connect attempt.
    cancel: CancellationToken,
    discovery_cancel: Option<CancellationToken>,
    next_id: u64,
    stopped: bool,
}

/// Everything a worker task needs.
#[derive(Clone)]
struct Context {
    transport: Arc<dyn Transport>,
    config: Arc<SessionConfig>,
    inner: Arc<Mutex<Inner>>,
    events: EventSender,
}

/// A single managed connection.
pub struct Session {
    ctx: Context,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl Session {
    /// Create a session and the receiver its events arrive on.
    pub fn new(transport: Arc<dyn Transport>, config: SessionConfig) -> (Self, EventReceiver) {
        let (events, receiver) = event_queue();
        let inner = Inner {
            state: SessionState::None,
            role: None,
            stream: None,
            peer: None,
            cancel: CancellationToken::new(),
            discovery_cancel: None,
            next_id: 0,
            stopped: false,
        };
        let session = Self {
            ctx: Context {
                transport,
                config: Arc::new(config),
                inner: Arc::new(Mutex::new(inner)),
                events,
            },
            workers: Mutex::new(Vec::new()),
        };
        (session, receiver)
    }

    pub fn state(&self) -> SessionState {
        self.ctx.inner.lock().state
    }

    pub fn is_connected(&self) -> bool {
        self.state() == SessionState::Connected
    }

    /// Role of the current or most recent connection.
    pub fn role(&self) -> Option<Role> {
        self.ctx.inner.lock().role
    }

    /// Current peer, or the last one seen until the next connect attempt.
    pub fn who(&self) -> Option<PeerInfo> {
        self.ctx.inner.lock().peer.clone()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.ctx.config
    }

    /// Advertise the service and wait for a peer.
    pub fn connect_as_server(&self) -> Result<(), SessionError> {
        self.begin_connect(Role::Server, None)
    }

    /// Connect to the service on `address`.
    pub fn connect_as_client(&self, address: &str) -> Result<(), SessionError> {
        self.begin_connect(Role::Client, Some(address.to_string()))
    }

    fn begin_connect(&self, role: Role, address: Option<String>) -> Result<(), SessionError> {
        let cancel = {
            let mut inner = self.ctx.inner.lock();
            if inner.stopped {
                return Err(SessionError::Stopped);
            }
            if inner.state != SessionState::None {
                return Err(SessionError::AlreadyActive { state: inner.state });
            }
            inner.state = SessionState::Connecting;
            inner.role = Some(role);
            inner.peer = None;
            inner.next_id = 0;
            inner.cancel = CancellationToken::new();
            inner.cancel.clone()
        };

        info!("Session connecting as {:?}", role);
        let ctx = self.ctx.clone();
        self.spawn(async move { ctx.run_connection(address, cancel).await });
        Ok(())
    }

    /// Send a message with the configured placeholder contact name.
    ///
    /// A bare 10-digit number is normalized to `+1XXXXXXXXXX` first.
    pub fn submit_write(
        &self,
        phone_number: &str,
        message: &str,
    ) -> Result<CorrelationId, SessionError> {
        let message = TextMessage::new(normalize_phone_number(phone_number), message)
            .with_contact(self.ctx.config.contact_placeholder.clone());
        self.submit_message(&message)
    }

    /// Send a fully specified message.
    ///
    /// The result arrives later as exactly one `WriteSucceeded` or
    /// `WriteFailed` carrying the returned id.
    pub fn submit_message(&self, message: &TextMessage) -> Result<CorrelationId, SessionError> {
        let (id, stream, payload) = {
            let mut inner = self.ctx.inner.lock();
            let stream = match (inner.state, &inner.stream) {
                (SessionState::Connected, Some(stream)) => stream.clone(),
                _ => return Err(SessionError::NotConnected),
            };
            let payload = message.to_bytes()?;
            inner.next_id += 1;
            (CorrelationId(inner.next_id), stream, payload)
        };

        debug!("Write {} queued: {} bytes", id, payload.len());
        let events = self.ctx.events.clone();
        self.spawn(async move {
            match stream.send(&payload).await {
                Ok(()) => {
                    debug!("Write {} sent", id);
                    events.push(SessionEvent::WriteSucceeded { id });
                }
                Err(cause) => {
                    warn!("Write {} failed: {}", id, cause);
                    events.push(SessionEvent::WriteFailed { id, cause });
                }
            }
        });
        Ok(id)
    }

    /// Scan for nearby devices.
    pub fn discover(&self) -> Result<(), SessionError> {
        let cancel = {
            let mut inner = self.ctx.inner.lock();
            if inner.stopped {
                return Err(SessionError::Stopped);
            }
            if inner.discovery_cancel.is_some() {
                return Err(SessionError::DiscoveryInProgress);
            }
            let token = CancellationToken::new();
            inner.discovery_cancel = Some(token.clone());
            token
        };

        let ctx = self.ctx.clone();
        self.spawn(async move { ctx.run_discovery(cancel).await });
        Ok(())
    }

    /// Close the current link or abandon the current attempt.
    ///
    /// Returns once every worker has finished. The session can connect again
    /// afterwards.
    pub async fn disconnect(&mut self) {
        self.shutdown("Disconnected").await;
    }

    /// Like [`disconnect`](Self::disconnect), but leaves the session inert.
    pub async fn stop(&mut self) {
        self.ctx.inner.lock().stopped = true;
        self.shutdown("Session stopped").await;
        info!("Session stopped");
    }

    async fn shutdown(&mut self, comment: &str) {
        let (was_connected, stream) = {
            let mut inner = self.ctx.inner.lock();
            inner.cancel.cancel();
            if let Some(token) = &inner.discovery_cancel {
                token.cancel();
            }
            (inner.state == SessionState::Connected, inner.stream.take())
        };

        if let Some(stream) = stream {
            stream.close().await;
            debug!("Stream closed");
        }

        let workers = std::mem::take(&mut *self.workers.lock());
        debug!("Joining {} worker(s)", workers.len());
        for handle in workers {
            if let Err(e) = handle.await {
                error!("Session worker ended abnormally: {}", e);
            }
        }

        {
            let mut inner = self.ctx.inner.lock();
            inner.state = SessionState::None;
            inner.discovery_cancel = None;
        }

        if was_connected {
            info!("{}", comment);
            self.ctx.events.push(SessionEvent::Disconnected {
                comment: comment.to_string(),
            });
        }
    }

    fn spawn<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let finished = {
            let mut workers = self.workers.lock();
            let (finished, running): (Vec<_>, Vec<_>) =
                workers.drain(..).partition(|handle| handle.is_finished());
            *workers = running;
            workers.push(tokio::spawn(task));
            finished
        };

        // Already complete, so polling once yields the result.
        for handle in finished {
            if let Some(Err(e)) = handle.now_or_never() {
                error!("Session worker ended abnormally: {}", e);
            }
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        let inner = self.ctx.inner.lock();
        inner.cancel.cancel();
        if let Some(token) = &inner.discovery_cancel {
            token.cancel();
        }
    }
}

impl Context {
    /// Connect, then read until the link goes away.
    async fn run_connection(self, address: Option<String>, cancel: CancellationToken) {
        let service = &self.config.service;
        let attempt = async {
            match address.as_deref() {
                None => self.transport.listen_for_server(service).await,
                Some(address) => self.transport.connect_to_peer(address, service).await,
            }
        };

        let result = tokio::select! {
            _ = cancel.cancelled() => Err(ConnectError::Canceled),
            result = attempt => result,
        };

        let link = match result {
            Ok(link) => link,
            Err(cause) => {
                self.connect_failed(cause, &cancel);
                return;
            }
        };

        let accepted = {
            let mut inner = self.inner.lock();
            if cancel.is_cancelled() {
                false
            } else {
                inner.state = SessionState::Connected;
                inner.stream = Some(link.stream.clone());
                inner.peer = Some(link.peer.clone());
                info!("Connection made with {}", link.peer);
                self.events.push(SessionEvent::ConnectionMade {
                    peer: link.peer.clone(),
                });
                true
            }
        };

        if !accepted {
            link.stream.close().await;
            self.events
                .push(SessionEvent::note("connection attempt canceled"));
            return;
        }

        self.receive_loop(link.stream, cancel).await;
    }

    fn connect_failed(&self, cause: ConnectError, cancel: &CancellationToken) {
        let mut inner = self.inner.lock();
        if cancel.is_cancelled() {
            info!("Connection attempt canceled");
            self.events
                .push(SessionEvent::note("connection attempt canceled"));
            return;
        }
        inner.state = SessionState::None;
        let comment = failure_comment(&cause).to_string();
        warn!("{}: {}", comment, cause);
        self.events
            .push(SessionEvent::ConnectionFailed { cause, comment });
    }

    async fn receive_loop(&self, stream: Arc<dyn Stream>, cancel: CancellationToken) {
        info!("Listening for messages");
        let mut reassembler = MessageReassembler::new(self.config.max_message_len);
        let cause = loop {
            let read = tokio::select! {
                _ = cancel.cancelled() => return,
                read = stream.recv(self.config.recv_buffer_size) => read,
            };

            match read {
                Ok(buf) if buf.is_empty() => break IoError::Closed,
                Ok(buf) => self.dispatch_chunk(&mut reassembler, &buf),
                Err(e) => break e,
            }
        };

        if reassembler.buffered() > 0 {
            debug!(
                "Dropping {} bytes of an incomplete message",
                reassembler.buffered()
            );
        }

        self.connection_lost(cause, &cancel, stream).await;
    }

    /// Emit every message a received chunk completes.
    fn dispatch_chunk(&self, reassembler: &mut MessageReassembler, buf: &[u8]) {
        for result in reassembler.push(buf) {
            match result {
                Ok(message) => {
                    debug!("Message received from {}", message.phone_number);
                    self.events.push(SessionEvent::MessageReceived { message });
                }
                Err(e) => {
                    warn!("Malformed message: {}", e);
                    self.events.push(SessionEvent::error("malformed message", e));
                }
            }
        }
    }

    async fn connection_lost(
        &self,
        cause: IoError,
        cancel: &CancellationToken,
        stream: Arc<dyn Stream>,
    ) {
        {
            let mut inner = self.inner.lock();
            if cancel.is_cancelled() {
                // disconnect() owns this transition
                return;
            }
            inner.state = SessionState::None;
            inner.stream = None;
            error!("Connection lost: {}", cause);
            self.events.push(SessionEvent::ConnectionLost { cause });
        }
        stream.close().await;
    }

    async fn run_discovery(self, cancel: CancellationToken) {
        info!("Discovering devices...");
        self.events.push(SessionEvent::DiscoveryStarted);

        let result = tokio::select! {
            _ = cancel.cancelled() => None,
            result = self.transport.discover(self.config.discovery_duration) => Some(result),
        };

        match result {
            Some(Ok(devices)) => {
                info!("Discovery found {} device(s)", devices.len());
                self.events.push(SessionEvent::DiscoveryResult { devices });
            }
            Some(Err(e)) => {
                warn!("Discovery failed: {}", e);
                self.events.push(SessionEvent::error("discovery failed", e));
            }
            None => {
                self.events.push(SessionEvent::note("discovery canceled"));
            }
        }

        self.inner.lock().discovery_cancel = None;
        self.events.push(SessionEvent::DiscoveryComplete);
    }
}

/// Human-readable context for a failed connect.
fn failure_comment(cause: &ConnectError) -> &'static str {
    match cause {
        ConnectError::BindFailed(_) => "Failed to create a server socket",
        ConnectError::AdvertiseFailed(_) => "Failed to advertise the service",
        ConnectError::AcceptFailed(_) => "There was an issue accepting connections",
        ConnectError::ServiceNotFound { .. } => "Didn't find any matching service",
        ConnectError::ConnectFailed(_) => "Error when connecting to the remote device",
        ConnectError::DiscoveryFailed(_) => "Could not search for matching services",
        ConnectError::Canceled => "Connection attempt canceled",
    }
}
