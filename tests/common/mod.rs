//! Scripted in-memory transport for session tests.

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use terminal_texting::bluetooth::{
    ConnectError, DiscoveredDevice, IoError, Link, PeerInfo, ServiceId, Stream, Transport,
};
use terminal_texting::events::{EventReceiver, SessionEvent};

pub const PEER_ADDRESS: &str = "C0:EE:FB:27:43:16";

pub fn peer() -> PeerInfo {
    PeerInfo {
        address: PEER_ADDRESS.to_string(),
        channel: 1,
    }
}

/// What the next connect call should do.
pub enum ConnectPlan {
    Succeed(Arc<MockStream>),
    Fail(ConnectError),
    /// Block until canceled.
    Hang,
}

#[derive(Default)]
pub struct MockTransport {
    plans: Mutex<VecDeque<ConnectPlan>>,
    discovery: Mutex<Option<Result<Vec<DiscoveredDevice>, ConnectError>>>,
    discovery_panics: AtomicBool,
    pub listen_calls: AtomicUsize,
    pub connect_calls: AtomicUsize,
    pub connect_addresses: Mutex<Vec<String>>,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn plan(&self, plan: ConnectPlan) {
        self.plans.lock().push_back(plan);
    }

    pub fn plan_discovery(&self, result: Result<Vec<DiscoveredDevice>, ConnectError>) {
        *self.discovery.lock() = Some(result);
    }

    pub fn panic_on_discover(&self) {
        self.discovery_panics.store(true, Ordering::SeqCst);
    }

    async fn next_link(&self) -> Result<Link, ConnectError> {
        let plan = self.plans.lock().pop_front();
        match plan {
            Some(ConnectPlan::Succeed(stream)) => Ok(Link {
                stream,
                peer: peer(),
            }),
            Some(ConnectPlan::Fail(e)) => Err(e),
            Some(ConnectPlan::Hang) | None => std::future::pending().await,
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn listen_for_server(&self, _service: &ServiceId) -> Result<Link, ConnectError> {
        self.listen_calls.fetch_add(1, Ordering::SeqCst);
        self.next_link().await
    }

    async fn connect_to_peer(
        &self,
        address: &str,
        _service: &ServiceId,
    ) -> Result<Link, ConnectError> {
        self.connect_calls.fetch_add(1, Ordering::SeqCst);
        self.connect_addresses.lock().push(address.to_string());
        self.next_link().await
    }

    async fn discover(&self, _duration: Duration) -> Result<Vec<DiscoveredDevice>, ConnectError> {
        if self.discovery_panics.load(Ordering::SeqCst) {
            panic!("discovery backend crashed");
        }
        let result = self.discovery.lock().take();
        match result {
            Some(result) => result,
            None => std::future::pending().await,
        }
    }
}

enum Inbound {
    Data(Vec<u8>),
    Eof,
    Error(IoError),
}

/// Stream whose inbound side is fed by the test.
pub struct MockStream {
    inbound_tx: mpsc::UnboundedSender<Inbound>,
    inbound_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Inbound>>,
    pub sent: Mutex<Vec<Vec<u8>>>,
    pub fail_writes: AtomicBool,
    write_delay: Mutex<Duration>,
    closed: CancellationToken,
    pub close_calls: AtomicUsize,
}

impl MockStream {
    pub fn new() -> Arc<Self> {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        Arc::new(Self {
            inbound_tx,
            inbound_rx: tokio::sync::Mutex::new(inbound_rx),
            sent: Mutex::new(Vec::new()),
            fail_writes: AtomicBool::new(false),
            write_delay: Mutex::new(Duration::ZERO),
            closed: CancellationToken::new(),
            close_calls: AtomicUsize::new(0),
        })
    }

    pub fn feed(&self, bytes: Vec<u8>) {
        let _ = self.inbound_tx.send(Inbound::Data(bytes));
    }

    pub fn feed_eof(&self) {
        let _ = self.inbound_tx.send(Inbound::Eof);
    }

    pub fn feed_error(&self, error: IoError) {
        let _ = self.inbound_tx.send(Inbound::Error(error));
    }

    pub fn set_write_delay(&self, delay: Duration) {
        *self.write_delay.lock() = delay;
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }
}

#[async_trait]
impl Stream for MockStream {
    async fn send(&self, data: &[u8]) -> Result<(), IoError> {
        let delay = *self.write_delay.lock();
        tokio::select! {
            _ = self.closed.cancelled() => return Err(IoError::Closed),
            _ = tokio::time::sleep(delay) => {}
        }
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(IoError::WriteFailed("simulated failure".into()));
        }
        self.sent.lock().push(data.to_vec());
        Ok(())
    }

    async fn recv(&self, _max_bytes: usize) -> Result<Vec<u8>, IoError> {
        let next = async {
            let mut rx = self.inbound_rx.lock().await;
            rx.recv().await
        };
        tokio::select! {
            _ = self.closed.cancelled() => Err(IoError::Closed),
            item = next => match item {
                Some(Inbound::Data(bytes)) => Ok(bytes),
                Some(Inbound::Eof) | None => Ok(Vec::new()),
                Some(Inbound::Error(e)) => Err(e),
            },
        }
    }

    async fn close(&self) {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        self.closed.cancel();
    }
}

/// Buffers drained batches so tests can take events one at a time.
pub struct EventLog {
    rx: EventReceiver,
    buffered: VecDeque<SessionEvent>,
}

impl EventLog {
    pub fn new(rx: EventReceiver) -> Self {
        Self {
            rx,
            buffered: VecDeque::new(),
        }
    }

    /// Next event, failing the test after two seconds.
    pub async fn next(&mut self) -> SessionEvent {
        if let Some(event) = self.buffered.pop_front() {
            return event;
        }
        let batch = tokio::time::timeout(Duration::from_secs(2), self.rx.wait_and_drain())
            .await
            .expect("timed out waiting for event");
        self.buffered.extend(batch);
        self.buffered.pop_front().expect("event queue closed")
    }

    /// Everything that arrives within `window`.
    pub async fn collect_for(&mut self, window: Duration) -> Vec<SessionEvent> {
        let mut events: Vec<SessionEvent> = self.buffered.drain(..).collect();
        let deadline = tokio::time::Instant::now() + window;
        while let Ok(batch) = tokio::time::timeout_at(deadline, self.rx.wait_and_drain()).await {
            if batch.is_empty() {
                break;
            }
            events.extend(batch);
        }
        events
    }

    /// Whatever is queued right now.
    pub fn drain_now(&mut self) -> Vec<SessionEvent> {
        let mut events: Vec<SessionEvent> = self.buffered.drain(..).collect();
        events.extend(self.rx.try_drain());
        events
    }
}
