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

//! BlueZ RFCOMM transport.

use anyhow::Result;
use async_trait::async_trait;
use bluer::rfcomm::stream::{OwnedReadHalf, OwnedWriteHalf};
use bluer::rfcomm::{ConnectRequest, Profile, ProfileHandle, Role};
use bluer::{Adapter, AdapterEvent, Address};
use futures::StreamExt;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::error::{ConnectError, IoError};
use super::transport::{DiscoveredDevice, Link, PeerInfo, ServiceId, Stream, Transport};

/// RFCOMM channel used when none is configured.
pub const DEFAULT_RFCOMM_CHANNEL: u8 = 1;

/// Transport backed by the default BlueZ adapter.
pub struct RfcommTransport {
    session: bluer::Session,
    adapter: Adapter,
    channel: u8,
}

impl RfcommTransport {
    /// Open a BlueZ session on the default adapter.
    pub async fn new(channel: u8) -> Result<Self> {
        info!("Initializing Bluetooth transport...");

        let session = bluer::Session::new().await?;
        let adapter = session.default_adapter().await?;
        info!("Using Bluetooth adapter: {}", adapter.name());

        if !adapter.is_powered().await? {
            info!("Powering on Bluetooth adapter...");
            adapter.set_powered(true).await?;
        }

        Ok(Self {
            session,
            adapter,
            channel,
        })
    }

    pub fn adapter_name(&self) -> &str {
        self.adapter.name()
    }

    /// Accept a connect request and wrap the resulting socket.
    fn accept(&self, req: ConnectRequest, profile: ProfileHandle) -> Result<Link, ConnectError> {
        let device = req.device();
        let stream = req
            .accept()
            .map_err(|e| ConnectError::AcceptFailed(e.to_string()))?;
        let channel = stream
            .peer_addr()
            .map(|addr| addr.channel)
            .unwrap_or(self.channel);
        info!("Accepted RFCOMM connection from {}", device);

        Ok(Link {
            stream: Arc::new(RfcommStream::new(stream, profile)),
            peer: PeerInfo {
                address: device.to_string(),
                channel,
            },
        })
    }
}

#[async_trait]
impl Transport for RfcommTransport {
    async fn listen_for_server(&self, service: &ServiceId) -> Result<Link, ConnectError> {
        let powered = self
            .adapter
            .is_powered()
            .await
            .map_err(|e| ConnectError::BindFailed(e.to_string()))?;
        if !powered {
            return Err(ConnectError::BindFailed("adapter is powered off".into()));
        }

        let profile = Profile {
            uuid: service.uuid,
            name: Some(service.name.clone()),
            role: Some(Role::Server),
            channel: Some(self.channel.into()),
            require_authentication: Some(false),
            require_authorization: Some(false),
            ..Default::default()
        };
        let mut handle = self
            .session
            .register_profile(profile)
            .await
            .map_err(|e| ConnectError::AdvertiseFailed(e.to_string()))?;
        info!(
            "Advertising '{}' ({}) on RFCOMM channel {}",
            service.name, service.uuid, self.channel
        );

        let req = handle
            .next()
            .await
            .ok_or_else(|| ConnectError::AcceptFailed("profile unregistered".into()))?;
        self.accept(req, handle)
    }

    async fn connect_to_peer(
        &self,
        address: &str,
        service: &ServiceId,
    ) -> Result<Link, ConnectError> {
        let addr: Address = address
            .parse()
            .map_err(|_| ConnectError::ConnectFailed(format!("invalid address '{}'", address)))?;
        let device = self
            .adapter
            .device(addr)
            .map_err(|e| ConnectError::ConnectFailed(e.to_string()))?;

        let profile = Profile {
            uuid: service.uuid,
            name: Some(service.name.clone()),
            role: Some(Role::Client),
            require_authentication: Some(false),
            require_authorization: Some(false),
            auto_connect: Some(false),
            ..Default::default()
        };
        let mut handle = self
            .session
            .register_profile(profile)
            .await
            .map_err(|e| ConnectError::AdvertiseFailed(e.to_string()))?;
        info!("Connecting to '{}' on {}", service.name, addr);

        // BlueZ delivers the socket to the profile handle while
        // connect_profile is still pending.
        let connect = device.connect_profile(&service.uuid);
        tokio::pin!(connect);
        let mut connect_done = false;

        loop {
            tokio::select! {
                req = handle.next() => {
                    let req = req.ok_or_else(|| {
                        ConnectError::AcceptFailed("profile unregistered".into())
                    })?;
                    return self.accept(req, handle);
                }
                result = &mut connect, if !connect_done => {
                    connect_done = true;
                    if let Err(e) = result {
                        return Err(match e.kind {
                            bluer::ErrorKind::DoesNotExist | bluer::ErrorKind::NotAvailable => {
                                ConnectError::ServiceNotFound { address: address.to_string() }
                            }
                            _ => ConnectError::ConnectFailed(e.to_string()),
                        });
                    }
                    debug!("Profile connected, waiting for socket");
                }
            }
        }
    }

    async fn discover(&self, duration: Duration) -> Result<Vec<DiscoveredDevice>, ConnectError> {
        let mut found: Vec<Address> = Vec::new();
        {
            let events = self
                .adapter
                .discover_devices()
                .await
                .map_err(|e| ConnectError::DiscoveryFailed(e.to_string()))?;
            tokio::pin!(events);

            let deadline = tokio::time::Instant::now() + duration;
            while let Ok(Some(event)) = tokio::time::timeout_at(deadline, events.next()).await {
                if let AdapterEvent::DeviceAdded(addr) = event {
                    if !found.contains(&addr) {
                        debug!("Discovered {}", addr);
                        found.push(addr);
                    }
                }
            }
        }

        let mut devices = Vec::with_capacity(found.len());
        for addr in found {
            let name = match self.adapter.device(addr) {
                Ok(device) => device.name().await.unwrap_or_else(|e| {
                    warn!("Name lookup failed for {}: {}", addr, e);
                    None
                }),
                Err(_) => None,
            };
            devices.push(DiscoveredDevice {
                address: addr.to_string(),
                name,
            });
        }
        Ok(devices)
    }
}

/// An accepted RFCOMM socket.
///
/// The halves are locked independently so the receive loop never waits on a
/// writer.
pub struct RfcommStream {
    reader: tokio::sync::Mutex<OwnedReadHalf>,
    writer: tokio::sync::Mutex<OwnedWriteHalf>,
    closed: CancellationToken,
    /// Keeps the profile registered for the lifetime of the link.
    profile: Mutex<Option<ProfileHandle>>,
}

impl RfcommStream {
    fn new(stream: bluer::rfcomm::Stream, profile: ProfileHandle) -> Self {
        let (reader, writer) = stream.into_split();
        Self {
            reader: tokio::sync::Mutex::new(reader),
            writer: tokio::sync::Mutex::new(writer),
            closed: CancellationToken::new(),
            profile: Mutex::new(Some(profile)),
        }
    }
}

#[async_trait]
impl Stream for RfcommStream {
    async fn send(&self, data: &[u8]) -> Result<(), IoError> {
        let write = async {
            let mut writer = self.writer.lock().await;
            writer.write_all(data).await?;
            writer.flush().await
        };
        tokio::select! {
            _ = self.closed.cancelled() => Err(IoError::Closed),
            result = write => result.map_err(|e| IoError::WriteFailed(e.to_string())),
        }
    }

    async fn recv(&self, max_bytes: usize) -> Result<Vec<u8>, IoError> {
        let mut buf = vec![0u8; max_bytes];
        let read = async {
            let mut reader = self.reader.lock().await;
            reader.read(&mut buf).await
        };
        let n = tokio::select! {
            _ = self.closed.cancelled() => return Err(IoError::Closed),
            result = read => result.map_err(|e| IoError::ReadFailed(e.to_string()))?,
        };
        buf.truncate(n);
        Ok(buf)
    }

    async fn close(&self) {
        if self.closed.is_cancelled() {
            return;
        }
        self.closed.cancel();
        let mut writer = self.writer.lock().await;
        if let Err(e) = writer.shutdown().await {
            debug!("RFCOMM shutdown: {}", e);
        }
        drop(writer);
        self.profile.lock().take();
    }
}
