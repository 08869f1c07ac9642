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

//! Error types for the Bluetooth session layer.

use thiserror::Error;

use super::session::SessionState;

/// Failure to establish a link, as either server or client.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectError {
    #[error("Failed to bind RFCOMM socket: {0}")]
    BindFailed(String),

    #[error("Failed to advertise service: {0}")]
    AdvertiseFailed(String),

    #[error("Failed to accept connection: {0}")]
    AcceptFailed(String),

    #[error("Service not found on {address}")]
    ServiceNotFound { address: String },

    #[error("Failed to connect to peer: {0}")]
    ConnectFailed(String),

    #[error("Device discovery failed: {0}")]
    DiscoveryFailed(String),

    #[error("Connection attempt canceled")]
    Canceled,
}

/// Failure on an established stream.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IoError {
    #[error("Connection closed")]
    Closed,

    #[error("Write failed: {0}")]
    WriteFailed(String),

    #[error("Read failed: {0}")]
    ReadFailed(String),
}

/// Failure to decode a wire message.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Truncated input reading {field}: needed {needed} bytes, {available} available")]
    TruncatedInput {
        field: &'static str,
        needed: usize,
        available: usize,
    },

    #[error("Invalid text encoding in {field}")]
    InvalidEncoding { field: &'static str },

    #[error("Negative message length: {0}")]
    NegativeLength(i32),

    #[error("Message length {len} exceeds the {max} byte limit")]
    MessageTooLarge { len: usize, max: usize },
}

/// Failure to encode an outbound message.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EncodeError {
    #[error("Phone number must be 12 bytes, got {len}")]
    PhoneNumberWidth { len: usize },

    #[error("Contact name too long: {len} bytes (max 255)")]
    ContactNameTooLong { len: usize },

    #[error("Message too long: {len} bytes")]
    MessageTooLong { len: usize },
}

/// Misuse of the session API on the calling thread.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("Not connected")]
    NotConnected,

    #[error("Session already active ({state})")]
    AlreadyActive { state: SessionState },

    #[error("Session has been stopped")]
    Stopped,

    #[error("Discovery already in progress")]
    DiscoveryInProgress,

    #[error(transparent)]
    Encode(#[from] EncodeError),
}
