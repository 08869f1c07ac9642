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

//! Bluetooth communication module.
//!
//! Session state machine, wire codec and the RFCOMM transport it runs on.

mod error;
pub mod protocol;
mod rfcomm;
mod session;
mod transport;

pub use error::{ConnectError, DecodeError, EncodeError, IoError, SessionError};
pub use protocol::{decode, encode, encode_with_contact, MessageReassembler, TextMessage};
pub use rfcomm::{RfcommStream, RfcommTransport, DEFAULT_RFCOMM_CHANNEL};
pub use session::{
    CorrelationId, Role, Session, SessionConfig, SessionState, DEFAULT_SERVICE_NAME,
    DEFAULT_SERVICE_UUID,
};
pub use transport::{DiscoveredDevice, Link, PeerInfo, ServiceId, Stream, Transport};
