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

//! Configuration module.
//!
//! Handles loading and saving application settings.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use uuid::Uuid;

use crate::bluetooth::{
    ServiceId, SessionConfig, DEFAULT_RFCOMM_CHANNEL, DEFAULT_SERVICE_NAME, DEFAULT_SERVICE_UUID,
};
use crate::bluetooth::protocol::{CONTACT_PLACEHOLDER, DEFAULT_MAX_MESSAGE_LEN};

const APP_DIR: &str = "terminal-texting";

/// Application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Bluetooth settings.
    pub bluetooth: BluetoothConfig,

    /// Outbound message settings.
    pub messages: MessagesConfig,

    /// Log output.
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BluetoothConfig {
    /// Service UUID; must match the phone app.
    pub service_uuid: Uuid,

    /// Service name advertised over SDP.
    pub service_name: String,

    /// RFCOMM channel to listen on.
    pub channel: u8,

    /// Bytes requested per read.
    pub recv_buffer_size: usize,

    /// Longest inbound message accepted, in bytes.
    pub max_message_len: usize,

    /// Length of a discovery scan in seconds.
    pub discovery_secs: u64,
}

impl Default for BluetoothConfig {
    fn default() -> Self {
        Self {
            service_uuid: DEFAULT_SERVICE_UUID,
            service_name: DEFAULT_SERVICE_NAME.to_string(),
            channel: DEFAULT_RFCOMM_CHANNEL,
            recv_buffer_size: 1024,
            max_message_len: DEFAULT_MAX_MESSAGE_LEN,
            discovery_secs: 8,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MessagesConfig {
    /// Contact name sent when none is known.
    pub contact_placeholder: String,
}

impl Default for MessagesConfig {
    fn default() -> Self {
        Self {
            contact_placeholder: CONTACT_PLACEHOLDER.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log file; stderr when unset.
    pub file: Option<PathBuf>,

    /// Default level for this crate: "error", "warn", "info", "debug" or "trace".
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            file: None,
            level: "info".to_string(),
        }
    }
}

impl Config {
    /// Default location of the config file.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR)
            .join("config.toml")
    }

    /// Load configuration from the default location or create it.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::default_path())
    }

    /// Load configuration from `path`, writing defaults if it does not exist.
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            Ok(toml::from_str(&content)?)
        } else {
            let config = Self::default();
            config.save_to(path)?;
            Ok(config)
        }
    }

    /// Save configuration to `path`.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn service_id(&self) -> ServiceId {
        ServiceId::new(
            self.bluetooth.service_uuid,
            self.bluetooth.service_name.clone(),
        )
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            service: self.service_id(),
            recv_buffer_size: self.bluetooth.recv_buffer_size.max(1),
            max_message_len: self.bluetooth.max_message_len,
            discovery_duration: Duration::from_secs(self.bluetooth.discovery_secs),
            contact_placeholder: self.messages.contact_placeholder.clone(),
        }
    }
}
