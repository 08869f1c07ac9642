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

//! Line-oriented controller driving a [`Session`].

use std::collections::HashMap;
use std::io::BufRead;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::bluetooth::{CorrelationId, Session, SessionState};
use crate::events::SessionEvent;

pub const HELP: &str = "\
Commands:
  /listen                    wait for the phone to connect
  /connect <address>         connect to the phone at a Bluetooth address
  /send <number> <message>   send a text message
  /disconnect                close the current connection
  /discover                  scan for nearby devices
  /who                       show the connected device
  /status                    show the connection state
  /help                      show this help
  /quit                      exit";

/// A parsed console command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Listen,
    Connect { address: String },
    Send { phone_number: String, message: String },
    Disconnect,
    Discover,
    Who,
    Status,
    Help,
    Quit,
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ParseError {
    #[error("Empty input")]
    Empty,

    #[error("Unknown command '{0}', try /help")]
    Unknown(String),

    #[error("Usage: {0}")]
    Usage(&'static str),
}

impl Command {
    /// Parse one input line.
    pub fn parse(line: &str) -> Result<Self, ParseError> {
        let line = line.trim();
        if line.is_empty() {
            return Err(ParseError::Empty);
        }

        let (name, rest) = match line.split_once(char::is_whitespace) {
            Some((name, rest)) => (name, rest.trim()),
            None => (line, ""),
        };

        match name {
            "/listen" => Ok(Self::Listen),
            "/connect" => {
                if rest.is_empty() {
                    return Err(ParseError::Usage("/connect <address>"));
                }
                Ok(Self::Connect {
                    address: rest.to_string(),
                })
            }
            "/send" => {
                let (number, message) = rest
                    .split_once(char::is_whitespace)
                    .map(|(n, m)| (n, m.trim_start()))
                    .ok_or(ParseError::Usage("/send <number> <message>"))?;
                if message.is_empty() {
                    return Err(ParseError::Usage("/send <number> <message>"));
                }
                Ok(Self::Send {
                    phone_number: number.to_string(),
                    message: message.to_string(),
                })
            }
            "/disconnect" => Ok(Self::Disconnect),
            "/discover" => Ok(Self::Discover),
            "/who" => Ok(Self::Who),
            "/status" => Ok(Self::Status),
            "/help" => Ok(Self::Help),
            "/quit" | "/exit" => Ok(Self::Quit),
            other => Err(ParseError::Unknown(other.to_string())),
        }
    }
}

/// Lines to show the user, and whether to exit.
#[derive(Debug, Default)]
pub struct Reply {
    pub lines: Vec<String>,
    pub quit: bool,
}

impl Reply {
    fn line(line: impl Into<String>) -> Self {
        Self {
            lines: vec![line.into()],
            quit: false,
        }
    }
}

/// Owns the session and renders its events.
pub struct Console {
    session: Session,
    /// Recipient of each write still in flight.
    pending: HashMap<CorrelationId, String>,
}

impl Console {
    pub fn new(session: Session) -> Self {
        Self {
            session,
            pending: HashMap::new(),
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Number of writes awaiting a result.
    pub fn pending_writes(&self) -> usize {
        self.pending.len()
    }

    /// Execute a command.
    pub async fn apply(&mut self, command: Command) -> Reply {
        debug!("Console command: {:?}", command);
        match command {
            Command::Listen => match self.session.connect_as_server() {
                Ok(()) => Reply::line("Bluetooth: waiting for a connection..."),
                Err(e) => Reply::line(format!("Error: {}", e)),
            },
            Command::Connect { address } => match self.session.connect_as_client(&address) {
                Ok(()) => Reply::line(format!("Bluetooth: connecting to {}...", address)),
                Err(e) => Reply::line(format!("Error: {}", e)),
            },
            Command::Send {
                phone_number,
                message,
            } => match self.session.submit_write(&phone_number, &message) {
                Ok(id) => {
                    self.pending.insert(id, phone_number.clone());
                    Reply::line(format!("Sending {} to {}...", id, phone_number))
                }
                Err(e) => Reply::line(format!("Error: {}", e)),
            },
            Command::Disconnect => {
                if self.session.state() == SessionState::None {
                    return Reply::line("Bluetooth: not connected");
                }
                self.session.disconnect().await;
                Reply::default()
            }
            Command::Discover => match self.session.discover() {
                Ok(()) => Reply::default(),
                Err(e) => Reply::line(format!("Error: {}", e)),
            },
            Command::Who => Reply::line(match self.session.who() {
                Some(peer) if self.session.is_connected() => format!("Connected to {}", peer),
                Some(peer) => format!("Last connected to {}", peer),
                None => "No connection".to_string(),
            }),
            Command::Status => Reply::line(format!(
                "State: {} ({} write(s) pending)",
                self.session.state(),
                self.pending.len()
            )),
            Command::Help => Reply::line(HELP),
            Command::Quit => Reply {
                lines: vec!["Good bye!".to_string()],
                quit: true,
            },
        }
    }

    /// Render an event from the session.
    pub fn handle_event(&mut self, event: SessionEvent) -> Vec<String> {
        match event {
            SessionEvent::DiscoveryStarted => vec!["Bluetooth: discovering devices...".into()],
            SessionEvent::DiscoveryResult { devices } => {
                let mut lines = vec![format!("Bluetooth: found {} device(s)", devices.len())];
                lines.extend(devices.iter().map(|d| {
                    format!("  {}  {}", d.address, d.name.as_deref().unwrap_or("(unknown)"))
                }));
                lines
            }
            SessionEvent::DiscoveryComplete => vec!["Bluetooth: discovery complete".into()],
            SessionEvent::ConnectionMade { peer } => {
                info!("Connected to {}", peer);
                vec![format!("Bluetooth: connection made with {}", peer)]
            }
            SessionEvent::ConnectionFailed { cause, comment } => {
                vec![format!("Bluetooth: {} - {}", comment, cause)]
            }
            SessionEvent::ConnectionLost { cause } => {
                let mut lines = vec![format!("Bluetooth: lost connection - {}", cause)];
                if !self.pending.is_empty() {
                    lines.push(format!("{} message(s) awaiting result", self.pending.len()));
                }
                lines
            }
            SessionEvent::Disconnected { comment } => vec![format!("Bluetooth: {}", comment)],
            SessionEvent::MessageReceived { message } => {
                vec![format!(
                    "{} ({}): {}",
                    message.sender(),
                    message.phone_number,
                    message.message
                )]
            }
            SessionEvent::WriteSucceeded { id } => match self.pending.remove(&id) {
                Some(to) => vec![format!("Message {} to {} sent", id, to)],
                None => {
                    warn!("Result for unknown write {}", id);
                    vec![format!("Message {} sent", id)]
                }
            },
            SessionEvent::WriteFailed { id, cause } => {
                let to = self.pending.remove(&id).unwrap_or_else(|| "?".to_string());
                vec![format!("Message {} to {} failed - {}", id, to, cause)]
            }
            SessionEvent::Note { note } => vec![format!("Bluetooth: {}", note)],
            SessionEvent::Error { comment, cause } => {
                vec![format!("Bluetooth: {} - {:#}", comment, cause)]
            }
        }
    }

    /// Stop the session and wait for its workers.
    pub async fn shutdown(&mut self) {
        self.session.stop().await;
    }
}

/// Forward lines from `reader` over a channel from a dedicated thread.
///
/// The thread is detached: a read blocked on a terminal never holds up
/// runtime shutdown. The channel closes at end of input.
pub fn spawn_line_reader<R>(reader: R) -> mpsc::UnboundedReceiver<String>
where
    R: BufRead + Send + 'static,
{
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        for line in reader.lines() {
            match line {
                Ok(line) => {
                    if tx.send(line).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    error!("Failed to read input: {}", e);
                    break;
                }
            }
        }
        debug!("Input reader finished");
    });
    rx
}
