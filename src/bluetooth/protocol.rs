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

//! Text message wire format.
//!
//! ```text
//! +--------------+-------------+--------------+-------------+---------+
//! | phone (12 B) | name len u8 | name (len B) | msg len i32 | message |
//! +--------------+-------------+--------------+-------------+---------+
//! ```
//!
//! All fields are taken verbatim by length, nothing is escaped.

use tracing::{debug, warn};

use super::error::{DecodeError, EncodeError};

/// Width of the phone number field.
pub const PHONE_NUMBER_LEN: usize = 12;

/// Default limit on the declared message length.
pub const DEFAULT_MAX_MESSAGE_LEN: usize = 64 * 1024;

/// Contact name written when the sender is not in the address book.
pub const CONTACT_PLACEHOLDER: &str = "none";

/// A decoded text message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextMessage {
    pub phone_number: String,
    pub contact_name: String,
    pub message: String,
}

impl TextMessage {
    /// Create a message with the placeholder contact name.
    pub fn new(phone_number: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            phone_number: phone_number.into(),
            contact_name: CONTACT_PLACEHOLDER.to_string(),
            message: message.into(),
        }
    }

    pub fn with_contact(mut self, contact_name: impl Into<String>) -> Self {
        self.contact_name = contact_name.into();
        self
    }

    /// Serialize to wire bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, EncodeError> {
        encode_with_contact(&self.phone_number, &self.contact_name, &self.message)
    }

    /// Parse from wire bytes.
    pub fn from_bytes(buf: &[u8]) -> Result<Self, DecodeError> {
        decode(buf)
    }

    /// Display name for the sender, falling back to the number.
    pub fn sender(&self) -> &str {
        if self.contact_name.is_empty() || self.contact_name == CONTACT_PLACEHOLDER {
            &self.phone_number
        } else {
            &self.contact_name
        }
    }
}

/// Bring a bare 10-digit number up to the 12-byte `+1XXXXXXXXXX` form.
///
/// Anything else is returned unchanged.
pub fn normalize_phone_number(number: &str) -> String {
    let number = number.trim();
    if number.len() == 10 && number.bytes().all(|b| b.is_ascii_digit()) {
        format!("+1{}", number)
    } else {
        number.to_string()
    }
}

/// Encode a message using the placeholder contact name.
pub fn encode(phone_number: &str, message: &str) -> Result<Vec<u8>, EncodeError> {
    encode_with_contact(phone_number, CONTACT_PLACEHOLDER, message)
}

/// Encode a message with an explicit contact name.
pub fn encode_with_contact(
    phone_number: &str,
    contact_name: &str,
    message: &str,
) -> Result<Vec<u8>, EncodeError> {
    let phone = phone_number.as_bytes();
    if phone.len() != PHONE_NUMBER_LEN {
        return Err(EncodeError::PhoneNumberWidth { len: phone.len() });
    }

    let name = contact_name.as_bytes();
    let name_len =
        u8::try_from(name.len()).map_err(|_| EncodeError::ContactNameTooLong { len: name.len() })?;

    let body = message.as_bytes();
    let body_len =
        i32::try_from(body.len()).map_err(|_| EncodeError::MessageTooLong { len: body.len() })?;

    let mut out = Vec::with_capacity(PHONE_NUMBER_LEN + 1 + name.len() + 4 + body.len());
    out.extend_from_slice(phone);
    out.push(name_len);
    out.extend_from_slice(name);
    out.extend_from_slice(&body_len.to_be_bytes());
    out.extend_from_slice(body);
    Ok(out)
}

/// Decode one message from the start of `buf`. Trailing bytes are ignored.
pub fn decode(buf: &[u8]) -> Result<TextMessage, DecodeError> {
    decode_prefix(buf).map(|(msg, _)| msg)
}

/// Decode one message and report how many bytes it occupied.
pub fn decode_prefix(buf: &[u8]) -> Result<(TextMessage, usize), DecodeError> {
    let mut reader = FieldReader::new(buf);

    let phone_number = reader.text("phone_number", PHONE_NUMBER_LEN)?;

    let name_len = reader.take("contact_name_length", 1)?[0] as usize;
    let contact_name = reader.text("contact_name", name_len)?;

    let len_bytes = reader.take("message_length", 4)?;
    let message_len = i32::from_be_bytes([len_bytes[0], len_bytes[1], len_bytes[2], len_bytes[3]]);
    if message_len < 0 {
        return Err(DecodeError::NegativeLength(message_len));
    }
    let message = reader.text("message", message_len as usize)?;

    Ok((
        TextMessage {
            phone_number,
            contact_name,
            message,
        },
        reader.pos,
    ))
}

/// Rebuilds messages from a byte stream that may split or merge them.
pub struct MessageReassembler {
    buffer: Vec<u8>,
    max_message_len: usize,
}

impl MessageReassembler {
    /// Create a reassembler rejecting messages longer than `max_message_len`.
    pub fn new(max_message_len: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(1024),
            max_message_len,
        }
    }

    /// Append a received chunk and decode every message it completes.
    ///
    /// A message cut short by the end of the chunk stays buffered for the next
    /// one. Any other failure discards the buffer, since the position of the
    /// next header is lost.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Result<TextMessage, DecodeError>> {
        self.buffer.extend_from_slice(chunk);

        let mut results = Vec::new();
        let mut offset = 0;
        while offset < self.buffer.len() {
            match decode_prefix(&self.buffer[offset..]) {
                Ok((message, used)) => {
                    offset += used;
                    if message.message.len() > self.max_message_len {
                        results.push(Err(self.too_large(message.message.len())));
                    } else {
                        results.push(Ok(message));
                    }
                }
                Err(DecodeError::TruncatedInput {
                    field: "message",
                    needed,
                    ..
                }) if needed > self.max_message_len => {
                    results.push(Err(self.too_large(needed)));
                    offset = self.buffer.len();
                }
                Err(DecodeError::TruncatedInput { .. }) => break,
                Err(e) => {
                    results.push(Err(e));
                    offset = self.buffer.len();
                }
            }
        }

        self.buffer.drain(..offset);
        if !self.buffer.is_empty() {
            debug!("Holding {} bytes of a partial message", self.buffer.len());
        }
        results
    }

    /// Bytes waiting for the rest of their message.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    fn too_large(&self, len: usize) -> DecodeError {
        warn!(
            "Message of {} bytes exceeds limit of {}",
            len, self.max_message_len
        );
        DecodeError::MessageTooLarge {
            len,
            max: self.max_message_len,
        }
    }
}

/// Sequential reader over a byte buffer.
struct FieldReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> FieldReader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take(&mut self, field: &'static str, len: usize) -> Result<&'a [u8], DecodeError> {
        let available = self.buf.len() - self.pos;
        if available < len {
            return Err(DecodeError::TruncatedInput {
                field,
                needed: len,
                available,
            });
        }
        let bytes = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(bytes)
    }

    fn text(&mut self, field: &'static str, len: usize) -> Result<String, DecodeError> {
        let bytes = self.take(field, len)?;
        std::str::from_utf8(bytes)
            .map(str::to_string)
            .map_err(|_| DecodeError::InvalidEncoding { field })
    }
}
