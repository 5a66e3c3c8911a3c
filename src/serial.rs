use std::fmt::Display;

use serde::{Deserialize, Serialize};

/// Serial port related errors.
pub mod error;

/// The serial port structure.
pub mod serial_port;

/// Codecs for encoding/decoding messages to/from wire.
pub mod codecs;

/// A single line of the line oriented protocol, without its terminator.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone, Deserialize, Serialize)]
pub struct SerialMessage(String);

impl SerialMessage {
    /// Create a serial message from bytes, ignoring any bad utf8 bytes.
    pub fn new_lossy<B: AsRef<[u8]>>(bytes: B) -> Self {
        Self(String::from_utf8_lossy(bytes.as_ref()).to_string())
    }

    /// Turn the message (utf8) into bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.0.into_bytes()
    }

    /// Borrowed form.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The same message with surrounding whitespace (including any `\r`) removed.
    pub fn trimmed(&self) -> Self {
        Self(self.0.trim().to_owned())
    }

    /// True if there is nothing but whitespace in the message.
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl<T: AsRef<str>> From<T> for SerialMessage {
    fn from(string_like: T) -> Self {
        Self(string_like.as_ref().into())
    }
}

impl Display for SerialMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = self.0.chars().take(48).collect::<String>();

        write!(f, "{}", s.trim())
    }
}
