//! Payload types produced by message converters.

use serde::Deserialize;
use std::fmt;
use std::str::FromStr;

/// Selects which schema a converter emits.
///
/// The discriminants are part of the converter ABI and are passed as-is to
/// `msgconv_ctx_create`.
#[repr(u32)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize)]
#[serde(try_from = "String")]
pub enum PayloadType {
    /// Full schema: every field of the frame metadata tree.
    #[default]
    Full = 0,
    /// Minimal schema: identifiers, geometry and labels only.
    Minimal = 1,
    /// Reserved for future schemas; the built-in converter emits nothing.
    Reserved = 0x100,
    /// Custom schema provided by an external converter library.
    Custom = 0x101,
}

impl PayloadType {
    /// All payload types, in discriminant order.
    pub const ALL: [PayloadType; 4] = [
        PayloadType::Full,
        PayloadType::Minimal,
        PayloadType::Reserved,
        PayloadType::Custom,
    ];

    /// Short lowercase name used in configuration.
    pub fn as_str(&self) -> &'static str {
        match self {
            PayloadType::Full => "full",
            PayloadType::Minimal => "minimal",
            PayloadType::Reserved => "reserved",
            PayloadType::Custom => "custom",
        }
    }

    /// Enum nick used by the GStreamer-style property of the same name.
    pub fn nick(&self) -> &'static str {
        match self {
            PayloadType::Full => "PAYLOAD_DEEPSTREAM",
            PayloadType::Minimal => "PAYLOAD_DEEPSTREAM_MINIMAL",
            PayloadType::Reserved => "PAYLOAD_RESERVED",
            PayloadType::Custom => "PAYLOAD_CUSTOM",
        }
    }

    /// Convert a raw ABI discriminant.
    pub fn from_raw(value: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|t| *t as u32 == value)
    }

    /// Whether this payload type needs an external converter library.
    pub fn requires_library(&self) -> bool {
        matches!(self, PayloadType::Custom)
    }
}

impl fmt::Display for PayloadType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PayloadType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let s = s.trim();
        PayloadType::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s) || t.nick() == s)
            .or_else(|| s.parse::<u32>().ok().and_then(PayloadType::from_raw))
            .ok_or_else(|| format!("unknown payload type: {}", s))
    }
}

impl TryFrom<String> for PayloadType {
    type Error = String;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        value.parse()
    }
}

/// A serialized message generated for one frame.
///
/// The converter fills in the bytes; the host stamps `component_id` after
/// generation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Payload {
    data: Vec<u8>,
    /// Component id assigned by the host element.
    pub component_id: u32,
}

impl Payload {
    /// Create a payload from serialized bytes.
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Self {
            data: data.into(),
            component_id: 0,
        }
    }

    /// Length of the serialized message in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the message is empty.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// The serialized message.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// The message as UTF-8 text, if it is valid UTF-8.
    pub fn as_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.data).ok()
    }

    /// Consume the payload and return its bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }
}
