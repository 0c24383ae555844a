//! Core types for the NMEA2000 decoder library
//!
//! This module defines the frames the decoder consumes and the decoded trees it
//! emits. The decoder keeps no history beyond open fast-packet conversations;
//! aggregation (statistics, device directories) is left to the caller.

use crate::dictionary::{PacketType, PgnHandle};
use serde::{Serialize, Serializer};
use std::fmt;

/// Result type for decoder operations
pub type Result<T> = std::result::Result<T, DecoderError>;

/// Destination address used for broadcast (PDU2) messages
pub const BROADCAST_ADDRESS: u8 = 255;

/// Errors that can occur while loading a dictionary or decoding messages
#[derive(Debug, thiserror::Error)]
pub enum DecoderError {
    #[error("Failed to parse dictionary document: {0}")]
    DictionaryParseError(#[from] serde_json::Error),

    #[error("Invalid dictionary: {0}")]
    InvalidDictionary(String),

    #[error("Invalid definition for PGN {pgn}: {reason}")]
    InvalidDefinition { pgn: u32, reason: String },

    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    #[error("PGN {0} is not in the dictionary")]
    UnknownPgn(u32),

    #[error("PGN {0}: no definition matches the payload")]
    NoPatternMatch(u32),

    #[error("Definition handle {0} is not part of this dictionary")]
    InvalidHandle(usize),

    #[error(transparent)]
    Field(#[from] FieldError),
}

/// Failure confined to a single field of a decoded message
///
/// Field errors are collected next to the fields that did decode, so one bad
/// field never hides the rest of the message.
#[derive(Debug, Clone, PartialEq, Serialize, thiserror::Error)]
pub enum FieldError {
    #[error("Field '{field}' has unsupported type {type_name}")]
    UnsupportedFieldType { field: String, type_name: String },

    #[error("Field '{field}' references unknown field order {order}")]
    MissingReferencedField { field: String, order: u32 },
}

//==================================================================================CAN_ID
/// A 29-bit extended CAN identifier carrying an NMEA2000 header
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CanId(pub u32);

impl CanId {
    /// Priority (3 bits, 0-7)
    pub fn priority(&self) -> u8 {
        ((self.0 >> 26) & 0x07) as u8
    }

    /// Raw 17-bit PGN field, before any PDU1 destination is stripped
    fn raw_pgn(&self) -> u32 {
        (self.0 >> 8) & 0x1FFFF
    }

    /// True when the PGN falls in the proprietary addressed range (0xEF00)
    pub fn is_pdu1(&self) -> bool {
        (self.raw_pgn() & 0xFF00) == 0xEF00
    }

    /// PGN with the destination byte removed for PDU1 identifiers
    pub fn pgn(&self) -> u32 {
        let pgn = self.raw_pgn();
        if self.is_pdu1() {
            pgn & 0x1FF00
        } else {
            pgn
        }
    }

    /// Destination address; PDU2 messages are always broadcast
    pub fn destination(&self) -> u8 {
        if self.is_pdu1() {
            (self.raw_pgn() & 0xFF) as u8
        } else {
            BROADCAST_ADDRESS
        }
    }

    /// Source address of the sending node
    pub fn source(&self) -> u8 {
        (self.0 & 0xFF) as u8
    }
}

/// Normalized CAN frame, as produced by a log adapter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanFrame {
    /// Priority, 0-7
    pub priority: u8,
    /// Parameter Group Number
    pub pgn: u32,
    /// Source address
    pub source: u8,
    /// Destination address (255 = broadcast)
    pub destination: u8,
    /// Frame data bytes (1-8)
    pub data: Vec<u8>,
    /// Timestamp as recorded by the log, kept opaque
    pub timestamp: Option<String>,
}

impl CanFrame {
    /// Build a frame from a raw 29-bit identifier
    pub fn from_can_id(can_id: u32, data: Vec<u8>, timestamp: Option<String>) -> Result<Self> {
        if data.is_empty() || data.len() > 8 {
            return Err(DecoderError::InvalidFrame(format!(
                "CAN ID 0x{:08X} carries {} data bytes, expected 1-8",
                can_id,
                data.len()
            )));
        }

        let id = CanId(can_id);
        Ok(Self {
            priority: id.priority(),
            pgn: id.pgn(),
            source: id.source(),
            destination: id.destination(),
            data,
            timestamp,
        })
    }

    /// True if the frame is addressed to every node
    pub fn is_broadcast(&self) -> bool {
        self.destination == BROADCAST_ADDRESS
    }
}

//==================================================================================DECODED
/// How a logical message reached the decoder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Transport {
    /// Single CAN frame
    Single,
    /// Reassembled from several fast-packet frames
    Fast,
    /// PGN absent from the dictionary, passed through as a single frame
    Unknown,
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transport::Single => write!(f, "Single"),
            Transport::Fast => write!(f, "Fast"),
            Transport::Unknown => write!(f, "Unknown"),
        }
    }
}

/// One logical message: a single frame or a completed fast-packet payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MessageHeader {
    /// Timestamp of the first frame
    pub timestamp: Option<String>,
    pub priority: u8,
    pub pgn: u32,
    pub source: u8,
    pub destination: u8,
    /// Complete payload bytes
    #[serde(serialize_with = "serialize_hex")]
    pub payload: Vec<u8>,
    pub transport: Transport,
}

impl MessageHeader {
    /// Header for a message that fits a single frame
    pub fn single(frame: CanFrame, transport: Transport) -> Self {
        Self {
            timestamp: frame.timestamp,
            priority: frame.priority,
            pgn: frame.pgn,
            source: frame.source,
            destination: frame.destination,
            payload: frame.data,
            transport,
        }
    }

    /// Payload rendered as space separated hex bytes
    pub fn payload_hex(&self) -> String {
        hex_string(&self.payload)
    }
}

/// Decoded field value
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    /// Scaled numeric value
    Number(f64),
    /// Text: strings, or numbers rendered with their unit
    Text(String),
    /// Label resolved from a lookup table
    Label(String),
    /// Labels of the set bits of a bit lookup
    Flags(Vec<String>),
    /// Raw bytes of a binary field
    Bytes(#[serde(serialize_with = "serialize_hex")] Vec<u8>),
}

impl FieldValue {
    /// Numeric value, if this is a number
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Number(v) => Some(*v),
            _ => None,
        }
    }

    /// String content for text and label values
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) | FieldValue::Label(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Number(v) => write!(f, "{}", v),
            FieldValue::Text(s) | FieldValue::Label(s) => write!(f, "{}", s),
            FieldValue::Flags(labels) => write!(f, "[{}]", labels.join(", ")),
            FieldValue::Bytes(bytes) => write!(f, "{}", hex_string(bytes)),
        }
    }
}

/// A decoded field with its presentation unit
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecodedField {
    pub name: String,
    pub value: FieldValue,
    /// Unit of a numeric value left unconverted
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
}

/// Structured result of decoding one payload against one definition
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecodedMessage {
    pub pgn: u32,
    pub id: String,
    pub description: String,
    #[serde(rename = "type")]
    pub packet_type: PacketType,
    pub fields: Vec<DecodedField>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub repeated_groups: Vec<Vec<DecodedField>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<FieldError>,
}

impl DecodedMessage {
    /// Find a top-level field by name
    pub fn field(&self, name: &str) -> Option<&DecodedField> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// Main decoded event type - the primary output of the decoder
#[derive(Debug)]
pub enum DecodedEvent {
    /// Payload decoded against a definition
    Message {
        header: MessageHeader,
        definition: PgnHandle,
        message: DecodedMessage,
    },

    /// PGN has discriminated variants but none matched the payload;
    /// `message` carries the representative definition's metadata only
    NoPatternMatch {
        header: MessageHeader,
        message: DecodedMessage,
    },

    /// PGN absent from the dictionary
    UnknownPgn { header: MessageHeader },

    /// Decoding this message failed; the stream continues
    Failed {
        header: MessageHeader,
        error: DecoderError,
    },
}

impl DecodedEvent {
    /// Header of the logical message behind this event
    pub fn header(&self) -> &MessageHeader {
        match self {
            DecodedEvent::Message { header, .. } => header,
            DecodedEvent::NoPatternMatch { header, .. } => header,
            DecodedEvent::UnknownPgn { header } => header,
            DecodedEvent::Failed { header, .. } => header,
        }
    }

    /// Short human readable description
    pub fn description(&self) -> &str {
        match self {
            DecodedEvent::Message { message, .. } => &message.description,
            DecodedEvent::NoPatternMatch { .. } => "No pattern match",
            DecodedEvent::UnknownPgn { .. } => "Unknown PGN",
            DecodedEvent::Failed { .. } => "Decode failed",
        }
    }

    /// Decoded tree, when one was produced
    pub fn message(&self) -> Option<&DecodedMessage> {
        match self {
            DecodedEvent::Message { message, .. } | DecodedEvent::NoPatternMatch { message, .. } => {
                Some(message)
            }
            _ => None,
        }
    }
}

pub(crate) fn hex_string(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

fn serialize_hex<S: Serializer>(bytes: &[u8], serializer: S) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_str(&hex_string(bytes))
}
