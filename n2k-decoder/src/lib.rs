//! NMEA2000 Decoder Library
//!
//! A reusable library for decoding NMEA2000 traffic from raw CAN frames,
//! driven by a canboat PGN dictionary.
//!
//! # Architecture
//!
//! This library is intentionally minimal and focused on decoding:
//! - Decomposes 29-bit CAN identifiers (priority, PGN, PDU1/PDU2 addressing)
//! - Reassembles fast-packet messages per (source, destination, PGN)
//! - Picks the right definition among PGN variants sharing one number
//! - Decodes fields (numbers, lookups, strings, repeated groups) with unit conversion
//!
//! The library does NOT:
//! - Read log files or fetch the dictionary document
//! - Filter records or aggregate statistics and device lists
//!
//! All higher-level functionality is in the application layer (n2k-cli).
//!
//! # Example Usage
//!
//! ```no_run
//! use n2k_decoder::{CanFrame, Decoder, DecoderConfig, PgnDictionary};
//!
//! let json = std::fs::read_to_string("canboat.json").unwrap();
//! let dictionary = PgnDictionary::from_json_str(&json).unwrap().into_handle();
//!
//! let config = DecoderConfig::new().with_unit_conversion(true);
//! let mut decoder = Decoder::new(dictionary, config);
//!
//! let frame = CanFrame::from_can_id(0x09F11201, vec![0x01, 0x5C, 0x3D, 0xFF, 0x7F, 0xFF, 0x7F, 0xFD], None).unwrap();
//! if let Some(event) = decoder.decode_frame(frame) {
//!     println!("{}: {:?}", event.description(), event.message());
//! }
//! ```

// Public modules
pub mod bits;
pub mod config;
pub mod decoder;
pub mod dictionary;
pub mod fast_packet;
pub mod field_decoder;
pub mod message_decoder;
pub mod types;
pub mod units;

// Re-export main types for convenience
pub use config::DecoderConfig;
pub use decoder::{Decoder, DecodingIterator};
pub use dictionary::{
    merge_documents, DictionaryHandle, DictionaryStats, FieldDef, FieldType, LookupTables,
    PacketType, PgnDef, PgnDictionary, PgnHandle, RepeatingFieldSet, Resolution,
};
pub use fast_packet::{FastPacketAssembler, ProcessResult, ReassemblyStats};
pub use message_decoder::MessageDecoder;
pub use types::{
    CanFrame, CanId, DecodedEvent, DecodedField, DecodedMessage, DecoderError, FieldError,
    FieldValue, MessageHeader, Result, Transport, BROADCAST_ADDRESS,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
