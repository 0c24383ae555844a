//! Main decoder API
//!
//! This module provides the primary interface for the decoder library.
//! The Decoder owns the fast-packet state of one frame stream and hands
//! complete messages to the shared, stateless message decoder.

use crate::config::DecoderConfig;
use crate::dictionary::{DictionaryHandle, DictionaryStats, PgnDictionary};
use crate::fast_packet::{FastPacketAssembler, ProcessResult, ReassemblyStats};
use crate::message_decoder::MessageDecoder;
use crate::types::{CanFrame, DecodedEvent, MessageHeader, Result, Transport};

/// The main decoder struct - entry point for all decoding operations
pub struct Decoder {
    message_decoder: MessageDecoder,
    assembler: FastPacketAssembler,
    config: DecoderConfig,
}

impl Decoder {
    /// Create a decoder for one frame stream
    ///
    /// # Example
    /// ```no_run
    /// use n2k_decoder::{Decoder, DecoderConfig, PgnDictionary};
    ///
    /// let json = std::fs::read_to_string("canboat.json").unwrap();
    /// let dictionary = PgnDictionary::from_json_str(&json).unwrap().into_handle();
    /// let mut decoder = Decoder::new(dictionary, DecoderConfig::new());
    /// ```
    pub fn new(dictionary: DictionaryHandle, config: DecoderConfig) -> Self {
        Self {
            message_decoder: MessageDecoder::new(dictionary, config.convert_units),
            assembler: FastPacketAssembler::new(config.fast_packet_idle_frames),
            config,
        }
    }

    /// Parse a canboat document and create a decoder over it
    pub fn from_json_str(json: &str, config: DecoderConfig) -> Result<Self> {
        let dictionary = PgnDictionary::from_json_str(json)?;
        Ok(Self::new(dictionary.into_handle(), config))
    }

    pub fn config(&self) -> &DecoderConfig {
        &self.config
    }

    /// Shared message decoder, e.g. to decode assembled messages on other threads
    pub fn message_decoder(&self) -> &MessageDecoder {
        &self.message_decoder
    }

    /// Turn a frame into a logical message, reassembling fast packets
    ///
    /// # Returns
    /// * `Some(header)` for single-frame PGNs, unknown PGNs and completed fast packets
    /// * `None` while a fast packet is still incomplete or the frame was dropped
    pub fn assemble(&mut self, frame: CanFrame) -> Option<MessageHeader> {
        let packet_type = self
            .message_decoder
            .dictionary()
            .representative_def(frame.pgn)
            .map(|def| def.packet_type.is_fast_packet());

        match packet_type {
            None => {
                log::trace!("Unknown PGN {} from {}", frame.pgn, frame.source);
                Some(MessageHeader::single(frame, Transport::Unknown))
            }
            Some(false) => Some(MessageHeader::single(frame, Transport::Single)),
            Some(true) => match self.assembler.process_frame(frame) {
                ProcessResult::MessageComplete(header) => Some(header),
                ProcessResult::FragmentConsumed | ProcessResult::Ignored => None,
            },
        }
    }

    /// Process one frame; returns an event once a logical message is complete
    pub fn decode_frame(&mut self, frame: CanFrame) -> Option<DecodedEvent> {
        let header = self.assemble(frame)?;
        if header.transport == Transport::Unknown && !self.config.emit_unknown {
            return None;
        }
        Some(self.message_decoder.decode_header(header))
    }

    /// Decode a stream of frames lazily
    pub fn decode_frames<I>(&mut self, frames: I) -> DecodingIterator<'_, I::IntoIter>
    where
        I: IntoIterator<Item = CanFrame>,
    {
        DecodingIterator {
            frame_iter: frames.into_iter(),
            decoder: self,
        }
    }

    /// Abandon every incomplete fast packet (end of stream)
    pub fn flush(&mut self) -> usize {
        self.assembler.flush()
    }

    /// Get statistics about the loaded dictionary
    pub fn dictionary_stats(&self) -> DictionaryStats {
        self.message_decoder.dictionary().stats()
    }

    pub fn reassembly_stats(&self) -> ReassemblyStats {
        self.assembler.stats()
    }

    /// Number of fast-packet conversations waiting for more frames
    pub fn open_conversations(&self) -> usize {
        self.assembler.open_conversations()
    }
}

/// Iterator that decodes CAN frames into decoded events
///
/// Frames that do not complete a message produce no item.
pub struct DecodingIterator<'a, I>
where
    I: Iterator<Item = CanFrame>,
{
    frame_iter: I,
    decoder: &'a mut Decoder,
}

impl<'a, I> Iterator for DecodingIterator<'a, I>
where
    I: Iterator<Item = CanFrame>,
{
    type Item = DecodedEvent;

    fn next(&mut self) -> Option<Self::Item> {
        for frame in self.frame_iter.by_ref() {
            if let Some(event) = self.decoder.decode_frame(frame) {
                return Some(event);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOCUMENT: &str = r#"{
        "PGNs": [
            {
                "PGN": 127250, "Id": "vesselHeading", "Description": "Vessel Heading",
                "Type": "Single", "Length": 8,
                "Fields": [
                    {"Order": 1, "Id": "sid", "Name": "SID", "BitOffset": 0, "BitLength": 8, "FieldType": "NUMBER"},
                    {"Order": 2, "Id": "heading", "Name": "Heading", "BitOffset": 8, "BitLength": 16,
                     "FieldType": "NUMBER", "Resolution": 0.0001, "Unit": "rad"}
                ]
            },
            {
                "PGN": 129029, "Id": "gnssPositionData", "Description": "GNSS Position Data",
                "Type": "Fast", "Length": 10,
                "Fields": [
                    {"Order": 1, "Id": "sid", "Name": "SID", "BitOffset": 0, "BitLength": 8, "FieldType": "NUMBER"},
                    {"Order": 2, "Id": "date", "Name": "Date", "BitOffset": 8, "BitLength": 16, "FieldType": "DATE", "Unit": "d"}
                ]
            }
        ]
    }"#;

    fn frame(pgn: u32, source: u8, data: &[u8]) -> CanFrame {
        CanFrame {
            priority: 2,
            pgn,
            source,
            destination: 255,
            data: data.to_vec(),
            timestamp: None,
        }
    }

    #[test]
    fn test_decoder_creation() {
        let decoder = Decoder::from_json_str(DOCUMENT, DecoderConfig::new()).unwrap();
        let stats = decoder.dictionary_stats();
        assert_eq!(stats.num_definitions, 2);
        assert_eq!(stats.num_fields, 4);
    }

    #[test]
    fn test_empty_document_is_rejected() {
        assert!(Decoder::from_json_str(r#"{"PGNs": []}"#, DecoderConfig::new()).is_err());
    }

    #[test]
    fn test_single_frame_is_decoded() {
        let mut decoder = Decoder::from_json_str(DOCUMENT, DecoderConfig::new()).unwrap();
        // 15708 * 0.0001 rad = 90.0 deg
        let event = decoder
            .decode_frame(frame(127250, 1, &[0x01, 0x5C, 0x3D, 0xFF, 0x7F, 0xFF, 0x7F, 0xFD]))
            .unwrap();
        let message = event.message().unwrap();
        assert_eq!(message.field("Heading").unwrap().value.to_string(), "90.0 deg");
    }

    #[test]
    fn test_fast_packet_is_decoded_on_completion() {
        let mut decoder = Decoder::from_json_str(DOCUMENT, DecoderConfig::new()).unwrap();
        let frames = vec![
            frame(129029, 3, &[0x20, 0x0A, 0x07, 0x0B, 0x4D, 0, 0, 0]),
            frame(129029, 3, &[0x21, 0, 0, 0, 0, 0, 0, 0]),
        ];

        let events: Vec<_> = decoder.decode_frames(frames).collect();
        assert_eq!(events.len(), 1);
        let message = events[0].message().unwrap();
        // 0x4D0B = 19723 days after the epoch
        assert_eq!(message.field("Date").unwrap().value.to_string(), "2024-01-01");
        assert_eq!(events[0].header().transport, Transport::Fast);
        assert_eq!(decoder.reassembly_stats().completed, 1);
    }

    #[test]
    fn test_unknown_pgns_can_be_suppressed() {
        let mut decoder = Decoder::from_json_str(DOCUMENT, DecoderConfig::new()).unwrap();
        let event = decoder.decode_frame(frame(59904, 1, &[0x14, 0xF0, 0x01])).unwrap();
        assert_eq!(event.description(), "Unknown PGN");

        let config = DecoderConfig::new().with_unknown_pgns(false);
        let mut decoder = Decoder::from_json_str(DOCUMENT, config).unwrap();
        assert!(decoder.decode_frame(frame(59904, 1, &[0x14, 0xF0, 0x01])).is_none());
    }

    #[test]
    fn test_flush_reports_incomplete_messages() {
        let mut decoder = Decoder::from_json_str(DOCUMENT, DecoderConfig::new()).unwrap();
        assert!(decoder.decode_frame(frame(129029, 3, &[0x00, 0x0A, 1, 2, 3, 4, 5, 6])).is_none());
        assert_eq!(decoder.open_conversations(), 1);
        assert_eq!(decoder.flush(), 1);
        assert_eq!(decoder.open_conversations(), 0);
    }
}
