//! Message Decoding Engine
//!
//! Decodes a complete payload against the dictionary: picks the definition
//! through the disambiguator, decodes every plain field in declaration order,
//! then expands the repeating field set, if the definition declares one.

use crate::bits::extract_at;
use crate::dictionary::{DictionaryHandle, PgnDef, PgnDictionary, PgnHandle, RepeatingFieldSet, Resolution};
use crate::field_decoder::FieldDecoder;
use crate::types::{DecodedEvent, DecodedField, DecodedMessage, DecoderError, FieldError, MessageHeader, Result};

/// Message decoder - stateless apart from the shared dictionary
///
/// Cloning is cheap; clones share the same dictionary and may decode on
/// different threads.
#[derive(Debug, Clone)]
pub struct MessageDecoder {
    dictionary: DictionaryHandle,
    convert_units: bool,
}

impl MessageDecoder {
    pub fn new(dictionary: DictionaryHandle, convert_units: bool) -> Self {
        Self {
            dictionary,
            convert_units,
        }
    }

    pub fn dictionary(&self) -> &PgnDictionary {
        &self.dictionary
    }

    /// Decode one logical message into an event
    ///
    /// Never fails: an unknown PGN, a payload matching none of the PGN's
    /// variants or a broken definition each produce their own event.
    pub fn decode_header(&self, header: MessageHeader) -> DecodedEvent {
        match self.dictionary.resolve(header.pgn, &header.payload) {
            Resolution::Unknown => DecodedEvent::UnknownPgn { header },
            Resolution::NoPatternMatch { representative } => {
                log::debug!(
                    "PGN {} from {}: no variant matches payload {}",
                    header.pgn,
                    header.source,
                    header.payload_hex()
                );
                let message = Self::metadata_only(&self.dictionary[representative]);
                DecodedEvent::NoPatternMatch { header, message }
            }
            Resolution::Matched(handle) | Resolution::Representative(handle) => {
                match self.decode_with(handle, &header.payload) {
                    Ok(message) => DecodedEvent::Message {
                        header,
                        definition: handle,
                        message,
                    },
                    Err(error) => {
                        log::warn!("PGN {} from {}: {}", header.pgn, header.source, error);
                        DecodedEvent::Failed { header, error }
                    }
                }
            }
        }
    }

    /// Disambiguate and decode a payload
    ///
    /// # Returns
    /// * `Err(UnknownPgn)` if the PGN is not in the dictionary
    /// * `Err(NoPatternMatch)` if the PGN has variants and none matches
    pub fn decode_payload(&self, pgn: u32, payload: &[u8]) -> Result<DecodedMessage> {
        match self.dictionary.resolve(pgn, payload) {
            Resolution::Unknown => Err(DecoderError::UnknownPgn(pgn)),
            Resolution::NoPatternMatch { .. } => Err(DecoderError::NoPatternMatch(pgn)),
            Resolution::Matched(handle) | Resolution::Representative(handle) => self.decode_with(handle, payload),
        }
    }

    /// Decode a payload against a specific definition
    pub fn decode_with(&self, handle: PgnHandle, payload: &[u8]) -> Result<DecodedMessage> {
        let def = self
            .dictionary
            .get(handle)
            .ok_or(DecoderError::InvalidHandle(handle.index()))?;

        let repeating = def.repeating_set.map(|set| Self::check_repeating_set(def, set)).transpose()?;
        let mut message = Self::metadata_only(def);

        for (idx, field) in def.fields.iter().enumerate() {
            if repeating.map_or(false, |set| set.contains(idx)) {
                continue;
            }
            let decoded = self.decode_field(def, idx, field.bit_offset, None, payload);
            Self::collect(decoded, &mut message.fields, &mut message.errors);
        }

        if let Some(set) = repeating {
            let count = Self::repetition_count(def, set, payload);
            log::trace!("PGN {} {}: {} repetitions", def.pgn, def.id, count);

            for repetition in 0..count {
                let mut group = Vec::with_capacity(set.field_count);
                for idx in set.start_field_index..set.start_field_index + set.field_count {
                    let field = &def.fields[idx];
                    let offset = field.bit_offset + repetition * field.bit_length;
                    let decoded = self.decode_field(def, idx, offset, Some(repetition), payload);
                    Self::collect(decoded, &mut group, &mut message.errors);
                }
                message.repeated_groups.push(group);
            }
        }

        Ok(message)
    }

    /// Decode field `idx` of `def` found at `bit_offset`
    fn decode_field(
        &self,
        def: &PgnDef,
        idx: usize,
        bit_offset: usize,
        repetition: Option<usize>,
        payload: &[u8],
    ) -> std::result::Result<Option<DecodedField>, FieldError> {
        let field = &def.fields[idx];
        let indirect_key = match field.indirect_field_order {
            Some(order) if field.indirect_lookup.is_some() => {
                Some(Self::referenced_raw(def, order, repetition, payload).ok_or_else(|| {
                    FieldError::MissingReferencedField {
                        field: field.name.clone(),
                        order,
                    }
                })?)
            }
            _ => None,
        };

        FieldDecoder::decode_field(
            payload,
            field,
            bit_offset,
            indirect_key,
            self.dictionary.lookups(),
            self.convert_units,
        )
    }

    /// Raw bits of the field an indirect lookup refers to
    ///
    /// Inside a repeated group, a referenced field of the same group is read
    /// from the same repetition.
    fn referenced_raw(def: &PgnDef, order: u32, repetition: Option<usize>, payload: &[u8]) -> Option<u64> {
        let idx = def.fields.iter().position(|f| f.order == order)?;
        let field = &def.fields[idx];

        let in_group = def.repeating_set.map_or(false, |set| set.contains(idx));
        let offset = match repetition {
            Some(i) if in_group => field.bit_offset + i * field.bit_length,
            _ => field.bit_offset,
        };

        Some(extract_at(payload, offset, field.bit_length))
    }

    /// Number of repetitions to expand
    ///
    /// Read from the count field when there is one; otherwise as many whole
    /// repetitions as the payload holds.
    fn repetition_count(def: &PgnDef, set: RepeatingFieldSet, payload: &[u8]) -> usize {
        if let Some(count_idx) = set.count_field_index {
            let field = &def.fields[count_idx];
            return extract_at(payload, field.bit_offset, field.bit_length) as usize;
        }

        let payload_bits = payload.len() * 8;
        def.fields[set.start_field_index..set.start_field_index + set.field_count]
            .iter()
            .filter(|f| f.bit_length > 0)
            .map(|f| payload_bits.saturating_sub(f.bit_offset) / f.bit_length)
            .min()
            .unwrap_or(0)
    }

    fn check_repeating_set(def: &PgnDef, set: RepeatingFieldSet) -> Result<RepeatingFieldSet> {
        let end = set.start_field_index + set.field_count;
        if set.field_count == 0 || end > def.fields.len() {
            return Err(DecoderError::InvalidDefinition {
                pgn: def.pgn,
                reason: format!(
                    "repeating set covers fields {}..{} of {}",
                    set.start_field_index,
                    end,
                    def.fields.len()
                ),
            });
        }
        if let Some(count_idx) = set.count_field_index {
            if count_idx >= def.fields.len() || set.contains(count_idx) {
                return Err(DecoderError::InvalidDefinition {
                    pgn: def.pgn,
                    reason: format!("invalid repetition count field index {}", count_idx),
                });
            }
        }
        Ok(set)
    }

    fn collect(
        decoded: std::result::Result<Option<DecodedField>, FieldError>,
        fields: &mut Vec<DecodedField>,
        errors: &mut Vec<FieldError>,
    ) {
        match decoded {
            Ok(Some(field)) => fields.push(field),
            Ok(None) => {}
            Err(e) => {
                log::debug!("{}", e);
                errors.push(e);
            }
        }
    }

    /// Message carrying the definition's metadata and no fields
    fn metadata_only(def: &PgnDef) -> DecodedMessage {
        DecodedMessage {
            pgn: def.pgn,
            id: def.id.clone(),
            description: def.description.clone(),
            packet_type: def.packet_type.clone(),
            fields: Vec::new(),
            repeated_groups: Vec::new(),
            errors: Vec::new(),
        }
    }
}
