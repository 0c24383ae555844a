//! Field Decoding Engine
//!
//! Turns the bits of one field into a typed value: scaled numbers, lookup
//! labels, bit flags, strings and raw byte spans. Unit conversion for display
//! happens here too, after range filtering.

use crate::bits::{extract_at, sign_extend};
use crate::dictionary::{FieldDef, FieldType, LookupTables};
use crate::types::{DecodedField, FieldError, FieldValue};
use crate::units::convert_unit;

/// Field decoder - stateless, all context is passed in
pub struct FieldDecoder;

impl FieldDecoder {
    /// Decode the field located at `bit_offset` in `payload`
    ///
    /// # Arguments
    /// * `payload` - Complete message payload
    /// * `field` - Field definition
    /// * `bit_offset` - Absolute bit position of the field (differs from
    ///   `field.bit_offset` inside repeated groups)
    /// * `indirect_key` - Raw value of the referenced field, for indirect lookups
    /// * `lookups` - Dictionary lookup tables
    /// * `convert_units` - Render numbers with their presentation unit
    ///
    /// # Returns
    /// * `Ok(Some(field))` for a decoded field
    /// * `Ok(None)` for padding and values outside the declared range
    /// * `Err` if the field type cannot be decoded
    pub fn decode_field(
        payload: &[u8],
        field: &FieldDef,
        bit_offset: usize,
        indirect_key: Option<u64>,
        lookups: &LookupTables,
        convert_units: bool,
    ) -> Result<Option<DecodedField>, FieldError> {
        let value = match &field.field_type {
            t if t.is_skipped() => return Ok(None),
            FieldType::StringFix => {
                FieldValue::Text(decode_string_fix(byte_span(payload, bit_offset, field.bit_length)))
            }
            FieldType::StringLz => FieldValue::Text(decode_string_lz(payload, bit_offset)),
            FieldType::StringLau => FieldValue::Text(decode_string_lau(payload, bit_offset)),
            FieldType::Binary => FieldValue::Bytes(byte_span(payload, bit_offset, field.bit_length).to_vec()),
            FieldType::IndirectLookup => {
                let key = indirect_key.ok_or_else(|| FieldError::MissingReferencedField {
                    field: field.name.clone(),
                    order: field.indirect_field_order.unwrap_or(0),
                })?;
                let raw = extract_at(payload, bit_offset, field.bit_length);
                let table = field.indirect_lookup.as_deref().unwrap_or_default();
                FieldValue::Label(lookups.lookup_indirect(table, key, raw))
            }
            _ => {
                let raw = extract_at(payload, bit_offset, field.bit_length);
                match Self::decode_value(raw, field, lookups)? {
                    Some(value) => value,
                    None => return Ok(None),
                }
            }
        };

        Ok(Some(Self::present(field, value, convert_units)))
    }

    /// Decode a raw integer for types that need nothing but the field's own bits
    ///
    /// Numeric values are sign extended when the field is signed, then scaled
    /// by the resolution. Values outside the declared range yield `None`.
    pub fn decode_value(raw: u64, field: &FieldDef, lookups: &LookupTables) -> Result<Option<FieldValue>, FieldError> {
        match &field.field_type {
            t if t.is_numeric() => {
                let number = if field.signed {
                    sign_extend(raw, field.bit_length) as f64
                } else {
                    raw as f64
                };
                let scaled = number * field.resolution;

                if field.is_out_of_range(scaled) {
                    log::trace!(
                        "Field '{}' value {} outside [{:?}, {:?}], dropped",
                        field.name,
                        scaled,
                        field.range_min,
                        field.range_max
                    );
                    return Ok(None);
                }
                Ok(Some(FieldValue::Number(scaled)))
            }
            FieldType::Lookup => {
                let table = field.lookup.as_deref().unwrap_or_default();
                Ok(Some(FieldValue::Label(lookups.lookup(table, raw))))
            }
            FieldType::BitLookup => {
                let table = field.bit_lookup.as_deref().unwrap_or_default();
                Ok(Some(FieldValue::Flags(lookups.lookup_bits(table, raw, field.bit_length))))
            }
            t if t.is_skipped() => Ok(None),
            other => Err(FieldError::UnsupportedFieldType {
                field: field.name.clone(),
                type_name: other.name().to_string(),
            }),
        }
    }

    /// Attach the unit, converting numbers to display text when requested
    fn present(field: &FieldDef, value: FieldValue, convert_units: bool) -> DecodedField {
        let unit = field.unit.as_deref().filter(|u| !u.is_empty());

        let (value, unit) = match (value, unit) {
            (FieldValue::Number(number), Some(unit)) if convert_units => {
                (FieldValue::Text(convert_unit(number, unit)), None)
            }
            (value @ FieldValue::Number(_), unit) => (value, unit.map(str::to_string)),
            (value, _) => (value, None),
        };

        DecodedField {
            name: field.name.clone(),
            value,
            unit,
        }
    }
}

/// Bytes covered by a field, clipped to the payload
fn byte_span(payload: &[u8], bit_offset: usize, bit_length: usize) -> &[u8] {
    let start = (bit_offset / 8).min(payload.len());
    let end = (start + bit_length / 8).min(payload.len());
    &payload[start..end]
}

/// Fixed-length string: 0x00 and 0xFF are padding, trailing '@' and spaces are fill
fn decode_string_fix(bytes: &[u8]) -> String {
    let text: String = bytes
        .iter()
        .filter(|&&b| b != 0x00 && b != 0xFF)
        .map(|&b| b as char)
        .collect();
    text.trim_end_matches(['@', ' ']).to_string()
}

/// Length byte followed by the characters, optionally zero terminated
fn decode_string_lz(payload: &[u8], bit_offset: usize) -> String {
    let start = bit_offset / 8;
    let Some(&len) = payload.get(start) else {
        return String::new();
    };

    let end = (start + 1 + len as usize).min(payload.len());
    let body = &payload[(start + 1).min(end)..end];
    let body = body.split(|&b| b == 0).next().unwrap_or_default();
    decode_string_fix(body)
}

/// Total length byte (header included), encoding byte (0 = UTF-16LE, 1 = ASCII), characters
fn decode_string_lau(payload: &[u8], bit_offset: usize) -> String {
    let start = bit_offset / 8;
    let (Some(&len), Some(&encoding)) = (payload.get(start), payload.get(start + 1)) else {
        return String::new();
    };

    let end = (start + len as usize).min(payload.len());
    let body = payload.get(start + 2..end).unwrap_or_default();

    if encoding == 0 {
        let units: Vec<u16> = body
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .collect();
        String::from_utf16_lossy(&units)
            .trim_end_matches(['\0', '@', ' '])
            .to_string()
    } else {
        decode_string_fix(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dictionary::{BitLookup, DirectLookup, IndirectLookup};
    use std::collections::{BTreeMap, HashMap};

    fn lookups() -> LookupTables {
        let mut tables = LookupTables::new();
        tables.add_direct(DirectLookup {
            name: "DIRECTION_REFERENCE".to_string(),
            entries: HashMap::from([(0, "True".to_string()), (1, "Magnetic".to_string())]),
        });
        tables.add_indirect(IndirectLookup {
            name: "DEVICE_FUNCTION".to_string(),
            entries: HashMap::from([((40, 130), "Display".to_string())]),
        });
        tables.add_bit(BitLookup {
            name: "ENGINE_STATUS_1".to_string(),
            entries: BTreeMap::from([(0, "Check Engine".to_string()), (1, "Over Temperature".to_string())]),
        });
        tables
    }

    fn decode(payload: &[u8], field: &FieldDef, convert: bool) -> Option<DecodedField> {
        FieldDecoder::decode_field(payload, field, field.bit_offset, None, &lookups(), convert).unwrap()
    }

    #[test]
    fn test_signed_number_with_resolution() {
        let mut field = FieldDef::new(1, "Rate", 0, 16, FieldType::Number);
        field.signed = true;
        field.resolution = 0.01;

        // 0xFF9C = -100
        let decoded = decode(&[0x9C, 0xFF], &field, false).unwrap();
        let value = decoded.value.as_f64().unwrap();
        assert!((value - (-1.0)).abs() < 1e-9);
    }

    #[test]
    fn test_range_drop() {
        let mut field = FieldDef::new(1, "Depth", 0, 8, FieldType::Number);
        field.range_max = Some(100.0);
        assert!(decode(&[0xC8], &field, false).is_none());
        assert!(decode(&[0x32], &field, false).is_some());
    }

    #[test]
    fn test_unit_conversion_applies_after_range_check() {
        let mut field = FieldDef::new(1, "Speed", 0, 16, FieldType::Number);
        field.resolution = 0.01;
        field.unit = Some("m/s".to_string());

        // 1000 * 0.01 = 10 m/s
        let converted = decode(&[0xE8, 0x03], &field, true).unwrap();
        assert_eq!(converted.value, FieldValue::Text("19.44 kts".to_string()));
        assert_eq!(converted.unit, None);

        let raw = decode(&[0xE8, 0x03], &field, false).unwrap();
        assert_eq!(raw.value, FieldValue::Number(10.0));
        assert_eq!(raw.unit.as_deref(), Some("m/s"));
    }

    #[test]
    fn test_direct_lookup() {
        let mut field = FieldDef::new(1, "Reference", 0, 2, FieldType::Lookup);
        field.lookup = Some("DIRECTION_REFERENCE".to_string());
        let decoded = decode(&[0x01], &field, true).unwrap();
        assert_eq!(decoded.value, FieldValue::Label("Magnetic".to_string()));

        let decoded = decode(&[0x03], &field, true).unwrap();
        assert_eq!(decoded.value, FieldValue::Label("Unknown (3)".to_string()));
    }

    #[test]
    fn test_bit_lookup() {
        let mut field = FieldDef::new(1, "Status", 0, 16, FieldType::BitLookup);
        field.bit_lookup = Some("ENGINE_STATUS_1".to_string());
        let decoded = decode(&[0x03, 0x00], &field, true).unwrap();
        assert_eq!(
            decoded.value,
            FieldValue::Flags(vec!["Check Engine".to_string(), "Over Temperature".to_string()])
        );
    }

    #[test]
    fn test_indirect_lookup_requires_key() {
        let mut field = FieldDef::new(2, "Function", 8, 8, FieldType::IndirectLookup);
        field.indirect_lookup = Some("DEVICE_FUNCTION".to_string());
        field.indirect_field_order = Some(1);

        let decoded = FieldDecoder::decode_field(&[40, 130], &field, 8, Some(40), &lookups(), true)
            .unwrap()
            .unwrap();
        assert_eq!(decoded.value, FieldValue::Label("Display".to_string()));

        let err = FieldDecoder::decode_field(&[40, 130], &field, 8, None, &lookups(), true).unwrap_err();
        assert_eq!(
            err,
            FieldError::MissingReferencedField {
                field: "Function".to_string(),
                order: 1
            }
        );
    }

    #[test]
    fn test_string_fix_strips_padding() {
        let field = FieldDef::new(1, "Name", 0, 64, FieldType::StringFix);
        let payload = b"AB\x00C@ \xFF@";
        let decoded = decode(payload, &field, true).unwrap();
        assert_eq!(decoded.value, FieldValue::Text("ABC".to_string()));
    }

    #[test]
    fn test_string_lz() {
        let field = FieldDef::new(1, "Name", 8, 0, FieldType::StringLz);
        let payload = [0xAA, 4, b'B', b'O', b'A', b'T', 0x00];
        let decoded = decode(&payload, &field, true).unwrap();
        assert_eq!(decoded.value, FieldValue::Text("BOAT".to_string()));
    }

    #[test]
    fn test_string_lau_ascii_and_utf16() {
        let field = FieldDef::new(1, "Name", 0, 0, FieldType::StringLau);

        let ascii = [5, 1, b'S', b'E', b'A'];
        assert_eq!(decode(&ascii, &field, true).unwrap().value, FieldValue::Text("SEA".to_string()));

        let utf16 = [6, 0, b'O', 0, b'K', 0];
        assert_eq!(decode(&utf16, &field, true).unwrap().value, FieldValue::Text("OK".to_string()));
    }

    #[test]
    fn test_binary_span() {
        let field = FieldDef::new(1, "Data", 8, 16, FieldType::Binary);
        let decoded = decode(&[0x00, 0xDE, 0xAD, 0xFF], &field, true).unwrap();
        assert_eq!(decoded.value, FieldValue::Bytes(vec![0xDE, 0xAD]));
    }

    #[test]
    fn test_reserved_is_skipped() {
        let field = FieldDef::new(1, "Reserved", 0, 8, FieldType::Reserved);
        assert!(decode(&[0xFF], &field, true).is_none());
    }

    #[test]
    fn test_unsupported_type_is_an_error() {
        let field = FieldDef::new(1, "Blob", 0, 8, FieldType::Unsupported("VARIABLE".to_string()));
        let err = FieldDecoder::decode_field(&[0x00], &field, 0, None, &lookups(), true).unwrap_err();
        assert_eq!(
            err,
            FieldError::UnsupportedFieldType {
                field: "Blob".to_string(),
                type_name: "VARIABLE".to_string()
            }
        );
    }
}
