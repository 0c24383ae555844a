//! canboat dictionary parser
//!
//! Parses the canboat JSON document and converts it into our internal
//! dictionary format. The parser works on in-memory text or JSON values only;
//! reading and fetching the document is the caller's job.

use super::database::{FieldDef, FieldType, PacketType, PgnDef, PgnDictionary, RepeatingFieldSet};
use super::lookup::{BitLookup, DirectLookup, IndirectLookup, LookupTables};
use crate::types::{DecoderError, Result};
use serde::Deserialize;
use serde_json::Value;

//==================================================================================DOCUMENT
// Structures used to deserialize `canboat.json`. Unused keys are ignored.

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CanboatDocument {
    #[serde(rename = "PGNs", default)]
    pgns: Option<Vec<RawPgn>>,
    #[serde(default)]
    lookup_enumerations: Vec<RawLookup>,
    #[serde(default)]
    lookup_indirect_enumerations: Vec<RawIndirectLookup>,
    #[serde(default)]
    lookup_bit_enumerations: Vec<RawBitLookup>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawLookup {
    name: String,
    #[serde(default)]
    enum_values: Vec<RawEnumValue>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawEnumValue {
    name: String,
    value: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawIndirectLookup {
    name: String,
    #[serde(default)]
    enum_values: Vec<RawIndirectValue>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawIndirectValue {
    name: String,
    value1: u64,
    value2: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawBitLookup {
    name: String,
    #[serde(default)]
    enum_bit_values: Vec<RawBitValue>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawBitValue {
    name: String,
    bit: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawPgn {
    #[serde(rename = "PGN")]
    pgn: u32,
    #[serde(default)]
    id: String,
    #[serde(default)]
    description: String,
    #[serde(rename = "Type")]
    packet_type: Option<String>,
    /// Payload length in bytes
    length: Option<usize>,
    #[serde(default)]
    fields: Vec<RawField>,
    #[serde(default)]
    repeating_field_set1_size: usize,
    #[serde(default)]
    repeating_field_set1_start_field: usize,
    #[serde(default)]
    repeating_field_set1_count_field: usize,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawField {
    order: u32,
    #[serde(default)]
    id: String,
    name: String,
    #[serde(default)]
    bit_length: usize,
    #[serde(default)]
    bit_offset: usize,
    resolution: Option<f64>,
    #[serde(default)]
    signed: bool,
    range_min: Option<f64>,
    range_max: Option<f64>,
    field_type: Option<String>,
    #[serde(rename = "Match")]
    match_value: Option<u64>,
    lookup_enumeration: Option<String>,
    lookup_indirect_enumeration: Option<String>,
    lookup_indirect_enumeration_field_order: Option<u32>,
    lookup_bit_enumeration: Option<String>,
    unit: Option<String>,
    physical_quantity: Option<String>,
}

//==================================================================================PARSING
/// Parse a canboat JSON document into a dictionary
pub fn parse_canboat_str(json: &str) -> Result<PgnDictionary> {
    let document: CanboatDocument = serde_json::from_str(json)?;
    convert_document(document)
}

/// Parse an already loaded (and possibly merged) canboat JSON value
pub fn parse_canboat_value(value: Value) -> Result<PgnDictionary> {
    let document: CanboatDocument = serde_json::from_value(value)?;
    convert_document(document)
}

/// Merge an overlay document (local additions) into a base document
///
/// Objects are merged key by key, arrays are concatenated, `null` overlay
/// values are ignored and any other overlay value replaces the base value.
pub fn merge_documents(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (base, Value::Null) => base,
        (Value::Object(mut base_map), Value::Object(overlay_map)) => {
            for (key, overlay_value) in overlay_map {
                let merged = match base_map.remove(&key) {
                    Some(base_value) => merge_documents(base_value, overlay_value),
                    None => overlay_value,
                };
                if !merged.is_null() {
                    base_map.insert(key, merged);
                }
            }
            Value::Object(base_map)
        }
        (Value::Array(mut base_items), Value::Array(overlay_items)) => {
            base_items.extend(overlay_items);
            Value::Array(base_items)
        }
        (_, overlay) => overlay,
    }
}

fn convert_document(document: CanboatDocument) -> Result<PgnDictionary> {
    let raw_pgns = document
        .pgns
        .filter(|pgns| !pgns.is_empty())
        .ok_or_else(|| {
            DecoderError::InvalidDictionary(
                "the document does not contain valid PGN definitions".to_string(),
            )
        })?;

    let mut lookups = LookupTables::new();
    for raw in document.lookup_enumerations {
        lookups.add_direct(DirectLookup {
            entries: raw.enum_values.into_iter().map(|v| (v.value, v.name)).collect(),
            name: raw.name,
        });
    }
    for raw in document.lookup_indirect_enumerations {
        lookups.add_indirect(IndirectLookup {
            entries: raw
                .enum_values
                .into_iter()
                .map(|v| ((v.value1, v.value2), v.name))
                .collect(),
            name: raw.name,
        });
    }
    for raw in document.lookup_bit_enumerations {
        lookups.add_bit(BitLookup {
            entries: raw.enum_bit_values.into_iter().map(|v| (v.bit, v.name)).collect(),
            name: raw.name,
        });
    }

    let definitions: Vec<PgnDef> = raw_pgns.into_iter().map(convert_pgn).collect();

    let dictionary = PgnDictionary::new(definitions, lookups)?;
    let stats = dictionary.stats();
    log::info!(
        "Loaded {} PGN definitions ({} distinct PGNs, {} discriminated variants)",
        stats.num_definitions,
        stats.num_pgns,
        stats.num_discriminated
    );

    Ok(dictionary)
}

/// Convert a canboat PGN entry to our PgnDef
fn convert_pgn(raw: RawPgn) -> PgnDef {
    let repeating_set = convert_repeating_set(&raw);
    let fields: Vec<FieldDef> = raw.fields.into_iter().map(convert_field).collect();

    let total_bit_length = raw.length.map(|bytes| bytes * 8).unwrap_or_else(|| {
        fields
            .iter()
            .map(|f| f.bit_offset + f.bit_length)
            .max()
            .unwrap_or(0)
    });

    PgnDef {
        pgn: raw.pgn,
        id: raw.id,
        description: raw.description,
        packet_type: raw
            .packet_type
            .as_deref()
            .map(PacketType::from_name)
            .unwrap_or(PacketType::Single),
        total_bit_length,
        fields,
        repeating_set,
    }
}

/// Translate the 1-based canboat repeating set attributes into field indices
fn convert_repeating_set(raw: &RawPgn) -> Option<RepeatingFieldSet> {
    let (pgn, id, num_fields) = (raw.pgn, &raw.id, raw.fields.len());
    if raw.repeating_field_set1_size == 0 || raw.repeating_field_set1_start_field == 0 {
        return None;
    }

    let start_field_index = raw.repeating_field_set1_start_field - 1;
    if start_field_index + raw.repeating_field_set1_size > num_fields {
        log::warn!(
            "PGN {} ({}): repeating set {}+{} exceeds {} fields, ignored",
            pgn,
            id,
            raw.repeating_field_set1_start_field,
            raw.repeating_field_set1_size,
            num_fields
        );
        return None;
    }

    let count_field_index = match raw.repeating_field_set1_count_field {
        0 => None,
        order if order <= num_fields => Some(order - 1),
        order => {
            log::warn!("PGN {} ({}): repeat count field {} does not exist", pgn, id, order);
            None
        }
    };

    Some(RepeatingFieldSet {
        start_field_index,
        field_count: raw.repeating_field_set1_size,
        count_field_index,
    })
}

/// Convert a canboat field to our FieldDef
fn convert_field(raw: RawField) -> FieldDef {
    let field_type = raw
        .field_type
        .as_deref()
        .map(FieldType::from_name)
        .unwrap_or(FieldType::Number);

    FieldDef {
        order: raw.order,
        id: raw.id,
        name: raw.name,
        bit_offset: raw.bit_offset,
        bit_length: raw.bit_length,
        field_type,
        resolution: raw.resolution.unwrap_or(1.0),
        signed: raw.signed,
        range_min: raw.range_min,
        range_max: raw.range_max,
        match_value: raw.match_value,
        lookup: raw.lookup_enumeration,
        indirect_lookup: raw.lookup_indirect_enumeration,
        indirect_field_order: raw.lookup_indirect_enumeration_field_order,
        bit_lookup: raw.lookup_bit_enumeration,
        unit: raw.unit,
        physical_quantity: raw.physical_quantity,
    }
}
