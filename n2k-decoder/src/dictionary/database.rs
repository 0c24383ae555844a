//! PGN dictionary index
//!
//! Holds every PGN definition in an arena addressed by [`PgnHandle`]. Several
//! definitions may share one PGN number (manufacturer proprietary PGNs, mode
//! dependent variants); they are told apart by discriminator fields carrying
//! a `Match` value. The index keeps:
//! - a primary map PGN → first-seen (representative) definition
//! - a secondary multimap PGN → `(match_value, mask, handle)` patterns, in
//!   insertion order, for every definition declaring discriminators

use super::lookup::LookupTables;
use crate::bits::low_mask;
use crate::types::{DecoderError, Result};
use byteorder::{ByteOrder as _, LittleEndian};
use serde::{Serialize, Serializer};
use std::collections::HashMap;
use std::fmt;
use std::ops::Index;
use std::sync::Arc;

/// Shared, immutable dictionary passed to the decoders at construction time
pub type DictionaryHandle = Arc<PgnDictionary>;

/// Declared type of a field
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldType {
    Number,
    Float,
    Decimal,
    Time,
    Date,
    Mmsi,
    FieldIndex,
    Lookup,
    IndirectLookup,
    BitLookup,
    StringFix,
    StringLz,
    StringLau,
    Binary,
    Reserved,
    Spare,
    /// Any type the decoder does not handle, with its declared name
    Unsupported(String),
}

impl FieldType {
    /// Map a dictionary type name onto a field type
    pub fn from_name(name: &str) -> Self {
        match name {
            "NUMBER" => FieldType::Number,
            "FLOAT" => FieldType::Float,
            "DECIMAL" => FieldType::Decimal,
            "TIME" => FieldType::Time,
            "DATE" => FieldType::Date,
            "MMSI" => FieldType::Mmsi,
            "FIELD_INDEX" => FieldType::FieldIndex,
            "LOOKUP" => FieldType::Lookup,
            "INDIRECT_LOOKUP" => FieldType::IndirectLookup,
            "BITLOOKUP" => FieldType::BitLookup,
            "STRING_FIX" => FieldType::StringFix,
            "STRING_LZ" => FieldType::StringLz,
            "STRING_LAU" => FieldType::StringLau,
            "BINARY" => FieldType::Binary,
            "RESERVED" => FieldType::Reserved,
            "SPARE" => FieldType::Spare,
            other => FieldType::Unsupported(other.to_string()),
        }
    }

    /// Dictionary name of this type
    pub fn name(&self) -> &str {
        match self {
            FieldType::Number => "NUMBER",
            FieldType::Float => "FLOAT",
            FieldType::Decimal => "DECIMAL",
            FieldType::Time => "TIME",
            FieldType::Date => "DATE",
            FieldType::Mmsi => "MMSI",
            FieldType::FieldIndex => "FIELD_INDEX",
            FieldType::Lookup => "LOOKUP",
            FieldType::IndirectLookup => "INDIRECT_LOOKUP",
            FieldType::BitLookup => "BITLOOKUP",
            FieldType::StringFix => "STRING_FIX",
            FieldType::StringLz => "STRING_LZ",
            FieldType::StringLau => "STRING_LAU",
            FieldType::Binary => "BINARY",
            FieldType::Reserved => "RESERVED",
            FieldType::Spare => "SPARE",
            FieldType::Unsupported(name) => name,
        }
    }

    /// True for types whose decoded value is a scaled number
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            FieldType::Number
                | FieldType::Float
                | FieldType::Decimal
                | FieldType::Time
                | FieldType::Date
                | FieldType::Mmsi
                | FieldType::FieldIndex
        )
    }

    /// True for padding that is never emitted
    pub fn is_skipped(&self) -> bool {
        matches!(self, FieldType::Reserved | FieldType::Spare)
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Transport declared for a PGN
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PacketType {
    Single,
    Fast,
    Iso,
    Mixed,
    Other(String),
}

impl PacketType {
    pub fn from_name(name: &str) -> Self {
        match name {
            "Single" => PacketType::Single,
            "Fast" => PacketType::Fast,
            "ISO" => PacketType::Iso,
            "Mixed" => PacketType::Mixed,
            other => PacketType::Other(other.to_string()),
        }
    }

    /// Only "Fast" PGNs go through fast-packet reassembly
    pub fn is_fast_packet(&self) -> bool {
        matches!(self, PacketType::Fast)
    }
}

impl Serialize for PacketType {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl fmt::Display for PacketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PacketType::Single => write!(f, "Single"),
            PacketType::Fast => write!(f, "Fast"),
            PacketType::Iso => write!(f, "ISO"),
            PacketType::Mixed => write!(f, "Mixed"),
            PacketType::Other(name) => write!(f, "{}", name),
        }
    }
}

/// A field of a PGN definition
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDef {
    /// 1-based position in the definition
    pub order: u32,
    pub id: String,
    pub name: String,
    pub bit_offset: usize,
    pub bit_length: usize,
    pub field_type: FieldType,
    /// Scale factor applied to the raw value
    pub resolution: f64,
    pub signed: bool,
    pub range_min: Option<f64>,
    pub range_max: Option<f64>,
    /// Required value when this field discriminates PGN variants
    pub match_value: Option<u64>,
    /// Direct lookup table name
    pub lookup: Option<String>,
    /// Indirect lookup table name
    pub indirect_lookup: Option<String>,
    /// Order of the field providing the first key of the indirect lookup
    pub indirect_field_order: Option<u32>,
    /// Bit lookup table name
    pub bit_lookup: Option<String>,
    pub unit: Option<String>,
    pub physical_quantity: Option<String>,
}

impl FieldDef {
    /// Plain field with default scaling, mostly useful to build definitions by hand
    pub fn new(order: u32, name: impl Into<String>, bit_offset: usize, bit_length: usize, field_type: FieldType) -> Self {
        let name = name.into();
        Self {
            order,
            id: name.to_lowercase().replace(' ', "_"),
            name,
            bit_offset,
            bit_length,
            field_type,
            resolution: 1.0,
            signed: false,
            range_min: None,
            range_max: None,
            match_value: None,
            lookup: None,
            indirect_lookup: None,
            indirect_field_order: None,
            bit_lookup: None,
            unit: None,
            physical_quantity: None,
        }
    }

    /// True if the field carries a discriminator value
    pub fn is_discriminator(&self) -> bool {
        self.match_value.is_some()
    }

    /// True if `value` lies outside the declared range
    pub fn is_out_of_range(&self, value: f64) -> bool {
        self.range_min.map_or(false, |min| value < min) || self.range_max.map_or(false, |max| value > max)
    }
}

/// Repeating field set: a group of consecutive fields repeated `count` times
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RepeatingFieldSet {
    /// Index of the first repeated field in `PgnDef::fields`
    pub start_field_index: usize,
    /// Number of fields in one repetition
    pub field_count: usize,
    /// Index of the field holding the repetition count, if any
    pub count_field_index: Option<usize>,
}

impl RepeatingFieldSet {
    /// True if the field at `index` belongs to the repeated group
    pub fn contains(&self, index: usize) -> bool {
        index >= self.start_field_index && index < self.start_field_index + self.field_count
    }
}

/// A complete PGN definition
#[derive(Debug, Clone, PartialEq)]
pub struct PgnDef {
    pub pgn: u32,
    /// Camel-case identifier from the dictionary
    pub id: String,
    pub description: String,
    pub packet_type: PacketType,
    /// Declared payload length in bits
    pub total_bit_length: usize,
    pub fields: Vec<FieldDef>,
    pub repeating_set: Option<RepeatingFieldSet>,
}

impl PgnDef {
    /// Find a field by its 1-based order
    pub fn field_by_order(&self, order: u32) -> Option<&FieldDef> {
        self.fields
            .iter()
            .find(|f| f.order == order)
            .or_else(|| self.fields.get((order as usize).checked_sub(1)?))
    }

    /// Discriminator pattern as `(match_value, mask)` over the first 64 payload bits
    ///
    /// Returns `None` when no field declares a match value.
    pub fn discriminator_pattern(&self) -> Option<(u64, u64)> {
        let mut mask = 0u64;
        let mut match_value = 0u64;
        let mut found = false;

        for field in self.fields.iter().filter(|f| f.is_discriminator()) {
            if field.bit_offset + field.bit_length > 64 {
                log::warn!(
                    "PGN {} ({}): discriminator '{}' lies beyond the first 8 bytes, ignored",
                    self.pgn,
                    self.id,
                    field.name
                );
                continue;
            }

            let field_mask = low_mask(field.bit_length);
            let value = field.match_value.unwrap_or(0) & field_mask;
            mask |= field_mask << field.bit_offset;
            match_value |= value << field.bit_offset;
            found = true;
        }

        found.then_some((match_value, mask))
    }
}

/// Stable handle to a definition inside a [`PgnDictionary`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct PgnHandle(usize);

impl PgnHandle {
    /// Position of the definition in dictionary order
    pub fn index(&self) -> usize {
        self.0
    }
}

/// Discriminator pattern of one definition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchPattern {
    pub match_value: u64,
    pub mask: u64,
    pub handle: PgnHandle,
}

/// Outcome of picking a definition for a payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// A discriminated variant matched the payload
    Matched(PgnHandle),
    /// PGN has no discriminated variants; use its only/first definition
    Representative(PgnHandle),
    /// PGN has discriminated variants but none matched
    NoPatternMatch { representative: PgnHandle },
    /// PGN is not in the dictionary
    Unknown,
}

impl Resolution {
    /// Definition to decode the payload with, if any
    pub fn handle(&self) -> Option<PgnHandle> {
        match self {
            Resolution::Matched(handle) | Resolution::Representative(handle) => Some(*handle),
            Resolution::NoPatternMatch { .. } | Resolution::Unknown => None,
        }
    }
}

/// The dictionary: definitions, index and lookup tables
#[derive(Debug, Clone)]
pub struct PgnDictionary {
    /// All definitions in document order
    definitions: Vec<PgnDef>,

    /// PGN → representative (first-seen) definition
    primary: HashMap<u32, PgnHandle>,

    /// PGN → discriminator patterns in insertion order
    patterns: HashMap<u32, Vec<MatchPattern>>,

    lookups: LookupTables,
}

impl PgnDictionary {
    /// Build the dictionary and its indices
    ///
    /// Fails if `definitions` is empty: a dictionary without PGNs can decode nothing.
    pub fn new(definitions: Vec<PgnDef>, lookups: LookupTables) -> Result<Self> {
        if definitions.is_empty() {
            return Err(DecoderError::InvalidDictionary(
                "the document does not contain any PGN definitions".to_string(),
            ));
        }

        let mut primary = HashMap::new();
        let mut patterns: HashMap<u32, Vec<MatchPattern>> = HashMap::new();

        for (idx, def) in definitions.iter().enumerate() {
            let handle = PgnHandle(idx);
            primary.entry(def.pgn).or_insert(handle);

            if let Some((match_value, mask)) = def.discriminator_pattern() {
                log::trace!(
                    "PGN {} {}: match 0x{:016X} mask 0x{:016X}",
                    def.pgn,
                    def.id,
                    match_value,
                    mask
                );
                patterns.entry(def.pgn).or_default().push(MatchPattern {
                    match_value,
                    mask,
                    handle,
                });
            }
        }

        Ok(Self {
            definitions,
            primary,
            patterns,
            lookups,
        })
    }

    /// Wrap the dictionary for sharing between decoders
    pub fn into_handle(self) -> DictionaryHandle {
        Arc::new(self)
    }

    /// Definition behind a handle
    pub fn get(&self, handle: PgnHandle) -> Option<&PgnDef> {
        self.definitions.get(handle.0)
    }

    /// First-seen definition for a PGN
    pub fn representative(&self, pgn: u32) -> Option<PgnHandle> {
        self.primary.get(&pgn).copied()
    }

    /// First-seen definition for a PGN, by reference
    pub fn representative_def(&self, pgn: u32) -> Option<&PgnDef> {
        self.representative(pgn).and_then(|h| self.get(h))
    }

    /// True if the PGN appears in the dictionary
    pub fn contains(&self, pgn: u32) -> bool {
        self.primary.contains_key(&pgn)
    }

    /// Discriminator patterns registered for a PGN
    pub fn patterns(&self, pgn: u32) -> &[MatchPattern] {
        self.patterns.get(&pgn).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Every definition sharing a PGN number, in document order
    pub fn candidates(&self, pgn: u32) -> Vec<PgnHandle> {
        self.definitions
            .iter()
            .enumerate()
            .filter(|(_, def)| def.pgn == pgn)
            .map(|(idx, _)| PgnHandle(idx))
            .collect()
    }

    /// Pick the definition describing `payload` for `pgn`
    ///
    /// The payload is zero-padded to 8 bytes and its first 8 bytes read as a
    /// little-endian word; the first pattern with `(word & mask) == match_value`
    /// wins.
    pub fn resolve(&self, pgn: u32, payload: &[u8]) -> Resolution {
        let Some(representative) = self.representative(pgn) else {
            return Resolution::Unknown;
        };

        let patterns = self.patterns(pgn);
        if patterns.is_empty() {
            return Resolution::Representative(representative);
        }

        let mut word_bytes = [0u8; 8];
        let len = payload.len().min(8);
        word_bytes[..len].copy_from_slice(&payload[..len]);
        let data = LittleEndian::read_u64(&word_bytes);

        patterns
            .iter()
            .find(|p| data & p.mask == p.match_value)
            .map(|p| Resolution::Matched(p.handle))
            .unwrap_or(Resolution::NoPatternMatch { representative })
    }

    /// Lookup tables referenced by field definitions
    pub fn lookups(&self) -> &LookupTables {
        &self.lookups
    }

    /// All definitions with their handles, in document order
    pub fn definitions(&self) -> impl Iterator<Item = (PgnHandle, &PgnDef)> {
        self.definitions
            .iter()
            .enumerate()
            .map(|(idx, def)| (PgnHandle(idx), def))
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    /// Get dictionary statistics
    pub fn stats(&self) -> DictionaryStats {
        let (direct_lookups, indirect_lookups, bit_lookups) = self.lookups.counts();
        DictionaryStats {
            num_definitions: self.definitions.len(),
            num_pgns: self.primary.len(),
            num_discriminated: self.patterns.values().map(Vec::len).sum(),
            num_fields: self.definitions.iter().map(|d| d.fields.len()).sum(),
            direct_lookups,
            indirect_lookups,
            bit_lookups,
        }
    }
}

impl Index<PgnHandle> for PgnDictionary {
    type Output = PgnDef;

    fn index(&self, handle: PgnHandle) -> &PgnDef {
        &self.definitions[handle.0]
    }
}

/// Dictionary statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DictionaryStats {
    /// Total number of definitions
    pub num_definitions: usize,
    /// Distinct PGN numbers
    pub num_pgns: usize,
    /// Definitions carrying a discriminator pattern
    pub num_discriminated: usize,
    /// Total number of field definitions
    pub num_fields: usize,
    pub direct_lookups: usize,
    pub indirect_lookups: usize,
    pub bit_lookups: usize,
}
