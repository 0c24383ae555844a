//! PGN dictionary and canboat parser
//!
//! This module contains the canboat document parser, the lookup tables and
//! the indexed, immutable PGN dictionary.

pub mod canboat;
pub mod database;
pub mod lookup;

// Re-export key types for convenience
pub use canboat::{merge_documents, parse_canboat_str, parse_canboat_value};
pub use database::{
    DictionaryHandle, DictionaryStats, FieldDef, FieldType, MatchPattern, PacketType, PgnDef,
    PgnDictionary, PgnHandle, RepeatingFieldSet, Resolution,
};
pub use lookup::{BitLookup, DirectLookup, IndirectLookup, LookupTables};

impl PgnDictionary {
    /// Parse a canboat JSON document
    pub fn from_json_str(json: &str) -> crate::types::Result<Self> {
        parse_canboat_str(json)
    }
}
