//! Lookup tables
//!
//! Three independent enumeration systems from the dictionary: direct
//! (value → label), indirect ((value1, value2) → label) and bit lookups
//! (bit index → label). Tables are referenced by name from field definitions
//! and never mutated after load.

use std::collections::{BTreeMap, HashMap};

/// Direct enumeration: raw value → label
#[derive(Debug, Clone, Default)]
pub struct DirectLookup {
    pub name: String,
    pub entries: HashMap<u64, String>,
}

/// Two-key enumeration: (value1, value2) → label
#[derive(Debug, Clone, Default)]
pub struct IndirectLookup {
    pub name: String,
    pub entries: HashMap<(u64, u64), String>,
}

/// Bit-flag enumeration: bit index → label
#[derive(Debug, Clone, Default)]
pub struct BitLookup {
    pub name: String,
    pub entries: BTreeMap<u32, String>,
}

/// All lookup tables of a dictionary, keyed by table name
#[derive(Debug, Clone, Default)]
pub struct LookupTables {
    direct: HashMap<String, DirectLookup>,
    indirect: HashMap<String, IndirectLookup>,
    bit: HashMap<String, BitLookup>,
}

impl LookupTables {
    /// Create an empty set of tables
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_direct(&mut self, table: DirectLookup) {
        self.direct.insert(table.name.clone(), table);
    }

    pub fn add_indirect(&mut self, table: IndirectLookup) {
        self.indirect.insert(table.name.clone(), table);
    }

    pub fn add_bit(&mut self, table: BitLookup) {
        self.bit.insert(table.name.clone(), table);
    }

    pub fn direct(&self, name: &str) -> Option<&DirectLookup> {
        self.direct.get(name)
    }

    pub fn indirect(&self, name: &str) -> Option<&IndirectLookup> {
        self.indirect.get(name)
    }

    pub fn bit(&self, name: &str) -> Option<&BitLookup> {
        self.bit.get(name)
    }

    /// Resolve a value in a direct table, falling back to a descriptive label
    pub fn lookup(&self, name: &str, value: u64) -> String {
        match self.direct.get(name) {
            Some(table) => table
                .entries
                .get(&value)
                .cloned()
                .unwrap_or_else(|| format!("Unknown ({})", value)),
            None => unknown_enumeration(name),
        }
    }

    /// Resolve a value pair in an indirect table
    pub fn lookup_indirect(&self, name: &str, value1: u64, value2: u64) -> String {
        match self.indirect.get(name) {
            Some(table) => table
                .entries
                .get(&(value1, value2))
                .cloned()
                .unwrap_or_else(|| format!("Unknown ({} {})", value1, value2)),
            None => unknown_enumeration(name),
        }
    }

    /// Labels of every bit set in `value`, lowest bit first
    pub fn lookup_bits(&self, name: &str, value: u64, bit_length: usize) -> Vec<String> {
        let Some(table) = self.bit.get(name) else {
            return vec![unknown_enumeration(name)];
        };

        (0..bit_length.min(64) as u32)
            .filter(|bit| (value >> bit) & 1 == 1)
            .map(|bit| {
                table
                    .entries
                    .get(&bit)
                    .cloned()
                    .unwrap_or_else(|| format!("Unknown ({})", bit))
            })
            .collect()
    }

    /// Number of (direct, indirect, bit) tables
    pub fn counts(&self) -> (usize, usize, usize) {
        (self.direct.len(), self.indirect.len(), self.bit.len())
    }
}

fn unknown_enumeration(name: &str) -> String {
    format!("Unknown Enumeration ({})", name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tables() -> LookupTables {
        let mut tables = LookupTables::new();
        tables.add_direct(DirectLookup {
            name: "YES_NO".to_string(),
            entries: HashMap::from([(0, "No".to_string()), (1, "Yes".to_string())]),
        });
        tables.add_indirect(IndirectLookup {
            name: "DEVICE_FUNCTION".to_string(),
            entries: HashMap::from([((60, 145), "Autopilot".to_string())]),
        });
        tables.add_bit(BitLookup {
            name: "ALERTS".to_string(),
            entries: BTreeMap::from([(0, "Low Oil".to_string()), (2, "Overheat".to_string())]),
        });
        tables
    }

    #[test]
    fn test_direct_lookup() {
        let tables = tables();
        assert_eq!(tables.lookup("YES_NO", 1), "Yes");
        assert_eq!(tables.lookup("YES_NO", 3), "Unknown (3)");
        assert_eq!(tables.lookup("MISSING", 1), "Unknown Enumeration (MISSING)");
    }

    #[test]
    fn test_indirect_lookup() {
        let tables = tables();
        assert_eq!(tables.lookup_indirect("DEVICE_FUNCTION", 60, 145), "Autopilot");
        assert_eq!(tables.lookup_indirect("DEVICE_FUNCTION", 60, 1), "Unknown (60 1)");
        assert_eq!(
            tables.lookup_indirect("NOPE", 0, 0),
            "Unknown Enumeration (NOPE)"
        );
    }

    #[test]
    fn test_bit_lookup() {
        let tables = tables();
        assert_eq!(
            tables.lookup_bits("ALERTS", 0b0111, 8),
            vec!["Low Oil", "Unknown (1)", "Overheat"]
        );
        assert!(tables.lookup_bits("ALERTS", 0, 8).is_empty());
        assert_eq!(
            tables.lookup_bits("NOPE", 1, 8),
            vec!["Unknown Enumeration (NOPE)"]
        );
    }

    #[test]
    fn test_counts() {
        assert_eq!(tables().counts(), (1, 1, 1));
    }
}
