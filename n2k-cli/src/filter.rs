//! Record filtering on reassembled messages

use crate::config::{FilterConfig, Preset};
use n2k_decoder::MessageHeader;
use std::collections::HashSet;

/// Include/exclude filter over logical messages
#[derive(Debug, Clone, Default)]
pub struct RecordFilter {
    include_pgns: HashSet<u32>,
    exclude_pgns: HashSet<u32>,
    addresses: HashSet<u8>,
    distinct: bool,
}

impl RecordFilter {
    pub fn new(config: &FilterConfig) -> Self {
        Self {
            include_pgns: config.include_pgns.iter().copied().collect(),
            exclude_pgns: config.exclude_pgns.iter().copied().collect(),
            addresses: config.addresses.iter().copied().collect(),
            distinct: config.distinct,
        }
    }

    /// Add the PGNs of a preset to the include list
    pub fn with_preset(mut self, preset: &Preset) -> Self {
        self.include_pgns.extend(preset.include_pgns.iter().copied());
        self
    }

    /// True if the message passes the PGN and address filters
    ///
    /// Empty include lists accept everything; exclusion always wins.
    pub fn matches(&self, header: &MessageHeader) -> bool {
        let included = self.include_pgns.is_empty() || self.include_pgns.contains(&header.pgn);
        let address = self.addresses.is_empty()
            || self.addresses.contains(&header.source)
            || self.addresses.contains(&header.destination);
        let excluded = self.exclude_pgns.contains(&header.pgn);

        included && address && !excluded
    }

    /// Filter messages in order, keeping the first of each distinct payload if requested
    pub fn apply(&self, headers: Vec<MessageHeader>) -> Vec<MessageHeader> {
        let mut seen: HashSet<Vec<u8>> = HashSet::new();
        let before = headers.len();

        let kept: Vec<MessageHeader> = headers
            .into_iter()
            .filter(|h| self.matches(h))
            .filter(|h| !self.distinct || seen.insert(h.payload.clone()))
            .collect();

        log::debug!("Filter kept {} of {} messages", kept.len(), before);
        kept
    }

    pub fn is_empty(&self) -> bool {
        self.include_pgns.is_empty() && self.exclude_pgns.is_empty() && self.addresses.is_empty() && !self.distinct
    }
}
