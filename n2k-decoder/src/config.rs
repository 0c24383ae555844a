//! Decoder configuration types
//!
//! This module defines the minimal configuration needed by the decoder library.
//! Filtering, presets and reports belong to the application layer.

use serde::{Deserialize, Serialize};

/// Configuration for the decoder library
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecoderConfig {
    /// Render numeric values in presentation units (knots, degrees, dates, ...)
    #[serde(default = "default_true")]
    pub convert_units: bool,

    /// Evict a fast-packet conversation after this many further frames
    /// without progress (None = keep until flush)
    #[serde(default = "default_idle_frames")]
    pub fast_packet_idle_frames: Option<u64>,

    /// Emit events for PGNs missing from the dictionary
    #[serde(default = "default_true")]
    pub emit_unknown: bool,
}

fn default_true() -> bool {
    true
}

fn default_idle_frames() -> Option<u64> {
    Some(1024)
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            convert_units: true,
            fast_packet_idle_frames: default_idle_frames(),
            emit_unknown: true,
        }
    }
}

impl DecoderConfig {
    /// Create a new decoder configuration with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method: enable or disable unit conversion
    pub fn with_unit_conversion(mut self, enabled: bool) -> Self {
        self.convert_units = enabled;
        self
    }

    /// Builder method: set the fast-packet idle window, in frames
    pub fn with_fast_packet_idle_frames(mut self, frames: Option<u64>) -> Self {
        self.fast_packet_idle_frames = frames;
        self
    }

    /// Builder method: emit or suppress unknown PGN events
    pub fn with_unknown_pgns(mut self, enabled: bool) -> Self {
        self.emit_unknown = enabled;
        self
    }
}
