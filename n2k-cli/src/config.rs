//! Configuration loading and parsing

use anyhow::{Context, Result};
use n2k_decoder::DecoderConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Main application configuration (loaded from config.toml)
///
/// Every section is optional; command-line flags override what is set here.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub dictionary: DictionaryConfig,
    #[serde(default)]
    pub decoder: DecoderConfig,
    #[serde(default)]
    pub filter: FilterConfig,
    #[serde(default)]
    pub presets: Vec<Preset>,
}

/// Where to find the canboat document and its local overlay
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct DictionaryConfig {
    pub path: Option<PathBuf>,
    pub overlay: Option<PathBuf>,
}

/// Record filters, applied to reassembled messages
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct FilterConfig {
    #[serde(default)]
    pub include_pgns: Vec<u32>,
    #[serde(default)]
    pub exclude_pgns: Vec<u32>,
    /// Keep messages whose source or destination is one of these addresses
    #[serde(default)]
    pub addresses: Vec<u8>,
    /// Keep only the first message of every distinct payload
    #[serde(default)]
    pub distinct: bool,
}

/// Named set of PGNs to include
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Preset {
    pub name: String,
    pub include_pgns: Vec<u32>,
}

impl AppConfig {
    /// Find a preset by name, ignoring case
    pub fn preset(&self, name: &str) -> Option<&Preset> {
        self.presets.iter().find(|p| p.name.eq_ignore_ascii_case(name))
    }
}

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config: AppConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    log::debug!(
        "Config: {} presets, filter {:?}",
        config.presets.len(),
        config.filter
    );

    Ok(config)
}
