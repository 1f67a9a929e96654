//! Conversion options
//!
//! Options are plain serde structs so a host tool can keep them in a TOML
//! file next to the songs. Every field has a default, so an empty document
//! is a valid configuration.

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// All conversion options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ConversionOptions {
    /// Tempo resolution settings
    #[serde(default)]
    pub timing: TimingConfig,
    /// Compression settings
    #[serde(default)]
    pub compression: CompressionConfig,
}

impl ConversionOptions {
    /// Parse options from a TOML document
    pub fn from_toml_str(source: &str) -> Result<Self> {
        Ok(toml::from_str(source)?)
    }
}

/// How tracker tempo is mapped onto the driver timer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TimingMode {
    /// Smallest error for the row duration
    LowError,
    /// Largest tick multiplier whose error stays under the tolerance
    #[default]
    LowestError,
}

/// Explicit timer choice for one tempo/speed pair
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimingOverride {
    pub ticks_per_second: f64,
    pub speed: u8,
    /// Timer register value (64-256, in 0.125 ms units)
    pub timer: u16,
    /// Driver ticks per row
    pub ticks: u16,
}

/// Tempo resolution settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimingConfig {
    /// Search policy (default: lowest_error)
    #[serde(default)]
    pub mode: TimingMode,
    /// Accepted row duration error in milliseconds (default: 2.0)
    #[serde(default = "default_tolerance_ms")]
    pub tolerance_ms: f64,
    /// Tolerance used for grooves when nothing fits the first one (default: 5.0)
    #[serde(default = "default_fallback_tolerance_ms")]
    pub fallback_tolerance_ms: f64,
    /// Fixed timer choices that bypass the search
    #[serde(default)]
    pub overrides: Vec<TimingOverride>,
}

/// How hard the compressor searches for loops
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CompressionLevel {
    Coarse,
    #[default]
    Fine,
}

impl CompressionLevel {
    /// Number of loop folding passes
    pub const fn loop_passes(self) -> usize {
        match self {
            Self::Coarse => 2,
            Self::Fine => 4,
        }
    }
}

/// Compression settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompressionConfig {
    /// Fold repeated runs into loops (default: true)
    #[serde(default = "default_true")]
    pub loops: bool,
    /// Extract repeated runs into subroutines (default: true)
    #[serde(default = "default_true")]
    pub subroutines: bool,
    /// Loop search effort (default: fine)
    #[serde(default)]
    pub level: CompressionLevel,
    /// Longest loop body in tokens (default: 35)
    #[serde(default = "default_max_loop_body")]
    pub max_loop_body: usize,
    /// Shortest subroutine body in tokens (default: 4)
    #[serde(default = "default_min_subroutine_length")]
    pub min_subroutine_length: usize,
    /// Longest subroutine body in tokens (default: 30)
    #[serde(default = "default_max_subroutine_length")]
    pub max_subroutine_length: usize,
}

fn default_true() -> bool {
    true
}
fn default_tolerance_ms() -> f64 {
    2.0
}
fn default_fallback_tolerance_ms() -> f64 {
    5.0
}
fn default_max_loop_body() -> usize {
    35
}
fn default_min_subroutine_length() -> usize {
    4
}
fn default_max_subroutine_length() -> usize {
    30
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            mode: TimingMode::default(),
            tolerance_ms: default_tolerance_ms(),
            fallback_tolerance_ms: default_fallback_tolerance_ms(),
            overrides: Vec::new(),
        }
    }
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            loops: default_true(),
            subroutines: default_true(),
            level: CompressionLevel::default(),
            max_loop_body: default_max_loop_body(),
            min_subroutine_length: default_min_subroutine_length(),
            max_subroutine_length: default_max_subroutine_length(),
        }
    }
}
