//! Nether-Tracker: normalized tracker song model
//!
//! This crate provides the format-agnostic song representation that tracker
//! file parsers produce and the MML converter consumes. Parsers normalize
//! their native note numbering, volume columns and effect commands onto the
//! types here; nothing downstream needs to know which tracker a song came from.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐     ┌──────────────────┐
//! │  Furnace (.fur)  │     │  IT File (.it)   │
//! └────────┬─────────┘     └────────┬─────────┘
//!          │    (external parsers)  │
//!          ▼                        ▼
//!     ┌────────────────────────────────────────┐
//!     │          TrackerSong (normalized)      │
//!     │  - channels: orders + pattern maps     │
//!     │  - instruments: TrackerInstrument      │
//!     │  - tempo, speed / groove patterns      │
//!     └────────────────────────────────────────┘
//!                      │
//!                      ▼
//!                  nether-mml
//! ```

mod effects;
mod instrument;
mod pattern;


use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

pub use effects::{Effect, EffectKind};
pub use instrument::{NoteMapping, ResolvedNote, SampleRemap, SubInstrument, TrackerInstrument};
pub use pattern::{EffectList, TrackerPattern, TrackerRow};

/// Maximum number of channels the driver plays
pub const MAX_CHANNELS: usize = 8;

/// Channel letters, in output order
pub const CHANNEL_NAMES: [char; MAX_CHANNELS] = ['A', 'B', 'C', 'D', 'E', 'F', 'G', 'H'];

/// Pitch of C in driver octave 0
pub const PITCH_OCTAVE_ZERO: u8 = 60;

// =============================================================================
// Song
// =============================================================================

/// Normalized tracker song
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackerSong {
    /// Song name
    pub name: String,
    /// Initial tempo in ticks per second (IT tempo / 2.5, Furnace Hz)
    pub ticks_per_second: f64,
    /// Initial speed pattern (ticks per row, cycled row by row)
    pub speed_pattern: Vec<u8>,
    /// Groove patterns selectable with `SPEED_1`
    #[serde(default)]
    pub groove_patterns: Vec<Vec<u8>>,
    /// Initial arpeggio speed in ticks
    #[serde(default = "default_arpeggio_speed")]
    pub arpeggio_speed: u8,
    /// Maximum of the native volume range (127 for Furnace, 255 for IT after scaling)
    #[serde(default = "default_volume_max")]
    pub volume_max: u8,
    /// Rows per pattern
    pub pattern_length: u16,
    /// Channel data, at most [`MAX_CHANNELS`]
    pub channels: Vec<TrackerChannel>,
    /// Instrument definitions
    #[serde(default)]
    pub instruments: Vec<TrackerInstrument>,
}

fn default_arpeggio_speed() -> u8 {
    1
}

fn default_volume_max() -> u8 {
    127
}

impl TrackerSong {
    /// Create a song with default timing and no channels
    pub fn new(name: impl Into<String>, pattern_length: u16) -> Self {
        Self {
            name: name.into(),
            ticks_per_second: 60.0,
            speed_pattern: vec![6],
            groove_patterns: Vec::new(),
            arpeggio_speed: default_arpeggio_speed(),
            volume_max: default_volume_max(),
            pattern_length,
            channels: Vec::new(),
            instruments: Vec::new(),
        }
    }

    /// Number of order rows (the longest channel order list)
    pub fn order_count(&self) -> usize {
        self.channels
            .iter()
            .map(|c| c.orders.len())
            .max()
            .unwrap_or(0)
    }

    /// Row of a channel at an order row and pattern row, if present
    pub fn row_at(&self, channel: usize, order: usize, row: usize) -> Option<&TrackerRow> {
        let ch = self.channels.get(channel)?;
        let pattern_id = *ch.orders.get(order)?;
        ch.patterns.get(&pattern_id)?.row(row)
    }

    /// Instrument by index
    pub fn instrument(&self, index: u16) -> Option<&TrackerInstrument> {
        self.instruments.get(index as usize)
    }
}

/// Order list and patterns of one channel
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackerChannel {
    /// Order row → pattern id
    pub orders: Vec<u16>,
    /// Pattern id → pattern
    pub patterns: HashMap<u16, TrackerPattern>,
}

impl TrackerChannel {
    /// Channel that plays one pattern per order row
    pub fn from_patterns(patterns: Vec<TrackerPattern>) -> Self {
        let orders = (0..patterns.len() as u16).collect();
        let patterns = patterns
            .into_iter()
            .enumerate()
            .map(|(i, p)| (i as u16, p))
            .collect();
        Self { orders, patterns }
    }
}
