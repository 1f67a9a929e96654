//! Pattern and row data structures

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::effects::{Effect, EffectKind};

/// Effect columns of one row
pub type EffectList = SmallVec<[Effect; 4]>;

/// Tracker pattern for a single channel
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackerPattern {
    /// Row data, one entry per pattern row
    pub rows: Vec<TrackerRow>,
}

impl TrackerPattern {
    /// Get the row at a specific index
    pub fn row(&self, index: usize) -> Option<&TrackerRow> {
        self.rows.get(index)
    }

    /// Create an empty pattern
    pub fn empty(num_rows: usize) -> Self {
        Self {
            rows: vec![TrackerRow::default(); num_rows],
        }
    }
}

/// Single cell of the pattern grid
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TrackerRow {
    /// Pitch (0-179 = note, 180 = off, 181 = release, 182 = macro release)
    #[serde(default)]
    pub note: Option<u8>,
    /// Instrument index (0-based)
    #[serde(default)]
    pub instrument: Option<u16>,
    /// Volume in the song's native range
    #[serde(default)]
    pub volume: Option<u8>,
    /// Effect columns in column order
    #[serde(default)]
    pub effects: EffectList,
}

impl TrackerRow {
    pub const NOTE_MAX: u8 = 179;
    pub const NOTE_OFF: u8 = 180;
    pub const NOTE_RELEASE: u8 = 181;
    pub const NOTE_MACRO_RELEASE: u8 = 182;

    /// Row with a note
    pub fn with_note(note: u8) -> Self {
        Self {
            note: Some(note),
            ..Default::default()
        }
    }

    /// Row with a note-off
    pub fn off() -> Self {
        Self::with_note(Self::NOTE_OFF)
    }

    /// Builder: set instrument
    pub fn instrument(mut self, instrument: u16) -> Self {
        self.instrument = Some(instrument);
        self
    }

    /// Builder: set volume
    pub fn volume(mut self, volume: u8) -> Self {
        self.volume = Some(volume);
        self
    }

    /// Builder: append an effect
    pub fn effect(mut self, kind: EffectKind, value: u8) -> Self {
        self.effects.push(Effect::new(kind, value));
        self
    }

    /// Check if nothing at all is set
    pub fn is_empty(&self) -> bool {
        self.note.is_none()
            && self.instrument.is_none()
            && self.volume.is_none()
            && self.effects.is_empty()
    }

    /// Check if this has a playable pitch
    pub fn has_note(&self) -> bool {
        matches!(self.note, Some(n) if n <= Self::NOTE_MAX)
    }

    /// Playable pitch, if any
    pub fn pitch(&self) -> Option<u8> {
        self.note.filter(|&n| n <= Self::NOTE_MAX)
    }

    /// Check if this is a note-off or release (key off)
    pub fn is_note_off(&self) -> bool {
        matches!(self.note, Some(Self::NOTE_OFF | Self::NOTE_RELEASE))
    }

    /// Value of the last effect of the given kind
    pub fn find_effect(&self, kind: EffectKind) -> Option<u8> {
        self.effects
            .iter()
            .rev()
            .find(|e| e.kind == kind)
            .map(|e| e.value)
    }

    /// Check if there's an effect of the given kind
    pub fn has_effect(&self, kind: EffectKind) -> bool {
        self.effects.iter().any(|e| e.kind == kind)
    }
}
