//! Instrument definitions and per-note name resolution

use serde::{Deserialize, Serialize};

/// Tracker instrument as seen by the sound driver
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackerInstrument {
    /// Instrument name (used as the driver instrument name)
    pub name: String,
    /// Semitone offset applied to every note
    #[serde(default)]
    pub transpose: i8,
    /// How notes map onto driver instruments
    #[serde(default)]
    pub mapping: NoteMapping,
}

/// Note → driver instrument mapping
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum NoteMapping {
    /// One driver instrument for every note
    #[default]
    Single,
    /// Per-note sample table: index = tracker note, entry = (pitch to play, sample).
    /// Each sample is a distinct driver instrument named `{name}_{sample}`.
    SampleRemap(Vec<SampleRemap>),
    /// Note ranges mapped to separately named driver instruments (drum kits)
    SubInstruments(Vec<SubInstrument>),
}

/// One entry of a per-note sample table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleRemap {
    /// Pitch the sample is played at
    pub pitch: u8,
    /// Sample number
    pub sample: u16,
}

/// A note range that plays a different driver instrument
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubInstrument {
    /// First tracker note of the range (inclusive)
    pub first_note: u8,
    /// Last tracker note of the range (inclusive)
    pub last_note: u8,
    /// Driver instrument name
    pub name: String,
    /// Semitone offset for this range
    #[serde(default)]
    pub transpose: i8,
}

/// Result of resolving a tracker note against an instrument
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedNote {
    /// Driver instrument name
    pub instrument: String,
    /// Pitch after remapping and transposition (may leave 0-179, caller clamps)
    pub pitch: i16,
}

impl TrackerInstrument {
    /// Instrument with a single driver instrument and no transposition
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            transpose: 0,
            mapping: NoteMapping::Single,
        }
    }

    /// Driver instrument name and pitch for a tracker note
    pub fn resolve(&self, note: u8) -> ResolvedNote {
        let base = note as i16 + self.transpose as i16;
        match &self.mapping {
            NoteMapping::Single => ResolvedNote {
                instrument: self.name.clone(),
                pitch: base,
            },
            NoteMapping::SampleRemap(table) => match table.get(note as usize) {
                Some(entry) => ResolvedNote {
                    instrument: format!("{}_{}", self.name, entry.sample),
                    pitch: entry.pitch as i16 + self.transpose as i16,
                },
                None => ResolvedNote {
                    instrument: self.name.clone(),
                    pitch: base,
                },
            },
            NoteMapping::SubInstruments(ranges) => ranges
                .iter()
                .find(|r| (r.first_note..=r.last_note).contains(&note))
                .map(|r| ResolvedNote {
                    instrument: r.name.clone(),
                    pitch: base + r.transpose as i16,
                })
                .unwrap_or_else(|| ResolvedNote {
                    instrument: self.name.clone(),
                    pitch: base,
                }),
        }
    }
}
