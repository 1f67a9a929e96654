//! Tracker effect vocabulary
//!
//! Effects are stored as `(kind, value)` pairs. The kind is an open tag set:
//! format parsers normalize their native commands onto the codes below, and
//! anything a consumer does not recognize is simply skipped. Codes below
//! 0x100 follow the Furnace numbering; codes from 0x100 upwards are
//! synthetic kinds that only exist after normalization.

use serde::{Deserialize, Serialize};

/// Effect kind (open set of numeric codes)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EffectKind(pub u16);

impl EffectKind {
    // =========================================================================
    // Pitch
    // =========================================================================
    /// Arpeggio: `xy` = two semitone offsets, `00` stops
    pub const ARPEGGIO: Self = Self(0x00);
    /// Pitch slide up, 1/32 semitone per tick (`00` stops)
    pub const PITCH_UP: Self = Self(0x01);
    /// Pitch slide down, 1/32 semitone per tick (`00` stops)
    pub const PITCH_DOWN: Self = Self(0x02);
    /// Tone portamento toward the row's note, 1/32 semitone per tick
    pub const PORTAMENTO: Self = Self(0x03);
    /// Vibrato: `x` = speed, `y` = depth
    pub const VIBRATO: Self = Self(0x04);
    /// Tremolo (not representable, ignored by the transpiler)
    pub const TREMOLO: Self = Self(0x07);

    // =========================================================================
    // Speed and flow
    // =========================================================================
    /// Speed 1 (ticks per row), or groove index when grooves are defined
    pub const SPEED_1: Self = Self(0x09);
    /// Volume slide: `x` = up, `y` = down, per tick
    pub const VOLUME_SLIDE: Self = Self(0x0A);
    /// Jump to order row
    pub const JUMP_TO_ORDER: Self = Self(0x0B);
    /// Jump to the next pattern, starting at row `xx`
    pub const JUMP_TO_NEXT_PATTERN: Self = Self(0x0D);
    /// Speed 2 (second entry of the alternating speed pattern)
    pub const SPEED_2: Self = Self(0x0F);

    // =========================================================================
    // Driver features
    // =========================================================================
    /// Noise mode on/off
    pub const NOISE_MODE: Self = Self(0x11);
    /// Echo on/off
    pub const ECHO: Self = Self(0x12);
    /// Pitch modulation on/off
    pub const PITCH_MOD: Self = Self(0x13);
    /// Phase invert: `x` = left, `y` = right
    pub const INVERT: Self = Self(0x14);
    /// Noise frequency (0-31)
    pub const NOISE_FREQUENCY: Self = Self(0x1D);

    // =========================================================================
    // Panning
    // =========================================================================
    /// Linear panning: `00` left, `80` center, `FF` right
    pub const PAN: Self = Self(0x80);
    /// Panning slide: `x` = right, `y` = left, per tick
    pub const PAN_SLIDE: Self = Self(0x83);
    /// Panbrello (not representable, ignored by the transpiler)
    pub const PANBRELLO: Self = Self(0x84);

    // =========================================================================
    // Extended
    // =========================================================================
    /// Arpeggio speed in ticks
    pub const ARPEGGIO_SPEED: Self = Self(0xE0);
    /// Note slide up: `x` = speed, `y` = semitones
    pub const NOTE_SLIDE_UP: Self = Self(0xE1);
    /// Note slide down: `x` = speed, `y` = semitones
    pub const NOTE_SLIDE_DOWN: Self = Self(0xE2);
    /// Vibrato range in 1/16 semitone
    pub const VIBRATO_RANGE: Self = Self(0xE4);
    /// Legato on/off
    pub const LEGATO: Self = Self(0xEA);
    /// Note cut after `xx` ticks
    pub const NOTE_CUT: Self = Self(0xEC);
    /// Note delay by `xx` ticks
    pub const NOTE_DELAY: Self = Self(0xED);
    /// Set tempo in BPM (ticks per second = BPM / 2.5)
    pub const SET_BPM: Self = Self(0xF0);
    /// Single tick pitch up
    pub const SINGLE_TICK_PITCH_UP: Self = Self(0xF1);
    /// Single tick pitch down
    pub const SINGLE_TICK_PITCH_DOWN: Self = Self(0xF2);
    /// Fine volume slide up (first tick only)
    pub const FINE_VOLUME_UP: Self = Self(0xF8);
    /// Fine volume slide down (first tick only)
    pub const FINE_VOLUME_DOWN: Self = Self(0xF9);
    /// Stop song (disables looping)
    pub const STOP_SONG: Self = Self(0xFF);

    // =========================================================================
    // Synthetic
    // =========================================================================
    /// Vibrato depth only, speed unchanged (IT volume column)
    pub const VIBRATO_DEPTH: Self = Self(0x100);
    /// Loop point marker, injected by linearization
    pub const LOOP_MARKER: Self = Self(0x101);

    /// Raw numeric code
    pub const fn code(self) -> u16 {
        self.0
    }

    /// Scan order within a row. Setters that other effects read
    /// (ranges, speeds, noise frequency) come first.
    pub const fn priority(self) -> u8 {
        match self {
            Self::LOOP_MARKER => 0,
            Self::VIBRATO_RANGE | Self::ARPEGGIO_SPEED | Self::NOISE_FREQUENCY => 1,
            Self::NOTE_CUT | Self::NOTE_DELAY => 3,
            _ => 2,
        }
    }

    /// Check if this effect controls pattern flow
    pub const fn affects_pattern_flow(self) -> bool {
        matches!(
            self,
            Self::JUMP_TO_ORDER | Self::JUMP_TO_NEXT_PATTERN | Self::STOP_SONG
        )
    }

    /// Check if this effect changes song speed or tempo
    pub const fn affects_speed(self) -> bool {
        matches!(self, Self::SPEED_1 | Self::SPEED_2 | Self::SET_BPM)
    }
}

/// A single effect column entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Effect {
    pub kind: EffectKind,
    pub value: u8,
}

impl Effect {
    pub const fn new(kind: EffectKind, value: u8) -> Self {
        Self { kind, value }
    }

    /// High nibble of the value
    pub const fn x(self) -> u8 {
        self.value >> 4
    }

    /// Low nibble of the value
    pub const fn y(self) -> u8 {
        self.value & 0x0F
    }
}
