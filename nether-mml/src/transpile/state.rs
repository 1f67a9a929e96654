//! Sticky per-channel state

use crate::token::{InvertFlags, Token};

/// Default vibrato range in 1/16 semitone
pub const DEFAULT_VIBRATO_RANGE: u8 = 16;

/// Driver vibrato setting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VibratoSetting {
    Off,
    On { depth: u16, quarter_wavelength: u16 },
}

impl VibratoSetting {
    pub fn token(self) -> Token {
        match self {
            Self::Off => Token::VibratoOff,
            Self::On {
                depth,
                quarter_wavelength,
            } => Token::VibratoSet {
                depth,
                quarter_wavelength,
            },
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct VibratoState {
    pub speed: u8,
    pub depth: u8,
    pub range: u8,
    /// Set when an effect touched vibrato on the current row
    pub dirty: bool,
    /// What the driver is known to play; `None` after a loop point
    pub emitted: Option<VibratoSetting>,
}

impl Default for VibratoState {
    fn default() -> Self {
        Self {
            speed: 0,
            depth: 0,
            range: DEFAULT_VIBRATO_RANGE,
            dirty: false,
            emitted: Some(VibratoSetting::Off),
        }
    }
}

/// A slide command covering a run of rows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlideRun {
    /// Raw effect value that started the run
    pub value: u8,
    /// First row after the run
    pub end: usize,
}

/// Everything that carries over from one row to the next
#[derive(Debug, Clone)]
pub struct ChannelState {
    /// Current tracker instrument index
    pub instrument: Option<u16>,
    /// Last driver instrument emitted
    pub last_instrument: Option<String>,
    /// Current volume (driver range), unknown after a slide
    pub volume: Option<u8>,
    /// Last volume emitted
    pub last_volume: Option<u8>,
    /// Last pan emitted
    pub last_pan: Option<u8>,
    pub vibrato: VibratoState,
    /// Arpeggio offsets in semitones, `(0, 0)` when off
    pub arpeggio: (u8, u8),
    /// Arpeggio speed in tracker ticks
    pub arpeggio_speed: u8,
    /// Pitch slide in 1/32 semitone per tracker tick
    pub pitch_slide: i16,
    /// Portamento speed in 1/32 semitone per tracker tick, 0 when off
    pub portamento: u16,
    /// Pitch the portamento is heading for
    pub portamento_target: Option<f64>,
    /// Current pitch in driver semitones
    pub pitch: Option<f64>,
    pub noise: bool,
    pub noise_frequency: u8,
    pub legato: bool,
    pub echo: bool,
    pub pitch_mod: bool,
    pub invert: InvertFlags,
    /// A note is playing (no key-off since)
    pub sounding: bool,
    pub volume_slide: Option<SlideRun>,
    pub pan_slide: Option<SlideRun>,
}

impl ChannelState {
    pub fn new(arpeggio_speed: u8) -> Self {
        Self {
            instrument: None,
            last_instrument: None,
            volume: None,
            last_volume: None,
            last_pan: None,
            vibrato: VibratoState::default(),
            arpeggio: (0, 0),
            arpeggio_speed: arpeggio_speed.max(1),
            pitch_slide: 0,
            portamento: 0,
            portamento_target: None,
            pitch: None,
            noise: false,
            noise_frequency: 0,
            legato: false,
            echo: false,
            pitch_mod: false,
            invert: InvertFlags::default(),
            sounding: false,
            volume_slide: None,
            pan_slide: None,
        }
    }

    /// Forget what the driver plays so it is re-emitted after a loop point
    pub fn forget_emitted(&mut self) {
        self.last_instrument = None;
        self.last_volume = None;
        self.vibrato.emitted = None;
    }

    pub fn arpeggio_active(&self) -> bool {
        self.arpeggio != (0, 0)
    }
}
