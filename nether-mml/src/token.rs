//! MML token stream
//!
//! The transpiler emits [`Token`]s and both compression passes rewrite them.
//! Tokens are typed values; the textual MML form only exists in their
//! [`Display`](fmt::Display) implementation.

use core::fmt;

use nether_tracker::PITCH_OCTAVE_ZERO;

/// Longest span a single driver instruction can cover, in ticks
pub const MAX_TICKS: u32 = 256;

/// Highest iteration count of a loop
pub const MAX_LOOP_COUNT: u32 = 255;

/// Number of octaves the driver can play
pub const DRIVER_OCTAVES: u8 = 8;

const NOTE_NAMES: [&str; 12] = [
    "c", "c+", "d", "d+", "e", "f", "f+", "g", "g+", "a", "a+", "b",
];

// =============================================================================
// Pitch
// =============================================================================

/// Driver pitch in semitones above C of octave 0
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Pitch(u8);

impl Pitch {
    pub const MIN: Self = Self(0);
    pub const MAX: Self = Self(DRIVER_OCTAVES * 12 - 1);

    /// Convert a tracker pitch, saturating to the driver range
    pub fn from_tracker(pitch: i16) -> Self {
        Self::from_semitones(pitch - PITCH_OCTAVE_ZERO as i16)
    }

    /// Pitch from semitones above C0, saturating to the driver range
    pub fn from_semitones(semitones: i16) -> Self {
        let clamped = semitones.clamp(Self::MIN.0 as i16, Self::MAX.0 as i16);
        if clamped != semitones {
            tracing::debug!("pitch {} outside driver range, saturated", semitones);
        }
        Self(clamped as u8)
    }

    /// Semitones above C0
    pub const fn semitones(self) -> u8 {
        self.0
    }

    /// Octave number (0-7)
    pub const fn octave(self) -> u8 {
        self.0 / 12
    }

    /// Note name within the octave
    pub fn name(self) -> &'static str {
        NOTE_NAMES[(self.0 % 12) as usize]
    }

    /// Transpose by semitones, saturating
    pub fn transpose(self, semitones: i16) -> Self {
        Self::from_semitones(self.0 as i16 + semitones)
    }
}

impl fmt::Display for Pitch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "o{}{}", self.octave(), self.name())
    }
}

// =============================================================================
// Token
// =============================================================================

/// Surround/phase invert flags
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct InvertFlags {
    pub left: bool,
    pub right: bool,
}

/// One MML instruction
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Token {
    /// Wait without key-off
    Wait(u32),
    /// Rest (key-off)
    Rest(u32),
    /// Plain note
    Note { pitch: Pitch, ticks: u32, tie: bool },
    /// Noise channel note at the given noise frequency
    NoiseNote { frequency: u8, ticks: u32, tie: bool },
    /// Two-note pitch slide
    SlideNote {
        from: Pitch,
        to: Pitch,
        ticks: u32,
        tie: bool,
    },
    /// Broken chord cycling three pitches every `speed` ticks
    ArpeggioNote {
        notes: [Pitch; 3],
        ticks: u32,
        speed: u32,
    },
    /// Switch instrument
    InstrumentChange(String),
    /// Instrument assumed active at subroutine entry (no state change)
    InstrumentHint(String),
    /// Set volume (0-255)
    VolumeChange(u8),
    /// Relative volume slide over `ticks`
    VolumeSlide { delta: i16, ticks: u32 },
    /// Vibrato: depth in cents, quarter wavelength in ticks
    VibratoSet { depth: u16, quarter_wavelength: u16 },
    VibratoOff,
    /// Set pan (0-128)
    PanSet(u8),
    /// Relative pan slide over `ticks`
    PanSlide { delta: i16, ticks: u32 },
    Echo(bool),
    PitchMod(bool),
    Invert(InvertFlags),
    LoopStart,
    /// Skip the rest of the body on the final iteration
    LoopBreak,
    /// End of loop with total iteration count
    LoopEnd(u32),
    /// Song loop point
    LoopPoint,
    SubroutineCall(String),
}

impl Token {
    /// Note-class tokens start subroutine candidates
    pub fn is_note(&self) -> bool {
        matches!(
            self,
            Self::Note { .. }
                | Self::NoiseNote { .. }
                | Self::SlideNote { .. }
                | Self::ArpeggioNote { .. }
        )
    }

    /// Tokens a folded loop body may not contain
    pub fn is_loop_boundary(&self) -> bool {
        matches!(
            self,
            Self::LoopStart | Self::LoopEnd(_) | Self::LoopBreak | Self::LoopPoint
        )
    }

    /// Driver ticks this token advances time by
    pub fn ticks(&self) -> u32 {
        match self {
            Self::Wait(t) | Self::Rest(t) => *t,
            Self::Note { ticks, .. }
            | Self::NoiseNote { ticks, .. }
            | Self::SlideNote { ticks, .. }
            | Self::ArpeggioNote { ticks, .. } => *ticks,
            _ => 0,
        }
    }

    /// Tie flag of a note-class token
    pub fn is_tied(&self) -> bool {
        matches!(
            self,
            Self::Note { tie: true, .. }
                | Self::NoiseNote { tie: true, .. }
                | Self::SlideNote { tie: true, .. }
        )
    }

    /// Set the tie flag; returns false for tokens that can't be tied
    pub fn set_tie(&mut self, value: bool) -> bool {
        match self {
            Self::Note { tie, .. } | Self::NoiseNote { tie, .. } | Self::SlideNote { tie, .. } => {
                *tie = value;
                true
            }
            _ => false,
        }
    }
}

fn tie_suffix(tie: bool) -> &'static str {
    if tie { "&" } else { "" }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Wait(t) => write!(f, "w%{}", t),
            Self::Rest(t) => write!(f, "r%{}", t),
            Self::Note { pitch, ticks, tie } => {
                write!(f, "{}%{}{}", pitch, ticks, tie_suffix(*tie))
            }
            Self::NoiseNote {
                frequency,
                ticks,
                tie,
            } => write!(f, "N{},%{}{}", frequency, ticks, tie_suffix(*tie)),
            Self::SlideNote {
                from,
                to,
                ticks,
                tie,
            } => write!(f, "{{{} {}}}%{}{}", from, to, ticks, tie_suffix(*tie)),
            Self::ArpeggioNote {
                notes,
                ticks,
                speed,
            } => write!(
                f,
                "{{{{{} {} {}}}}}%{},%{}",
                notes[0], notes[1], notes[2], ticks, speed
            ),
            Self::InstrumentChange(name) => write!(f, "@{}", name),
            Self::InstrumentHint(name) => write!(f, "?@{}", name),
            Self::VolumeChange(v) => write!(f, "V{}", v),
            Self::VolumeSlide { delta, ticks } => write!(f, "Vs{:+},{}", delta, ticks),
            Self::VibratoSet {
                depth,
                quarter_wavelength,
            } => write!(f, "MP{},{}", depth, quarter_wavelength),
            Self::VibratoOff => f.write_str("MP0"),
            Self::PanSet(p) => write!(f, "p{}", p),
            Self::PanSlide { delta, ticks } => write!(f, "ps{:+},{}", delta, ticks),
            Self::Echo(on) => f.write_str(if *on { "E1" } else { "E0" }),
            Self::PitchMod(on) => f.write_str(if *on { "PM" } else { "PM0" }),
            Self::Invert(flags) => f.write_str(match (flags.left, flags.right) {
                (false, false) => "i0",
                (true, false) => "iL",
                (false, true) => "iR",
                (true, true) => "iLR",
            }),
            Self::LoopStart => f.write_str("["),
            Self::LoopBreak => f.write_str(":"),
            Self::LoopEnd(count) => write!(f, "]{}", count),
            Self::LoopPoint => f.write_str("L"),
            Self::SubroutineCall(name) => write!(f, "!{}", name),
        }
    }
}

/// Render tokens as one space-separated line
pub fn render_tokens(tokens: &[Token]) -> String {
    let mut out = String::new();
    for (i, token) in tokens.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        out.push_str(&token.to_string());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pitch(name: &str) -> Pitch {
        let octave: i16 = name[1..].parse().unwrap();
        let semitone = match &name[..1] {
            "C" => 0,
            "D" => 2,
            "E" => 4,
            "F" => 5,
            "G" => 7,
            "A" => 9,
            _ => 11,
        };
        Pitch::from_semitones(octave * 12 + semitone)
    }

    #[test]
    fn test_pitch_from_tracker() {
        assert_eq!(Pitch::from_tracker(60).to_string(), "o0c");
        assert_eq!(Pitch::from_tracker(60 + 4 * 12 + 1).to_string(), "o4c+");
        assert_eq!(Pitch::from_tracker(0), Pitch::MIN);
        assert_eq!(Pitch::from_tracker(179), Pitch::MAX);
        assert_eq!(Pitch::MAX.to_string(), "o7b");
    }

    #[test]
    fn test_note_rendering() {
        let c4 = pitch("C4");
        let note = Token::Note {
            pitch: c4,
            ticks: 24,
            tie: false,
        };
        assert_eq!(note.to_string(), "o4c%24");

        let tied = Token::Note {
            pitch: c4,
            ticks: 12,
            tie: true,
        };
        assert_eq!(tied.to_string(), "o4c%12&");

        let slide = Token::SlideNote {
            from: c4,
            to: pitch("E4"),
            ticks: 8,
            tie: false,
        };
        assert_eq!(slide.to_string(), "{o4c o4e}%8");

        let arp = Token::ArpeggioNote {
            notes: [c4, pitch("E4"), pitch("G4")],
            ticks: 24,
            speed: 2,
        };
        assert_eq!(arp.to_string(), "{{o4c o4e o4g}}%24,%2");

        let noise = Token::NoiseNote {
            frequency: 12,
            ticks: 6,
            tie: false,
        };
        assert_eq!(noise.to_string(), "N12,%6");
    }

    #[test]
    fn test_command_rendering() {
        assert_eq!(Token::Wait(10).to_string(), "w%10");
        assert_eq!(Token::Rest(4).to_string(), "r%4");
        assert_eq!(Token::InstrumentChange("bass".into()).to_string(), "@bass");
        assert_eq!(Token::InstrumentHint("bass".into()).to_string(), "?@bass");
        assert_eq!(Token::VolumeChange(200).to_string(), "V200");
        assert_eq!(
            Token::VolumeSlide {
                delta: -40,
                ticks: 16
            }
            .to_string(),
            "Vs-40,16"
        );
        assert_eq!(
            Token::PanSlide {
                delta: 12,
                ticks: 8
            }
            .to_string(),
            "ps+12,8"
        );
        assert_eq!(
            Token::VibratoSet {
                depth: 50,
                quarter_wavelength: 4
            }
            .to_string(),
            "MP50,4"
        );
        assert_eq!(Token::VibratoOff.to_string(), "MP0");
        assert_eq!(Token::PanSet(64).to_string(), "p64");
        assert_eq!(Token::Echo(true).to_string(), "E1");
        assert_eq!(Token::PitchMod(false).to_string(), "PM0");
        assert_eq!(
            Token::Invert(InvertFlags {
                left: true,
                right: true
            })
            .to_string(),
            "iLR"
        );
        assert_eq!(Token::LoopEnd(3).to_string(), "]3");
        assert_eq!(Token::SubroutineCall("sub0".into()).to_string(), "!sub0");
    }

    #[test]
    fn test_render_tokens() {
        let line = render_tokens(&[
            Token::LoopStart,
            Token::Wait(4),
            Token::LoopBreak,
            Token::Rest(2),
            Token::LoopEnd(2),
            Token::LoopPoint,
        ]);
        assert_eq!(line, "[ w%4 : r%2 ]2 L");
    }

    #[test]
    fn test_tie_helpers() {
        let mut note = Token::Note {
            pitch: pitch("A3"),
            ticks: 4,
            tie: false,
        };
        assert!(!note.is_tied());
        assert!(note.set_tie(true));
        assert!(note.is_tied());

        let mut arp = Token::ArpeggioNote {
            notes: [Pitch::MIN; 3],
            ticks: 4,
            speed: 1,
        };
        assert!(!arp.set_tie(true));
        assert!(arp.is_note());
        assert!(!Token::Rest(1).is_note());
    }
}
