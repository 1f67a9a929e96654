//! Transpiler tests

use nether_tracker::{EffectKind, TrackerInstrument, TrackerRow};

use super::slides::{split_slide, spread_slides};
use super::{SongInfo, SpeedTable, transpile_channel};
use crate::linearize::SpeedAtRow;
use crate::token::{Pitch, Token};

const C4: u8 = 108;
const D4: u8 = 110;
const E4: u8 = 112;
const F4: u8 = 113;

fn speeds(rows: usize, ticks_per_row: u8, driver_ticks: u32) -> Vec<SpeedAtRow> {
    vec![
        SpeedAtRow {
            ticks_per_second: 60.0,
            ticks_per_row,
            timer: 80,
            driver_ticks,
        };
        rows
    ]
}

fn pitch(note: u8) -> Pitch {
    Pitch::from_tracker(note as i16)
}

fn note(n: u8, ticks: u32, tie: bool) -> Token {
    Token::Note {
        pitch: pitch(n),
        ticks,
        tie,
    }
}

struct Fixture {
    speeds: Vec<SpeedAtRow>,
    instruments: Vec<TrackerInstrument>,
    loop_point: Option<usize>,
    arpeggio_speed: u8,
}

impl Fixture {
    fn new(rows: usize, ticks_per_row: u8, driver_ticks: u32) -> Self {
        Self {
            speeds: speeds(rows, ticks_per_row, driver_ticks),
            instruments: Vec::new(),
            loop_point: None,
            arpeggio_speed: 1,
        }
    }

    fn run(&self, rows: &[TrackerRow]) -> Vec<Token> {
        let info = SongInfo {
            speeds: &self.speeds,
            loop_point: self.loop_point,
            instruments: &self.instruments,
            arpeggio_speed: self.arpeggio_speed,
            volume_max: 127,
        };
        transpile_channel(rows, &info)
    }
}

fn rows(len: usize, events: Vec<(usize, TrackerRow)>) -> Vec<TrackerRow> {
    let mut out = vec![TrackerRow::default(); len];
    for (i, row) in events {
        out[i] = row;
    }
    out
}

#[test]
fn test_note_then_note_off() {
    let input = rows(8, vec![(0, TrackerRow::with_note(C4)), (4, TrackerRow::off())]);
    let tokens = Fixture::new(8, 1, 1).run(&input);
    assert_eq!(tokens, vec![note(C4, 4, false), Token::Rest(4)]);
}

#[test]
fn test_sustain_across_effect_row_is_tied_wait() {
    let input = rows(
        4,
        vec![
            (0, TrackerRow::with_note(C4)),
            (2, TrackerRow::default().effect(EffectKind::TREMOLO, 0x11)),
        ],
    );
    let tokens = Fixture::new(4, 1, 1).run(&input);
    assert_eq!(tokens, vec![note(C4, 2, true), Token::Wait(2)]);
}

#[test]
fn test_silent_start_is_rest() {
    let input = rows(3, vec![(1, TrackerRow::with_note(C4))]);
    let tokens = Fixture::new(3, 1, 1).run(&input);
    assert_eq!(tokens, vec![Token::Rest(1), note(C4, 2, false)]);
}

#[test]
fn test_rest_is_extended() {
    let input = rows(
        3,
        vec![
            (0, TrackerRow::with_note(C4)),
            (1, TrackerRow::off()),
            (2, TrackerRow::default().effect(EffectKind::TREMOLO, 0x11)),
        ],
    );
    let tokens = Fixture::new(3, 1, 1).run(&input);
    assert_eq!(tokens, vec![note(C4, 1, false), Token::Rest(2)]);
}

#[test]
fn test_instrument_switching() {
    let mut fixture = Fixture::new(4, 1, 1);
    fixture.instruments = vec![TrackerInstrument::new("lead"), TrackerInstrument::new("bass")];
    let input = vec![
        TrackerRow::with_note(C4).instrument(0),
        TrackerRow::with_note(D4).instrument(0),
        TrackerRow::with_note(E4).instrument(1),
        // Unknown instrument keeps the previous one
        TrackerRow::with_note(F4).instrument(9),
    ];
    let tokens = fixture.run(&input);
    assert_eq!(
        tokens,
        vec![
            Token::InstrumentChange("lead".into()),
            note(C4, 1, false),
            note(D4, 1, false),
            Token::InstrumentChange("bass".into()),
            note(E4, 1, false),
            note(F4, 1, false),
        ]
    );
}

#[test]
fn test_volume_scaling_and_suppression() {
    let input = vec![
        TrackerRow::with_note(C4).volume(127),
        TrackerRow::with_note(D4).volume(127),
        TrackerRow::with_note(E4).volume(0),
    ];
    let tokens = Fixture::new(3, 1, 1).run(&input);
    assert_eq!(
        tokens,
        vec![
            Token::VolumeChange(255),
            note(C4, 1, false),
            note(D4, 1, false),
            Token::VolumeChange(0),
            note(E4, 1, false),
        ]
    );
}

#[test]
fn test_vibrato_conversion() {
    let input = vec![
        TrackerRow::with_note(C4).effect(EffectKind::VIBRATO, 0x4F),
        TrackerRow::with_note(D4).effect(EffectKind::VIBRATO, 0x4F),
        TrackerRow::with_note(E4).effect(EffectKind::VIBRATO, 0x00),
    ];
    let tokens = Fixture::new(3, 6, 6).run(&input);
    // Full depth at the default range is one semitone; a quarter wave of
    // 4 tracker ticks at 60 Hz is 66.7 ms, about 7 ticks of a 10 ms timer
    assert_eq!(
        tokens,
        vec![
            Token::VibratoSet {
                depth: 100,
                quarter_wavelength: 7
            },
            note(C4, 6, false),
            note(D4, 6, false),
            Token::VibratoOff,
            note(E4, 6, false),
        ]
    );
}

#[test]
fn test_arpeggio_note() {
    let input = vec![TrackerRow::with_note(C4).effect(EffectKind::ARPEGGIO, 0x37)];
    let tokens = Fixture::new(1, 6, 12).run(&input);
    assert_eq!(
        tokens,
        vec![Token::ArpeggioNote {
            notes: [pitch(C4), pitch(C4 + 3), pitch(C4 + 7)],
            ticks: 12,
            speed: 2,
        }]
    );
}

#[test]
fn test_noise_note() {
    let input = vec![
        TrackerRow::with_note(C4)
            .effect(EffectKind::NOISE_MODE, 1)
            .effect(EffectKind::NOISE_FREQUENCY, 12),
    ];
    let tokens = Fixture::new(1, 1, 4).run(&input);
    assert_eq!(
        tokens,
        vec![Token::NoiseNote {
            frequency: 12,
            ticks: 4,
            tie: false
        }]
    );
}

#[test]
fn test_long_note_is_split() {
    let input = vec![TrackerRow::with_note(C4)];
    let tokens = Fixture::new(1, 6, 300).run(&input);
    assert_eq!(tokens, vec![note(C4, 256, true), Token::Wait(44)]);
}

#[test]
fn test_long_rest_is_split() {
    let input = vec![TrackerRow::default(); 2];
    let tokens = Fixture::new(2, 6, 200).run(&input);
    assert_eq!(tokens, vec![Token::Rest(256), Token::Rest(144)]);
}

#[test]
fn test_loop_marker_re_emits_instrument() {
    let mut fixture = Fixture::new(4, 1, 1);
    fixture.instruments = vec![TrackerInstrument::new("lead")];
    fixture.loop_point = Some(2);
    let input = rows(
        4,
        vec![
            (0, TrackerRow::with_note(C4).instrument(0)),
            (
                2,
                TrackerRow::with_note(D4).effect(EffectKind::LOOP_MARKER, 0),
            ),
        ],
    );
    let tokens = fixture.run(&input);
    assert_eq!(
        tokens,
        vec![
            Token::InstrumentChange("lead".into()),
            note(C4, 2, false),
            Token::LoopPoint,
            Token::VibratoOff,
            Token::InstrumentChange("lead".into()),
            note(D4, 2, false),
        ]
    );
}

#[test]
fn test_portamento_reaches_target() {
    let input = rows(
        5,
        vec![
            (0, TrackerRow::with_note(C4)),
            (
                1,
                TrackerRow::with_note(E4).effect(EffectKind::PORTAMENTO, 0x40),
            ),
        ],
    );
    let tokens = Fixture::new(5, 6, 6).run(&input);
    assert_eq!(
        tokens,
        vec![
            note(C4, 6, true),
            Token::SlideNote {
                from: pitch(C4),
                to: pitch(E4),
                ticks: 2,
                tie: true
            },
            Token::Wait(22),
        ]
    );
}

#[test]
fn test_portamento_partial() {
    let input = vec![
        TrackerRow::with_note(C4),
        TrackerRow::with_note(E4).effect(EffectKind::PORTAMENTO, 0x08),
    ];
    let tokens = Fixture::new(2, 6, 6).run(&input);
    // 8/32 semitone per tick over 6 ticks reaches 1.5 semitones
    assert_eq!(
        tokens[1],
        Token::SlideNote {
            from: pitch(C4),
            to: pitch(C4 + 2),
            ticks: 6,
            tie: false
        }
    );
}

#[test]
fn test_pitch_slide() {
    let input = vec![
        TrackerRow::with_note(C4).effect(EffectKind::PITCH_UP, 0x20),
        TrackerRow::default(),
    ];
    let tokens = Fixture::new(2, 6, 6).run(&input);
    assert_eq!(
        tokens,
        vec![Token::SlideNote {
            from: pitch(C4),
            to: pitch(C4 + 12),
            ticks: 12,
            tie: false
        }]
    );
}

#[test]
fn test_note_cut() {
    let input = vec![TrackerRow::with_note(C4).effect(EffectKind::NOTE_CUT, 2)];
    let tokens = Fixture::new(1, 6, 6).run(&input);
    assert_eq!(tokens, vec![note(C4, 2, false), Token::Rest(4)]);
}

#[test]
fn test_note_delay() {
    let input = vec![
        TrackerRow::default(),
        TrackerRow::with_note(C4).effect(EffectKind::NOTE_DELAY, 2),
    ];
    let tokens = Fixture::new(2, 6, 6).run(&input);
    assert_eq!(tokens, vec![Token::Rest(8), note(C4, 4, false)]);
}

#[test]
fn test_volume_slide_run() {
    let input = rows(
        4,
        vec![
            (
                0,
                TrackerRow::with_note(C4).effect(EffectKind::VOLUME_SLIDE, 0x04),
            ),
            (1, TrackerRow::default().effect(EffectKind::VOLUME_SLIDE, 0x04)),
            (2, TrackerRow::default().effect(EffectKind::VOLUME_SLIDE, 0x04)),
            (3, TrackerRow::default().volume(64)),
        ],
    );
    let tokens = Fixture::new(4, 6, 6).run(&input);
    assert_eq!(
        tokens,
        vec![
            Token::VolumeSlide {
                delta: -36,
                ticks: 18
            },
            note(C4, 6, true),
            Token::Wait(6),
            Token::Wait(6),
            Token::VolumeChange(129),
            Token::Wait(6),
        ]
    );
}

#[test]
fn test_pan_and_echo_emitted_on_change() {
    let input = vec![
        TrackerRow::with_note(C4)
            .effect(EffectKind::PAN, 0xFF)
            .effect(EffectKind::ECHO, 1),
        TrackerRow::default()
            .effect(EffectKind::PAN, 0x80)
            .effect(EffectKind::ECHO, 1),
        TrackerRow::default().effect(EffectKind::ECHO, 0),
    ];
    let tokens = Fixture::new(3, 1, 1).run(&input);
    assert_eq!(
        tokens,
        vec![
            Token::PanSet(128),
            Token::Echo(true),
            note(C4, 1, true),
            Token::PanSet(64),
            Token::Wait(1),
            Token::Echo(false),
            Token::Wait(1),
        ]
    );
}

#[test]
fn test_legato_ties_previous_note() {
    let input = vec![
        TrackerRow::with_note(C4).effect(EffectKind::LEGATO, 1),
        TrackerRow::with_note(E4),
    ];
    let tokens = Fixture::new(2, 1, 1).run(&input);
    assert_eq!(tokens, vec![note(C4, 1, true), note(E4, 1, false)]);
}

#[test]
fn test_unrecognized_effect_is_ignored() {
    let input = vec![TrackerRow::with_note(C4).effect(EffectKind(0x3F), 0x12)];
    let tokens = Fixture::new(1, 1, 1).run(&input);
    assert_eq!(tokens, vec![note(C4, 1, false)]);
}

#[test]
fn test_long_wait_is_split() {
    let input = vec![
        TrackerRow::with_note(C4),
        TrackerRow::default().effect(EffectKind::ECHO, 1),
    ];
    let tokens = Fixture::new(2, 6, 300).run(&input);
    assert_eq!(
        tokens,
        vec![
            note(C4, 256, true),
            Token::Wait(44),
            Token::Echo(true),
            Token::Wait(256),
            Token::Wait(44),
        ]
    );
    assert_eq!(tokens.iter().map(Token::ticks).sum::<u32>(), 600);
}

fn slide_totals(tokens: &[Token]) -> (i32, u32) {
    tokens.iter().fold((0, 0), |(delta, ticks), t| match *t {
        Token::VolumeSlide { delta: d, ticks: n } | Token::PanSlide { delta: d, ticks: n } => {
            assert!(n <= 256, "slide command over {n} ticks");
            (delta + d as i32, ticks + n)
        }
        _ => (delta, ticks),
    })
}

#[test]
fn test_long_volume_slide_is_chained() {
    let mut input = vec![TrackerRow::default().effect(EffectKind::VOLUME_SLIDE, 0x02); 4];
    input[0] = TrackerRow::with_note(C4).effect(EffectKind::VOLUME_SLIDE, 0x02);
    let tokens = Fixture::new(4, 6, 100).run(&input);

    assert_eq!(slide_totals(&tokens), (-24, 400));
    assert_eq!(
        tokens,
        vec![
            Token::VolumeSlide {
                delta: -15,
                ticks: 256
            },
            note(C4, 100, true),
            Token::Wait(100),
            Token::Wait(56),
            Token::VolumeSlide {
                delta: -9,
                ticks: 144
            },
            Token::Wait(44),
            Token::Wait(100),
        ]
    );
}

#[test]
fn test_long_pan_slide_is_chained() {
    let mut input = vec![TrackerRow::default().effect(EffectKind::PAN_SLIDE, 0x20); 4];
    input[0] = TrackerRow::with_note(C4).effect(EffectKind::PAN_SLIDE, 0x20);
    let tokens = Fixture::new(4, 6, 100).run(&input);

    assert_eq!(slide_totals(&tokens), (24, 400));
    assert_eq!(tokens[0], Token::PanSlide { delta: 15, ticks: 256 });
    assert_eq!(tokens[4], Token::PanSlide { delta: 9, ticks: 144 });
    assert_eq!(tokens.iter().map(Token::ticks).sum::<u32>(), 400);
}

#[test]
fn test_split_slide_keeps_total() {
    assert_eq!(split_slide(-24, 400), vec![(-15, 256), (-9, 144)]);
    assert_eq!(split_slide(7, 256), vec![(7, 256)]);
    assert_eq!(
        split_slide(100, 1000),
        vec![(25, 256), (25, 256), (25, 256), (25, 232)]
    );
    assert_eq!(split_slide(-1, 600), vec![(0, 256), (0, 256), (-1, 88)]);
}

#[test]
fn test_slide_chunk_splits_pitch_slide() {
    let tokens = vec![
        Token::VolumeSlide {
            delta: -30,
            ticks: 300,
        },
        Token::SlideNote {
            from: pitch(C4),
            to: pitch(E4),
            ticks: 300,
            tie: false,
        },
    ];
    assert_eq!(
        spread_slides(tokens),
        vec![
            Token::VolumeSlide {
                delta: -25,
                ticks: 256
            },
            Token::SlideNote {
                from: pitch(C4),
                to: pitch(C4).transpose(3),
                ticks: 256,
                tie: true
            },
            Token::VolumeSlide {
                delta: -5,
                ticks: 44
            },
            Token::SlideNote {
                from: pitch(C4).transpose(3),
                to: pitch(E4),
                ticks: 44,
                tie: false
            },
        ]
    );
}

#[test]
fn test_new_volume_drops_remaining_chunks() {
    let tokens = vec![
        Token::VolumeSlide {
            delta: 60,
            ticks: 600,
        },
        note(C4, 200, true),
        Token::VolumeChange(10),
        Token::Wait(256),
        Token::Wait(144),
    ];
    let spread = spread_slides(tokens);
    assert_eq!(spread[0], Token::VolumeSlide { delta: 25, ticks: 256 });
    assert_eq!(
        spread.iter().filter(|t| matches!(t, Token::VolumeSlide { .. })).count(),
        1
    );
}

#[test]
fn test_portamento_zero_does_not_tie() {
    let input = vec![
        TrackerRow::with_note(C4),
        TrackerRow::with_note(D4).effect(EffectKind::PORTAMENTO, 0),
    ];
    let tokens = Fixture::new(2, 1, 1).run(&input);
    assert_eq!(tokens, vec![note(C4, 1, false), note(D4, 1, false)]);
}

#[test]
fn test_loop_point_at_start_emits_nothing_extra() {
    let mut fixture = Fixture::new(2, 1, 1);
    fixture.loop_point = Some(0);
    let input = vec![
        TrackerRow::with_note(C4).effect(EffectKind::LOOP_MARKER, 0),
        TrackerRow::off(),
    ];
    let tokens = fixture.run(&input);
    assert_eq!(tokens, vec![Token::LoopPoint, note(C4, 1, false), Token::Rest(1)]);
}

#[test]
fn test_speed_table_sums_saturate() {
    let speeds = speeds(3, 255, u32::MAX);
    let table = SpeedTable::new(&speeds);
    assert_eq!(table.driver_ticks(0, 3), u32::MAX);
    assert_eq!(table.tracker_ticks(0, 3), 765);
}
