//! Tracker rows → MML tokens
//!
//! Each channel is converted independently. The transpiler walks event rows
//! (row 0 and every non-empty row), keeps the tracker's sticky effect state
//! in a [`state::ChannelState`] and emits tokens whose durations are the
//! driver ticks spanned until the next event row.
//!
//! Per event row the order is:
//! 1. effects, scanned by [`EffectKind::priority`]
//! 2. the volume column
//! 3. vibrato, when it changed or must be re-emitted
//! 4. one note decision (portamento, pitch slide, rest, note or wait)

mod cursor;
mod slides;
mod state;

#[cfg(test)]
mod tests;

pub use cursor::{RowCursor, SpeedTable};

use nether_tracker::{Effect, EffectKind, TrackerInstrument, TrackerRow};
use smallvec::SmallVec;

use crate::linearize::SpeedAtRow;
use crate::token::{InvertFlags, MAX_TICKS, Pitch, Token};
use slides::spread_slides;
use state::{ChannelState, SlideRun, VibratoSetting};

/// Song-wide inputs shared by every channel
#[derive(Debug, Clone, Copy)]
pub struct SongInfo<'a> {
    /// Tempo per linearized row
    pub speeds: &'a [SpeedAtRow],
    pub loop_point: Option<usize>,
    pub instruments: &'a [TrackerInstrument],
    /// Initial arpeggio speed in tracker ticks
    pub arpeggio_speed: u8,
    /// Maximum of the native volume range
    pub volume_max: u8,
}

/// Convert one linearized channel into tokens
pub fn transpile_channel(rows: &[TrackerRow], song: &SongInfo<'_>) -> Vec<Token> {
    ChannelTranspiler::new(rows, song).run()
}

/// Note cut and delay requested by a row, in tracker ticks
#[derive(Debug, Default, Clone, Copy)]
struct RowTiming {
    cut: Option<u8>,
    delay: Option<u8>,
}

/// Volume slide rate per tracker tick: `x` up, `y` down
fn slide_rate(value: u8) -> i32 {
    let effect = Effect::new(EffectKind::VOLUME_SLIDE, value);
    if effect.x() > 0 {
        effect.x() as i32
    } else {
        -(effect.y() as i32)
    }
}

fn driver_pitch(semitones: f64) -> Pitch {
    Pitch::from_semitones(semitones.round() as i16)
}

struct ChannelTranspiler<'a> {
    rows: &'a [TrackerRow],
    cursor: RowCursor<'a>,
    speeds: SpeedTable<'a>,
    instruments: &'a [TrackerInstrument],
    volume_max: u8,
    state: ChannelState,
    tokens: Vec<Token>,
    /// Event row being converted
    row: usize,
}

impl<'a> ChannelTranspiler<'a> {
    fn new(rows: &'a [TrackerRow], song: &SongInfo<'a>) -> Self {
        Self {
            rows,
            cursor: RowCursor::new(rows, song.loop_point),
            speeds: SpeedTable::new(song.speeds),
            instruments: song.instruments,
            volume_max: song.volume_max.max(1),
            state: ChannelState::new(song.arpeggio_speed),
            tokens: Vec::new(),
            row: 0,
        }
    }

    fn run(mut self) -> Vec<Token> {
        let mut index = 0;
        while index < self.rows.len() {
            let span = self.cursor.duration(index);
            self.process_row(index, span);
            index += span;
        }
        spread_slides(self.tokens)
    }

    fn process_row(&mut self, index: usize, span: usize) {
        let rows = self.rows;
        let row = &rows[index];
        self.row = index;

        let mut effects: SmallVec<[Effect; 4]> = row.effects.clone();
        effects.sort_by_key(|e| e.kind.priority());
        let mut timing = RowTiming::default();
        for effect in effects {
            self.apply_effect(index, effect, &mut timing);
        }

        if let Some(volume) = row.volume {
            let scaled = (volume as u32 * 255 + self.volume_max as u32 / 2) / self.volume_max as u32;
            self.state.volume = Some(scaled.min(255) as u8);
        }
        if row.volume.is_some() || (row.has_note() && self.state.last_volume.is_none()) {
            self.emit_volume();
        }
        if self.state.vibrato.dirty || (row.has_note() && self.state.vibrato.emitted.is_none()) {
            self.emit_vibrato(index);
        }

        let total = self.speeds.driver_ticks(index, span);
        if row.is_note_off() {
            self.state.sounding = false;
            self.push_rest(total);
            return;
        }

        // Leading delay, then the sounding part, then the cut tail
        let lead = match timing.delay {
            Some(delay) if row.has_note() && total > 1 => self
                .speeds
                .driver_ticks_for(index, delay as f64)
                .min(total - 1),
            _ => 0,
        };
        if lead > 0 {
            self.push_idle(lead);
        }
        let body = total - lead;
        let sound = timing
            .cut
            .map(|cut| self.speeds.driver_ticks_for(index, cut as f64))
            .filter(|&cut| cut < body)
            .unwrap_or(body);
        let tail = body - sound;

        // Tie unless a new note (not a portamento target) follows
        let tie = tail == 0
            && self
                .cursor
                .following_event(index)
                .is_some_and(|r| {
                    !r.has_note() || r.find_effect(EffectKind::PORTAMENTO).is_some_and(|v| v > 0)
                });
        let tracker_ticks =
            self.speeds.tracker_ticks(index, span) as f64 * sound as f64 / total as f64;

        self.emit_event(row, sound, tracker_ticks, tie);

        if tail > 0 {
            self.state.sounding = false;
            self.push_rest(tail);
        }
    }

    /// Note decision for one event row, first match wins
    fn emit_event(&mut self, row: &TrackerRow, ticks: u32, tracker_ticks: f64, tie: bool) {
        // Portamento toward the row's note or the remembered target
        if self.state.portamento > 0 && self.state.sounding && self.state.pitch.is_some() {
            if let Some(note) = row.pitch() {
                let target = self.resolve_note(row, note, false);
                self.state.portamento_target = Some(target);
            }
            if let (Some(from), Some(target)) = (self.state.pitch, self.state.portamento_target) {
                self.portamento(from, target, ticks, tracker_ticks, tie);
                return;
            }
        }

        // Pitch slide, restarting from a new note if the row has one
        if self.state.pitch_slide != 0 && (row.has_note() || self.state.sounding) {
            if let Some(note) = row.pitch() {
                let pitch = self.resolve_note(row, note, true);
                self.state.pitch = Some(pitch);
                self.state.portamento_target = None;
            }
            if let Some(from) = self.state.pitch {
                let max = Pitch::MAX.semitones() as f64;
                let to = (from + self.state.pitch_slide as f64 * tracker_ticks / 32.0).clamp(0.0, max);
                self.push_slide(from, to, ticks, tie);
                self.state.pitch = Some(to);
                self.state.sounding = true;
                return;
            }
        }

        let Some(note) = row.pitch() else {
            if self.state.sounding {
                self.push_wait(ticks);
            } else {
                self.push_rest(ticks);
            }
            return;
        };

        let semitones = self.resolve_note(row, note, true);
        let pitch = driver_pitch(semitones);
        if self.state.legato && self.state.sounding {
            self.tie_previous_note();
        }

        if self.state.noise {
            let frequency = self.state.noise_frequency;
            self.push_note(
                |ticks, tie| Token::NoiseNote {
                    frequency,
                    ticks,
                    tie,
                },
                ticks,
                tie,
            );
        } else if self.state.arpeggio_active() {
            let (x, y) = self.state.arpeggio;
            let notes = [pitch, pitch.transpose(x as i16), pitch.transpose(y as i16)];
            let speed = self.arpeggio_driver_speed();
            self.push_note(
                |ticks, _| Token::ArpeggioNote {
                    notes,
                    ticks,
                    speed,
                },
                ticks,
                tie,
            );
        } else {
            self.push_note(|ticks, tie| Token::Note { pitch, ticks, tie }, ticks, tie);
        }

        self.state.pitch = Some(pitch.semitones() as f64);
        self.state.portamento_target = None;
        self.state.sounding = true;
    }

    // =========================================================================
    // Effects
    // =========================================================================

    fn apply_effect(&mut self, index: usize, effect: Effect, timing: &mut RowTiming) {
        let state = &mut self.state;
        match effect.kind {
            EffectKind::LOOP_MARKER => {
                // Nothing is set before the first token
                if !self.tokens.is_empty() {
                    state.forget_emitted();
                }
                self.tokens.push(Token::LoopPoint);
            }
            EffectKind::VOLUME_SLIDE => self.volume_slide(index, effect.value),
            EffectKind::FINE_VOLUME_UP | EffectKind::FINE_VOLUME_DOWN => {
                if effect.value > 0 {
                    let amount = (effect.value as i16 / 2).max(1);
                    let delta = if effect.kind == EffectKind::FINE_VOLUME_UP {
                        amount
                    } else {
                        -amount
                    };
                    self.tokens.push(Token::VolumeSlide { delta, ticks: 1 });
                    state.volume = None;
                    state.last_volume = None;
                }
            }
            EffectKind::PAN_SLIDE => self.pan_slide(index, effect.value),
            EffectKind::PAN => {
                let pan = (effect.value as f64 * 128.0 / 255.0).round() as u8;
                state.pan_slide = None;
                if state.last_pan != Some(pan) {
                    self.tokens.push(Token::PanSet(pan));
                    state.last_pan = Some(pan);
                }
            }
            EffectKind::ECHO => {
                let on = effect.value != 0;
                if state.echo != on {
                    state.echo = on;
                    self.tokens.push(Token::Echo(on));
                }
            }
            EffectKind::PITCH_MOD => {
                let on = effect.value != 0;
                if state.pitch_mod != on {
                    state.pitch_mod = on;
                    self.tokens.push(Token::PitchMod(on));
                }
            }
            EffectKind::INVERT => {
                let flags = InvertFlags {
                    left: effect.x() != 0,
                    right: effect.y() != 0,
                };
                if state.invert != flags {
                    state.invert = flags;
                    self.tokens.push(Token::Invert(flags));
                }
            }
            EffectKind::VIBRATO => {
                state.vibrato.speed = effect.x();
                state.vibrato.depth = effect.y();
                state.vibrato.dirty = true;
            }
            EffectKind::VIBRATO_DEPTH => {
                state.vibrato.depth = effect.value.min(15);
                state.vibrato.dirty = true;
            }
            EffectKind::VIBRATO_RANGE => {
                state.vibrato.range = effect.value;
                state.vibrato.dirty = true;
            }
            EffectKind::ARPEGGIO => state.arpeggio = (effect.x(), effect.y()),
            EffectKind::ARPEGGIO_SPEED => state.arpeggio_speed = effect.value.max(1),
            EffectKind::PITCH_UP => state.pitch_slide = effect.value as i16,
            EffectKind::PITCH_DOWN => state.pitch_slide = -(effect.value as i16),
            EffectKind::SINGLE_TICK_PITCH_UP | EffectKind::SINGLE_TICK_PITCH_DOWN => {
                if let Some(pitch) = state.pitch.as_mut() {
                    let offset = effect.value as f64 / 32.0;
                    if effect.kind == EffectKind::SINGLE_TICK_PITCH_UP {
                        *pitch += offset;
                    } else {
                        *pitch -= offset;
                    }
                    *pitch = pitch.clamp(0.0, Pitch::MAX.semitones() as f64);
                }
            }
            EffectKind::PORTAMENTO => {
                state.portamento = effect.value as u16;
                if effect.value == 0 {
                    state.portamento_target = None;
                }
            }
            EffectKind::NOTE_SLIDE_UP | EffectKind::NOTE_SLIDE_DOWN => {
                state.portamento = effect.x() as u16 * 4;
                let semitones = effect.y() as f64;
                state.portamento_target = match (state.portamento, state.pitch) {
                    (0, _) | (_, None) => None,
                    (_, Some(pitch)) if effect.kind == EffectKind::NOTE_SLIDE_UP => {
                        Some((pitch + semitones).min(Pitch::MAX.semitones() as f64))
                    }
                    (_, Some(pitch)) => Some((pitch - semitones).max(0.0)),
                };
            }
            EffectKind::LEGATO => state.legato = effect.value != 0,
            EffectKind::NOISE_MODE => state.noise = effect.value != 0,
            EffectKind::NOISE_FREQUENCY => state.noise_frequency = effect.value.min(31),
            EffectKind::NOTE_CUT => timing.cut = Some(effect.value),
            EffectKind::NOTE_DELAY => timing.delay = Some(effect.value),
            kind if kind.affects_speed() || kind.affects_pattern_flow() => {}
            kind => tracing::trace!("ignoring effect {:#x}", kind.code()),
        }
    }

    /// Signed amount and driver ticks of a slide run
    ///
    /// Runs longer than one command are split later by [`spread_slides`].
    fn slide_amount(&self, index: usize, rows: usize, rate: i32, limit: i32) -> Option<(i16, u32)> {
        let tracker_ticks = self.speeds.tracker_ticks(index, rows) as i64;
        let amount = (tracker_ticks * rate as i64 / 2).clamp(-limit as i64, limit as i64);
        let ticks = self.speeds.driver_ticks(index, rows);
        (amount != 0 && ticks > 0).then_some((amount as i16, ticks))
    }

    fn continues_run(run: Option<SlideRun>, index: usize, value: u8) -> bool {
        run.is_some_and(|r| r.value == value && index < r.end)
    }

    fn volume_slide(&mut self, index: usize, value: u8) {
        if value == 0 {
            self.state.volume_slide = None;
            return;
        }
        if Self::continues_run(self.state.volume_slide, index, value) {
            return;
        }
        let rows = self.cursor.rows_until(index, |r| {
            r.volume.is_some()
                || r
                    .find_effect(EffectKind::VOLUME_SLIDE)
                    .is_some_and(|v| v != value)
        });
        self.state.volume_slide = Some(SlideRun {
            value,
            end: index + rows,
        });
        if let Some((delta, ticks)) = self.slide_amount(index, rows, slide_rate(value), 255) {
            self.tokens.push(Token::VolumeSlide { delta, ticks });
            self.state.volume = None;
            self.state.last_volume = None;
        }
    }

    fn pan_slide(&mut self, index: usize, value: u8) {
        if value == 0 {
            self.state.pan_slide = None;
            return;
        }
        if Self::continues_run(self.state.pan_slide, index, value) {
            return;
        }
        let rows = self.cursor.rows_until(index, |r| {
            r.has_effect(EffectKind::PAN)
                || r
                    .find_effect(EffectKind::PAN_SLIDE)
                    .is_some_and(|v| v != value)
        });
        self.state.pan_slide = Some(SlideRun {
            value,
            end: index + rows,
        });
        if let Some((delta, ticks)) = self.slide_amount(index, rows, slide_rate(value), 128) {
            self.tokens.push(Token::PanSlide { delta, ticks });
            self.state.last_pan = None;
        }
    }

    fn emit_volume(&mut self) {
        if let Some(volume) = self.state.volume
            && self.state.last_volume != Some(volume)
        {
            self.tokens.push(Token::VolumeChange(volume));
            self.state.last_volume = Some(volume);
        }
    }

    fn emit_vibrato(&mut self, index: usize) {
        let vibrato = self.state.vibrato;
        self.state.vibrato.dirty = false;

        let setting = if vibrato.speed == 0 || vibrato.depth == 0 {
            VibratoSetting::Off
        } else {
            let depth = vibrato.depth as f64 / 15.0 * vibrato.range as f64 * 6.25;
            let quarter = self
                .speeds
                .timer_ticks_for(index, 16.0 / vibrato.speed as f64);
            VibratoSetting::On {
                depth: depth.round().clamp(1.0, u16::MAX as f64) as u16,
                quarter_wavelength: quarter.round().clamp(1.0, 255.0) as u16,
            }
        };
        if vibrato.emitted != Some(setting) {
            self.tokens.push(setting.token());
            self.state.vibrato.emitted = Some(setting);
        }
    }

    // =========================================================================
    // Notes
    // =========================================================================

    /// Driver pitch of a row's note, switching instrument when asked
    fn resolve_note(&mut self, row: &TrackerRow, note: u8, switch_instrument: bool) -> f64 {
        if let Some(index) = row.instrument {
            if self.instruments.get(index as usize).is_some() {
                self.state.instrument = Some(index);
            } else {
                tracing::warn!("instrument {} does not exist, keeping the previous one", index);
            }
        }

        let resolved = self
            .state
            .instrument
            .and_then(|i| self.instruments.get(i as usize))
            .map(|instrument| instrument.resolve(note));
        let pitch = match resolved {
            Some(resolved) => {
                if switch_instrument
                    && self.state.last_instrument.as_deref() != Some(resolved.instrument.as_str())
                {
                    self.tokens
                        .push(Token::InstrumentChange(resolved.instrument.clone()));
                    self.state.last_instrument = Some(resolved.instrument);
                }
                resolved.pitch
            }
            None => note as i16,
        };
        Pitch::from_tracker(pitch).semitones() as f64
    }

    fn arpeggio_driver_speed(&self) -> u32 {
        let speed = self.speeds.at(self.row);
        let ticks = self.state.arpeggio_speed as f64 * speed.driver_ticks as f64
            / speed.ticks_per_row.max(1) as f64;
        (ticks.ceil() as u32).max(1)
    }

    fn portamento(&mut self, from: f64, target: f64, ticks: u32, tracker_ticks: f64, tie: bool) {
        let rate = self.state.portamento as f64 / 32.0;
        let distance = target - from;
        let needed = distance.abs() / rate;

        if needed <= tracker_ticks {
            let slide_ticks =
                ((needed / tracker_ticks * ticks as f64 - 1e-9).ceil() as u32).clamp(1, ticks);
            let remainder = ticks - slide_ticks;
            if distance.abs() < f64::EPSILON {
                self.push_wait(ticks);
            } else {
                self.push_slide(from, target, slide_ticks, remainder > 0 || tie);
                self.push_wait(remainder);
            }
            self.state.pitch = Some(target);
            self.state.portamento_target = None;
        } else {
            let reached = from + rate * tracker_ticks * distance.signum();
            self.push_slide(from, reached, ticks, tie);
            self.state.pitch = Some(reached);
        }
        self.state.sounding = true;
    }

    /// Tie the most recent note onto the next one
    fn tie_previous_note(&mut self) {
        if let Some(last) = self.tokens.iter_mut().rev().find(|t| t.ticks() > 0) {
            last.set_tie(true);
        }
    }

    // =========================================================================
    // Timed output
    // =========================================================================

    /// Note-class token, continued with waits past the tick limit
    fn push_note(&mut self, make: impl Fn(u32, bool) -> Token, ticks: u32, tie: bool) {
        let first = ticks.min(MAX_TICKS);
        let remainder = ticks - first;
        self.tokens.push(make(first, tie || remainder > 0));
        self.push_wait(remainder);
    }

    /// Slide split into segments of at most the tick limit
    fn push_slide(&mut self, from: f64, to: f64, ticks: u32, tie: bool) {
        let mut elapsed = 0;
        let mut start = from;
        while elapsed < ticks {
            let segment = (ticks - elapsed).min(MAX_TICKS);
            let first = elapsed == 0;
            elapsed += segment;
            let end = from + (to - from) * elapsed as f64 / ticks as f64;
            let segment_tie = if elapsed == ticks { tie } else { true };

            let (a, b) = (driver_pitch(start), driver_pitch(end));
            let token = match (a == b, first) {
                (false, _) => Token::SlideNote {
                    from: a,
                    to: b,
                    ticks: segment,
                    tie: segment_tie,
                },
                (true, true) => Token::Note {
                    pitch: a,
                    ticks: segment,
                    tie: segment_tie,
                },
                (true, false) => Token::Wait(segment),
            };
            self.tokens.push(token);
            start = end;
        }
    }

    fn push_idle(&mut self, ticks: u32) {
        if self.state.sounding {
            self.push_wait(ticks);
        } else {
            self.push_rest(ticks);
        }
    }

    fn push_wait(&mut self, mut ticks: u32) {
        while ticks > 0 {
            let chunk = ticks.min(MAX_TICKS);
            self.tokens.push(Token::Wait(chunk));
            ticks -= chunk;
        }
    }

    /// Rest with key-off: unties the previous note and extends a previous rest
    fn push_rest(&mut self, mut ticks: u32) {
        if ticks == 0 {
            return;
        }
        if let Some(last) = self.tokens.iter_mut().rev().find(|t| t.ticks() > 0)
            && last.is_tied()
        {
            last.set_tie(false);
        }
        if let Some(Token::Rest(previous)) = self.tokens.last_mut() {
            let add = ticks.min(MAX_TICKS.saturating_sub(*previous));
            *previous += add;
            ticks -= add;
        }
        while ticks > 0 {
            let chunk = ticks.min(MAX_TICKS);
            self.tokens.push(Token::Rest(chunk));
            ticks -= chunk;
        }
    }
}
