//! Order list walking
//!
//! Flattens the order list and pattern grid into one row stream per channel,
//! following pattern breaks and order jumps the way the tracker plays them,
//! and records the tempo in effect on every row.

use nether_tracker::{EffectKind, TrackerRow, TrackerSong};
use smallvec::SmallVec;

use crate::error::{MmlError, Result};
use crate::tempo::{GrooveTiming, TempoResolver};

/// Tempo in effect on one linearized row
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpeedAtRow {
    pub ticks_per_second: f64,
    /// Tracker ticks this row lasts
    pub ticks_per_row: u8,
    /// Driver timer register value
    pub timer: u16,
    /// Driver ticks this row lasts
    pub driver_ticks: u32,
}

/// Song flattened into per-channel row streams
#[derive(Debug, Clone, PartialEq)]
pub struct LinearSong {
    /// One row stream per channel, all of the same length
    pub channels: Vec<Vec<TrackerRow>>,
    /// Tempo per row, in lockstep with the channel streams
    pub speeds: Vec<SpeedAtRow>,
    /// First row of the repeating tail
    pub loop_point: Option<usize>,
}

impl LinearSong {
    pub fn row_count(&self) -> usize {
        self.speeds.len()
    }

    /// Timer of the first row
    pub fn initial_timer(&self) -> Option<u16> {
        self.speeds.first().map(|s| s.timer)
    }
}

/// Control flow requested by one grid row
#[derive(Debug, Default)]
struct RowFlow {
    jump: Option<u8>,
    break_row: Option<u8>,
    stop: bool,
}

impl RowFlow {
    fn is_set(&self) -> bool {
        self.jump.is_some() || self.break_row.is_some() || self.stop
    }
}

/// Speed pattern and tempo as the song plays
struct TempoState {
    ticks_per_second: f64,
    pattern: SmallVec<[u8; 4]>,
    position: usize,
    timing: GrooveTiming,
}

impl TempoState {
    fn new(song: &TrackerSong, resolver: &mut TempoResolver) -> Result<Self> {
        let pattern: SmallVec<[u8; 4]> = song.speed_pattern.iter().copied().collect();
        let timing = resolver.resolve_pattern(song.ticks_per_second, &pattern)?;
        Ok(Self {
            ticks_per_second: song.ticks_per_second,
            pattern,
            position: 0,
            timing,
        })
    }

    /// Apply the speed effects of one grid row
    fn apply(
        &mut self,
        song: &TrackerSong,
        row: &TrackerRow,
        resolver: &mut TempoResolver,
    ) -> Result<()> {
        let mut changed = false;
        for effect in row.effects.iter().filter(|e| e.kind.affects_speed()) {
            if effect.value == 0 {
                tracing::trace!("ignoring zero speed effect {:?}", effect.kind);
                continue;
            }
            match effect.kind {
                EffectKind::SPEED_1 if !song.groove_patterns.is_empty() => {
                    match song.groove_patterns.get(effect.value as usize) {
                        Some(groove) if !groove.is_empty() => {
                            self.pattern = groove.iter().copied().collect();
                            self.position = 0;
                            changed = true;
                        }
                        _ => tracing::warn!("groove {} does not exist", effect.value),
                    }
                }
                EffectKind::SPEED_1 => {
                    if self.pattern.len() < 2 {
                        self.pattern = SmallVec::from_slice(&[effect.value]);
                    } else {
                        self.pattern[0] = effect.value;
                    }
                    changed = true;
                }
                EffectKind::SPEED_2 => {
                    if self.pattern.len() < 2 {
                        let first = self.pattern.first().copied().unwrap_or(effect.value);
                        self.pattern = SmallVec::from_slice(&[first, effect.value]);
                    } else {
                        self.pattern[1] = effect.value;
                    }
                    changed = true;
                }
                _ => {
                    // SET_BPM uses the IT convention of 2.5 BPM per tick/s
                    self.ticks_per_second = effect.value as f64 / 2.5;
                    changed = true;
                }
            }
        }
        if changed {
            self.timing = resolver.resolve_pattern(self.ticks_per_second, &self.pattern)?;
        }
        Ok(())
    }

    /// Speed of the next row, advancing the pattern position
    fn next_row(&mut self) -> SpeedAtRow {
        let index = self.position % self.pattern.len();
        self.position += 1;
        SpeedAtRow {
            ticks_per_second: self.ticks_per_second,
            ticks_per_row: self.pattern[index],
            timer: self.timing.timer,
            driver_ticks: self.timing.ticks[index],
        }
    }
}

/// Flatten a song into per-channel row streams
pub fn linearize(song: &TrackerSong, resolver: &mut TempoResolver) -> Result<LinearSong> {
    let order_count = song.order_count();
    if song.channels.is_empty() || order_count == 0 || song.pattern_length == 0 {
        return Err(MmlError::EmptySong);
    }

    let pattern_length = song.pattern_length as usize;
    let empty_row = TrackerRow::default();
    let mut tempo = TempoState::new(song, resolver)?;
    let mut out = LinearSong {
        channels: vec![Vec::new(); song.channels.len()],
        speeds: Vec::new(),
        loop_point: None,
    };
    let mut order_starts: Vec<Option<usize>> = vec![None; order_count];

    let mut order = 0;
    let mut start_row = 0;
    loop {
        if order >= order_count {
            // Running off the end repeats from the first order
            out.loop_point = order_starts[0];
            break;
        }
        if order_starts[order].is_none() {
            order_starts[order] = Some(out.row_count());
        }

        let mut flow = RowFlow::default();
        for row in start_row..pattern_length {
            let grid: SmallVec<[&TrackerRow; 8]> = (0..song.channels.len())
                .map(|ch| song.row_at(ch, order, row).unwrap_or(&empty_row))
                .collect();

            for cell in &grid {
                tempo.apply(song, cell, resolver)?;
            }
            out.speeds.push(tempo.next_row());
            for (stream, cell) in out.channels.iter_mut().zip(&grid) {
                stream.push((*cell).clone());
            }

            for effect in grid.iter().flat_map(|cell| cell.effects.iter()) {
                match effect.kind {
                    EffectKind::JUMP_TO_ORDER => flow.jump = Some(effect.value),
                    EffectKind::JUMP_TO_NEXT_PATTERN => flow.break_row = Some(effect.value),
                    EffectKind::STOP_SONG => flow.stop = true,
                    _ => {}
                }
            }
            if flow.is_set() {
                break;
            }
        }

        let next_start = flow
            .break_row
            .map(|r| r as usize)
            .filter(|&r| r < pattern_length)
            .unwrap_or(0);

        if flow.stop {
            tracing::debug!("song stops at order {}", order);
            break;
        }
        match flow.jump.map(|j| j as usize) {
            Some(target) if target > order => {
                order = target;
                start_row = next_start;
            }
            Some(target) => {
                out.loop_point = order_starts.get(target).copied().flatten();
                if out.loop_point.is_none() {
                    tracing::warn!(
                        "jump to order {} which was never played, song will not loop",
                        target
                    );
                }
                break;
            }
            None => {
                order += 1;
                start_row = next_start;
            }
        }
    }

    if let Some(point) = out.loop_point {
        tracing::debug!("loop point at row {}", point);
        for stream in &mut out.channels {
            if let Some(row) = stream.get_mut(point)
                && !row.has_effect(EffectKind::LOOP_MARKER)
            {
                row.effects
                    .push(nether_tracker::Effect::new(EffectKind::LOOP_MARKER, 0));
            }
        }
    }

    if let Some(first) = out.initial_timer()
        && let Some((row, speed)) = out
            .speeds
            .iter()
            .enumerate()
            .find(|(_, s)| s.timer != first)
    {
        tracing::warn!(
            "timer changes from {} to {} at row {}; the driver keeps the first timer",
            first,
            speed.timer,
            row
        );
    }

    Ok(out)
}
