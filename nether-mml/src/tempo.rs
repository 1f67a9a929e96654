//! Tracker tempo → driver timer resolution
//!
//! The driver plays on a single hardware timer with a period of
//! `timer × 0.125 ms` (`timer` in 64..=256). A tracker row lasts
//! `1000 / ticks_per_second × speed` ms, so each row has to be expressed as
//! an integer number of driver ticks of one shared timer period.

use hashbrown::HashMap;
use smallvec::SmallVec;

use crate::config::{TimingConfig, TimingMode, TimingOverride};
use crate::error::{MmlError, Result};

/// Smallest timer register value
pub const TIMER_MIN: u16 = 64;
/// Largest timer register value
pub const TIMER_MAX: u16 = 256;
/// Timer register unit in milliseconds
pub const TIMER_UNIT_MS: f64 = 0.125;
/// Multipliers searched by the tolerance based policies (exclusive)
const MULTIPLIER_LIMIT: u32 = 60;

/// Longest row the driver tick counters can hold
pub const MAX_ROW_TICKS: u32 = u16::MAX as u32;

/// Float comparisons closer than this count as ties
const EPSILON: f64 = 1e-9;

/// Duration of one tracker row in milliseconds
pub fn row_duration_ms(ticks_per_second: f64, speed: u8) -> f64 {
    1000.0 / ticks_per_second * speed as f64
}

/// Timer register value and driver ticks per row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerSetting {
    pub timer: u16,
    pub ticks: u32,
}

impl TimerSetting {
    /// Length of one driver tick in milliseconds
    pub fn tick_ms(self) -> f64 {
        self.timer as f64 * TIMER_UNIT_MS
    }

    /// Row duration this setting produces
    pub fn row_ms(self) -> f64 {
        self.tick_ms() * self.ticks as f64
    }
}

/// Shared timer plus driver ticks for each entry of a speed pattern
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrooveTiming {
    pub timer: u16,
    /// Driver ticks per row, aligned with the speed pattern
    pub ticks: SmallVec<[u32; 4]>,
}

fn timers() -> impl Iterator<Item = u16> {
    TIMER_MIN..=TIMER_MAX
}

fn error_ms(row_ms: f64, timer: u16, ticks: u32) -> f64 {
    (row_ms - timer as f64 * TIMER_UNIT_MS * ticks as f64).abs()
}

/// Best multiplier for one timer: floor or ceil of the ratio, at least 1
fn nearest_multiplier(row_ms: f64, timer: u16) -> (u32, f64) {
    let ratio = row_ms / (timer as f64 * TIMER_UNIT_MS);
    let floor = (ratio.floor() as u32).max(1);
    let ceil = (ratio.ceil() as u32).max(1);
    let floor_error = error_ms(row_ms, timer, floor);
    let ceil_error = error_ms(row_ms, timer, ceil);
    if ceil_error + EPSILON < floor_error {
        (ceil, ceil_error)
    } else {
        (floor, floor_error)
    }
}

/// Timer with the smallest row duration error (ties keep the smallest timer)
pub fn low_error(row_ms: f64) -> (TimerSetting, f64) {
    let mut best = TimerSetting {
        timer: TIMER_MIN,
        ticks: 1,
    };
    let mut best_error = f64::INFINITY;
    for timer in timers() {
        let (ticks, error) = nearest_multiplier(row_ms, timer);
        if error + EPSILON < best_error {
            best = TimerSetting { timer, ticks };
            best_error = error;
        }
    }
    (best, best_error)
}

/// Largest multiplier whose error is under `tolerance_ms`
///
/// Ties are broken by the smaller error, then the smaller timer.
pub fn lowest_error(row_ms: f64, tolerance_ms: f64) -> Option<(TimerSetting, f64)> {
    let mut best: Option<(TimerSetting, f64)> = None;
    for timer in timers() {
        for ticks in 1..MULTIPLIER_LIMIT {
            let error = error_ms(row_ms, timer, ticks);
            if error >= tolerance_ms {
                continue;
            }
            let better = match best {
                None => true,
                Some((current, current_error)) => {
                    ticks > current.ticks
                        || (ticks == current.ticks && error + EPSILON < current_error)
                }
            };
            if better {
                best = Some((TimerSetting { timer, ticks }, error));
            }
        }
    }
    best
}

/// Best multiplier in the searched range for one timer
fn best_bounded_multiplier(row_ms: f64, timer: u16) -> (u32, f64) {
    let mut best = (1, error_ms(row_ms, timer, 1));
    for ticks in 2..MULTIPLIER_LIMIT {
        let error = error_ms(row_ms, timer, ticks);
        if error + EPSILON < best.1 {
            best = (ticks, error);
        }
    }
    best
}

/// Timer shared by several speeds, minimizing the summed error
fn groove_search(row_ms: &[f64], tolerance_ms: f64) -> Option<(u16, SmallVec<[u32; 4]>)> {
    let mut best: Option<(u16, SmallVec<[u32; 4]>, f64)> = None;
    for timer in timers() {
        let mut ticks = SmallVec::new();
        let mut total = 0.0;
        let mut fits = true;
        for &ms in row_ms {
            let (multiplier, error) = best_bounded_multiplier(ms, timer);
            if error >= tolerance_ms {
                fits = false;
                break;
            }
            ticks.push(multiplier);
            total += error;
        }
        if !fits {
            continue;
        }
        if best.as_ref().is_none_or(|b| total + EPSILON < b.2) {
            best = Some((timer, ticks, total));
        }
    }
    best.map(|(timer, ticks, _)| (timer, ticks))
}

/// Memoizing tempo resolver
///
/// Results only depend on the configuration and the arguments; the caches
/// never change what is returned.
#[derive(Debug, Clone)]
pub struct TempoResolver {
    config: TimingConfig,
    single: HashMap<(u64, u8), TimerSetting>,
    patterns: HashMap<(u64, Vec<u8>), GrooveTiming>,
}

impl TempoResolver {
    pub fn new(config: TimingConfig) -> Self {
        Self {
            config,
            single: HashMap::new(),
            patterns: HashMap::new(),
        }
    }

    /// Timing configuration in use
    pub fn config(&self) -> &TimingConfig {
        &self.config
    }

    fn find_override(&self, ticks_per_second: f64, speed: u8) -> Option<&TimingOverride> {
        self.config.overrides.iter().find(|o| {
            o.speed == speed && (o.ticks_per_second - ticks_per_second).abs() < EPSILON
        })
    }

    /// Resolve one tempo and speed
    pub fn resolve(&mut self, ticks_per_second: f64, speed: u8) -> Result<TimerSetting> {
        let unresolvable = || MmlError::TimingUnresolvable {
            ticks_per_second,
            speeds: vec![speed],
        };
        if !(ticks_per_second.is_finite() && ticks_per_second > 0.0) || speed == 0 {
            return Err(unresolvable());
        }

        if let Some(o) = self.find_override(ticks_per_second, speed) {
            if !(TIMER_MIN..=TIMER_MAX).contains(&o.timer) || o.ticks == 0 {
                return Err(MmlError::InvalidTimingOverride {
                    ticks_per_second,
                    speed,
                    timer: o.timer,
                    ticks: o.ticks,
                });
            }
            return Ok(TimerSetting {
                timer: o.timer,
                ticks: o.ticks as u32,
            });
        }

        let key = (ticks_per_second.to_bits(), speed);
        if let Some(setting) = self.single.get(&key) {
            return Ok(*setting);
        }

        let row_ms = row_duration_ms(ticks_per_second, speed);
        let (setting, error) = match self.config.mode {
            TimingMode::LowError => low_error(row_ms),
            TimingMode::LowestError => lowest_error(row_ms, self.config.tolerance_ms)
                .unwrap_or_else(|| low_error(row_ms)),
        };
        if setting.ticks > MAX_ROW_TICKS {
            return Err(unresolvable());
        }
        tracing::debug!(
            "{} ticks/s speed {}: timer {} x {} (error {:.3} ms)",
            ticks_per_second,
            speed,
            setting.timer,
            setting.ticks,
            error
        );

        self.single.insert(key, setting);
        Ok(setting)
    }

    /// Resolve a speed pattern onto one shared timer
    ///
    /// A pattern that only repeats one speed resolves like a plain speed.
    pub fn resolve_pattern(&mut self, ticks_per_second: f64, pattern: &[u8]) -> Result<GrooveTiming> {
        let unresolvable = || MmlError::TimingUnresolvable {
            ticks_per_second,
            speeds: pattern.to_vec(),
        };
        let Some(&first) = pattern.first() else {
            return Err(unresolvable());
        };
        if pattern.iter().all(|&s| s == first) {
            let setting = self.resolve(ticks_per_second, first)?;
            return Ok(GrooveTiming {
                timer: setting.timer,
                ticks: pattern.iter().map(|_| setting.ticks).collect(),
            });
        }
        if !(ticks_per_second.is_finite() && ticks_per_second > 0.0) || pattern.contains(&0) {
            return Err(unresolvable());
        }

        let key = (ticks_per_second.to_bits(), pattern.to_vec());
        if let Some(timing) = self.patterns.get(&key) {
            return Ok(timing.clone());
        }

        let row_ms: SmallVec<[f64; 4]> = pattern
            .iter()
            .map(|&s| row_duration_ms(ticks_per_second, s))
            .collect();
        let (timer, ticks) = groove_search(&row_ms, self.config.tolerance_ms)
            .or_else(|| {
                tracing::debug!(
                    "groove {:?} at {} ticks/s: widening tolerance to {} ms",
                    pattern,
                    ticks_per_second,
                    self.config.fallback_tolerance_ms
                );
                groove_search(&row_ms, self.config.fallback_tolerance_ms)
            })
            .ok_or_else(unresolvable)?;

        let timing = GrooveTiming { timer, ticks };
        tracing::debug!(
            "groove {:?} at {} ticks/s: timer {} x {:?}",
            pattern,
            ticks_per_second,
            timing.timer,
            timing.ticks
        );
        self.patterns.insert(key, timing.clone());
        Ok(timing)
    }
}
