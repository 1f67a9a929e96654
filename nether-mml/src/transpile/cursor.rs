//! Row scanning helpers

use nether_tracker::TrackerRow;

use crate::linearize::SpeedAtRow;

/// Speed used when a song has no rows at all
const FALLBACK_SPEED: SpeedAtRow = SpeedAtRow {
    ticks_per_second: 60.0,
    ticks_per_row: 6,
    timer: 80,
    driver_ticks: 10,
};

/// Per-row tempo lookups. Rows past the end use the last row's speed.
#[derive(Debug, Clone, Copy)]
pub struct SpeedTable<'a> {
    speeds: &'a [SpeedAtRow],
}

impl<'a> SpeedTable<'a> {
    pub fn new(speeds: &'a [SpeedAtRow]) -> Self {
        Self { speeds }
    }

    /// Speed at a row
    pub fn at(&self, row: usize) -> SpeedAtRow {
        self.speeds
            .get(row)
            .or(self.speeds.last())
            .copied()
            .unwrap_or(FALLBACK_SPEED)
    }

    /// Driver ticks spanned by `rows` rows starting at `start`
    pub fn driver_ticks(&self, start: usize, rows: usize) -> u32 {
        (start..start + rows).fold(0u32, |total, r| {
            total.saturating_add(self.at(r).driver_ticks)
        })
    }

    /// Tracker ticks spanned by `rows` rows starting at `start`
    pub fn tracker_ticks(&self, start: usize, rows: usize) -> u32 {
        (start..start + rows).fold(0u32, |total, r| {
            total.saturating_add(self.at(r).ticks_per_row as u32)
        })
    }

    /// Convert tracker ticks at a row to driver ticks, rounded, at least 1
    pub fn driver_ticks_for(&self, row: usize, tracker_ticks: f64) -> u32 {
        let speed = self.at(row);
        let ratio = speed.driver_ticks as f64 / speed.ticks_per_row.max(1) as f64;
        ((tracker_ticks * ratio).round() as u32).max(1)
    }

    /// Convert tracker ticks at a row to driver ticks through milliseconds
    pub fn timer_ticks_for(&self, row: usize, tracker_ticks: f64) -> f64 {
        let speed = self.at(row);
        let ms = tracker_ticks * 1000.0 / speed.ticks_per_second;
        ms / (speed.timer as f64 * crate::tempo::TIMER_UNIT_MS)
    }
}

/// Walks event rows (row 0 and every non-empty row) of one channel
#[derive(Debug, Clone, Copy)]
pub struct RowCursor<'a> {
    rows: &'a [TrackerRow],
    loop_point: Option<usize>,
}

impl<'a> RowCursor<'a> {
    pub fn new(rows: &'a [TrackerRow], loop_point: Option<usize>) -> Self {
        Self { rows, loop_point }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    fn is_event(&self, index: usize) -> bool {
        index == 0 || self.rows.get(index).is_some_and(|r| !r.is_empty())
    }

    /// First event row after `index`
    pub fn next_event(&self, index: usize) -> Option<usize> {
        (index + 1..self.rows.len()).find(|&i| self.is_event(i))
    }

    /// Rows from `index` up to the next event row (or the end)
    pub fn duration(&self, index: usize) -> usize {
        self.next_event(index).unwrap_or(self.rows.len()) - index
    }

    /// Event row played after `index`, wrapping to the loop point
    pub fn following_event(&self, index: usize) -> Option<&'a TrackerRow> {
        let next = self.next_event(index).or_else(|| {
            let point = self.loop_point?;
            (point..self.rows.len()).find(|&i| self.is_event(i))
        })?;
        self.rows.get(next)
    }

    /// Rows from `start + 1` onward until `stop` matches, the loop point or the end
    pub fn rows_until(&self, start: usize, stop: impl Fn(&TrackerRow) -> bool) -> usize {
        let end = (start + 1..self.rows.len())
            .find(|&i| Some(i) == self.loop_point || stop(&self.rows[i]))
            .unwrap_or(self.rows.len());
        end - start
    }
}
