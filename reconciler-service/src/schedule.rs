use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveTime, Utc};

/// A specific window on a specific local day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowSlot {
    pub date: NaiveDate,
    pub index: usize,
}

/// Daily wall-clock windows in which the poller is allowed to sweep.
///
/// A window opens at its start time and stays open for `length`. The offset is
/// fixed, so daylight saving changes shift the windows by an hour.
#[derive(Debug, Clone)]
pub struct PollSchedule {
    starts: Vec<NaiveTime>,
    offset: FixedOffset,
    length: Duration,
}

impl PollSchedule {
    pub fn new(starts: Vec<NaiveTime>, offset: FixedOffset, length: Duration) -> Self {
        Self {
            starts,
            offset,
            length,
        }
    }

    /// Parses a comma-separated `HH:MM` list such as `08:30,13:30,16:30`.
    pub fn parse_starts(list: &str) -> Result<Vec<NaiveTime>> {
        let starts = list
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| {
                NaiveTime::parse_from_str(s, "%H:%M")
                    .with_context(|| format!("invalid poll window {s:?}, expected HH:MM"))
            })
            .collect::<Result<Vec<_>>>()?;
        if starts.is_empty() {
            return Err(anyhow!("at least one poll window is required"));
        }
        Ok(starts)
    }

    pub fn offset_from_minutes(minutes: i32) -> Result<FixedOffset> {
        FixedOffset::east_opt(minutes * 60)
            .ok_or_else(|| anyhow!("poll window offset {minutes} minutes is out of range"))
    }

    /// The window open at `now`, if any.
    pub fn window_at(&self, now: DateTime<Utc>) -> Option<WindowSlot> {
        let local = now.with_timezone(&self.offset).naive_local();
        let today = local.date();

        [today, today.pred_opt()?].into_iter().find_map(|date| {
            self.starts.iter().enumerate().find_map(|(index, start)| {
                let opens = date.and_time(*start);
                (opens <= local && local < opens + self.length).then_some(WindowSlot { date, index })
            })
        })
    }
}
