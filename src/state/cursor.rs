//! "Since" cursor separating processed from pending events.

use chrono::{NaiveDateTime, NaiveTime, SubsecRound, TimeDelta};
use serde::{Deserialize, Serialize};

/// Timestamp of the last successfully completed cycle.
///
/// Source timestamps have whole-second precision, so a cycle starting at
/// `hh:mm:ss.fff` settles the cursor on the second before `hh:mm:ss`: events
/// recorded later in that same second still compare greater. Events of that
/// second seen by the finished cycle are examined once more.
///
/// Moves forward only. The replay window is bounded to the current day: a
/// cursor from an earlier calendar day is replaced by today's midnight.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cursor(Option<NaiveDateTime>);

impl Cursor {
    pub fn at(ts: NaiveDateTime) -> Self {
        Self(Some(ts))
    }

    pub fn last(&self) -> Option<NaiveDateTime> {
        self.0
    }

    /// Boundary to use for a cycle starting at `now`.
    pub fn boundary(&self, now: NaiveDateTime) -> NaiveDateTime {
        let start_of_day = now.date().and_time(NaiveTime::MIN);
        match self.0 {
            Some(last) if last.date() == now.date() => last,
            _ => start_of_day,
        }
    }

    /// Record a completed cycle that started at `cycle_start`.
    pub fn settle(&mut self, cycle_start: NaiveDateTime) {
        self.advance(cycle_start.trunc_subsecs(0) - TimeDelta::seconds(1));
    }

    /// Advance to `to`. Earlier values are ignored.
    pub fn advance(&mut self, to: NaiveDateTime) {
        if self.0.is_none_or(|last| to > last) {
            self.0 = Some(to);
        }
    }
}
