//! Simulated clock for the World Sim engine.
//!
//! The clock is the single source of truth for simulated time. It never
//! reads the wall clock and never moves backwards.
//!
//! # Invariants
//!
//! - `start <= current`, and `current <= end` whenever an end is set.
//! - `current` is monotonically non-decreasing.
//! - While paused, every advancing operation is a no-op.
//! - No operation fails: out-of-range targets are ignored and anything that
//!   would overshoot `end` is clamped to it.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime, TimeDelta};
use serde::{Deserialize, Serialize};
use tracing::warn;
use worldsim_types::{ClockState, SimulationId};

/// Tick length used when a granularity string is not recognised.
const DEFAULT_TICK_MINUTES: i64 = 15;

/// Supported tick sizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TickGranularity {
    /// `"1m"`
    OneMinute,
    /// `"5m"`
    FiveMinutes,
    /// `"15m"`
    FifteenMinutes,
    /// `"30m"`
    ThirtyMinutes,
    /// `"1h"`
    OneHour,
    /// `"2h"`
    TwoHours,
    /// `"4h"`
    FourHours,
    /// `"6h"`
    SixHours,
    /// `"12h"`
    TwelveHours,
    /// `"1d"`
    OneDay,
}

impl TickGranularity {
    /// Every granularity, shortest first.
    pub const ALL: [Self; 10] = [
        Self::OneMinute,
        Self::FiveMinutes,
        Self::FifteenMinutes,
        Self::ThirtyMinutes,
        Self::OneHour,
        Self::TwoHours,
        Self::FourHours,
        Self::SixHours,
        Self::TwelveHours,
        Self::OneDay,
    ];

    /// Parse a granularity string. Unknown strings fall back to 15 minutes.
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        Self::ALL
            .into_iter()
            .find(|g| g.as_str() == raw)
            .unwrap_or_else(|| {
                warn!(granularity = raw, "Unknown tick granularity, using 15m");
                Self::FifteenMinutes
            })
    }

    /// Canonical string form.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::OneMinute => "1m",
            Self::FiveMinutes => "5m",
            Self::FifteenMinutes => "15m",
            Self::ThirtyMinutes => "30m",
            Self::OneHour => "1h",
            Self::TwoHours => "2h",
            Self::FourHours => "4h",
            Self::SixHours => "6h",
            Self::TwelveHours => "12h",
            Self::OneDay => "1d",
        }
    }

    /// Length of one tick.
    pub const fn delta(self) -> TimeDelta {
        match self {
            Self::OneMinute => TimeDelta::minutes(1),
            Self::FiveMinutes => TimeDelta::minutes(5),
            Self::FifteenMinutes => TimeDelta::minutes(15),
            Self::ThirtyMinutes => TimeDelta::minutes(30),
            Self::OneHour => TimeDelta::hours(1),
            Self::TwoHours => TimeDelta::hours(2),
            Self::FourHours => TimeDelta::hours(4),
            Self::SixHours => TimeDelta::hours(6),
            Self::TwelveHours => TimeDelta::hours(12),
            Self::OneDay => TimeDelta::days(1),
        }
    }
}

/// The half-open interval `[start, end)` covered by one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickWindow {
    /// Inclusive lower bound.
    pub start: NaiveDateTime,
    /// Exclusive upper bound.
    pub end: NaiveDateTime,
}

impl TickWindow {
    /// Whether `t` falls inside the window.
    pub fn contains(&self, t: NaiveDateTime) -> bool {
        self.start <= t && t < self.end
    }
}

/// Simulated time: start, current instant, tick size, optional end, pause.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulationClock {
    start: NaiveDateTime,
    current: NaiveDateTime,
    tick: TimeDelta,
    end: Option<NaiveDateTime>,
    paused: bool,
}

impl SimulationClock {
    /// Create a clock at `start`.
    ///
    /// A non-positive tick falls back to 15 minutes; an end before `start`
    /// is dropped.
    pub fn new(start: NaiveDateTime, tick: TimeDelta, end: Option<NaiveDateTime>) -> Self {
        let mut clock = Self {
            start,
            current: start,
            tick: default_tick(),
            end: None,
            paused: false,
        };
        clock.initialize(start, tick, end);
        clock
    }

    /// Create a clock from a granularity string such as `"15m"`.
    pub fn with_granularity(
        start: NaiveDateTime,
        granularity: &str,
        end: Option<NaiveDateTime>,
    ) -> Self {
        Self::new(start, TickGranularity::parse(granularity).delta(), end)
    }

    /// Reset to `start` with a new tick size.
    ///
    /// Passing `end = None` keeps the end the clock already had, so changing
    /// granularity never drops a run's deadline. An end that would precede
    /// `start` is dropped.
    pub fn initialize(&mut self, start: NaiveDateTime, tick: TimeDelta, end: Option<NaiveDateTime>) {
        self.tick = if tick > TimeDelta::zero() {
            tick
        } else {
            warn!(tick_seconds = tick.num_seconds(), "Non-positive tick size, using 15m");
            default_tick()
        };
        self.start = start;
        self.current = start;
        let end = end.or(self.end);
        self.end = match end {
            Some(end) if end < start => {
                warn!(%start, %end, "Clock end precedes start, dropping end");
                None
            }
            other => other,
        };
    }

    /// Move forward by one tick, clamped to `end`. No-op while paused.
    /// Returns the (possibly unchanged) current time.
    pub fn advance_tick(&mut self) -> NaiveDateTime {
        if !self.paused {
            let next = self.current.checked_add_signed(self.tick).unwrap_or(self.current);
            self.current = self.clamp(next);
        }
        self.current
    }

    /// Jump forward to `target`, clamped to `end`. Targets in the past and
    /// calls while paused are ignored. Returns the current time.
    pub fn advance_to(&mut self, target: NaiveDateTime) -> NaiveDateTime {
        if !self.paused && target > self.current {
            self.current = self.clamp(target);
        }
        self.current
    }

    fn clamp(&self, t: NaiveDateTime) -> NaiveDateTime {
        match self.end {
            Some(end) if t > end => end,
            _ => t,
        }
    }

    /// True when the end has been reached or the current tick is the last
    /// one of the calendar day.
    pub fn is_end_of_day(&self) -> bool {
        if self.end.is_some_and(|end| self.current >= end) {
            return true;
        }
        self.current
            .checked_add_signed(self.tick)
            .is_none_or(|next| next.date() != self.current.date())
    }

    /// Whether the end has been reached.
    pub fn is_finished(&self) -> bool {
        self.end.is_some_and(|end| self.current >= end)
    }

    /// Stop time.
    pub const fn pause(&mut self) {
        self.paused = true;
    }

    /// Let time move again.
    pub const fn resume(&mut self) {
        self.paused = false;
    }

    /// Whether time is stopped.
    pub const fn is_paused(&self) -> bool {
        self.paused
    }

    /// Move back to the start. The only operation that decreases `current`.
    pub const fn reset_to_start(&mut self) {
        self.current = self.start;
    }

    /// Simulated now.
    pub const fn current(&self) -> NaiveDateTime {
        self.current
    }

    /// Simulated start of the run.
    pub const fn start(&self) -> NaiveDateTime {
        self.start
    }

    /// Optional end of the run.
    pub const fn end(&self) -> Option<NaiveDateTime> {
        self.end
    }

    /// Length of one tick.
    pub const fn tick_size(&self) -> TimeDelta {
        self.tick
    }

    /// Simulated time elapsed since the start.
    pub fn elapsed(&self) -> TimeDelta {
        self.current.signed_duration_since(self.start)
    }

    /// The window the current tick covers: `[current, current + tick)`.
    pub fn tick_window(&self) -> TickWindow {
        TickWindow {
            start: self.current,
            end: self
                .current
                .checked_add_signed(self.tick)
                .unwrap_or(NaiveDateTime::MAX),
        }
    }

    /// Midnight at the start of the current day.
    pub fn day_start(&self) -> NaiveDateTime {
        self.current.date().and_time(NaiveTime::MIN)
    }

    /// The last representable instant of the current day.
    pub fn day_end(&self) -> NaiveDateTime {
        let last = NaiveTime::from_hms_micro_opt(23, 59, 59, 999_999).unwrap_or(NaiveTime::MIN);
        self.current.date().and_time(last)
    }

    /// The calendar date of the current time.
    pub fn date(&self) -> NaiveDate {
        self.current.date()
    }

    /// Persistable snapshot of this clock.
    pub fn state(&self, simulation_id: SimulationId) -> ClockState {
        ClockState {
            simulation_id,
            start: self.start,
            current: self.current,
            end: self.end,
            tick_seconds: self.tick.num_seconds(),
            paused: self.paused,
        }
    }

    /// Rebuild a clock from a persisted snapshot.
    ///
    /// A stored `current` outside `[start, end]` is clamped back inside.
    pub fn from_state(state: &ClockState) -> Self {
        let tick = TimeDelta::try_seconds(state.tick_seconds).unwrap_or_else(default_tick);
        let mut clock = Self::new(state.start, tick, state.end);
        clock.current = clock.clamp(state.current.max(state.start));
        clock.paused = state.paused;
        clock
    }

    /// Resume a run from a persisted snapshot.
    ///
    /// The stored end is kept unless the caller supplies a new one.
    pub fn resume_from(stored: &ClockState, new_end: Option<NaiveDateTime>) -> Self {
        let mut clock = Self::from_state(stored);
        if let Some(end) = new_end {
            if end >= clock.current {
                clock.end = Some(end);
            } else {
                warn!(%end, current = %clock.current, "New end precedes current time, keeping stored end");
            }
        }
        clock
    }
}

const fn default_tick() -> TimeDelta {
    TimeDelta::minutes(DEFAULT_TICK_MINUTES)
}
