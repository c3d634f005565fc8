//! Plan-to-schedule conversion.
//!
//! Agents plan their day as an ordered list of [`PlanStep`]s with
//! human-readable times (`"09:30 AM"`, or the compact `"0930 AM"`). This
//! module turns such a plan into [`ScheduledEvent`]s for the scheduler.
//!
//! Conversion never fails. A time that does not parse is replaced with the
//! configured default and reported in [`PlanConversion::substitutions`];
//! a step that would happen before the agent wakes up is moved to just
//! after wake-up, staggered by its index so moved steps keep their order.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime, TimeDelta};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::warn;
use worldsim_types::{ActionParameters, AgentId, ParamLimits, PlanStep, ScheduledEvent};

/// Minimum gap between consecutive events before validation warns.
const MIN_GAP_MINUTES: i64 = 5;

/// Maximum span of a single day's schedule.
const MAX_SPAN_HOURS: i64 = 24;

/// Earliest and latest wake-up hour.
const WAKE_HOUR_MIN: u32 = 4;
const WAKE_HOUR_MAX: u32 = 10;

/// The time used when a plan step's time does not parse: 09:00.
pub fn fallback_time() -> NaiveTime {
    NaiveTime::from_hms_opt(9, 0, 0).unwrap_or(NaiveTime::MIN)
}

/// Knobs for [`convert_plan`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlanSettings {
    /// Time substituted for unparseable step times.
    pub default_time: NaiveTime,
    /// Gap between wake-up and the first moved step.
    pub wake_buffer: TimeDelta,
    /// Extra offset per step index for moved steps.
    pub stagger: TimeDelta,
    /// Bounds applied to raw step parameters.
    pub limits: ParamLimits,
}

impl Default for PlanSettings {
    fn default() -> Self {
        Self {
            default_time: fallback_time(),
            wake_buffer: TimeDelta::minutes(15),
            stagger: TimeDelta::minutes(5),
            limits: ParamLimits::default(),
        }
    }
}

/// A parsed plan time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedTime {
    /// The resulting instant on the base date.
    pub time: NaiveDateTime,
    /// Whether the default time had to be substituted.
    pub substituted: bool,
}

/// Parse `"HH:MM AM"`, `"H:MM PM"`, compact `"HHMM AM"` or 24-hour
/// `"HH:MM"` on `base_date`. Anything else yields `default` with
/// `substituted` set.
pub fn parse_time_string(raw: &str, base_date: NaiveDate, default: NaiveTime) -> ParsedTime {
    let normalized = normalize_time(raw);
    let parsed = NaiveTime::parse_from_str(&normalized, "%I:%M %p")
        .or_else(|_| NaiveTime::parse_from_str(&normalized, "%H:%M"));
    match parsed {
        Ok(time) => ParsedTime {
            time: base_date.and_time(time),
            substituted: false,
        },
        Err(_) => ParsedTime {
            time: base_date.and_time(default),
            substituted: true,
        },
    }
}

/// Upper-case, trim, and insert the colon into compact `"HHMM AM"` times.
fn normalize_time(raw: &str) -> String {
    let upper = raw.trim().to_ascii_uppercase();
    let Some((clock, meridiem)) = ["AM", "PM"]
        .iter()
        .find_map(|m| upper.strip_suffix(m).map(|clock| (clock.trim(), *m)))
    else {
        return upper;
    };
    let compact = !clock.contains(':')
        && (3..=4).contains(&clock.len())
        && clock.bytes().all(|b| b.is_ascii_digit());
    if !compact {
        return format!("{clock} {meridiem}");
    }
    clock
        .len()
        .checked_sub(2)
        .and_then(|split| clock.split_at_checked(split))
        .map_or_else(
            || format!("{clock} {meridiem}"),
            |(hours, minutes)| format!("{hours}:{minutes} {meridiem}"),
        )
}

/// A step whose time was replaced with the default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSubstitution {
    /// Index of the step in the plan.
    pub step_index: usize,
    /// The time string that did not parse.
    pub raw: String,
}

/// Result of [`convert_plan`].
#[derive(Debug, Clone, PartialEq)]
pub struct PlanConversion {
    /// One event per plan step, in plan order.
    pub events: Vec<ScheduledEvent>,
    /// Steps whose time did not parse.
    pub substitutions: Vec<TimeSubstitution>,
    /// Indices of steps moved to after wake-up.
    pub shifted: Vec<usize>,
    /// Indices of steps whose parameters were clipped.
    pub clipped: Vec<usize>,
}

/// Convert an agent's plan into scheduled events on `base_date`.
///
/// Step `i` gets priority `i`. When `wake` is given, a step due before it
/// is moved to `wake + wake_buffer + stagger * i`.
pub fn convert_plan(
    agent_id: &AgentId,
    steps: &[PlanStep],
    base_date: NaiveDate,
    wake: Option<NaiveDateTime>,
    settings: &PlanSettings,
) -> PlanConversion {
    let mut conversion = PlanConversion {
        events: Vec::with_capacity(steps.len()),
        substitutions: Vec::new(),
        shifted: Vec::new(),
        clipped: Vec::new(),
    };

    for (index, step) in steps.iter().enumerate() {
        let parsed = parse_time_string(&step.target_time, base_date, settings.default_time);
        if parsed.substituted {
            warn!(
                agent_id = %agent_id,
                step = index,
                raw = %step.target_time,
                substituted = %parsed.time,
                "Unparseable plan time, using default"
            );
            conversion.substitutions.push(TimeSubstitution {
                step_index: index,
                raw: step.target_time.clone(),
            });
        }

        let mut due_time = parsed.time;
        if let Some(wake) = wake.filter(|wake| due_time < *wake) {
            due_time = after_wake(wake, index, settings);
            conversion.shifted.push(index);
        }

        let action = ActionParameters::from_raw(&step.action, &step.parameters, &settings.limits);
        if action.clipped {
            warn!(agent_id = %agent_id, step = index, action = %step.action, "Action parameters clipped");
            conversion.clipped.push(index);
        }

        conversion.events.push(ScheduledEvent {
            due_time,
            agent_id: agent_id.clone(),
            action_name: step.action.clone(),
            action: action.params,
            location: step.location.clone(),
            priority: i64::try_from(index).unwrap_or(i64::MAX),
        });
    }

    conversion
}

fn after_wake(wake: NaiveDateTime, index: usize, settings: &PlanSettings) -> NaiveDateTime {
    let stagger = i32::try_from(index)
        .ok()
        .and_then(|i| settings.stagger.checked_mul(i))
        .unwrap_or(TimeDelta::zero());
    settings
        .wake_buffer
        .checked_add(&stagger)
        .and_then(|offset| wake.checked_add_signed(offset))
        .unwrap_or(wake)
}

/// Findings of [`validate_schedule`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleValidation {
    /// Suspicious but acceptable.
    pub warnings: Vec<String>,
    /// The schedule should not be run as is.
    pub errors: Vec<String>,
}

impl ScheduleValidation {
    /// Whether there are no errors.
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Sanity-check one agent's day: warns about events packed closer than five
/// minutes, errors on an empty schedule or one spanning more than a day.
pub fn validate_schedule(events: &[ScheduledEvent]) -> ScheduleValidation {
    let mut validation = ScheduleValidation::default();
    let mut sorted: Vec<&ScheduledEvent> = events.iter().collect();
    sorted.sort_by_key(|e| e.order_key());

    let (Some(first), Some(last)) = (sorted.first(), sorted.last()) else {
        validation.errors.push("schedule is empty".to_owned());
        return validation;
    };

    for pair in sorted.windows(2) {
        if let [a, b] = pair {
            let gap = b.due_time.signed_duration_since(a.due_time);
            if gap < TimeDelta::minutes(MIN_GAP_MINUTES) {
                validation.warnings.push(format!(
                    "{} at {} and {} at {} are less than {MIN_GAP_MINUTES} minutes apart",
                    a.action_name, a.due_time, b.action_name, b.due_time
                ));
            }
        }
    }

    let span = last.due_time.signed_duration_since(first.due_time);
    if span > TimeDelta::hours(MAX_SPAN_HOURS) {
        validation.errors.push(format!(
            "schedule spans {} hours, more than {MAX_SPAN_HOURS}",
            span.num_hours()
        ));
    }

    validation
}

/// A plausible wake-up time for an agent of `age` on `date`.
///
/// Children wake between 07:00 and 09:00, young adults between 06:00 and
/// 08:00, everyone else between 05:00 and 07:00; one hour of jitter either
/// way is added and the result is kept within 04:00..=10:00. Minutes are a
/// random quarter hour.
pub fn generate_wake_time<R: Rng + ?Sized>(age: u32, date: NaiveDate, rng: &mut R) -> NaiveDateTime {
    let base: u32 = match age {
        0..18 => rng.random_range(7..=9),
        18..30 => rng.random_range(6..=8),
        _ => rng.random_range(5..=7),
    };
    let jitter: i32 = rng.random_range(-1..=1);
    let hour = base
        .saturating_add_signed(jitter)
        .clamp(WAKE_HOUR_MIN, WAKE_HOUR_MAX);
    let minute = rng.random_range(0..4_u32).saturating_mul(15);
    let time = NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or_else(fallback_time);
    date.and_time(time)
}
