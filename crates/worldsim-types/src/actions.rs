//! Typed action parameters for scheduled agent actions.
//!
//! Planners hand the engine an action name plus an open string-keyed map.
//! [`ActionParameters::from_raw`] turns that pair into a tagged variant for
//! every action the engine knows, and falls back to
//! [`ActionParameters::Generic`] for anything else (or for a known action
//! whose parameters do not parse). Parsing never fails; oversized or
//! garbled input is clipped to [`ParamLimits`] first.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use ts_rs::TS;

use crate::ids::{AgentId, FirmId, PlaceId};

/// Action-name prefix for direct messages; the remainder is the channel id.
pub const DIRECT_MESSAGE_PREFIX: &str = "dm_on_";

/// Nesting depth beyond which parameter values are replaced with `null`.
const MAX_VALUE_DEPTH: usize = 8;

/// Bounds applied to raw action parameters before they are interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamLimits {
    /// Maximum number of top-level keys kept (in key order).
    pub max_params: usize,
    /// Maximum length, in characters, of any string value.
    pub max_string_len: usize,
}

impl Default for ParamLimits {
    fn default() -> Self {
        Self {
            max_params: 32,
            max_string_len: 1000,
        }
    }
}

/// Parameters of a scheduled action, one variant per known action name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(tag = "kind", rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum ActionParameters {
    /// `Travel`: move to another place.
    Travel {
        /// Destination place.
        to: PlaceId,
        /// Parameters the engine does not interpret, passed through as given.
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        #[ts(type = "Record<string, unknown>")]
        extra: BTreeMap<String, Value>,
    },
    /// `Exchange`: buy goods from a firm.
    Exchange {
        /// The selling firm.
        counterparty: FirmId,
        /// SKU to quantity requested.
        receive: BTreeMap<String, u32>,
        /// Uninterpreted parameters.
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        #[ts(type = "Record<string, unknown>")]
        extra: BTreeMap<String, Value>,
    },
    /// `Work`: a work shift.
    Work {
        /// Shift length in hours.
        duration_hours: u32,
        /// Uninterpreted parameters.
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        #[ts(type = "Record<string, unknown>")]
        extra: BTreeMap<String, Value>,
    },
    /// `MorningRoutine`: getting ready for the day.
    MorningRoutine {
        /// Routine length in minutes.
        duration_minutes: u32,
        /// Uninterpreted parameters.
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        #[ts(type = "Record<string, unknown>")]
        extra: BTreeMap<String, Value>,
    },
    /// `EveningRoutine`: winding down.
    EveningRoutine {
        /// Routine length in minutes.
        duration_minutes: u32,
        /// Uninterpreted parameters.
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        #[ts(type = "Record<string, unknown>")]
        extra: BTreeMap<String, Value>,
    },
    /// `Sleep`.
    Sleep {
        /// Sleep length in hours.
        duration_hours: u32,
        /// Uninterpreted parameters.
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        #[ts(type = "Record<string, unknown>")]
        extra: BTreeMap<String, Value>,
    },
    /// `dm_on_<channel>`: a direct message to another agent.
    DirectMessage {
        /// Channel the message is sent on (the part after `dm_on_`).
        channel: String,
        /// The receiving agent.
        recipient: AgentId,
        /// Optional message body.
        body: Option<String>,
        /// Uninterpreted parameters.
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        #[ts(type = "Record<string, unknown>")]
        extra: BTreeMap<String, Value>,
    },
    /// Anything the engine does not model explicitly.
    Generic {
        /// The (clipped) raw parameters.
        #[ts(type = "Record<string, unknown>")]
        params: BTreeMap<String, Value>,
    },
}

/// Result of interpreting raw action parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedAction {
    /// The interpreted parameters.
    pub params: ActionParameters,
    /// Whether the raw input had to be clipped to fit [`ParamLimits`].
    pub clipped: bool,
}

impl ActionParameters {
    /// Interpret `raw` parameters for the action called `action_name`.
    pub fn from_raw(
        action_name: &str,
        raw: &BTreeMap<String, Value>,
        limits: &ParamLimits,
    ) -> ParsedAction {
        let (params, clipped) = sanitize(raw, limits);
        let typed = match action_name {
            "Travel" => str_param(&params, "to").map(|to| Self::Travel {
                to: PlaceId::new(to),
                extra: leftover(&params, &["to"]),
            }),
            "Exchange" => str_param(&params, "counterparty").map(|firm| Self::Exchange {
                counterparty: FirmId::new(firm),
                receive: quantities(params.get("receive")),
                extra: leftover(&params, &["counterparty", "receive"]),
            }),
            "Work" => Some(Self::Work {
                duration_hours: u32_param(&params, "duration_hours").unwrap_or(8),
                extra: leftover(&params, &["duration_hours"]),
            }),
            "MorningRoutine" => Some(Self::MorningRoutine {
                duration_minutes: u32_param(&params, "duration_minutes").unwrap_or(45),
                extra: leftover(&params, &["duration_minutes"]),
            }),
            "EveningRoutine" => Some(Self::EveningRoutine {
                duration_minutes: u32_param(&params, "duration_minutes").unwrap_or(60),
                extra: leftover(&params, &["duration_minutes"]),
            }),
            "Sleep" => Some(Self::Sleep {
                duration_hours: u32_param(&params, "duration_hours").unwrap_or(8),
                extra: leftover(&params, &["duration_hours"]),
            }),
            other => other.strip_prefix(DIRECT_MESSAGE_PREFIX).and_then(|channel| {
                str_param(&params, "recipient_id").map(|recipient| Self::DirectMessage {
                    channel: channel.to_owned(),
                    recipient: AgentId::new(recipient),
                    body: str_param(&params, "message").map(str::to_owned),
                    extra: leftover(&params, &["recipient_id", "message"]),
                })
            }),
        };

        ParsedAction {
            params: typed.unwrap_or(Self::Generic { params }),
            clipped,
        }
    }

    /// Parameters carried along without interpretation. For `Generic` this is
    /// every parameter.
    pub const fn extra(&self) -> &BTreeMap<String, Value> {
        match self {
            Self::Travel { extra, .. }
            | Self::Exchange { extra, .. }
            | Self::Work { extra, .. }
            | Self::MorningRoutine { extra, .. }
            | Self::EveningRoutine { extra, .. }
            | Self::Sleep { extra, .. }
            | Self::DirectMessage { extra, .. } => extra,
            Self::Generic { params } => params,
        }
    }

    /// Short label of the variant, as used in the serialized `kind` tag.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Travel { .. } => "travel",
            Self::Exchange { .. } => "exchange",
            Self::Work { .. } => "work",
            Self::MorningRoutine { .. } => "morning_routine",
            Self::EveningRoutine { .. } => "evening_routine",
            Self::Sleep { .. } => "sleep",
            Self::DirectMessage { .. } => "direct_message",
            Self::Generic { .. } => "generic",
        }
    }
}

fn str_param<'a>(params: &'a BTreeMap<String, Value>, key: &str) -> Option<&'a str> {
    params
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
}

/// The parameters not named in `known`.
fn leftover(params: &BTreeMap<String, Value>, known: &[&str]) -> BTreeMap<String, Value> {
    params
        .iter()
        .filter(|(key, _)| !known.contains(&key.as_str()))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

fn u32_param(params: &BTreeMap<String, Value>, key: &str) -> Option<u32> {
    params
        .get(key)
        .and_then(Value::as_u64)
        .and_then(|n| u32::try_from(n).ok())
}

/// Read a `{sku: qty}` object, dropping entries whose quantity is not a
/// non-negative integer that fits in `u32`.
fn quantities(value: Option<&Value>) -> BTreeMap<String, u32> {
    value
        .and_then(Value::as_object)
        .map(|obj| {
            obj.iter()
                .filter_map(|(sku, qty)| {
                    let qty = qty.as_u64().and_then(|n| u32::try_from(n).ok())?;
                    Some((sku.clone(), qty))
                })
                .collect()
        })
        .unwrap_or_default()
}

fn sanitize(raw: &BTreeMap<String, Value>, limits: &ParamLimits) -> (BTreeMap<String, Value>, bool) {
    let mut clipped = raw.len() > limits.max_params;
    let params = raw
        .iter()
        .take(limits.max_params)
        .map(|(key, value)| {
            let (value, value_clipped) = clip_value(value, limits.max_string_len, 0);
            clipped |= value_clipped;
            (key.clone(), value)
        })
        .collect();
    (params, clipped)
}

fn clip_value(value: &Value, max_len: usize, depth: usize) -> (Value, bool) {
    if depth >= MAX_VALUE_DEPTH {
        return (Value::Null, true);
    }
    let next = depth.saturating_add(1);
    match value {
        Value::String(s) if s.chars().count() > max_len => {
            (Value::String(s.chars().take(max_len).collect()), true)
        }
        Value::Array(items) => {
            let mut clipped = false;
            let items = items
                .iter()
                .map(|item| {
                    let (item, c) = clip_value(item, max_len, next);
                    clipped |= c;
                    item
                })
                .collect();
            (Value::Array(items), clipped)
        }
        Value::Object(map) => {
            let mut clipped = false;
            let map = map
                .iter()
                .map(|(k, v)| {
                    let (v, c) = clip_value(v, max_len, next);
                    clipped |= c;
                    (k.clone(), v)
                })
                .collect();
            (Value::Object(map), clipped)
        }
        other => (other.clone(), false),
    }
}
