//! Rotating timestamp slots
//!
//! `MultiRotate` manages a fixed-size ring of timestamps and refreshes at
//! most one slot per update, once the slot under the cursor has outlived the
//! rotation period. Consumers key derived secrets off individual slots, so
//! refreshing a single slot at a time keeps the other generations valid
//! while they age out.
//!
//! A period of `n` days is exactly `n * 24` hours. Expiry is strict: a slot
//! refreshed at `t` with period `p` expires only once the clock passes
//! `t + p`, never at `t + p` itself.

use async_trait::async_trait;
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{WindlassError, WindlassResult};
use crate::provider::{
    CheckFailure, CheckResult, CreateResult, DiffResult, ResourceProvider, UpdateResult,
};

const INVALID_REASON: &str = "Must be a positive integer";

/// Declared inputs after defaulting: how many slots to keep and how long a
/// slot stays fresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RotationInputs {
    pub count: u32,
    pub rotation_period_days: u32,
}

impl Default for RotationInputs {
    fn default() -> Self {
        Self {
            count: 1,
            rotation_period_days: 60,
        }
    }
}

/// Durable rotation state, recorded as resource outputs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RotationState {
    pub index: usize,
    pub rotation_period_days: u32,
    pub timestamps: Vec<DateTime<Utc>>,
    pub current_timestamp: DateTime<Utc>,
}

/// Previously recorded outputs. Every field is optional so state written by
/// an older output layout still deserializes; diff treats any gap as a
/// reason to update.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ObservedState {
    index: Option<usize>,
    rotation_period_days: Option<u32>,
    timestamps: Option<Vec<DateTime<Utc>>>,
    current_timestamp: Option<DateTime<Utc>>,
}

/// Provider for a ring of rotating timestamps.
pub struct MultiRotate;

#[async_trait]
impl ResourceProvider for MultiRotate {
    async fn check(&self, _olds: Value, news: Value) -> CheckResult {
        check_inputs(news)
    }

    async fn create(&self, inputs: Value) -> WindlassResult<CreateResult> {
        let inputs = parse_inputs(&inputs)?;
        create_at(&inputs, Utc::now())
    }

    async fn diff(&self, _id: &str, olds: Value, news: Value) -> WindlassResult<DiffResult> {
        // Foreign or corrupt outputs may not even be an object; they read as
        // fully missing state, which diff reports as changed and update
        // rebuilds from scratch.
        let observed: ObservedState = serde_json::from_value(olds).unwrap_or_default();
        let desired = parse_inputs(&news)?;
        Ok(diff_at(&observed, &desired, Utc::now()))
    }

    async fn update(&self, _id: &str, olds: Value, news: Value) -> WindlassResult<UpdateResult> {
        let observed: ObservedState = serde_json::from_value(olds).unwrap_or_default();
        let desired = parse_inputs(&news)?;
        let state = update_at(&observed, &desired, Utc::now());
        Ok(UpdateResult {
            outs: serde_json::to_value(state)?,
        })
    }
}

/// Validate raw inputs. Missing properties get their defaults; present but
/// invalid values are kept as given and reported as failures.
fn check_inputs(news: Value) -> CheckResult {
    let mut inputs = match news {
        Value::Object(map) => map,
        _ => Map::new(),
    };

    let mut failures = Vec::new();
    for (property, default) in [("count", 1u64), ("rotationPeriodDays", 60u64)] {
        match inputs.get(property) {
            None => {
                inputs.insert(property.to_string(), Value::from(default));
            }
            Some(value) if as_positive_integer(value).is_none() => {
                failures.push(CheckFailure {
                    property: property.to_string(),
                    reason: INVALID_REASON.to_string(),
                });
            }
            Some(_) => {}
        }
    }

    CheckResult {
        inputs: Value::Object(inputs),
        failures,
    }
}

/// Parse checked inputs. Operations past check treat bad values as a
/// contract violation.
fn parse_inputs(inputs: &Value) -> WindlassResult<RotationInputs> {
    let field = |property: &str, default: u64| -> WindlassResult<u32> {
        let value = match inputs.get(property) {
            None => default,
            Some(raw) => as_positive_integer(raw).ok_or_else(|| {
                WindlassError::Provider(format!("{}: {}, got {}", property, INVALID_REASON, raw))
            })?,
        };
        u32::try_from(value)
            .map_err(|_| WindlassError::Provider(format!("{} is out of range: {}", property, value)))
    };

    Ok(RotationInputs {
        count: field("count", 1)?,
        rotation_period_days: field("rotationPeriodDays", 60)?,
    })
}

/// Positive integer in the JSON sense: integral floats count, so `2.0`
/// passes where `2.5`, `0`, and `"2"` do not.
fn as_positive_integer(value: &Value) -> Option<u64> {
    if let Some(n) = value.as_u64() {
        return (n >= 1).then_some(n);
    }
    let f = value.as_f64()?;
    (f.fract() == 0.0 && f >= 1.0 && f <= u64::MAX as f64).then_some(f as u64)
}

fn create_at(inputs: &RotationInputs, now: DateTime<Utc>) -> WindlassResult<CreateResult> {
    let state = RotationState {
        index: 0,
        rotation_period_days: inputs.rotation_period_days,
        timestamps: vec![now; inputs.count as usize],
        current_timestamp: now,
    };
    debug!("Created rotation with {} slots", inputs.count);
    Ok(CreateResult {
        id: now.to_rfc3339_opts(SecondsFormat::Millis, true),
        outs: serde_json::to_value(state)?,
    })
}

/// An update is needed when any recorded output is missing, when the slot
/// count no longer matches, or when the cursor slot has expired under the
/// period it was recorded with.
fn diff_at(observed: &ObservedState, desired: &RotationInputs, now: DateTime<Utc>) -> DiffResult {
    let ObservedState {
        index: Some(index),
        rotation_period_days: Some(period),
        timestamps: Some(timestamps),
        current_timestamp: Some(_),
    } = observed
    else {
        return DiffResult { changes: true };
    };

    if timestamps.len() != desired.count as usize {
        return DiffResult { changes: true };
    }

    let changes = match timestamps.get(*index) {
        Some(refreshed) => is_expired(now, *refreshed, *period),
        None => true,
    };
    DiffResult { changes }
}

/// Reconcile to the desired inputs: apply the declared period, grow the ring
/// with fresh slots, shrink it from the tail, then refresh at most one
/// expired slot.
///
/// Requires `desired.count >= 1`, which parse_inputs enforces.
fn update_at(
    observed: &ObservedState,
    desired: &RotationInputs,
    now: DateTime<Utc>,
) -> RotationState {
    let period = desired.rotation_period_days;
    let count = desired.count as usize;

    let mut timestamps = observed.timestamps.clone().unwrap_or_default();
    let mut index = observed.index.unwrap_or(0);

    while timestamps.len() < count {
        timestamps.push(now);
    }
    timestamps.truncate(count);
    if index >= timestamps.len() {
        index %= timestamps.len();
    }

    if is_expired(now, timestamps[index], period) {
        index = (index + 1) % timestamps.len();
        debug!("Slot expired, rotating cursor to {}", index);
        timestamps[index] = now;
    }

    let current_timestamp = timestamps[index];
    RotationState {
        index,
        rotation_period_days: period,
        timestamps,
        current_timestamp,
    }
}

fn is_expired(now: DateTime<Utc>, refreshed: DateTime<Utc>, period_days: u32) -> bool {
    // Periods too large to represent as an instant never expire.
    match refreshed.checked_add_signed(Duration::days(i64::from(period_days))) {
        Some(expiry) => now > expiry,
        None => false,
    }
}
