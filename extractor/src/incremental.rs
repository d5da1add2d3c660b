//! Incremental cursor tracking.
//!
//! An [`Incremental`] holds the watermark for one resource-run: seeded from
//! the configured `initial_value` or, when resuming, from the externally
//! persisted last-synced value (which takes precedence), advanced from
//! observed record fields as pages stream through, and read back by the
//! scheduler after the run for persistence.
//!
//! The watermark never regresses: an observed value only replaces
//! `last_value` when it compares strictly greater. Numbers compare
//! numerically, strings lexicographically (correct for ISO-8601
//! timestamps). Descending-order vendor APIs therefore cannot drag the
//! cursor backwards even if their paginator fails to stop early.

use crate::jsonpath::extract_value;
use serde_json::Value;
use std::cmp::Ordering;
use std::sync::Mutex;

/// Value transform applied when injecting the watermark into a request
/// parameter (e.g. render a unix epoch as the vendor's date format).
/// Connector modules pass these explicitly; they are never part of the
/// serialized configuration.
pub type ConvertFn = fn(&Value) -> Value;

pub struct Incremental {
    pub cursor_path: String,
    pub initial_value: Option<Value>,
    pub end_value: Option<Value>,
    last: Mutex<Option<Value>>,
}

impl Incremental {
    pub fn new(
        cursor_path: impl Into<String>,
        initial_value: Option<Value>,
        end_value: Option<Value>,
    ) -> Self {
        Self {
            cursor_path: cursor_path.into(),
            last: Mutex::new(initial_value.clone()),
            initial_value,
            end_value,
        }
    }

    /// Seed the run's starting watermark. The externally persisted value
    /// from the previous successful run wins over the configured
    /// `initial_value`.
    pub fn seed(&self, external_last_value: Option<Value>) {
        if let Some(value) = external_last_value {
            *self.last.lock().unwrap() = Some(value);
        }
    }

    /// Observe one record; advance the watermark if the cursor field is
    /// present, non-null and strictly newer.
    pub fn update(&self, record: &Value) {
        let observed = match extract_value(record, Some(&self.cursor_path)) {
            Some(Value::Null) | None => return,
            Some(value) => value,
        };

        let mut last = self.last.lock().unwrap();
        let advance = match last.as_ref() {
            None => true,
            Some(current) => matches!(compare_values(&observed, current), Some(Ordering::Greater)),
        };
        if advance {
            *last = Some(observed);
        }
    }

    /// The current watermark: the effective start value until records are
    /// observed, the newest observed cursor afterwards.
    pub fn last_value(&self) -> Option<Value> {
        self.last.lock().unwrap().clone()
    }
}

/// Order two JSON scalars of the same shape; `None` when they are not
/// comparable.
pub fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(a), Value::Number(b)) => a.as_f64().partial_cmp(&b.as_f64()),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        _ => None,
    }
}
