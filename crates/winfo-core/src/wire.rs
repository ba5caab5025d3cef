//! `window-metrics` wire schema and inbound validation.
//!
//! ```text
//! { "id": "<window id>", "cnt": <u32>, "metrics": { "x": .., "focus": .., ... } }
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::WireError;
use crate::types::{MetricField, MetricValue, Metrics, WindowId};

/// Message type used for every window snapshot or delta.
pub const WINDOW_METRICS: &str = "window-metrics";

/// One snapshot or delta about a window, as carried on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowMessage {
    pub id: WindowId,
    pub cnt: u32,
    pub metrics: Metrics,
}

impl WindowMessage {
    pub fn new(id: WindowId, cnt: u32, metrics: Metrics) -> Self {
        Self { id, cnt, metrics }
    }

    /// Encode for the wire. JSON has no NaN or infinity: a non-finite
    /// number is left out, so receivers see that field as unchanged.
    pub fn to_payload(&self) -> Value {
        let mut metrics = Map::new();
        for (field, value) in self.metrics.fields() {
            let json = match value {
                MetricValue::Number(n) => match serde_json::Number::from_f64(n) {
                    Some(n) => Value::Number(n),
                    None => continue,
                },
                MetricValue::Flag(b) => Value::Bool(b),
            };
            metrics.insert(field.as_str().to_owned(), json);
        }
        serde_json::json!({
            "id": self.id.as_str(),
            "cnt": self.cnt,
            "metrics": Value::Object(metrics),
        })
    }

    /// Validate and decode an inbound payload.
    ///
    /// Rules:
    /// - payload present and an object
    /// - `cnt` a JSON integer in `0..=u32::MAX` (floats, negatives, strings rejected)
    /// - `id` a non-empty string
    /// - `metrics` present and an object; known fields must carry the right
    ///   JSON kind, `null` counts as absent, unknown keys are ignored
    pub fn parse(payload: Option<&Value>) -> Result<Self, WireError> {
        let payload = payload.ok_or(WireError::MissingPayload)?;
        let obj = payload.as_object().ok_or(WireError::NotAnObject)?;

        let cnt = obj
            .get("cnt")
            .and_then(Value::as_u64)
            .and_then(|n| u32::try_from(n).ok())
            .ok_or(WireError::InvalidCount)?;

        let id = obj
            .get("id")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .ok_or(WireError::InvalidId)?;

        let raw = obj
            .get("metrics")
            .and_then(Value::as_object)
            .ok_or(WireError::InvalidMetrics)?;

        Ok(Self {
            id: WindowId::new(id),
            cnt,
            metrics: parse_metrics(raw)?,
        })
    }
}

fn parse_metrics(raw: &Map<String, Value>) -> Result<Metrics, WireError> {
    let mut metrics = Metrics::new();
    for field in MetricField::ALL {
        let Some(value) = raw.get(field.as_str()) else {
            continue;
        };
        if value.is_null() {
            continue;
        }
        let decoded = if field.is_flag() {
            value.as_bool().map(MetricValue::Flag)
        } else {
            value.as_f64().map(MetricValue::Number)
        };
        let decoded = decoded.ok_or(WireError::InvalidField {
            field: field.as_str(),
        })?;
        metrics.set(field, decoded);
    }
    Ok(metrics)
}

// ─── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_partial_message() {
        let payload = json!({ "id": "w2", "cnt": 1, "metrics": { "x": 10 } });
        let msg = WindowMessage::parse(Some(&payload)).unwrap();
        assert_eq!(msg.id.as_str(), "w2");
        assert_eq!(msg.cnt, 1);
        assert_eq!(msg.metrics.x, Some(10.0));
        assert_eq!(msg.metrics.len(), 1);
    }

    #[test]
    fn rejects_missing_payload() {
        assert_eq!(WindowMessage::parse(None), Err(WireError::MissingPayload));
        assert_eq!(
            WindowMessage::parse(Some(&json!("hello"))),
            Err(WireError::NotAnObject)
        );
    }

    #[test]
    fn rejects_malformed_count() {
        for cnt in [json!(-1), json!(1.5), json!("2"), json!(null)] {
            let payload = json!({ "id": "w", "cnt": cnt, "metrics": {} });
            assert_eq!(
                WindowMessage::parse(Some(&payload)),
                Err(WireError::InvalidCount),
                "cnt = {cnt}"
            );
        }
        let missing = json!({ "id": "w", "metrics": {} });
        assert_eq!(
            WindowMessage::parse(Some(&missing)),
            Err(WireError::InvalidCount)
        );
    }

    #[test]
    fn zero_count_is_well_formed() {
        let payload = json!({ "id": "w", "cnt": 0, "metrics": {} });
        assert_eq!(WindowMessage::parse(Some(&payload)).unwrap().cnt, 0);
    }

    #[test]
    fn rejects_bad_id() {
        for id in [json!(""), json!(7), json!(null)] {
            let payload = json!({ "id": id, "cnt": 1, "metrics": {} });
            assert_eq!(
                WindowMessage::parse(Some(&payload)),
                Err(WireError::InvalidId)
            );
        }
    }

    #[test]
    fn rejects_non_object_metrics() {
        for metrics in [json!([1, 2]), json!("x"), json!(null)] {
            let payload = json!({ "id": "w", "cnt": 1, "metrics": metrics });
            assert_eq!(
                WindowMessage::parse(Some(&payload)),
                Err(WireError::InvalidMetrics)
            );
        }
    }

    #[test]
    fn rejects_wrong_field_kind() {
        let payload = json!({ "id": "w", "cnt": 1, "metrics": { "focus": 1 } });
        assert_eq!(
            WindowMessage::parse(Some(&payload)),
            Err(WireError::InvalidField { field: "focus" })
        );
        let payload = json!({ "id": "w", "cnt": 1, "metrics": { "width": "wide" } });
        assert_eq!(
            WindowMessage::parse(Some(&payload)),
            Err(WireError::InvalidField { field: "width" })
        );
    }

    #[test]
    fn payload_carries_only_present_fields() {
        let metrics = Metrics {
            scrolly: Some(40.0),
            focus: Some(false),
            ..Metrics::default()
        };
        let msg = WindowMessage::new(WindowId::new("w1"), 2, metrics);
        assert_eq!(
            msg.to_payload(),
            json!({ "id": "w1", "cnt": 2, "metrics": { "scrolly": 40.0, "focus": false } })
        );
    }

    #[test]
    fn non_finite_numbers_are_left_out() {
        let metrics = Metrics {
            x: Some(f64::NAN),
            width: Some(f64::INFINITY),
            y: Some(5.0),
            ..Metrics::default()
        };
        let msg = WindowMessage::new(WindowId::new("w1"), 1, metrics);
        let payload = msg.to_payload();
        assert_eq!(payload["metrics"], json!({ "y": 5.0 }));

        let parsed = WindowMessage::parse(Some(&payload)).unwrap();
        assert_eq!(parsed.metrics.x, None);
        assert_eq!(parsed.metrics.width, None);
        assert_eq!(parsed.metrics.y, Some(5.0));
    }

    #[test]
    fn payload_parses_back() {
        let metrics = Metrics::new().with_focus(true).with_current(true);
        let msg = WindowMessage::new(WindowId::new("w1"), 1, metrics);
        let payload = msg.to_payload();
        assert_eq!(WindowMessage::parse(Some(&payload)).unwrap(), msg);
    }
}
