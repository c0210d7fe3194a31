//! Core data models for the assistant pipeline
//!
//! Upstream telemetry arrives loosely structured (Google Calendar events,
//! Google Fit heart-rate points). Parsing here is deliberately lenient: a
//! malformed event or reading degrades to "absent", it never fails the
//! request.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Feature names in the order the stress model was trained on
pub const CANONICAL_FEATURE_ORDER: [&str; 5] = [
    "Sleep_Duration",
    "Calendar_Busy_Hours",
    "HeartRate_Avg",
    "Steps_Last_24h",
    "Urgent_Emails_Flag",
];

/// Raw telemetry for one user, fetched once per request
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RawTelemetry {
    pub calendar_events: Vec<CalendarEvent>,
    pub heart_rate_samples: Vec<HeartRateSample>,
}

impl RawTelemetry {
    /// Build telemetry from the integrations aggregate document.
    ///
    /// Missing arrays are treated as empty, and entries that are not JSON
    /// objects are dropped.
    pub fn from_value(document: &Value) -> Self {
        let calendar_events = document
            .get("calendar_events")
            .and_then(Value::as_array)
            .map(|events| events.iter().filter_map(CalendarEvent::from_value).collect())
            .unwrap_or_default();

        let heart_rate_samples = document
            .get("heart_rate_data")
            .and_then(Value::as_array)
            .map(|points| points.iter().map(HeartRateSample::from_value).collect())
            .unwrap_or_default();

        Self {
            calendar_events,
            heart_rate_samples,
        }
    }
}

/// One bound (start or end) of a calendar event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EventBound {
    pub at: DateTime<Utc>,
    /// Date-only bound (`{"date": "YYYY-MM-DD"}`), pinned to midnight UTC
    pub all_day: bool,
}

impl EventBound {
    /// Parse a `{"dateTime": ...}` or `{"date": ...}` object.
    ///
    /// `dateTime` takes precedence; an empty `dateTime` falls through to `date`.
    pub fn from_value(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        let non_empty = |key: &str| {
            obj.get(key)
                .and_then(Value::as_str)
                .filter(|s| !s.trim().is_empty())
        };

        if let Some(raw) = non_empty("dateTime") {
            return parse_date_time(raw).map(|at| Self { at, all_day: false });
        }
        non_empty("date")
            .and_then(parse_date)
            .map(|at| Self { at, all_day: true })
    }
}

fn parse_date_time(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    // Offset-less timestamps are read as UTC
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Calendar event as seen by the feature extractor
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CalendarEvent {
    pub start: Option<EventBound>,
    pub end: Option<EventBound>,
    pub summary: String,
    pub description: String,
}

impl CalendarEvent {
    pub fn from_value(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        let text = |key: &str| {
            obj.get(key)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };

        Some(Self {
            start: obj.get("start").and_then(EventBound::from_value),
            end: obj.get("end").and_then(EventBound::from_value),
            summary: text("summary"),
            description: text("description"),
        })
    }
}

/// Heart-rate readings from one fitness data point
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HeartRateSample {
    pub readings: Vec<f64>,
}

impl HeartRateSample {
    /// Collect `fpVal`/`intVal` readings nested under `value`.
    ///
    /// `fpVal` wins when a reading carries both; readings with neither
    /// numeric field are skipped.
    pub fn from_value(value: &Value) -> Self {
        let readings = value
            .get("value")
            .and_then(Value::as_array)
            .map(|entries| entries.iter().filter_map(reading_value).collect())
            .unwrap_or_default();
        Self { readings }
    }
}

fn reading_value(entry: &Value) -> Option<f64> {
    if let Some(fp) = entry.get("fpVal").and_then(Value::as_f64) {
        return Some(fp);
    }
    let int_val = match entry.get("intVal")? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    int_val.filter(|v| v.is_finite())
}

/// Feature vector consumed by the stress model
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    #[serde(rename = "Sleep_Duration")]
    pub sleep_duration: f64,
    #[serde(rename = "Calendar_Busy_Hours")]
    pub calendar_busy_hours: f64,
    #[serde(rename = "HeartRate_Avg")]
    pub heart_rate_avg: f64,
    #[serde(rename = "Steps_Last_24h")]
    pub steps_last_24h: f64,
    #[serde(rename = "Urgent_Emails_Flag")]
    pub urgent_emails_flag: f64,
}

impl FeatureVector {
    /// Values in [`CANONICAL_FEATURE_ORDER`]
    pub fn to_array(&self) -> [f64; 5] {
        [
            self.sleep_duration,
            self.calendar_busy_hours,
            self.heart_rate_avg,
            self.steps_last_24h,
            self.urgent_emails_flag,
        ]
    }

    /// Look up a feature by canonical name or by its training-schema alias
    /// (`Heart_Rate`, `Daily_Steps`)
    pub fn get(&self, name: &str) -> Option<f64> {
        match name {
            "Sleep_Duration" => Some(self.sleep_duration),
            "Calendar_Busy_Hours" => Some(self.calendar_busy_hours),
            "HeartRate_Avg" | "Heart_Rate" => Some(self.heart_rate_avg),
            "Steps_Last_24h" | "Daily_Steps" => Some(self.steps_last_24h),
            "Urgent_Emails_Flag" => Some(self.urgent_emails_flag),
            _ => None,
        }
    }
}

/// Intervention kinds understood by the actions service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    CreateBreakEvent,
    DraftEmail,
    SendSlackNotification,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::CreateBreakEvent => "create_break_event",
            ActionKind::DraftEmail => "draft_email",
            ActionKind::SendSlackNotification => "send_slack_notification",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Concrete intervention chosen from a stress level
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionDirective {
    pub action: ActionKind,
    #[serde(default)]
    pub details: Map<String, Value>,
}

impl ActionDirective {
    /// Attach the caller's token, producing the dispatch payload
    pub fn into_request(self, user_token: impl Into<String>) -> ActionRequest {
        ActionRequest {
            action: self.action,
            details: self.details,
            user_token: user_token.into(),
        }
    }
}

/// Payload accepted by the actions service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRequest {
    pub action: ActionKind,
    pub details: Map<String, Value>,
    pub user_token: String,
}

/// Opaque response from the actions service, passed through unmodified
pub type ActionOutcome = Value;

/// Result of one pipeline invocation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Recommendation {
    pub directive: ActionDirective,
    /// Stress level as produced by the model, before clamping
    pub stress_level: i64,
    pub features: FeatureVector,
    pub outcome: ActionOutcome,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_bound_prefers_date_time() {
        let bound = EventBound::from_value(&json!({
            "dateTime": "2024-03-01T09:30:00Z",
            "date": "2024-02-01"
        }))
        .unwrap();
        assert!(!bound.all_day);
        assert_eq!(bound.at.to_rfc3339(), "2024-03-01T09:30:00+00:00");
    }

    #[test]
    fn test_event_bound_honours_offsets_and_dates() {
        let offset = EventBound::from_value(&json!({"dateTime": "2024-03-01T09:30:00+02:00"})).unwrap();
        assert_eq!(offset.at.to_rfc3339(), "2024-03-01T07:30:00+00:00");

        let date = EventBound::from_value(&json!({"date": "2024-03-01"})).unwrap();
        assert!(date.all_day);
        assert_eq!(date.at.to_rfc3339(), "2024-03-01T00:00:00+00:00");
    }

    #[test]
    fn test_malformed_bounds_are_absent() {
        assert!(EventBound::from_value(&json!({"dateTime": "yesterday-ish"})).is_none());
        assert!(EventBound::from_value(&json!({"dateTime": 12})).is_none());
        assert!(EventBound::from_value(&json!("2024-03-01T09:30:00Z")).is_none());
        assert!(EventBound::from_value(&json!({})).is_none());
    }

    #[test]
    fn test_telemetry_from_aggregate_document() {
        let raw = RawTelemetry::from_value(&json!({
            "calendar_events": [
                {"summary": "Standup", "start": {"dateTime": "2024-03-01T09:00:00Z"}},
                "not an event",
                {"start": {"dateTime": "garbage"}, "end": 5}
            ],
            "heart_rate_data": [
                {"value": [{"fpVal": 72.5}, {"intVal": 70}, {"intVal": "68"}]},
                {"value": [{"mapVal": []}]},
                {"nothing": true}
            ],
            "timestamp": "2024-03-01T10:00:00Z"
        }));

        assert_eq!(raw.calendar_events.len(), 2);
        assert_eq!(raw.calendar_events[0].summary, "Standup");
        assert!(raw.calendar_events[1].start.is_none());
        assert!(raw.calendar_events[1].end.is_none());

        assert_eq!(raw.heart_rate_samples.len(), 3);
        assert_eq!(raw.heart_rate_samples[0].readings, vec![72.5, 70.0, 68.0]);
        assert!(raw.heart_rate_samples[1].readings.is_empty());
        assert!(raw.heart_rate_samples[2].readings.is_empty());
    }

    #[test]
    fn test_missing_arrays_are_empty() {
        let raw = RawTelemetry::from_value(&json!({"timestamp": "now"}));
        assert!(raw.calendar_events.is_empty());
        assert!(raw.heart_rate_samples.is_empty());
    }

    #[test]
    fn test_feature_vector_aliases_and_wire_names() {
        let features = FeatureVector {
            sleep_duration: 7.5,
            calendar_busy_hours: 3.0,
            heart_rate_avg: 82.0,
            steps_last_24h: 8000.0,
            urgent_emails_flag: 1.0,
        };
        assert_eq!(features.get("Heart_Rate"), Some(82.0));
        assert_eq!(features.get("Daily_Steps"), Some(8000.0));
        assert_eq!(features.get("Age"), None);

        let wire = serde_json::to_value(features).unwrap();
        for name in CANONICAL_FEATURE_ORDER {
            assert!(wire.get(name).is_some(), "missing {}", name);
        }
    }

    #[test]
    fn test_directive_into_request_keeps_details() {
        let mut details = Map::new();
        details.insert("title".to_string(), json!("Stretch Break"));
        let directive = ActionDirective {
            action: ActionKind::CreateBreakEvent,
            details,
        };
        let request = directive.clone().into_request("tok");
        assert_eq!(request.user_token, "tok");
        assert_eq!(request.details, directive.details);

        let wire = serde_json::to_value(&request).unwrap();
        assert_eq!(wire["action"], "create_break_event");
    }
}
