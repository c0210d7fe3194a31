//! Feature extraction for the stress model
//!
//! Turns raw telemetry into the five-feature vector. Every feature has a
//! default so extraction never fails, whatever upstream sends.

use crate::models::{CalendarEvent, FeatureVector, HeartRateSample, RawTelemetry};
use crate::urgency::UrgencyClassifier;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;

/// Heart rate assumed when no valid reading exists
pub const DEFAULT_HEART_RATE: f64 = 70.0;

/// Sleep assumed when the calendar shows no plausible overnight gap
pub const DEFAULT_SLEEP_HOURS: f64 = 7.0;

/// Gap between consecutive events considered a sleep period (hours)
const SLEEP_GAP_RANGE: std::ops::RangeInclusive<f64> = 6.0..=12.0;

/// Words that make a calendar event an email-like urgency candidate
pub const EMAIL_HINTS: [&str; 5] = ["email", "message", "urgent", "asap", "important"];

/// Maximum number of texts handed to the urgency classifier
pub const MAX_URGENCY_TEXTS: usize = 5;

#[derive(Clone)]
pub struct FeatureExtractor {
    urgency: Arc<UrgencyClassifier>,
    window: Duration,
}

impl FeatureExtractor {
    pub fn new(urgency: Arc<UrgencyClassifier>) -> Self {
        Self {
            urgency,
            window: Duration::hours(24),
        }
    }

    pub fn urgency(&self) -> &UrgencyClassifier {
        &self.urgency
    }

    pub fn extract(&self, raw: &RawTelemetry) -> FeatureVector {
        self.extract_at(raw, Utc::now())
    }

    pub fn extract_at(&self, raw: &RawTelemetry, now: DateTime<Utc>) -> FeatureVector {
        let heart_rate_avg = heart_rate_average(&raw.heart_rate_samples);
        let texts = self.urgency_texts(raw);

        FeatureVector {
            sleep_duration: estimate_sleep_duration(&raw.calendar_events),
            calendar_busy_hours: busy_hours_in_window(&raw.calendar_events, now, self.window),
            heart_rate_avg,
            steps_last_24h: steps_from_heart_rate(heart_rate_avg),
            urgent_emails_flag: self.urgency.classify(&texts),
        }
    }

    /// Email-like texts synthesised from calendar events, at most
    /// [`MAX_URGENCY_TEXTS`]
    pub fn urgency_texts(&self, raw: &RawTelemetry) -> Vec<String> {
        raw.calendar_events
            .iter()
            .filter(|event| looks_like_email(event))
            .take(MAX_URGENCY_TEXTS)
            .map(|event| format!("SUBJECT: {} BODY: {}", event.summary, event.description))
            .collect()
    }
}

fn looks_like_email(event: &CalendarEvent) -> bool {
    let haystack = format!("{} {}", event.summary, event.description).to_lowercase();
    EMAIL_HINTS.iter().any(|hint| haystack.contains(hint))
}

/// Busy hours over the trailing 24h ending at `now`, rounded to 2 decimals
pub fn calendar_busy_hours(events: &[CalendarEvent], now: DateTime<Utc>) -> f64 {
    busy_hours_in_window(events, now, Duration::hours(24))
}

fn busy_hours_in_window(events: &[CalendarEvent], now: DateTime<Utc>, window: Duration) -> f64 {
    let window_start = now - window;

    let seconds: i64 = events
        .iter()
        .filter_map(|event| Some((event.start?.at, event.end?.at)))
        .filter(|(start, _)| *start >= window_start)
        .map(|(start, end)| (end.min(now) - start).num_seconds().max(0))
        .sum();

    round_to(seconds as f64 / 3600.0, 2)
}

/// Mean of all valid readings, rounded to 1 decimal
pub fn heart_rate_average(samples: &[HeartRateSample]) -> f64 {
    let (sum, count) = samples
        .iter()
        .flat_map(|sample| sample.readings.iter())
        .filter(|reading| reading.is_finite())
        .fold((0.0, 0usize), |(sum, count), r| (sum + r, count + 1));

    if count == 0 {
        return DEFAULT_HEART_RATE;
    }
    round_to(sum / count as f64, 1)
}

/// Longest gap in [6, 12] hours between consecutive timed event starts
pub fn estimate_sleep_duration(events: &[CalendarEvent]) -> f64 {
    let mut starts: Vec<DateTime<Utc>> = events
        .iter()
        .filter_map(|event| event.start)
        .filter(|bound| !bound.all_day)
        .map(|bound| bound.at)
        .collect();
    starts.sort();

    starts
        .windows(2)
        .map(|pair| (pair[1] - pair[0]).num_seconds() as f64 / 3600.0)
        .filter(|gap| SLEEP_GAP_RANGE.contains(gap))
        .fold(None, |best: Option<f64>, gap| Some(best.map_or(gap, |b| b.max(gap))))
        .map(|gap| round_to(gap, 1))
        .unwrap_or(DEFAULT_SLEEP_HOURS)
}

/// Step-count proxy derived from average heart rate
pub fn steps_from_heart_rate(heart_rate_avg: f64) -> f64 {
    if heart_rate_avg > 80.0 {
        8000.0
    } else if heart_rate_avg > 70.0 {
        5000.0
    } else {
        2000.0
    }
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EventBound;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 2, 12, 0, 0).unwrap()
    }

    fn timed(at: DateTime<Utc>) -> Option<EventBound> {
        Some(EventBound { at, all_day: false })
    }

    fn event(start_hours_ago: i64, duration_hours: i64) -> CalendarEvent {
        let start = now() - Duration::hours(start_hours_ago);
        CalendarEvent {
            start: timed(start),
            end: timed(start + Duration::hours(duration_hours)),
            ..Default::default()
        }
    }

    fn titled(summary: &str, description: &str) -> CalendarEvent {
        CalendarEvent {
            summary: summary.to_string(),
            description: description.to_string(),
            ..event(2, 1)
        }
    }

    fn samples(readings: &[f64]) -> Vec<HeartRateSample> {
        vec![HeartRateSample {
            readings: readings.to_vec(),
        }]
    }

    fn extractor() -> FeatureExtractor {
        FeatureExtractor::new(Arc::new(UrgencyClassifier::keyword_only()))
    }

    #[test]
    fn test_empty_telemetry_uses_defaults() {
        let features = extractor().extract_at(&RawTelemetry::default(), now());
        assert_eq!(features.heart_rate_avg, 70.0);
        assert_eq!(features.calendar_busy_hours, 0.0);
        assert_eq!(features.sleep_duration, 7.0);
        assert_eq!(features.steps_last_24h, 2000.0);
        assert_eq!(features.urgent_emails_flag, 0.0);
    }

    #[test]
    fn test_busy_hours_clips_to_window() {
        let events = vec![
            event(3, 1),  // fully inside: 1h
            event(1, 4),  // ends in the future: 1h counted
            event(30, 8), // starts before the window: ignored
            event(-2, 1), // starts in the future: 0h
        ];
        assert_eq!(calendar_busy_hours(&events, now()), 2.0);
    }

    #[test]
    fn test_busy_hours_skips_events_missing_a_bound() {
        let mut open_ended = event(2, 1);
        open_ended.end = None;
        let mut inverted = event(2, 0);
        inverted.end = timed(now() - Duration::hours(5));

        assert_eq!(calendar_busy_hours(&[open_ended, inverted], now()), 0.0);
        assert_eq!(calendar_busy_hours(&[], now()), 0.0);
    }

    #[test]
    fn test_busy_hours_rounds_to_two_decimals() {
        let start = now() - Duration::hours(2);
        let events = vec![CalendarEvent {
            start: timed(start),
            end: timed(start + Duration::minutes(20)),
            ..Default::default()
        }];
        assert_eq!(calendar_busy_hours(&events, now()), 0.33);
    }

    #[test]
    fn test_heart_rate_average_ignores_non_finite() {
        assert_eq!(heart_rate_average(&[]), 70.0);
        assert_eq!(heart_rate_average(&samples(&[])), 70.0);
        assert_eq!(heart_rate_average(&samples(&[60.0, f64::NAN, 75.0])), 67.5);

        let many = vec![
            HeartRateSample { readings: vec![70.0] },
            HeartRateSample { readings: vec![71.0, 72.0] },
        ];
        assert_eq!(heart_rate_average(&many), 71.0);
    }

    #[test]
    fn test_sleep_takes_longest_plausible_gap() {
        let events = vec![
            event(30, 1), // 8h gap to the next
            event(22, 1), // 3h gap
            event(19, 1), // 13h gap: too long
            event(6, 1),
        ];
        assert_eq!(estimate_sleep_duration(&events), 8.0);
    }

    #[test]
    fn test_sleep_defaults_without_plausible_gap() {
        assert_eq!(estimate_sleep_duration(&[event(2, 1)]), 7.0);
        assert_eq!(estimate_sleep_duration(&[event(5, 1), event(2, 1)]), 7.0);
    }

    #[test]
    fn test_sleep_ignores_all_day_starts() {
        let mut all_day = event(14, 1);
        all_day.start = Some(EventBound {
            at: now() - Duration::hours(14),
            all_day: true,
        });
        assert_eq!(estimate_sleep_duration(&[all_day, event(6, 1)]), 7.0);
    }

    #[test]
    fn test_steps_thresholds() {
        assert_eq!(steps_from_heart_rate(70.0), 2000.0);
        assert_eq!(steps_from_heart_rate(70.1), 5000.0);
        assert_eq!(steps_from_heart_rate(80.0), 5000.0);
        assert_eq!(steps_from_heart_rate(80.1), 8000.0);
    }

    #[test]
    fn test_urgency_texts_filters_and_caps() {
        let raw = RawTelemetry {
            calendar_events: vec![
                titled("Reply to EMAIL from Dana", "re: budget"),
                titled("Lunch", ""),
                titled("Sync", "important numbers"),
                titled("Message board", ""),
                titled("asap review", ""),
                titled("Urgent call", ""),
                titled("one more message", ""),
            ],
            ..Default::default()
        };

        let texts = extractor().urgency_texts(&raw);
        assert_eq!(texts.len(), 5);
        assert_eq!(texts[0], "SUBJECT: Reply to EMAIL from Dana BODY: re: budget");
        assert_eq!(texts[1], "SUBJECT: Sync BODY: important numbers");
    }

    #[test]
    fn test_extract_flags_urgent_email() {
        let raw = RawTelemetry {
            calendar_events: vec![titled("Urgent: deadline today", "")],
            heart_rate_samples: samples(&[85.0, 95.0]),
        };
        let features = extractor().extract_at(&raw, now());
        assert_eq!(features.urgent_emails_flag, 1.0);
        assert_eq!(features.heart_rate_avg, 90.0);
        assert_eq!(features.steps_last_24h, 8000.0);
        assert_eq!(features.calendar_busy_hours, 1.0);
    }
}
