//! Commands that run locally, without the service: action tables, feature
//! extraction and urgency classification

use anyhow::{Context, Result};
use assistant_lib::{
    ActionTable, FeatureExtractor, FeatureVector, RawTelemetry, UrgencyClassifier, UrgencyConfig,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tabled::Tabled;

use crate::output::{
    format_value, print_info, print_json, print_table, print_warning, truncate, OutputFormat,
};

const TEXT_COLUMN_WIDTH: usize = 60;

#[derive(Tabled)]
struct ActionRow {
    #[tabled(rename = "Level")]
    level: u8,
    #[tabled(rename = "Action")]
    action: String,
    #[tabled(rename = "Details")]
    details: String,
}

/// Print the built-in action table, or a table file after validating it
pub fn show_actions(table_path: Option<&Path>, format: OutputFormat) -> Result<()> {
    let table = match table_path {
        Some(path) => ActionTable::load_from_path(path)?,
        None => ActionTable::builtin(),
    };

    match format {
        OutputFormat::Json => print_json(&table)?,
        OutputFormat::Table => {
            let rows: Vec<ActionRow> = table
                .templates()
                .map(|(level, directive)| ActionRow {
                    level,
                    action: directive.action.to_string(),
                    details: directive
                        .details
                        .iter()
                        .map(|(key, value)| {
                            format!("{}: {}", key, truncate(&format_value(value), TEXT_COLUMN_WIDTH))
                        })
                        .collect::<Vec<_>>()
                        .join("\n"),
                })
                .collect();
            print_table(rows);
            print_info(&format!("Action table version {}", table.version()));
        }
    }

    Ok(())
}

fn build_classifier(nlp_model: Option<PathBuf>) -> UrgencyClassifier {
    let requested = nlp_model.is_some();
    let classifier = UrgencyClassifier::from_config(&UrgencyConfig {
        nlp_enabled: requested,
        model_dir: nlp_model,
    });
    if requested {
        if let Some(reason) = classifier.unavailable_reason() {
            print_warning(&format!("Falling back to keywords: {}", reason));
        }
    }
    classifier
}

#[derive(Serialize)]
struct FeatureReport {
    evaluated_at: DateTime<Utc>,
    urgency_backend: String,
    features: FeatureVector,
    urgency_texts: Vec<String>,
}

#[derive(Tabled)]
struct FeatureRow {
    #[tabled(rename = "Feature")]
    name: &'static str,
    #[tabled(rename = "Value")]
    value: f64,
}

/// Extract the feature vector from a saved integrations aggregate document
pub fn extract_features(
    telemetry_path: &Path,
    at: Option<DateTime<Utc>>,
    nlp_model: Option<PathBuf>,
    format: OutputFormat,
) -> Result<()> {
    let content = std::fs::read_to_string(telemetry_path)
        .with_context(|| format!("Failed to read telemetry file {}", telemetry_path.display()))?;
    let document: serde_json::Value = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse telemetry file {}", telemetry_path.display()))?;
    let raw = RawTelemetry::from_value(&document);

    let extractor = FeatureExtractor::new(Arc::new(build_classifier(nlp_model)));
    let evaluated_at = at.unwrap_or_else(Utc::now);
    let report = FeatureReport {
        evaluated_at,
        urgency_backend: extractor.urgency().backend().to_string(),
        features: extractor.extract_at(&raw, evaluated_at),
        urgency_texts: extractor.urgency_texts(&raw),
    };

    match format {
        OutputFormat::Json => print_json(&report)?,
        OutputFormat::Table => {
            let f = &report.features;
            print_table(vec![
                FeatureRow { name: "Sleep_Duration", value: f.sleep_duration },
                FeatureRow { name: "Calendar_Busy_Hours", value: f.calendar_busy_hours },
                FeatureRow { name: "HeartRate_Avg", value: f.heart_rate_avg },
                FeatureRow { name: "Steps_Last_24h", value: f.steps_last_24h },
                FeatureRow { name: "Urgent_Emails_Flag", value: f.urgent_emails_flag },
            ]);
            print_info(&format!(
                "Evaluated at {} with {} urgency detection ({} email-like texts)",
                report.evaluated_at.to_rfc3339(),
                report.urgency_backend,
                report.urgency_texts.len()
            ));
        }
    }

    Ok(())
}

#[derive(Serialize)]
struct TextVerdict {
    text: String,
    urgent: bool,
}

#[derive(Serialize)]
struct ClassificationReport {
    backend: String,
    urgent_emails_flag: f64,
    texts: Vec<TextVerdict>,
}

#[derive(Tabled)]
struct VerdictRow {
    #[tabled(rename = "Text")]
    text: String,
    #[tabled(rename = "Urgent")]
    urgent: String,
}

/// Classify texts the way the pipeline would
pub fn classify(texts: &[String], nlp_model: Option<PathBuf>, format: OutputFormat) -> Result<()> {
    let classifier = build_classifier(nlp_model);

    let report = ClassificationReport {
        backend: classifier.backend().to_string(),
        urgent_emails_flag: classifier.classify(texts),
        texts: texts
            .iter()
            .map(|text| TextVerdict {
                text: text.clone(),
                urgent: classifier.classify(std::slice::from_ref(text)) >= 0.5,
            })
            .collect(),
    };

    match format {
        OutputFormat::Json => print_json(&report)?,
        OutputFormat::Table => {
            let rows: Vec<VerdictRow> = report
                .texts
                .iter()
                .map(|verdict| VerdictRow {
                    text: truncate(&verdict.text, TEXT_COLUMN_WIDTH),
                    urgent: if verdict.urgent { "yes" } else { "no" }.to_string(),
                })
                .collect();
            print_table(rows);
            print_info(&format!(
                "Urgent_Emails_Flag = {} ({} backend)",
                report.urgent_emails_flag, report.backend
            ));
        }
    }

    Ok(())
}
