//! Stress level to intervention mapping
//!
//! The table is a versioned JSON document with one template per stress level
//! 0 through 10. A built-in table is used unless one is configured.

use crate::models::{ActionDirective, ActionKind};
use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

pub const MAX_STRESS_LEVEL: u8 = 10;

/// Chat channel used by the built-in notifications
pub const DEFAULT_CHANNEL: &str = "#team-harmonia";

/// A complete table; every deserialized table has been validated
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActionTable {
    version: u32,
    templates: BTreeMap<u8, ActionDirective>,
}

impl<'de> Deserialize<'de> for ActionTable {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        #[derive(Deserialize)]
        struct RawActionTable {
            version: u32,
            templates: BTreeMap<u8, ActionDirective>,
        }

        let raw = RawActionTable::deserialize(deserializer)?;
        let table = ActionTable {
            version: raw.version,
            templates: raw.templates,
        };
        table.validate().map_err(serde::de::Error::custom)?;
        Ok(table)
    }
}

impl ActionTable {
    pub fn builtin() -> Self {
        let templates = BTreeMap::from([
            (0, slack("🌟 You're in a great flow state! Keep up the excellent work.")),
            (1, slack("💪 Great energy levels! Stay focused and productive.")),
            (2, slack("✨ You're doing well! Remember to stay hydrated.")),
            (
                3,
                break_event(
                    "Quick Refresher",
                    10,
                    "AI suggests: Take a short breather to maintain your energy",
                ),
            ),
            (
                4,
                break_event(
                    "Stretch Break",
                    15,
                    "AI suggests: Time for a quick stretch and some deep breaths",
                ),
            ),
            (
                5,
                break_event(
                    "Mindfulness Break",
                    20,
                    "AI suggests: Take time for meditation or a short walk",
                ),
            ),
            (
                6,
                slack("🧘‍♀️ Consider taking a longer break to recharge. Your wellbeing matters!"),
            ),
            (
                7,
                break_event(
                    "Wellness Break",
                    30,
                    "AI Alert: High stress detected. Time for a proper break and reset.",
                ),
            ),
            (
                8,
                slack("⚠️ High stress levels detected. Please prioritize your wellbeing and consider delegating tasks."),
            ),
            (
                9,
                break_event(
                    "URGENT: Wellness Priority",
                    60,
                    "AI ALERT: Critical stress levels. Please step away and focus on self-care.",
                ),
            ),
            (
                10,
                directive(
                    ActionKind::DraftEmail,
                    json!({
                        "to": "manager@company.com",
                        "subject": "Wellness Check - High Stress Alert",
                        "body": "AI Health Assistant Alert: High stress levels detected. May need support or workload adjustment. Please prioritize wellbeing."
                    }),
                ),
            ),
        ]);

        Self {
            version: 1,
            templates,
        }
    }

    /// Parse and validate a table document
    pub fn from_json(content: &str) -> Result<Self> {
        serde_json::from_str(content).context("Failed to parse action table")
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read action table {}", path.display()))?;
        Self::from_json(&content).with_context(|| format!("Invalid action table {}", path.display()))
    }

    fn validate(&self) -> Result<()> {
        let missing: Vec<u8> = (0..=MAX_STRESS_LEVEL)
            .filter(|level| !self.templates.contains_key(level))
            .collect();
        if !missing.is_empty() {
            anyhow::bail!("Action table is missing levels {:?}", missing);
        }

        let extra: Vec<u8> = self
            .templates
            .keys()
            .copied()
            .filter(|level| *level > MAX_STRESS_LEVEL)
            .collect();
        if !extra.is_empty() {
            anyhow::bail!("Action table has levels outside 0..=10: {:?}", extra);
        }
        Ok(())
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    /// Templates in level order
    pub fn templates(&self) -> impl Iterator<Item = (u8, &ActionDirective)> {
        self.templates.iter().map(|(level, d)| (*level, d))
    }
}

fn directive(action: ActionKind, details: Value) -> ActionDirective {
    let details = match details {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    ActionDirective { action, details }
}

fn slack(message: &str) -> ActionDirective {
    directive(
        ActionKind::SendSlackNotification,
        json!({"message": message, "channel": DEFAULT_CHANNEL}),
    )
}

fn break_event(title: &str, duration_minutes: u32, description: &str) -> ActionDirective {
    directive(
        ActionKind::CreateBreakEvent,
        json!({"title": title, "duration": duration_minutes, "description": description}),
    )
}

/// Bucket used for a stress level: itself when in range, otherwise clamped
/// (`<= 3` to 0, `<= 6` to 5, anything higher to 7)
pub fn clamp_bucket(stress_level: i64) -> u8 {
    match stress_level {
        0..=10 => stress_level as u8,
        l if l <= 3 => 0,
        l if l <= 6 => 5,
        _ => 7,
    }
}

pub struct ActionMapper {
    table: ActionTable,
}

impl Default for ActionMapper {
    fn default() -> Self {
        Self::new(ActionTable::builtin())
    }
}

impl ActionMapper {
    pub fn new(table: ActionTable) -> Self {
        Self { table }
    }

    pub fn table(&self) -> &ActionTable {
        &self.table
    }

    /// Directive for a stress level; always a fresh copy of the template
    pub fn map(&self, stress_level: i64) -> ActionDirective {
        // Tables are only built by `builtin` or validating deserialization
        self.table.templates[&clamp_bucket(stress_level)].clone()
    }
}
