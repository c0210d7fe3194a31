//! `harmonia recommend`

use anyhow::Result;
use tabled::Tabled;

use crate::client::{ApiClient, RecommendRequest};
use crate::output::{color_stress_level, format_value, print_json, print_success, print_table, OutputFormat};

#[derive(Tabled)]
struct FieldRow {
    #[tabled(rename = "Field")]
    field: String,
    #[tabled(rename = "Value")]
    value: String,
}

/// Ask the service for a recommendation and show what was dispatched
pub async fn recommend(
    client: &ApiClient,
    user_token: String,
    user_id: Option<String>,
    format: OutputFormat,
) -> Result<()> {
    let request = RecommendRequest {
        user_token,
        user_id,
    };
    let response = client.recommend(&request).await?;

    match format {
        OutputFormat::Json => print_json(&response)?,
        OutputFormat::Table => {
            print_success(&response.recommendation);
            println!("Stress level: {}", color_stress_level(response.stress_level));

            let details: Vec<FieldRow> = response
                .action_details
                .iter()
                .map(|(field, value)| FieldRow {
                    field: field.clone(),
                    value: format_value(value),
                })
                .collect();
            if !details.is_empty() {
                println!("\nAction details:");
                print_table(details);
            }

            let features: Vec<FieldRow> = response
                .features_used
                .iter()
                .map(|(name, value)| FieldRow {
                    field: name.clone(),
                    value: value.to_string(),
                })
                .collect();
            println!("\nFeatures used:");
            print_table(features);
        }
    }

    Ok(())
}
