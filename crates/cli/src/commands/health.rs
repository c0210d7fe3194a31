//! `harmonia health`

use anyhow::Result;
use tabled::Tabled;

use crate::client::ApiClient;
use crate::output::{color_status, print_json, print_table, print_warning, OutputFormat};

#[derive(Tabled)]
struct CheckRow {
    #[tabled(rename = "Component")]
    component: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Response")]
    response_time: String,
    #[tabled(rename = "Message")]
    message: String,
}

/// Show the service's comprehensive health; fails when it is unhealthy
pub async fn show_health(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let report = client.health().await?;

    match format {
        OutputFormat::Json => print_json(&report)?,
        OutputFormat::Table => {
            println!(
                "Service: {} ({})",
                report.service,
                color_status(&report.status)
            );

            if report.checks.is_empty() {
                print_warning("No component checks reported");
            } else {
                let rows: Vec<CheckRow> = report
                    .checks
                    .iter()
                    .map(|(name, check)| CheckRow {
                        component: name.clone(),
                        status: color_status(&check.status),
                        response_time: check
                            .response_time_ms
                            .map(|ms| format!("{:.1}ms", ms))
                            .unwrap_or_else(|| "-".to_string()),
                        message: check.message.clone().unwrap_or_default(),
                    })
                    .collect();
                print_table(rows);
            }
        }
    }

    if report.status.eq_ignore_ascii_case("unhealthy") {
        anyhow::bail!("Service is unhealthy");
    }
    Ok(())
}
