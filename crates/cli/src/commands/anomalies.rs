//! Anomaly listing command

use anyhow::Result;
use tabled::Tabled;

use crate::client::{AnomalyList, ApiClient};
use crate::output::{
    color_status, format_confidence, format_timestamp, print_json, print_rows, print_success,
    OutputFormat,
};

/// Row for anomalies table
#[derive(Tabled)]
struct AnomalyRow {
    #[tabled(rename = "Time")]
    timestamp: String,
    #[tabled(rename = "Domain")]
    domain: String,
    #[tabled(rename = "Severity")]
    severity: String,
    #[tabled(rename = "Observed")]
    observed: String,
    #[tabled(rename = "Expected")]
    expected: String,
    #[tabled(rename = "Conf.")]
    confidence: String,
    #[tabled(rename = "Description")]
    description: String,
}

/// Longest description shown in table output
const DESCRIPTION_WIDTH: usize = 60;

fn truncate(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        return text.to_string();
    }
    let head: String = text.chars().take(width.saturating_sub(1)).collect();
    format!("{}…", head)
}

fn summary_line(list: &AnomalyList) -> String {
    let s = &list.summary;
    format!(
        "Total: {} (critical {}, high {}, medium {}, low {})",
        s.low + s.medium + s.high + s.critical,
        s.critical,
        s.high,
        s.medium,
        s.low
    )
}

/// List current anomalies
pub async fn list_anomalies(
    client: &ApiClient,
    domain: Option<String>,
    min_severity: Option<String>,
    format: OutputFormat,
) -> Result<()> {
    let list = client
        .anomalies(domain.as_deref(), min_severity.as_deref())
        .await?;

    match format {
        OutputFormat::Json => print_json(&list)?,
        OutputFormat::Table => {
            if list.anomalies.is_empty() {
                print_success("No anomalies detected");
                return Ok(());
            }
            let rows: Vec<AnomalyRow> = list
                .anomalies
                .iter()
                .map(|a| AnomalyRow {
                    timestamp: format_timestamp(&a.timestamp),
                    domain: a.domain.clone(),
                    severity: color_status(&a.severity),
                    observed: format!("{:.2}", a.observed_value),
                    expected: format!("{:.2}", a.expected_value),
                    confidence: format_confidence(a.confidence),
                    description: truncate(&a.description, DESCRIPTION_WIDTH),
                })
                .collect();
            print_rows(rows);
            println!("\n{}", summary_line(&list));
        }
    }

    Ok(())
}
