//! Prediction and retraining commands

use anyhow::{bail, Context, Result};
use colored::Colorize;
use serde_json::Value;
use std::path::Path;
use tabled::Tabled;

use crate::client::{
    ApiClient, BatchPredictionRequest, Prediction, PredictionOptions, PredictionRequest,
};
use crate::output::{
    color_confidence, color_trend, format_timestamp, print_info, print_json, print_rows,
    print_success, print_warning, OutputFormat,
};

/// Row for batch predictions table
#[derive(Tabled)]
struct PredictionRow {
    #[tabled(rename = "#")]
    index: usize,
    #[tabled(rename = "Value")]
    value: String,
    #[tabled(rename = "Trend")]
    trend: String,
    #[tabled(rename = "Confidence")]
    confidence: String,
}

/// Read a JSON document from an inline string or a file (`-` for stdin)
pub fn read_json(inline: Option<&str>, file: Option<&Path>) -> Result<Value> {
    match (inline, file) {
        (Some(text), None) => serde_json::from_str(text).context("Invalid JSON input"),
        (None, Some(path)) if path == Path::new("-") => {
            serde_json::from_reader(std::io::stdin().lock()).context("Invalid JSON on stdin")
        }
        (None, Some(path)) => {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            serde_json::from_str(&content)
                .with_context(|| format!("Invalid JSON in {}", path.display()))
        }
        (Some(_), Some(_)) => bail!("Pass either inline JSON or a file, not both"),
        (None, None) => bail!("No input given"),
    }
}

/// Read a JSON array of rows
pub fn read_rows(inline: Option<&str>, file: Option<&Path>) -> Result<Vec<Value>> {
    match read_json(inline, file)? {
        Value::Array(rows) => Ok(rows),
        _ => bail!("Expected a JSON array"),
    }
}

fn print_prediction(p: &Prediction) {
    println!("Value:      {}", format!("{:.2}", p.value).bold());
    println!("Trend:      {}", color_trend(&p.trend));
    println!("Confidence: {}", color_confidence(p.confidence));
    println!("At:         {}", format_timestamp(&p.timestamp));
    if !p.insights.is_empty() {
        println!();
        for insight in &p.insights {
            print_info(insight);
        }
    }
}

/// Run a single prediction
pub async fn predict(
    client: &ApiClient,
    model_type: &str,
    input: Value,
    timeout_ms: Option<u64>,
    format: OutputFormat,
) -> Result<()> {
    let request = PredictionRequest {
        model_type: model_type.to_string(),
        input,
        options: timeout_ms.map(|timeout_ms| PredictionOptions { timeout_ms }),
    };
    let response = client.predict(&request).await?;

    match format {
        OutputFormat::Json => print_json(&response)?,
        OutputFormat::Table => {
            println!(
                "{} {}",
                response.model_info.name.bold(),
                response.model_info.version.dimmed()
            );
            println!("{}", "=".repeat(40));
            print_prediction(&response.prediction);
            println!("\nProcessed in {:.1}ms", response.processing_time_ms);
        }
    }

    Ok(())
}

/// Predict over many inputs
pub async fn batch_predict(
    client: &ApiClient,
    model_type: &str,
    inputs: Vec<Value>,
    format: OutputFormat,
) -> Result<()> {
    let request = BatchPredictionRequest {
        model_type: model_type.to_string(),
        inputs,
    };
    let response = client.batch_predict(&request).await?;

    match format {
        OutputFormat::Json => print_json(&response)?,
        OutputFormat::Table => {
            if response.predictions.is_empty() {
                print_warning("No predictions produced");
            } else {
                let rows: Vec<PredictionRow> = response
                    .predictions
                    .iter()
                    .enumerate()
                    .map(|(i, p)| PredictionRow {
                        index: i + 1,
                        value: format!("{:.2}", p.value),
                        trend: color_trend(&p.trend),
                        confidence: color_confidence(p.confidence),
                    })
                    .collect();
                print_rows(rows);
            }
            if response.failed > 0 {
                print_warning(&format!("{} inputs failed and were skipped", response.failed));
            }
            println!("\nProcessed in {:.1}ms", response.processing_time_ms);
        }
    }

    Ok(())
}

/// Retrain a model from raw rows
pub async fn retrain(
    client: &ApiClient,
    model_type: &str,
    data: Vec<Value>,
    format: OutputFormat,
) -> Result<()> {
    let samples = data.len();
    let response = client.retrain(model_type, data).await?;

    match format {
        OutputFormat::Json => print_json(&response)?,
        OutputFormat::Table => {
            print_success(&format!(
                "Retrained {} from {} rows, now {}",
                model_type.cyan(),
                samples,
                response.model_info.version.bold()
            ));
            println!("  Samples:   {}", response.report.samples);
            println!("  Loss:      {:.6}", response.report.final_loss);
            println!("  Accuracy:  {:.3}", response.report.performance.accuracy);
            println!("  Trained:   {}", format_timestamp(&response.report.trained_at));
        }
    }

    Ok(())
}
