//! Model and agent status commands

use anyhow::Result;
use colored::Colorize;
use tabled::Tabled;

use crate::client::{ApiClient, ModelInfo};
use crate::output::{
    color_status, format_timestamp, print_json, print_rows, print_warning, OutputFormat,
};

/// Row for models table
#[derive(Tabled)]
struct ModelRow {
    #[tabled(rename = "Type")]
    model_type: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Version")]
    version: String,
    #[tabled(rename = "Accuracy")]
    accuracy: String,
    #[tabled(rename = "Updated")]
    last_updated: String,
}

impl From<&ModelInfo> for ModelRow {
    fn from(m: &ModelInfo) -> Self {
        Self {
            model_type: m.model_type.clone(),
            name: m.name.clone(),
            version: m.version.clone(),
            accuracy: format!("{:.3}", m.performance.accuracy),
            last_updated: format_timestamp(&m.last_updated),
        }
    }
}

#[derive(Tabled)]
struct ComponentRow {
    #[tabled(rename = "Component")]
    name: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Message")]
    message: String,
}

/// List registered models
pub async fn list_models(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let result = client.list_models().await?;

    match format {
        OutputFormat::Json => print_json(&result)?,
        OutputFormat::Table => {
            if result.models.is_empty() {
                print_warning("No models registered");
                return Ok(());
            }
            print_rows(result.models.iter().map(ModelRow::from).collect());
            println!("\nTotal: {} models", result.models.len());
        }
    }

    Ok(())
}

/// Show metadata and readiness of one model
pub async fn show_status(client: &ApiClient, model_type: &str, format: OutputFormat) -> Result<()> {
    let status = client.model_status(model_type).await?;

    match format {
        OutputFormat::Json => print_json(&status)?,
        OutputFormat::Table => {
            let info = &status.model_info;
            let ready = if status.available { "ready" } else { "not ready" };
            println!("{}", "Model Status".bold());
            println!("{}", "=".repeat(40));
            println!("Type:      {}", info.model_type.cyan());
            println!("Name:      {}", info.name);
            println!("Version:   {}", info.version);
            println!("State:     {}", color_status(ready));
            println!("Created:   {}", format_timestamp(&info.created_at));
            println!("Updated:   {}", format_timestamp(&info.last_updated));
            println!();
            println!("{}", "Performance".bold());
            println!("  Accuracy:  {:.3}", info.performance.accuracy);
            println!("  Precision: {:.3}", info.performance.precision);
            println!("  Recall:    {:.3}", info.performance.recall);
            println!("  F1:        {:.3}", info.performance.f1);
            match &info.performance.last_evaluated {
                Some(ts) => println!("  Evaluated: {}", format_timestamp(ts)),
                None => println!("  Evaluated: {}", "never".dimmed()),
            }
        }
    }

    Ok(())
}

/// Show agent component health
pub async fn show_health(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let health = client.health().await?;

    match format {
        OutputFormat::Json => print_json(&health)?,
        OutputFormat::Table => {
            println!("Agent: {}", color_status(&health.status));
            let mut rows: Vec<ComponentRow> = health
                .components
                .iter()
                .map(|(name, c)| ComponentRow {
                    name: name.clone(),
                    status: color_status(&c.status),
                    message: c.message.clone().unwrap_or_default(),
                })
                .collect();
            rows.sort_by(|a, b| a.name.cmp(&b.name));
            if !rows.is_empty() {
                print_rows(rows);
            }
        }
    }

    Ok(())
}
