//! Output formatting utilities

use chrono::{DateTime, Utc};
use clap::ValueEnum;
use colored::Colorize;
use serde::{Deserialize, Serialize};
use tabled::{settings::Style, Table, Tabled};

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
}

/// Render rows as a rounded table
pub fn print_rows<T: Tabled>(rows: Vec<T>) {
    let table = Table::new(rows).with(Style::rounded()).to_string();
    println!("{}", table);
}

/// Print any response as pretty JSON
pub fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Print a success message
pub fn print_success(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

/// Print an error message
pub fn print_error(message: &str) {
    eprintln!("{} {}", "✗".red().bold(), message);
}

/// Print a warning message
pub fn print_warning(message: &str) {
    println!("{} {}", "⚠".yellow().bold(), message);
}

/// Print an info message
pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue().bold(), message);
}

/// Format confidence as percentage
pub fn format_confidence(confidence: f64) -> String {
    format!("{:.0}%", confidence * 100.0)
}

pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Color health and severity labels
pub fn color_status(status: &str) -> String {
    match status.to_lowercase().as_str() {
        "healthy" | "ready" | "low" => status.green().to_string(),
        "degraded" | "medium" => status.yellow().to_string(),
        "high" => status.red().to_string(),
        "unhealthy" | "critical" | "not ready" => status.red().bold().to_string(),
        _ => status.to_string(),
    }
}

pub fn color_trend(trend: &str) -> String {
    match trend {
        "up" => "▲ up".green().to_string(),
        "down" => "▼ down".red().to_string(),
        _ => "● stable".normal().to_string(),
    }
}

/// Color confidence based on value
pub fn color_confidence(confidence: f64) -> String {
    let formatted = format_confidence(confidence);
    if confidence >= 0.8 {
        formatted.green().to_string()
    } else if confidence >= 0.6 {
        formatted.yellow().to_string()
    } else {
        formatted.red().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_format_confidence() {
        assert_eq!(format_confidence(0.85), "85%");
        assert_eq!(format_confidence(1.0), "100%");
    }

    #[test]
    fn test_format_timestamp() {
        let ts = Utc.with_ymd_and_hms(2024, 8, 20, 17, 5, 9).unwrap();
        assert_eq!(format_timestamp(&ts), "2024-08-20 17:05:09");
    }

    #[test]
    fn test_color_status_keeps_label() {
        colored::control::set_override(false);
        assert_eq!(color_status("critical"), "critical");
        assert_eq!(color_trend("up"), "▲ up");
        assert_eq!(color_trend("sideways"), "● stable");
    }
}
