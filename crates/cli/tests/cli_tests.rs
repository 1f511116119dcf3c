//! CLI integration tests

use std::process::{Command, Output};
use tempfile::TempDir;

/// Run `pa` with an isolated home directory
fn pa(args: &[&str]) -> (Output, TempDir) {
    let home = TempDir::new().expect("Failed to create temp home");
    let output = Command::new(env!("CARGO_BIN_EXE_pa"))
        .args(args)
        .env("HOME", home.path())
        .env_remove("PA_API_URL")
        .output()
        .expect("Failed to execute command");
    (output, home)
}

/// Test that the CLI shows help
#[test]
fn test_cli_help() {
    let (output, _home) = pa(&["--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "CLI help should succeed");
    assert!(stdout.contains("Predictive Analytics"), "Should show app name");
    for command in ["models", "status", "predict", "batch", "retrain", "anomalies", "health"] {
        assert!(stdout.contains(command), "Should show {} command", command);
    }
}

/// Test that the CLI shows version
#[test]
fn test_cli_version() {
    let (output, _home) = pa(&["--version"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "CLI version should succeed");
    assert!(stdout.contains("pa"), "Should show binary name");
}

#[test]
fn test_predict_help() {
    let (output, _home) = pa(&["predict", "--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success());
    assert!(stdout.contains("--input"), "Should show input option");
    assert!(stdout.contains("--input-file"), "Should show input-file option");
    assert!(stdout.contains("--timeout-ms"), "Should show timeout option");
}

#[test]
fn test_anomalies_help() {
    let (output, _home) = pa(&["anomalies", "--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success());
    assert!(stdout.contains("--domain"));
    assert!(stdout.contains("--min-severity"));
}

/// Test format and api-url options
#[test]
fn test_global_options() {
    let (output, _home) = pa(&["--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(stdout.contains("--format"), "Should show format option");
    assert!(stdout.contains("--api-url"), "Should show api-url option");
    assert!(stdout.contains("PA_API_URL"), "Should show env var");
}

/// Test invalid command error handling
#[test]
fn test_invalid_command() {
    let (output, _home) = pa(&["invalid-command"]);

    assert!(!output.status.success(), "Invalid command should fail");
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("error"), "Should show error message");
}

/// Test missing required argument error handling
#[test]
fn test_missing_argument() {
    let (output, _home) = pa(&["retrain", "sales"]);

    assert!(!output.status.success(), "Missing argument should fail");
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("--data"), "Should name the missing argument");
}

#[test]
fn test_conflicting_inputs() {
    let (output, _home) = pa(&["predict", "sales", "--input", "{}", "--input-file", "x.json"]);
    assert!(!output.status.success());
}

#[test]
fn test_models_against_mock_agent() {
    let mut server = mockito::Server::new();
    let mock = server
        .mock("GET", "/v1/models")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            r#"{"models": [{
                "name": "Sales Predictor", "version": "v0.1.3", "type": "sales",
                "performance": {"accuracy": 0.9, "precision": 0.0, "recall": 0.0, "f1": 0.0},
                "createdAt": "2024-08-01T00:00:00Z", "lastUpdated": "2024-08-02T00:00:00Z"
            }]}"#,
        )
        .create();

    let url = server.url();
    let (output, _home) = pa(&["--api-url", &url, "--format", "json", "models"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    mock.assert();
    assert!(output.status.success());
    assert!(stdout.contains("v0.1.3"));
}

#[test]
fn test_api_error_exits_nonzero() {
    let mut server = mockito::Server::new();
    server
        .mock("GET", "/v1/models/weather")
        .with_status(404)
        .with_body(r#"{"error": "model not found: weather", "code": "model_not_found"}"#)
        .create();

    let url = server.url();
    let (output, _home) = pa(&["--api-url", &url, "status", "weather"]);
    let stderr = String::from_utf8_lossy(&output.stderr);

    assert!(!output.status.success());
    assert!(stderr.contains("model not found: weather"));
    assert!(stderr.contains("model_not_found"));
}
