//! Predictive analytics CLI
//!
//! A command-line tool for running predictions, retraining models and
//! reviewing anomalies through the analytics agent API.

mod client;
mod commands;
mod config;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{anomalies, models, predict};
use std::path::PathBuf;

/// Predictive analytics CLI
#[derive(Parser)]
#[command(name = "pa")]
#[command(author, version, about = "CLI for the Predictive Analytics agent", long_about = None)]
pub struct Cli {
    /// API endpoint URL [default: http://localhost:8080]
    #[arg(long, env = "PA_API_URL")]
    pub api_url: Option<String>,

    /// Output format (table or json)
    #[arg(long, short)]
    pub format: Option<output::OutputFormat>,

    /// Show the full error chain on failure
    #[arg(long, short)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List registered models
    Models,

    /// Show metadata and readiness of a model
    Status {
        /// Model type (e.g. sales)
        model_type: String,
    },

    /// Run a prediction
    Predict {
        /// Model type (e.g. sales)
        model_type: String,

        /// Input object as inline JSON
        #[arg(long, conflicts_with = "input_file")]
        input: Option<String>,

        /// File holding the input object (`-` for stdin)
        #[arg(long)]
        input_file: Option<PathBuf>,

        /// Override the agent's prediction timeout
        #[arg(long)]
        timeout_ms: Option<u64>,
    },

    /// Run predictions over a JSON array of inputs
    Batch {
        /// Model type (e.g. sales)
        model_type: String,

        /// File holding the input array (`-` for stdin)
        #[arg(long)]
        file: PathBuf,
    },

    /// Retrain a model from a JSON array of raw rows
    Retrain {
        /// Model type (e.g. sales)
        model_type: String,

        /// File holding the training rows (`-` for stdin)
        #[arg(long)]
        data: PathBuf,
    },

    /// List detected anomalies
    Anomalies {
        /// Restrict to one domain (production, inventory, attendance, cash_flow, process)
        #[arg(long, short)]
        domain: Option<String>,

        /// Minimum severity (low, medium, high, critical)
        #[arg(long)]
        min_severity: Option<String>,
    },

    /// Show agent component health
    Health,
}

async fn run(cli: Cli) -> Result<()> {
    let config = config::Config::load()?;
    let format = config.resolve_format(cli.format);
    let client = client::ApiClient::new(&config.resolve_api_url(cli.api_url))?;

    match cli.command {
        Commands::Models => models::list_models(&client, format).await?,
        Commands::Status { model_type } => {
            models::show_status(&client, &model_type, format).await?;
        }
        Commands::Predict {
            model_type,
            input,
            input_file,
            timeout_ms,
        } => {
            let input = predict::read_json(input.as_deref(), input_file.as_deref())?;
            predict::predict(&client, &model_type, input, timeout_ms, format).await?;
        }
        Commands::Batch { model_type, file } => {
            let inputs = predict::read_rows(None, Some(&file))?;
            predict::batch_predict(&client, &model_type, inputs, format).await?;
        }
        Commands::Retrain { model_type, data } => {
            let rows = predict::read_rows(None, Some(&data))?;
            predict::retrain(&client, &model_type, rows, format).await?;
        }
        Commands::Anomalies {
            domain,
            min_severity,
        } => {
            anomalies::list_anomalies(&client, domain, min_severity, format).await?;
        }
        Commands::Health => models::show_health(&client, format).await?,
    }

    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let verbose = cli.verbose;

    if let Err(e) = run(cli).await {
        if verbose {
            output::print_error(&format!("{:?}", e));
        } else {
            output::print_error(&format!("{:#}", e));
        }
        if let Some(code) = e
            .downcast_ref::<client::ApiError>()
            .and_then(|api| api.code.as_deref())
        {
            eprintln!("  code: {}", code);
        }
        std::process::exit(1);
    }
}
