//! Harmonia CLI
//!
//! Calls the assistant service for recommendations and health, and runs
//! feature extraction, urgency classification and action-table checks
//! offline.

mod client;
mod commands;
mod config;
mod output;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use commands::{health, offline, recommend};
use std::path::PathBuf;

/// Harmonia wellness assistant CLI
#[derive(Parser)]
#[command(name = "harmonia")]
#[command(author, version, about = "CLI for the Harmonia wellness assistant", long_about = None)]
pub struct Cli {
    /// API endpoint URL (can also be set via HARMONIA_API_URL env var)
    #[arg(long, env = "HARMONIA_API_URL")]
    pub api_url: Option<String>,

    /// Output format [default: table]
    #[arg(long, short, value_enum)]
    pub format: Option<output::OutputFormat>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Request a recommendation and dispatch the resulting action
    Recommend {
        /// User token forwarded to the integrations and actions services
        #[arg(long, short)]
        token: Option<String>,

        /// User identifier, for service logs only
        #[arg(long)]
        user_id: Option<String>,
    },

    /// Show the service's comprehensive health
    Health,

    /// Print the stress level to action table
    Actions {
        /// Validate and print this table instead of the built-in one
        #[arg(long)]
        table: Option<PathBuf>,
    },

    /// Extract features from a saved integrations aggregate (offline)
    Features {
        /// JSON document as returned by the integrations service
        file: PathBuf,

        /// Evaluate the 24h window at this RFC 3339 instant instead of now
        #[arg(long)]
        at: Option<String>,

        /// NLP urgency model directory
        #[arg(long)]
        nlp_model: Option<PathBuf>,
    },

    /// Classify texts for urgency (offline)
    Classify {
        /// Texts to classify
        #[arg(required = true)]
        texts: Vec<String>,

        /// NLP urgency model directory
        #[arg(long)]
        nlp_model: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() {
    if let Err(e) = run(Cli::parse()).await {
        output::print_error(&format!("{:#}", e));
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = config::Config::load()?;
    let format = config.format(cli.format);

    match cli.command {
        Commands::Recommend { token, user_id } => {
            let token = token
                .or_else(|| config.user_token.clone())
                .context("No user token: pass --token or set user_token in the config file")?;
            let client = client::ApiClient::new(&config.api_url(cli.api_url))?;
            recommend::recommend(&client, token, user_id, format).await?;
        }
        Commands::Health => {
            let client = client::ApiClient::new(&config.api_url(cli.api_url))?;
            health::show_health(&client, format).await?;
        }
        Commands::Actions { table } => {
            offline::show_actions(table.as_deref(), format)?;
        }
        Commands::Features { file, at, nlp_model } => {
            let at = at
                .map(|raw| {
                    DateTime::parse_from_rfc3339(&raw)
                        .map(|dt| dt.with_timezone(&Utc))
                        .with_context(|| format!("Invalid --at timestamp '{}'", raw))
                })
                .transpose()?;
            offline::extract_features(&file, at, nlp_model, format)?;
        }
        Commands::Classify { texts, nlp_model } => {
            offline::classify(&texts, nlp_model, format)?;
        }
    }

    Ok(())
}
