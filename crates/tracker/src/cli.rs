//! Command-line arguments.

use clap::{Parser, Subcommand};
use neural_core::request::JobRequest;
use neural_core::types::JobId;

use crate::follow::TrackerError;

/// Start or watch a neural forecasting job and log its progress.
#[derive(Debug, Parser)]
#[command(name = "neural-tracker", version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Create a job and follow it until it finishes. Ctrl-C cancels it.
    Start {
        /// Model to train, e.g. `lstm` or `prophet`.
        #[arg(long)]
        model_type: String,

        /// Uploaded data file the job reads.
        #[arg(long)]
        file_id: String,

        /// Extra job option as `key=value`; JSON values are parsed
        /// (`epochs=20`), anything else is sent as a string.
        #[arg(long = "option", value_name = "KEY=VALUE")]
        options: Vec<String>,
    },

    /// Follow an existing job. Ctrl-C stops watching; the job keeps running.
    Watch {
        /// Identifier returned when the job was created.
        job_id: String,
    },
}

/// What the tracker should follow.
#[derive(Debug, Clone, PartialEq)]
pub enum Target {
    /// Create a job from this request.
    Create(JobRequest),
    /// Follow a job that already exists.
    Existing(JobId),
}

impl Command {
    pub fn target(&self) -> Result<Target, TrackerError> {
        match self {
            Self::Start {
                model_type,
                file_id,
                options,
            } => {
                let mut request = JobRequest::new(model_type.as_str(), file_id.as_str());
                for option in options {
                    let (key, raw) = parse_option(option)?;
                    request = request.with_option(key, raw);
                }
                Ok(Target::Create(request))
            }
            Self::Watch { job_id } => Ok(Target::Existing(JobId::new(job_id.as_str())?)),
        }
    }
}

/// Split `key=value`; JSON values are kept typed, anything else is a string.
fn parse_option(option: &str) -> Result<(&str, serde_json::Value), TrackerError> {
    let (key, raw) = option
        .split_once('=')
        .filter(|(key, _)| !key.trim().is_empty())
        .ok_or_else(|| TrackerError::InvalidOption(option.to_string()))?;
    let value = serde_json::from_str(raw)
        .unwrap_or_else(|_| serde_json::Value::String(raw.to_string()));
    Ok((key.trim(), value))
}
