//! CLI error types and exit codes

use crate::config::ConfigError;
use orgsync_client::ClientError;
use thiserror::Error;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Client setup failed: {0}")]
    Client(#[from] ClientError),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Output error: {0}")]
    Output(#[from] serde_json::Error),
}

impl CliError {
    /// Exit code for this error. A failed sync reports through its summary
    /// status instead.
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Config(_) | CliError::Client(_) | CliError::Output(_) => 1,
            CliError::NotFound(_) => 4,
        }
    }

    /// Print the error to stderr.
    pub fn print(&self) {
        if std::env::var("NO_COLOR").is_err() {
            eprintln!("\x1b[31mError:\x1b[0m {}", self);
        } else {
            eprintln!("Error: {}", self);
        }
        if let Some(suggestion) = self.suggestion() {
            eprintln!("\nSuggestion: {}", suggestion);
        }
    }

    fn suggestion(&self) -> Option<&'static str> {
        match self {
            CliError::Config(ConfigError::MissingVar(_)) => {
                Some("Export the variable or add it to the service environment.")
            }
            CliError::NotFound(_) => Some("Run 'orgsync mapping list' to see known ids."),
            _ => None,
        }
    }
}
