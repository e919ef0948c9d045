//! Error kinds shared by the fetch, draw and list utilities.
//!
//! Every external call site maps its failure into one of these variants so
//! callers can tell fatal conditions from skip-and-continue ones.

use std::process::ExitCode;

use thiserror::Error;

/// Result type alias for nmdb operations.
pub type Result<T> = std::result::Result<T, NmdbError>;

#[derive(Error, Debug)]
pub enum NmdbError {
    /// Bad arguments, missing password variable, unreadable config file.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Database or feed endpoint could not be reached.
    #[error("Couldn't reach {target}: {message}")]
    Connectivity { target: String, message: String },

    /// Text that should have been a measurement wasn't.
    #[error("Parse error: {0}")]
    Parse(String),

    /// Another process holds the exclusive lock on the table.
    #[error("Someone already writing to table {table}")]
    Contention { table: String },

    /// Database error inside a query or the insert transaction.
    #[error("Database error: {0}")]
    Transactional(#[from] postgres::Error),

    /// Plot could not be rendered or saved.
    #[error("Render error: {0}")]
    Render(String),
}

impl NmdbError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub fn connectivity(target: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::Connectivity {
            target: target.into(),
            message: message.to_string(),
        }
    }

    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse(message.into())
    }

    pub fn render(message: impl std::fmt::Display) -> Self {
        Self::Render(message.to_string())
    }

    /// Process exit status for this error.
    ///
    /// Contention is not a failure of the run: the other writer will pick up
    /// the data, so it exits with success.
    pub fn exit_code(&self) -> u8 {
        match self {
            NmdbError::Contention { .. } => 0,
            NmdbError::Configuration(_) => 2,
            NmdbError::Connectivity { .. } => 3,
            NmdbError::Parse(_) => 4,
            NmdbError::Transactional(_) => 5,
            NmdbError::Render(_) => 6,
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.exit_code() != 0
    }
}

impl From<&NmdbError> for ExitCode {
    fn from(err: &NmdbError) -> Self {
        ExitCode::from(err.exit_code())
    }
}
