//! Error types for the DAISY compiler.

use thiserror::Error;

use crate::diagnostics::Diagnostic;

#[derive(Error, Debug)]
pub enum DaisyError {
    /// One or more structured diagnostics from a compiler phase.
    #[error("{}", format_many(.0))]
    Diagnostics(Vec<Diagnostic>),

    #[error("manifest error: {0}")]
    Manifest(String),

    #[error("internal compiler error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl DaisyError {
    pub fn diagnostics(diags: Vec<Diagnostic>) -> Self {
        DaisyError::Diagnostics(diags)
    }

    pub fn manifest(message: impl Into<String>) -> Self {
        DaisyError::Manifest(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        DaisyError::Internal(message.into())
    }

    /// Exit status for the CLI: diagnostics are 1, everything else is 2.
    pub fn exit_code(&self) -> i32 {
        match self {
            DaisyError::Diagnostics(_) => 1,
            _ => 2,
        }
    }
}

fn format_many(diags: &[Diagnostic]) -> String {
    diags.iter().map(|d| d.to_string()).collect::<Vec<_>>().join("\n")
}

/// Result type for DAISY operations.
pub type DaisyResult<T> = Result<T, DaisyError>;
