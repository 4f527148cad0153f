use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("I/O error: {0}")]
    IoError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Missing or rejected API key. Stops the whole run.
    #[error("Credential error: {0}")]
    CredentialError(String),

    #[error("Parse error at line {line}, column {column}: {message}")]
    ParseError {
        line: usize,
        column: usize,
        message: String,
    },

    /// The repair loop hit its iteration bound without reaching a parseable text.
    #[error("Source could not be repaired after {iterations} iterations ({line_count} lines)")]
    UnrepairableSource { iterations: usize, line_count: usize },

    #[error("File resolution failed for input '{input}': {message}")]
    ResolutionError { input: String, message: String },
}

impl AppError {
    /// Errors that only doom the current file; the caller may move on to the next one.
    pub fn is_per_file(&self) -> bool {
        matches!(
            self,
            AppError::ParseError { .. } | AppError::UnrepairableSource { .. }
        )
    }
}

impl From<crate::types::SyntaxErrorLocus> for AppError {
    fn from(locus: crate::types::SyntaxErrorLocus) -> Self {
        AppError::ParseError {
            line: locus.line,
            column: locus.column,
            message: locus.message,
        }
    }
}
