//! Error types for tfaot-compile.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for tfaot-compile operations.
pub type Result<T> = std::result::Result<T, TfaotError>;

/// Errors that can occur while packaging an AOT-compiled model.
#[derive(Debug, Error)]
pub enum TfaotError {
    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The external AOT compiler failed or produced unexpected output.
    #[error("Compiler invocation failed: {0}")]
    Compiler(String),

    /// A generated header file could not be parsed.
    #[error("Header parsing failed: {0}")]
    Header(String),

    /// Wrapper header generation failed.
    #[error("Wrapper generation failed: {0}")]
    Wrapper(String),

    /// Template rendering error.
    #[error("Template error: {0}")]
    Template(String),

    /// YAML parsing error.
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON parsing error.
    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// File not found.
    #[error("File not found: {}", .0.display())]
    FileNotFound(PathBuf),
}

impl TfaotError {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a compiler invocation error.
    pub fn compiler(msg: impl Into<String>) -> Self {
        Self::Compiler(msg.into())
    }

    /// Create a header parsing error.
    pub fn header(msg: impl Into<String>) -> Self {
        Self::Header(msg.into())
    }

    /// Create a wrapper generation error.
    pub fn wrapper(msg: impl Into<String>) -> Self {
        Self::Wrapper(msg.into())
    }

    /// Create a template error.
    pub fn template(msg: impl Into<String>) -> Self {
        Self::Template(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TfaotError::config("missing 'model' entry");
        assert_eq!(
            format!("{}", err),
            "Configuration error: missing 'model' entry"
        );

        let err = TfaotError::header("corrupted header file");
        assert_eq!(
            format!("{}", err),
            "Header parsing failed: corrupted header file"
        );

        let err = TfaotError::FileNotFound(PathBuf::from("/path/to/aot.yaml"));
        assert_eq!(format!("{}", err), "File not found: /path/to/aot.yaml");
    }
}
