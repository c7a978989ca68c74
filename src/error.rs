//! Structured error types for configuration resolution.
//!
//! Every fatal error carries enough context (file path, key path or raw
//! template expression) to diagnose without re-running with verbose logging.
//! A missing config file is not an error and has no variant here.

use std::path::{Path, PathBuf};

/// Errors that abort a resolution pass.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Malformed `{{ ... }}` expression in a config file.
    #[error("template error in {} at line {line}: {reason}: `{expr}`", display_path(.path))]
    TemplateSyntax {
        path: Option<PathBuf>,
        line: usize,
        expr: String,
        reason: String,
    },

    /// The discovered config file could not be read.
    #[error("failed to read config file {}: {source}", .path.display())]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The decoder rejected the expanded file content.
    #[error("failed to decode {format} config file {}: {message}", .path.display())]
    FileDecode {
        path: PathBuf,
        format: &'static str,
        message: String,
    },

    /// The env-bind node in the config file is not a flat string mapping.
    #[error("invalid env binding node '{key}': {reason}")]
    InvalidBindNode { key: String, reason: String },

    /// The caller's defaults could not be turned into a key/value tree.
    #[error("failed to serialize default configuration: {0}")]
    Serialize(#[source] serde_json::Error),

    /// The merged tree does not fit the caller's configuration type.
    #[error("failed to decode merged configuration: {message}")]
    Deserialize { message: String },
}

impl ConfigError {
    pub fn template(expr: impl Into<String>, line: usize, reason: impl Into<String>) -> Self {
        Self::TemplateSyntax {
            path: None,
            line,
            expr: expr.into(),
            reason: reason.into(),
        }
    }

    /// Attach the config file path to a template error raised by the expander.
    pub fn in_file(self, file: &Path) -> Self {
        match self {
            Self::TemplateSyntax {
                path: None,
                line,
                expr,
                reason,
            } => Self::TemplateSyntax {
                path: Some(file.to_path_buf()),
                line,
                expr,
                reason,
            },
            other => other,
        }
    }

    pub fn file_read(path: &Path, source: std::io::Error) -> Self {
        Self::FileRead {
            path: path.to_path_buf(),
            source,
        }
    }

    pub fn file_decode(path: &Path, format: &'static str, message: impl Into<String>) -> Self {
        Self::FileDecode {
            path: path.to_path_buf(),
            format,
            message: message.into(),
        }
    }

    pub fn invalid_bind_node(key: &str, reason: impl Into<String>) -> Self {
        Self::InvalidBindNode {
            key: key.to_string(),
            reason: reason.into(),
        }
    }
}

fn display_path(path: &Option<PathBuf>) -> String {
    match path {
        Some(p) => p.display().to_string(),
        None => "<input>".to_string(),
    }
}

/// Result type for configuration operations.
pub type Result<T> = std::result::Result<T, ConfigError>;
