//! Error types for the analytics engine.

use thiserror::Error;

/// Main error type for the analytics engine.
///
/// Structural failures (schema, empty data, too few observations, unknown
/// strategy) abort a request. Numeric degeneracies never show up here: they
/// surface as undefined (`None`) metrics or as documented fallbacks.
#[derive(Error, Debug)]
pub enum AnalyticsError {
    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Empty data: {0}")]
    EmptyData(String),

    #[error("Insufficient data for {context}: need at least {required} observations, got {available}")]
    InsufficientData {
        context: String,
        required: usize,
        available: usize,
    },

    #[error("Unknown weighting strategy: '{0}' (expected one of: equal, price, inv-vol, sharpe)")]
    UnknownStrategy(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    #[error("CSV parsing error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("TOML serialization error: {0}")]
    TomlSerializeError(#[from] toml::ser::Error),
}

impl AnalyticsError {
    /// Shorthand for an [`AnalyticsError::InsufficientData`] error.
    pub fn insufficient(context: impl Into<String>, required: usize, available: usize) -> Self {
        AnalyticsError::InsufficientData {
            context: context.into(),
            required,
            available,
        }
    }
}

/// Result type alias for analytics operations.
pub type Result<T> = std::result::Result<T, AnalyticsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insufficient_message() {
        let err = AnalyticsError::insufficient("forecast", 30, 12);
        let msg = err.to_string();
        assert!(msg.contains("forecast"));
        assert!(msg.contains("30"));
        assert!(msg.contains("12"));
    }

    #[test]
    fn test_unknown_strategy_lists_choices() {
        let err = AnalyticsError::UnknownStrategy("MaxSharpe".to_string());
        assert!(err.to_string().contains("inv-vol"));
    }
}
