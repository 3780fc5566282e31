//! Error types for Lumen

use thiserror::Error;

/// The main error type for Lumen operations
#[derive(Debug, Error)]
pub enum LumenError {
    /// Transport-level download failure. Fatal for the base model,
    /// recoverable per adapter.
    #[error("Failed to fetch {url}: {reason}")]
    FetchFailure { url: String, reason: String },

    /// Adapter name absent from the engine registry. Never returned from a
    /// prediction; only rendered into the diagnostic for a skipped adapter.
    #[error("Adapter not found in engine registry: {0}")]
    AdapterNotFound(String),

    #[error("Invalid adapter weight '{token}': {reason}")]
    WeightParse { token: String, reason: String },

    #[error("Engine call failed: {0}")]
    EngineCall(String),

    #[error("Failed to decode engine response: {0}")]
    Decode(String),

    #[error("Value out of range: {field} must be between {min} and {max}, got {value}")]
    ValueOutOfRange {
        field: String,
        min: f64,
        max: f64,
        value: f64,
    },

    #[error("Invalid choice: {value} is not one of {allowed:?}")]
    InvalidChoice { value: String, allowed: Vec<String> },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(String),
}

/// Result type alias for Lumen operations
pub type Result<T> = std::result::Result<T, LumenError>;

impl From<toml::de::Error> for LumenError {
    fn from(err: toml::de::Error) -> Self {
        LumenError::TomlParse(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_failure_message() {
        let err = LumenError::FetchFailure {
            url: "https://example.com/a.safetensors".to_string(),
            reason: "connection refused".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Failed to fetch https://example.com/a.safetensors: connection refused"
        );
    }

    #[test]
    fn test_toml_error_conversion() {
        let err: LumenError = toml::from_str::<toml::Value>("= broken")
            .unwrap_err()
            .into();
        assert!(matches!(err, LumenError::TomlParse(_)));
    }
}
