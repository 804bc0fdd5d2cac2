use crate::config::ConfigError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Malformed event: {0}")]
    MalformedEvent(String),

    #[error("Invalid view parameters: {0}")]
    InvalidParams(String),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Unknown resource: {0}")]
    UnknownResource(String),
}

impl SyncError {
    pub fn malformed(msg: impl Into<String>) -> Self {
        SyncError::MalformedEvent(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_errors_convert_and_display() {
        let err: SyncError = ConfigError::ValidationError("limit must be positive".into()).into();
        assert!(matches!(err, SyncError::Config(_)));
        assert_eq!(
            err.to_string(),
            "Configuration error: Invalid configuration: limit must be positive"
        );
        assert_eq!(
            SyncError::malformed("missing id").to_string(),
            "Malformed event: missing id"
        );
    }
}
