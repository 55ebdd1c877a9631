// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

/// Errors raised while assembling the sink, before any entry is accepted.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid DSN: {0}")]
    InvalidDsn(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to build HTTP client: {0}")]
    HttpClient(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = ConfigError::InvalidConfig("flush count must be non-zero".to_string());
        assert_eq!(
            error.to_string(),
            "Invalid configuration: flush count must be non-zero"
        );
    }

    #[test]
    fn test_dsn_error_display() {
        let error = ConfigError::InvalidDsn("missing project id".to_string());
        assert_eq!(error.to_string(), "Invalid DSN: missing project id");
    }
}
