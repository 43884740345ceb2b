use std::net::SocketAddr;

use eyre::Result;
use url::Url;

use crate::config::models::{GatewayConfig, RateLimits};

/// Validation result type alias
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Validation error types
#[derive(Debug, thiserror::Error, Clone)]
pub enum ValidationError {
    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid field '{field}': {message}")]
    InvalidField { field: String, message: String },

    #[error("Invalid listen address '{address}': {reason}")]
    InvalidListenAddress { address: String, reason: String },

    #[error("Validation failed: {message}")]
    ValidationFailed { message: String },
}

/// Gateway configuration validator
pub struct GatewayConfigValidator;

impl GatewayConfigValidator {
    /// Validate the entire gateway configuration
    pub fn validate(config: &GatewayConfig) -> ValidationResult<()> {
        let mut errors = Vec::new();

        if let Err(e) = Self::validate_listen_address(&config.listen_addr) {
            errors.push(e);
        }

        if config.admin_key.is_empty() {
            errors.push(ValidationError::MissingField {
                field: "admin_key".to_string(),
            });
        }

        if config.upstream.api_key.is_empty() {
            errors.push(ValidationError::MissingField {
                field: "upstream.api_key".to_string(),
            });
        }

        if let Err(e) = Self::validate_url(&config.upstream.base_url, "upstream.base_url") {
            errors.push(e);
        }

        if let Err(e) = Self::validate_url(&config.public_base_url, "public_base_url") {
            errors.push(e);
        }

        if let Err(e) = Self::validate_limits(&config.default_limits, "default_limits") {
            errors.push(e);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::ValidationFailed {
                message: Self::format_multiple_errors(errors),
            })
        }
    }

    /// Validate listen address format
    fn validate_listen_address(address: &str) -> ValidationResult<()> {
        if address.parse::<SocketAddr>().is_err() {
            return Err(ValidationError::InvalidListenAddress {
                address: address.to_string(),
                reason: "Must be in format 'IP:PORT' (e.g., '127.0.0.1:7000' or '0.0.0.0:7000')"
                    .to_string(),
            });
        }
        Ok(())
    }

    /// Validate that a URL parses and uses an HTTP scheme
    fn validate_url(url: &str, field: &str) -> ValidationResult<()> {
        match Url::parse(url) {
            Ok(parsed) if parsed.scheme() == "http" || parsed.scheme() == "https" => Ok(()),
            Ok(parsed) => Err(ValidationError::InvalidField {
                field: field.to_string(),
                message: format!("Unsupported scheme '{}'", parsed.scheme()),
            }),
            Err(e) => Err(ValidationError::InvalidField {
                field: field.to_string(),
                message: format!("Not a valid URL: {e}"),
            }),
        }
    }

    /// Rate limits of zero would deny every request
    pub fn validate_limits(limits: &RateLimits, field: &str) -> ValidationResult<()> {
        if limits.per_minute == 0 {
            return Err(ValidationError::InvalidField {
                field: format!("{field}.perMinute"),
                message: "must be greater than 0".to_string(),
            });
        }
        if limits.per_day == 0 {
            return Err(ValidationError::InvalidField {
                field: format!("{field}.perDay"),
                message: "must be greater than 0".to_string(),
            });
        }
        Ok(())
    }

    /// Format multiple validation errors into a readable message
    fn format_multiple_errors(errors: Vec<ValidationError>) -> String {
        let mut message = format!("Found {} validation error(s):\n", errors.len());
        for (i, error) in errors.iter().enumerate() {
            message.push_str(&format!("  {}. {}\n", i + 1, error));
        }
        message
    }
}
