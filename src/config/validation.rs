//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (rates > 0, timeouts > 0)
//! - Reject malformed trusted origins
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ServerConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::fmt;

use crate::config::schema::ServerConfig;

const ENVIRONMENTS: [&str; 3] = ["development", "staging", "production"];

/// A single semantic problem with a configuration value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

/// Check every semantic constraint and collect all violations.
pub fn validate_config(config: &ServerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if !ENVIRONMENTS.contains(&config.env.as_str()) {
        errors.push(ValidationError::new(
            "env",
            format!("must be one of {}", ENVIRONMENTS.join("|")),
        ));
    }

    let limiter = &config.limiter;
    if !(limiter.requests_per_second.is_finite() && limiter.requests_per_second > 0.0) {
        errors.push(ValidationError::new(
            "limiter.requests_per_second",
            "must be a positive number",
        ));
    }
    if limiter.burst == 0 {
        errors.push(ValidationError::new("limiter.burst", "must be greater than zero"));
    }
    if limiter.sweep_interval_secs == 0 {
        errors.push(ValidationError::new(
            "limiter.sweep_interval_secs",
            "must be greater than zero",
        ));
    }

    for origin in &config.cors.trusted_origins {
        if origin.is_empty() || origin.chars().any(char::is_whitespace) {
            errors.push(ValidationError::new(
                "cors.trusted_origins",
                format!("invalid origin {:?}", origin),
            ));
        }
    }

    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::new("timeouts.request_secs", "must be greater than zero"));
    }
    if config.shutdown.drain_timeout_secs == 0 {
        errors.push(ValidationError::new(
            "shutdown.drain_timeout_secs",
            "must be greater than zero",
        ));
    }

    if config.observability.metrics_enabled
        && config
            .observability
            .metrics_address
            .parse::<std::net::SocketAddr>()
            .is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            "must be a socket address",
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
