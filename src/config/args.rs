//! Command-line flags.
//!
//! Flags override values from the optional TOML file, which override the
//! built-in defaults.

use std::path::PathBuf;

use clap::Parser;

use crate::config::loader::{load_config, ConfigError};
use crate::config::schema::ServerConfig;
use crate::config::validation::validate_config;

#[derive(Debug, Parser)]
#[command(name = "guarded-server")]
#[command(about = "HTTP service with rate limiting, panic recovery and graceful shutdown", long_about = None)]
pub struct Cli {
    /// TOML configuration file.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// API server port.
    #[arg(long)]
    pub port: Option<u16>,

    /// Environment (development|staging|production).
    #[arg(long)]
    pub env: Option<String>,

    /// Rate limiter maximum requests per second.
    #[arg(long = "limiter-rps")]
    pub limiter_rps: Option<f64>,

    /// Rate limiter maximum burst.
    #[arg(long = "limiter-burst")]
    pub limiter_burst: Option<u32>,

    /// Enable rate limiter.
    #[arg(long = "limiter-enabled")]
    pub limiter_enabled: Option<bool>,

    /// Trusted CORS origins (space separated).
    #[arg(long = "cors-trusted-origins")]
    pub cors_trusted_origins: Option<String>,
}

impl Cli {
    /// Apply explicitly given flags on top of `config`.
    pub fn apply(&self, config: &mut ServerConfig) {
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(env) = &self.env {
            config.env = env.clone();
        }
        if let Some(rps) = self.limiter_rps {
            config.limiter.requests_per_second = rps;
        }
        if let Some(burst) = self.limiter_burst {
            config.limiter.burst = burst;
        }
        if let Some(enabled) = self.limiter_enabled {
            config.limiter.enabled = enabled;
        }
        if let Some(origins) = &self.cors_trusted_origins {
            config.cors.trusted_origins = origins.split_whitespace().map(str::to_string).collect();
        }
    }

    /// Resolve defaults, file and flags into a validated configuration.
    pub fn resolve(&self) -> Result<ServerConfig, ConfigError> {
        let mut config = match &self.config {
            Some(path) => load_config(path)?,
            None => ServerConfig::default(),
        };
        self.apply(&mut config);
        validate_config(&config).map_err(ConfigError::Validation)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_defaults() {
        let cli = Cli::try_parse_from([
            "guarded-server",
            "--port",
            "8080",
            "--limiter-rps",
            "5.5",
            "--limiter-burst",
            "9",
            "--limiter-enabled",
            "false",
            "--cors-trusted-origins",
            "https://a.example  https://b.example",
        ])
        .unwrap();

        let config = cli.resolve().unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.limiter.requests_per_second, 5.5);
        assert_eq!(config.limiter.burst, 9);
        assert!(!config.limiter.enabled);
        assert_eq!(
            config.cors.trusted_origins,
            vec!["https://a.example", "https://b.example"]
        );
    }

    #[test]
    fn absent_flags_keep_defaults() {
        let cli = Cli::try_parse_from(["guarded-server"]).unwrap();
        let config = cli.resolve().unwrap();
        assert_eq!(config.port, 4000);
        assert_eq!(config.limiter.burst, 4);
    }

    #[test]
    fn invalid_flags_fail_validation() {
        let cli = Cli::try_parse_from(["guarded-server", "--limiter-burst", "0"]).unwrap();
        assert!(matches!(cli.resolve(), Err(ConfigError::Validation(_))));
    }
}
