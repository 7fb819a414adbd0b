//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (batch sizes, intervals > 0)
//! - Check addresses and URLs parse when the chain is enabled
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ServiceConfig → Result<(), Vec<ValidationError>>

use std::fmt;
use std::net::SocketAddr;

use crate::config::schema::ServiceConfig;

/// A single semantic problem with a configuration value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self { field, message: message.into() }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

pub fn validate_config(config: &ServiceConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.poller.interval_ms == 0 {
        errors.push(ValidationError::new("poller.interval_ms", "must be greater than 0"));
    }

    let batching = &config.batching;
    for (field, value) in [
        ("batching.settlement_batch_size", batching.settlement_batch_size),
        ("batching.mint_batch_size", batching.mint_batch_size),
        ("batching.insert_batch_size", batching.insert_batch_size),
        ("batching.outbox_batch_size", batching.outbox_batch_size),
    ] {
        if value == 0 {
            errors.push(ValidationError::new(field, "must be greater than 0"));
        }
    }
    if batching.max_blocks_per_check == 0 {
        errors.push(ValidationError::new("batching.max_blocks_per_check", "must be greater than 0"));
    }

    if config.chain.enabled {
        validate_chain(config, &mut errors);
    }

    let observability = &config.observability;
    if !matches!(observability.log_format.as_str(), "pretty" | "json") {
        errors.push(ValidationError::new(
            "observability.log_format",
            format!("unknown format '{}'", observability.log_format),
        ));
    }
    if observability.metrics_enabled && observability.metrics_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("'{}' is not a socket address", observability.metrics_address),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_chain(config: &ServiceConfig, errors: &mut Vec<ValidationError>) {
    let chain = &config.chain;
    if url::Url::parse(&chain.access_api_url).is_err() {
        errors.push(ValidationError::new(
            "chain.access_api_url",
            format!("'{}' is not a URL", chain.access_api_url),
        ));
    }
    if chain.rpc_timeout_secs == 0 {
        errors.push(ValidationError::new("chain.rpc_timeout_secs", "must be greater than 0"));
    }
    if chain.seal_timeout_secs == 0 {
        errors.push(ValidationError::new("chain.seal_timeout_secs", "must be greater than 0"));
    }
    if chain.seal_poll_base_ms > chain.seal_poll_max_ms {
        errors.push(ValidationError::new(
            "chain.seal_poll_base_ms",
            "must not exceed chain.seal_poll_max_ms",
        ));
    }

    if config.account.address().is_err() {
        errors.push(ValidationError::new(
            "account.address",
            format!("'{}' is not an account address", config.account.address),
        ));
    }
    if config.account.key_indexes.is_empty() {
        errors.push(ValidationError::new("account.key_indexes", "at least one key index required"));
    }
    if config.account.private_key_env.is_empty() {
        errors.push(ValidationError::new("account.private_key_env", "must name an environment variable"));
    }

    if config.contracts.pds_address().is_err() {
        errors.push(ValidationError::new("contracts.pds_address", "not an account address"));
    }
    if config.contracts.non_fungible_token_address().is_err() {
        errors.push(ValidationError::new("contracts.non_fungible_token_address", "not an account address"));
    }
    if config.contracts.pds_name.is_empty() {
        errors.push(ValidationError::new("contracts.pds_name", "must not be empty"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&ServiceConfig::default()).is_ok());
    }

    #[test]
    fn test_collects_all_errors() {
        let mut config = ServiceConfig::default();
        config.batching.settlement_batch_size = 0;
        config.batching.max_blocks_per_check = 0;
        config.observability.log_format = "xml".into();
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 3);
    }

    #[test]
    fn test_chain_checks_only_when_enabled() {
        let mut config = ServiceConfig::default();
        config.account.key_indexes.clear();
        config.account.address = "nope".into();
        assert!(validate_config(&config).is_ok());

        config.chain.enabled = true;
        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field).collect();
        assert!(fields.contains(&"account.address"));
        assert!(fields.contains(&"account.key_indexes"));
    }

    #[test]
    fn test_bad_metrics_address() {
        let mut config = ServiceConfig::default();
        config.observability.metrics_enabled = true;
        config.observability.metrics_address = "localhost".into();
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors[0].field, "observability.metrics_address");
    }
}
