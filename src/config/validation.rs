//! Configuration validation.
//!
//! Catches topology mistakes at load time instead of at routing time: a
//! config with zero or two primaries must never reach the registry.

use std::collections::HashSet;

use thiserror::Error;

use crate::config::schema::{RoleConfig, RouterConfig};

/// A single validation failure with enough context to fix the config.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("no endpoints configured")]
    NoEndpoints,

    #[error("expected exactly one primary, found {0}")]
    PrimaryCount(usize),

    #[error("duplicate endpoint name: {0}")]
    DuplicateName(String),

    #[error("endpoint {0} has empty address")]
    EmptyAddress(String),

    #[error("endpoint {0} has zero weight")]
    ZeroWeight(String),

    #[error("pool_min ({min}) exceeds pool_max ({max})")]
    PoolBounds { min: usize, max: usize },
}

/// Validate a loaded configuration, collecting every problem found.
pub fn validate_config(config: &RouterConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.endpoints.is_empty() {
        errors.push(ValidationError::NoEndpoints);
    }

    let primaries = config
        .endpoints
        .iter()
        .filter(|e| e.role == RoleConfig::Primary)
        .count();
    if !config.endpoints.is_empty() && primaries != 1 {
        errors.push(ValidationError::PrimaryCount(primaries));
    }

    let mut seen = HashSet::new();
    for endpoint in &config.endpoints {
        if !seen.insert(endpoint.name.as_str()) {
            errors.push(ValidationError::DuplicateName(endpoint.name.clone()));
        }
        if endpoint.address.trim().is_empty() {
            errors.push(ValidationError::EmptyAddress(endpoint.name.clone()));
        }
        if endpoint.weight == 0 {
            errors.push(ValidationError::ZeroWeight(endpoint.name.clone()));
        }
    }

    if config.pool.pool_min > config.pool.pool_max {
        errors.push(ValidationError::PoolBounds {
            min: config.pool.pool_min,
            max: config.pool.pool_max,
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::EndpointConfig;

    fn endpoint(name: &str, role: RoleConfig) -> EndpointConfig {
        EndpointConfig {
            name: name.to_string(),
            address: format!("{name}.db.internal:5432"),
            role,
            weight: 1,
        }
    }

    #[test]
    fn accepts_single_primary_topology() {
        let config = RouterConfig {
            endpoints: vec![
                endpoint("p1", RoleConfig::Primary),
                endpoint("r1", RoleConfig::Replica),
            ],
            ..Default::default()
        };
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn rejects_two_primaries() {
        let config = RouterConfig {
            endpoints: vec![
                endpoint("p1", RoleConfig::Primary),
                endpoint("p2", RoleConfig::Primary),
            ],
            ..Default::default()
        };
        let errors = validate_config(&config).unwrap_err();
        assert!(errors.contains(&ValidationError::PrimaryCount(2)));
    }

    #[test]
    fn rejects_inverted_pool_bounds() {
        let mut config = RouterConfig {
            endpoints: vec![endpoint("p1", RoleConfig::Primary)],
            ..Default::default()
        };
        config.pool.pool_min = 8;
        config.pool.pool_max = 4;
        let errors = validate_config(&config).unwrap_err();
        assert!(errors.contains(&ValidationError::PoolBounds { min: 8, max: 4 }));
    }
}
