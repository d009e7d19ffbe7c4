//! Configuration validation

use crate::schema::{RawConfig, RawNetworkConfig, RawRetryConfig};
use std::collections::HashSet;
use thiserror::Error;

/// Validation error
#[derive(Debug, Clone, Error)]
pub enum ValidationError {
    #[error("Placement '{placement_id}': {message}")]
    PlacementError {
        placement_id: String,
        message: String,
    },

    #[error("Duplicate placement ID: {0}")]
    DuplicatePlacementId(String),

    #[error("Invalid URL '{value}' for {field}: {message}")]
    InvalidUrl {
        field: &'static str,
        value: String,
        message: String,
    },

    #[error("Invalid value for {field}: {message}")]
    InvalidValue {
        field: &'static str,
        message: String,
    },
}

/// Validate a raw configuration
pub fn validate_config(config: &RawConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    let mut seen_ids = HashSet::new();
    for placement in &config.placements {
        if placement.id.trim().is_empty() {
            errors.push(ValidationError::PlacementError {
                placement_id: placement.id.clone(),
                message: "id cannot be empty".into(),
            });
        }
        if !seen_ids.insert(&placement.id) {
            errors.push(ValidationError::DuplicatePlacementId(placement.id.clone()));
        }
    }

    if let Some(value) = &config.gating.missing_ttl
        && let Err(e) = parse_missing_ttl(value)
    {
        errors.push(ValidationError::InvalidValue {
            field: "gating.missing_ttl",
            message: e,
        });
    }

    errors.extend(validate_retry(&config.retry));
    errors.extend(validate_network(&config.network));

    errors
}

fn validate_retry(retry: &RawRetryConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if retry.backoff_base == Some(0) {
        errors.push(ValidationError::InvalidValue {
            field: "retry.backoff_base",
            message: "must be at least 1".into(),
        });
    }

    // 2^63 seconds already saturates; larger caps only hide typos
    if let Some(cap) = retry.backoff_cap
        && cap > 63
    {
        errors.push(ValidationError::InvalidValue {
            field: "retry.backoff_cap",
            message: format!("{} is larger than 63", cap),
        });
    }

    if retry.show_retry_seconds == Some(0) {
        errors.push(ValidationError::InvalidValue {
            field: "retry.show_retry_seconds",
            message: "must be positive".into(),
        });
    }

    if retry.display_failure_retry_seconds == Some(0) {
        errors.push(ValidationError::InvalidValue {
            field: "retry.display_failure_retry_seconds",
            message: "must be positive".into(),
        });
    }

    errors
}

fn validate_network(network: &RawNetworkConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if let Some(base_url) = &network.base_url
        && let Err(e) = check_http_url(base_url)
    {
        errors.push(ValidationError::InvalidUrl {
            field: "network.base_url",
            value: base_url.clone(),
            message: e,
        });
    }

    if let Some(track_url) = &network.track_url
        && let Err(e) = check_http_url(track_url)
    {
        errors.push(ValidationError::InvalidUrl {
            field: "network.track_url",
            value: track_url.clone(),
            message: e,
        });
    }

    if network.fetch_timeout_ms == Some(0) {
        errors.push(ValidationError::InvalidValue {
            field: "network.fetch_timeout_ms",
            message: "must be positive".into(),
        });
    }

    errors
}

/// Require an absolute http(s) URL
pub fn check_http_url(s: &str) -> Result<url::Url, String> {
    let parsed = url::Url::parse(s).map_err(|e| e.to_string())?;
    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        other => Err(format!("unsupported scheme '{}'", other)),
    }
}

/// Parse the missing-TTL policy name
pub fn parse_missing_ttl(s: &str) -> Result<crate::MissingTtlPolicy, String> {
    match s.to_lowercase().as_str() {
        "expire" | "expired" => Ok(crate::MissingTtlPolicy::Expire),
        "persist" | "forever" => Ok(crate::MissingTtlPolicy::Persist),
        other => Err(format!("unknown missing_ttl policy '{}' (expected expire or persist)", other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::RawPlacement;
    use crate::MissingTtlPolicy;

    fn config_with_placements(ids: &[&str]) -> RawConfig {
        RawConfig {
            config_version: 1,
            service: Default::default(),
            gating: Default::default(),
            retry: Default::default(),
            network: Default::default(),
            placements: ids
                .iter()
                .map(|id| RawPlacement {
                    id: id.to_string(),
                    auto_load: true,
                })
                .collect(),
        }
    }

    #[test]
    fn test_duplicate_id_detection() {
        let config = config_with_placements(&["main", "main"]);
        let errors = validate_config(&config);
        assert!(errors
            .iter()
            .any(|e| matches!(e, ValidationError::DuplicatePlacementId(id) if id == "main")));
    }

    #[test]
    fn test_empty_id_rejected() {
        let config = config_with_placements(&["  "]);
        let errors = validate_config(&config);
        assert!(matches!(errors[0], ValidationError::PlacementError { .. }));
    }

    #[test]
    fn test_parse_missing_ttl() {
        assert_eq!(parse_missing_ttl("expire").unwrap(), MissingTtlPolicy::Expire);
        assert_eq!(parse_missing_ttl("Persist").unwrap(), MissingTtlPolicy::Persist);
        assert!(parse_missing_ttl("sometimes").is_err());
    }

    #[test]
    fn test_check_http_url() {
        assert!(check_http_url("https://api.example.com/request").is_ok());
        assert!(check_http_url("ftp://example.com").is_err());
        assert!(check_http_url("not a url").is_err());
    }

    #[test]
    fn test_bad_urls_reported() {
        let mut config = config_with_placements(&["main"]);
        config.network.base_url = Some("mailto:ads@example.com".into());
        config.network.track_url = Some("://".into());

        let errors = validate_config(&config);
        assert_eq!(errors.len(), 2);
        assert!(errors.iter().all(|e| matches!(e, ValidationError::InvalidUrl { .. })));
    }
}
