//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check pipeline ordering: dependencies run before their dependents
//! - Validate value ranges (windows and TTLs > 0, addresses parse)
//! - Validate every IP list entry and signature table
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ShieldConfig → Result<(), Vec<ValidationError>>
//! - Inactive sections are not validated beyond parsing
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::net::SocketAddr;

use crate::config::schema::{CheckKind, ShieldConfig, TransformKind};
use crate::net::ip::parse_rule;

/// One semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

pub fn validate_config(config: &ShieldConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    validate_listener(config, &mut errors);
    validate_check_order(config, &mut errors);
    validate_transform_order(config, &mut errors);
    validate_ip_lists(config, &mut errors);
    validate_ranges(config, &mut errors);
    validate_signature(config, &mut errors);

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_listener(config: &ShieldConfig, errors: &mut Vec<ValidationError>) {
    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("`{}` is not a socket address", config.listener.bind_address),
        ));
    }
    if config.listener.request_timeout_secs == 0 {
        errors.push(ValidationError::new(
            "listener.request_timeout_secs",
            "must be greater than 0",
        ));
    }
    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!(
                "`{}` is not a socket address",
                config.observability.metrics_address
            ),
        ));
    }
}

fn validate_check_order(config: &ShieldConfig, errors: &mut Vec<ValidationError>) {
    let mut seen = HashSet::new();
    for kind in &config.pipeline.request_checks {
        if !seen.insert(*kind) {
            errors.push(ValidationError::new(
                "pipeline.request_checks",
                format!("`{}` listed more than once", kind.as_str()),
            ));
        }
    }

    let active = config.active_checks();
    let position = |kind: CheckKind| active.iter().position(|k| *k == kind);
    let ip = position(CheckKind::Ip);

    if let Some(origin) = position(CheckKind::Origin) {
        for required in [CheckKind::Ip, CheckKind::Url] {
            match position(required) {
                Some(at) if at < origin => {}
                _ => errors.push(ValidationError::new(
                    "pipeline.request_checks",
                    format!("`origin` requires an active `{}` check before it", required.as_str()),
                )),
            }
        }
    }

    for (at, kind) in active.iter().enumerate() {
        if !config.ignores_whitelist(*kind) {
            continue;
        }
        if !matches!(ip, Some(ip_at) if ip_at < at) {
            errors.push(ValidationError::new(
                "pipeline.request_checks",
                format!(
                    "`{}` bypasses whitelisted IPs and needs an active `ip` check before it",
                    kind.as_str()
                ),
            ));
        }
    }
}

fn validate_transform_order(config: &ShieldConfig, errors: &mut Vec<ValidationError>) {
    let mut seen = HashSet::new();
    for kind in &config.pipeline.response_transforms {
        if !seen.insert(*kind) {
            errors.push(ValidationError::new(
                "pipeline.response_transforms",
                format!("`{}` listed more than once", kind.as_str()),
            ));
        }
    }

    let active = config.active_transforms();
    if let Some(at) = active.iter().position(|k| *k == TransformKind::Compress) {
        if at + 1 != active.len() {
            errors.push(ValidationError::new(
                "pipeline.response_transforms",
                "`compress` must be the last transform",
            ));
        }
    }
    if config.compress.is_active && config.compress.level > 9 {
        errors.push(ValidationError::new("compress.level", "must be between 0 and 9"));
    }
}

fn validate_ip_lists(config: &ShieldConfig, errors: &mut Vec<ValidationError>) {
    let ip = &config.ip;
    let lists = [
        ("ip.whitelist", &ip.whitelist),
        ("ip.blacklist", &ip.blacklist),
        ("ip.local_ranges", &ip.local_ranges),
        ("ip.internal_ranges", &ip.internal_ranges),
    ];
    for (field, entries) in lists {
        for entry in entries.iter() {
            if let Err(e) = parse_rule(entry) {
                errors.push(ValidationError::new(field, e.to_string()));
            }
        }
    }
}

fn validate_ranges(config: &ShieldConfig, errors: &mut Vec<ValidationError>) {
    let mut positive = |active: bool, field: &str, value: u64| {
        if active && value == 0 {
            errors.push(ValidationError::new(field, "must be greater than 0"));
        }
    };
    let limit = &config.request_limit;
    positive(limit.is_active, "request_limit.window_secs", limit.window_secs);
    positive(limit.is_active, "request_limit.max_requests", limit.max_requests);
    positive(true, "account.ttl_secs", config.account.ttl_secs);
    positive(true, "account.max_attempts", config.account.max_attempts);
    positive(
        true,
        "account.attempt_window_secs",
        config.account.attempt_window_secs,
    );
    positive(config.csrf.is_active, "csrf.ttl_secs", config.csrf.ttl_secs);

    if config.method.is_active && config.method.allowed.is_empty() {
        errors.push(ValidationError::new("method.allowed", "must not be empty"));
    }
}

fn validate_signature(config: &ShieldConfig, errors: &mut Vec<ValidationError>) {
    let signature = &config.signature;
    if !signature.is_active {
        return;
    }
    for table in &signature.allowed_tables {
        match signature.signature_fields.get(table) {
            Some(fields) if !fields.is_empty() => {}
            _ => errors.push(ValidationError::new(
                "signature.signature_fields",
                format!("table `{table}` has no signable fields"),
            )),
        }
    }
    for (table, fields) in &signature.signature_fields {
        if fields.iter().any(|f| *f == signature.signature_column) {
            errors.push(ValidationError::new(
                "signature.signature_fields",
                format!("table `{table}` lists the signature column as signable"),
            ));
        }
    }
    if signature.key_bits < 2048 {
        errors.push(ValidationError::new("signature.key_bits", "must be at least 2048"));
    }
    if signature.private_key_path.is_none() && signature.private_key_env.trim().is_empty() {
        errors.push(ValidationError::new(
            "signature.private_key_path",
            "no key source configured",
        ));
    }
}
