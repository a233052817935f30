//! Lease labels
//!
//! Labels are written as `key=value` pairs separated by commas, the same
//! syntax `kubectl` uses for equality-based selectors.

use std::collections::BTreeMap;

use crate::error::LockError;

/// Label naming the tool that manages a resource
pub const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";

/// Value of [`MANAGED_BY_LABEL`] on every lease written by klock
pub const MANAGED_BY_VALUE: &str = "klock";

/// Label set, ordered by key
pub type Labels = BTreeMap<String, String>;

/// Labels applied to every lease
pub fn common_labels() -> Labels {
    Labels::from([(MANAGED_BY_LABEL.to_string(), MANAGED_BY_VALUE.to_string())])
}

/// `extra` plus the common labels, which take precedence
pub fn merge_labels(extra: &Labels) -> Labels {
    let mut merged = extra.clone();
    merged.extend(common_labels());
    merged
}

/// Parse `a=b,c=d`
///
/// Whitespace around pairs is ignored and an empty string yields no labels.
pub fn parse_labels(input: &str) -> Result<Labels, LockError> {
    let mut labels = Labels::new();
    for pair in input.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let (key, value) = pair
            .split_once('=')
            .map(|(k, v)| (k.trim(), v.trim()))
            .ok_or_else(|| invalid(pair, "expected key=value"))?;
        validate_key(pair, key)?;
        validate_value(pair, value)?;
        labels.insert(key.to_string(), value.to_string());
    }
    Ok(labels)
}

/// Render labels as `a=b,c=d`, or `<none>` when empty
pub fn format_labels(labels: &Labels) -> String {
    if labels.is_empty() {
        return "<none>".to_string();
    }
    labels
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(",")
}

fn invalid(pair: &str, reason: &str) -> LockError {
    LockError::InvalidConfiguration(format!("invalid label '{}': {}", pair, reason))
}

fn is_label_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')
}

// Optional DNS prefix followed by a name of at most 63 characters
fn validate_key(pair: &str, key: &str) -> Result<(), LockError> {
    let name = match key.rsplit_once('/') {
        Some((prefix, name)) => {
            let valid_prefix = prefix
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '.'));
            if prefix.is_empty() || !valid_prefix {
                return Err(invalid(pair, "invalid key prefix"));
            }
            name
        }
        None => key,
    };
    if name.is_empty() || name.len() > 63 || !name.chars().all(is_label_char) {
        return Err(invalid(pair, "invalid key"));
    }
    Ok(())
}

fn validate_value(pair: &str, value: &str) -> Result<(), LockError> {
    if value.len() > 63 || !value.chars().all(is_label_char) {
        return Err(invalid(pair, "invalid value"));
    }
    Ok(())
}
