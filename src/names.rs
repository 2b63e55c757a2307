//! Topic name validation and namespace resolution.
//!
//! Names follow the usual graph-resource conventions:
//!
//! - `/a/b` is absolute and used as-is.
//! - `a/b` is relative and joined with the namespace.
//! - `~a` is private and joined with the namespace as well, since a bus
//!   instance stands in for a single node.
//!
//! Resolved names always start with `/`, never end with `/`, and never
//! contain empty segments.

use crate::{FanoutError, Result};

/// Check that a raw, unresolved name is legal.
pub fn validate(name: &str) -> Result<()> {
    // ---
    let mut chars = name.chars();

    let first = chars
        .next()
        .ok_or_else(|| FanoutError::InvalidTopic("<empty>".into()))?;

    if !(first.is_ascii_alphabetic() || first == '/' || first == '~') {
        return Err(FanoutError::InvalidTopic(name.into()));
    }

    if chars.any(|c| !(c.is_ascii_alphanumeric() || c == '_' || c == '/')) {
        return Err(FanoutError::InvalidTopic(name.into()));
    }

    Ok(())
}

/// Collapse repeated separators, drop a trailing separator and force a
/// leading one.
pub fn normalize(name: &str) -> String {
    // ---
    let segments: Vec<&str> = name.split('/').filter(|s| !s.is_empty()).collect();
    format!("/{}", segments.join("/"))
}

/// Join `parent` and `child` with exactly one separator.
pub fn join(parent: &str, child: &str) -> String {
    normalize(&format!("{parent}/{child}"))
}

/// Resolve `name` against `namespace` into a fully qualified name.
pub fn resolve(namespace: &str, name: &str) -> Result<String> {
    // ---
    validate(name)?;

    let resolved = if name.starts_with('/') {
        normalize(name)
    } else if let Some(private) = name.strip_prefix('~') {
        join(namespace, private)
    } else {
        join(namespace, name)
    };

    if resolved == "/" {
        return Err(FanoutError::InvalidTopic(name.into()));
    }

    Ok(resolved)
}
