/// Name validation for kinds, namespaces, properties and project ids
///
/// The service rejects these with an invalid-argument status; checking them
/// client-side surfaces the error before any RPC is issued.

use crate::{Error, Result};
use lazy_static::lazy_static;
use regex::Regex;

/// Property name that addresses the entity key in filters and orders
pub const KEY_PROPERTY: &str = "__key__";

/// Maximum length in bytes for kinds, names and property names
pub const MAX_NAME_BYTES: usize = 1500;

lazy_static! {
    static ref NAMESPACE_RE: Regex = Regex::new(r"^[0-9A-Za-z._\-]{0,100}$").unwrap();
    static ref PROJECT_ID_RE: Regex = Regex::new(r"^[A-Za-z0-9][A-Za-z0-9.:_\-]{0,99}$").unwrap();
    static ref RESERVED_RE: Regex = Regex::new(r"^__.*__$").unwrap();
}

/// Validate an entity kind
pub fn validate_kind(kind: &str) -> Result<()> {
    if kind.is_empty() {
        return Err(Error::InvalidKey("kind must not be empty".to_string()));
    }
    if kind.len() > MAX_NAME_BYTES {
        return Err(Error::InvalidKey(format!(
            "kind exceeds {} bytes",
            MAX_NAME_BYTES
        )));
    }
    if kind.starts_with("__") {
        return Err(Error::InvalidKey(format!("kind '{}' is reserved", kind)));
    }
    Ok(())
}

/// Validate a string identifier (key name)
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::InvalidKey("name must not be empty".to_string()));
    }
    if name.len() > MAX_NAME_BYTES {
        return Err(Error::InvalidKey(format!(
            "name exceeds {} bytes",
            MAX_NAME_BYTES
        )));
    }
    if RESERVED_RE.is_match(name) {
        return Err(Error::InvalidKey(format!("name '{}' is reserved", name)));
    }
    Ok(())
}

/// Validate a numeric identifier
pub fn validate_id(id: i64) -> Result<()> {
    if id <= 0 {
        return Err(Error::InvalidKey(format!("id must be positive, got {}", id)));
    }
    Ok(())
}

/// Validate a namespace (the empty string is the default namespace)
pub fn validate_namespace(namespace: &str) -> Result<()> {
    if !NAMESPACE_RE.is_match(namespace) {
        return Err(Error::InvalidKey(format!(
            "namespace '{}' must match [0-9A-Za-z._-]{{0,100}}",
            namespace
        )));
    }
    if RESERVED_RE.is_match(namespace) {
        return Err(Error::InvalidKey(format!("namespace '{}' is reserved", namespace)));
    }
    Ok(())
}

/// Validate a property name used in a filter, order, projection or group-by
pub fn validate_property(property: &str) -> Result<()> {
    if property.is_empty() {
        return Err(Error::InvalidQuery("property name must not be empty".to_string()));
    }
    if property.len() > MAX_NAME_BYTES {
        return Err(Error::InvalidQuery(format!(
            "property name exceeds {} bytes",
            MAX_NAME_BYTES
        )));
    }
    if property != KEY_PROPERTY && RESERVED_RE.is_match(property) {
        return Err(Error::InvalidQuery(format!(
            "property '{}' is reserved",
            property
        )));
    }
    Ok(())
}

/// Validate a project id
pub fn validate_project_id(project_id: &str) -> Result<()> {
    if !PROJECT_ID_RE.is_match(project_id) {
        return Err(Error::InvalidArgument(format!(
            "invalid project id '{}'",
            project_id
        )));
    }
    Ok(())
}
