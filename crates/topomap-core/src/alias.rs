//! Namespaced aliases (`<namespace>:<value>`).
//!
//! Aliases let a scanner reference a node without knowing its canonical id,
//! e.g. a connection table only knows peer IP addresses.

use crate::error::{CoreError, Result};

/// Canonical-id namespace. Every node carries `id:<id>`.
pub const ID: &str = "id";
/// IPv4/IPv6 address namespace.
pub const IP: &str = "ip";
/// DNS name namespace.
pub const HOST: &str = "host";

/// Build an alias string from a namespace and a value.
pub fn make(namespace: &str, value: &str) -> String {
    format!("{namespace}:{value}")
}

pub fn id(value: &str) -> String {
    make(ID, value)
}

pub fn ip(value: &str) -> String {
    make(IP, value)
}

pub fn host(value: &str) -> String {
    make(HOST, value)
}

/// Split an alias into `(namespace, value)`.
///
/// Only the first `:` separates; IPv6 values keep their colons.
pub fn parse(alias: &str) -> Result<(&str, &str)> {
    match alias.split_once(':') {
        Some((ns, value)) if !ns.is_empty() && !value.is_empty() => Ok((ns, value)),
        _ => Err(CoreError::InvalidAlias(alias.to_string())),
    }
}
