//! Queue naming: static names and path-derived names.
//!
//! Path-derived names are an external contract with deployed brokers, so
//! `slugify` keeps its exact transformation. Already-hyphenated or
//! doubled separators are passed through as-is (`/a-b//c` -> `a-b--c`).

use serde::{Deserialize, Serialize};
use std::fmt;

/// Dot-delimited queue namespace, e.g. `api.orders`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct QueueName(String);

impl QueueName {
    /// Joins non-empty parts with `.`.
    pub fn join(prefix: &str, segment: &str) -> Self {
        let joined = [prefix, segment]
            .iter()
            .filter(|part| !part.is_empty())
            .copied()
            .collect::<Vec<_>>()
            .join(".");
        Self(joined)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for QueueName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// How a queue middleware picks its queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NamingMode {
    /// One configured name for every request.
    Static(String),
    /// One queue per request path.
    PathDerived,
}

/// Trim surrounding `/`, turn inner `/` into `-`, lowercase; empty -> `index`.
pub fn slugify(path: &str) -> String {
    let dashed = path.trim_matches('/').replace('/', "-");
    if dashed.is_empty() {
        "index".to_string()
    } else {
        dashed.to_lowercase()
    }
}

pub fn resolve_name(mode: &NamingMode, prefix: &str, path: &str) -> QueueName {
    match mode {
        NamingMode::Static(name) => QueueName::join(prefix, name),
        NamingMode::PathDerived => QueueName::join(prefix, &slugify(path)),
    }
}
