//! Cache key derivation.
//!
//! A key is `prefix:variant:path[:query][:params]`, where `variant` is
//! `full` or `partial`. The variant sits before every request-controlled part,
//! so no path or query can make one variant's key spell the other's. Keys
//! longer than the configured limit collapse to `prefix:<sha256 hex>`.

use std::collections::BTreeMap;

use sha2::{Digest, Sha256};

/// Route parameters, sorted by name.
pub type RouteParams = BTreeMap<String, String>;

const FULL_VARIANT: &str = "full";
const PARTIAL_VARIANT: &str = "partial";

/// The parts of a request that select a cached variant.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestIdentity {
    pub path: String,
    pub query: Option<String>,
    /// Set for incremental-update requests that expect a fragment, not a page.
    pub partial: bool,
}

impl RequestIdentity {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            query: None,
            partial: false,
        }
    }

    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        let query = query.into();
        self.query = (!query.is_empty()).then_some(query);
        self
    }

    pub fn partial(mut self, partial: bool) -> Self {
        self.partial = partial;
        self
    }
}

/// Builds cache keys with a fixed length ceiling.
#[derive(Debug, Clone, Copy)]
pub struct KeyBuilder {
    max_len: usize,
}

impl KeyBuilder {
    pub fn new(max_len: usize) -> Self {
        Self { max_len }
    }

    pub fn build(&self, prefix: &str, identity: &RequestIdentity, params: &RouteParams) -> String {
        let variant = if identity.partial {
            PARTIAL_VARIANT
        } else {
            FULL_VARIANT
        };
        let mut parts: Vec<String> = vec![
            prefix.to_string(),
            variant.to_string(),
            identity.path.clone(),
        ];

        if let Some(query) = identity.query.as_deref().filter(|q| !q.is_empty()) {
            parts.push(query.to_string());
        }

        if !params.is_empty() {
            parts.push(serialize_params(params));
        }

        let key = parts.join(":");
        if key.len() > self.max_len {
            return format!("{prefix}:{}", digest(&key));
        }
        key
    }
}

impl Default for KeyBuilder {
    fn default() -> Self {
        Self::new(100)
    }
}

fn serialize_params(params: &RouteParams) -> String {
    let pairs: Vec<(&str, &str)> = params
        .iter()
        .map(|(name, value)| (name.as_str(), value.as_str()))
        .collect();
    serde_json::to_string(&pairs).unwrap_or_default()
}

fn digest(value: &str) -> String {
    hex::encode(Sha256::digest(value.as_bytes()))
}

/// Substitute `{name}` placeholders in a route template.
pub fn resolve_path(template: &str, params: &RouteParams) -> String {
    params.iter().fold(template.to_string(), |path, (name, value)| {
        path.replace(&format!("{{{name}}}"), value)
    })
}
