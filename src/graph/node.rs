//! Contact identities as they appear at the ends of graph edges.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A contact in the affinity graph: an email address, optionally scoped to
/// the datasource it was observed through.
///
/// Nodes are never stored on their own; they exist as edge endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContactNode {
    email: String,
    data_source_id: Option<String>,
}

impl ContactNode {
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            data_source_id: None,
        }
    }

    pub fn with_data_source(email: impl Into<String>, data_source_id: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            data_source_id: Some(data_source_id.into()),
        }
    }

    /// Build a node with an optional datasource tag
    pub fn tagged(email: impl Into<String>, data_source_id: Option<&str>) -> Self {
        Self {
            email: email.into(),
            data_source_id: data_source_id.map(str::to_string),
        }
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn data_source_id(&self) -> Option<&str> {
        self.data_source_id.as_deref()
    }

    /// Name under which the node is stored: `datasource:email`, or `email`.
    pub fn storage_name(&self) -> String {
        match &self.data_source_id {
            Some(ds) => format!("{}:{}", ds, self.email),
            None => self.email.clone(),
        }
    }
}

impl fmt::Display for ContactNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.data_source_id {
            Some(ds) => write!(f, "{}:{}", ds, self.email),
            None => f.write_str(&self.email),
        }
    }
}

/// Strip the `datasource:` prefix from a stored node name.
pub fn display_name(storage_name: &str) -> &str {
    match storage_name.split_once(':') {
        Some((prefix, rest)) if !prefix.is_empty() => rest,
        _ => storage_name,
    }
}

/// Prefix shared by every node stored under a datasource
pub(crate) fn data_source_prefix(data_source_id: &str) -> String {
    format!("{}:", data_source_id)
}
