//! Lead and enrollment identifiers
//!
//! Enrollment IDs use the format: `{8-char-hex}-seq-{slug}`
//! Example: `9f1c03ab-seq-acme-dental`

use serde::{Deserialize, Serialize};

/// Identity of the external CRM record an enrollment tracks
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LeadId(String);

impl LeadId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for LeadId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for LeadId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for LeadId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Generate an enrollment ID for a lead
///
/// Every enrollment gets a fresh ID, so a re-enrollment is distinguishable
/// from the sequence it replaced.
pub fn generate_enrollment_id(lead: &LeadId) -> String {
    // The leading v7 bits are a millisecond timestamp; take the random tail
    let simple = uuid::Uuid::now_v7().simple().to_string();
    let hex = &simple[simple.len() - 8..];
    format!("{}-seq-{}", hex, slugify(lead.as_str()))
}

fn slugify(text: &str) -> String {
    text.to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '-' })
        .collect::<String>()
        .split('-')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}
