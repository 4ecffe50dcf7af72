//! Endpoint identifiers
//!
//! An EID is an opaque address string such as `dtn://mars/rover`. The node
//! never parses the scheme; the only structure it relies on is the `/`
//! segment boundary used for prefix matching.

use serde::{Deserialize, Serialize};

/// Endpoint identifier
#[derive(
    Debug,
    Clone,
    Default,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    derive_more::Display,
)]
#[serde(transparent)]
pub struct Eid(String);

impl Eid {
    /// Create an EID from any string
    pub fn new(eid: impl Into<String>) -> Self {
        Self(eid.into())
    }

    /// The null endpoint, used where an EID is optional on the wire
    pub fn none() -> Self {
        Self(String::new())
    }

    /// Borrow the EID as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Check whether the EID is empty
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Check whether this EID is a segment-aligned prefix of `other`
    ///
    /// `dtn://mars` is a prefix of `dtn://mars` and `dtn://mars/rover`, but
    /// not of `dtn://marsbase/lab`. An empty EID is a prefix of nothing.
    pub fn is_prefix_of(&self, other: &Eid) -> bool {
        let prefix = self.as_str();
        let full = other.as_str();

        if prefix.is_empty() || !full.starts_with(prefix) {
            return false;
        }
        if full.len() == prefix.len() || prefix.ends_with('/') {
            return true;
        }
        full.as_bytes()[prefix.len()] == b'/'
    }
}

impl From<&str> for Eid {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Eid {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl AsRef<str> for Eid {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
