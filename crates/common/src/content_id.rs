use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier for immutable data in the content-addressed store
///
/// The store derives these from content; we treat them as opaque strings.
/// Equality is byte-equality of the string form, nothing more.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentId(String);

impl ContentId {
    pub fn new(id: impl Into<String>) -> Self {
        ContentId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<String> for ContentId {
    fn from(id: String) -> Self {
        ContentId(id)
    }
}

impl From<&str> for ContentId {
    fn from(id: &str) -> Self {
        ContentId(id.to_string())
    }
}

impl AsRef<str> for ContentId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
