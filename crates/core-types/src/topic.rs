//! Tenant/bucket namespace embedded in every key the storage engine writes.

use std::fmt;

/// A short string that namespaces objects within a model, letting one schema
/// host many logically isolated tenants in one physical column family.
///
/// Topics participate directly in binary keys (see the index-key grammar),
/// so they are restricted to ASCII and must not contain the `0x00` byte used
/// as a field separator.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
pub struct Topic(String);

#[derive(Debug, thiserror::Error)]
pub enum TopicError {
    #[error("topic must not be empty")]
    Empty,
    #[error("topic must not contain a NUL byte")]
    ContainsNul,
    #[error("topic must be ASCII")]
    NotAscii,
}

impl Topic {
    pub fn new(s: impl Into<String>) -> Result<Self, TopicError> {
        let s = s.into();
        if s.is_empty() {
            return Err(TopicError::Empty);
        }
        if !s.is_ascii() {
            return Err(TopicError::NotAscii);
        }
        if s.as_bytes().contains(&0u8) {
            return Err(TopicError::ContainsNul);
        }
        Ok(Self(s))
    }

    /// The default topic used when a caller does not need multi-tenancy.
    pub fn default_topic() -> Self {
        Self("default".to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl fmt::Debug for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Topic({:?})", self.0)
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<&str> for Topic {
    type Error = TopicError;
    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Topic::new(value)
    }
}
