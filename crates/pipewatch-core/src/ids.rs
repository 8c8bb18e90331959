//! Branded identifier types.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Identifier of one dashboard connection.
///
/// Generated ids are UUID v7 based, so they never repeat within a process.
#[derive(Clone, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(String);

impl ConnectionId {
    /// Generate a fresh id with the `conn_` prefix.
    pub fn new() -> Self {
        Self(format!("conn_{}", Uuid::now_v7()))
    }

    /// Wrap a caller-supplied id without validation.
    pub fn from_raw(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Borrow the underlying string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ConnectionId {
    type Err = std::convert::Infallible;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.to_owned()))
    }
}

impl AsRef<str> for ConnectionId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn connection_id_has_prefix() {
        let id = ConnectionId::new();
        assert!(id.as_str().starts_with("conn_"), "got: {id}");
    }

    #[test]
    fn generated_ids_are_unique() {
        let ids: HashSet<ConnectionId> = (0..1000).map(|_| ConnectionId::new()).collect();
        assert_eq!(ids.len(), 1000);
    }

    #[test]
    fn from_raw_preserves_value() {
        let id = ConnectionId::from_raw("dash-1");
        assert_eq!(id.as_str(), "dash-1");
        assert_eq!(id.to_string(), "dash-1");
    }

    #[test]
    fn serializes_transparently() {
        let id = ConnectionId::from_raw("conn_x");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"conn_x\"");
    }
}
