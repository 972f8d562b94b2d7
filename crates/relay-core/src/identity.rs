//! Authenticated caller identity and request identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// The caller established by an authentication unit.
///
/// Stored in request state under [`IDENTITY_KEY`](crate::state::IDENTITY_KEY).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Stable subject identifier (user id, service name, key id).
    pub subject: String,

    /// Authentication scheme that produced this identity, e.g. `Bearer`.
    pub scheme: String,

    /// Granted scopes.
    #[serde(default)]
    pub scopes: Vec<String>,
}

impl Identity {
    /// Creates an identity with no scopes.
    pub fn new(subject: impl Into<String>, scheme: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            scheme: scheme.into(),
            scopes: Vec::new(),
        }
    }

    /// Adds scopes to this identity.
    #[must_use]
    pub fn with_scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scopes.extend(scopes.into_iter().map(Into::into));
        self
    }

    /// Returns true if the identity carries `scope`.
    #[must_use]
    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes.iter().any(|s| s == scope)
    }

    /// Returns an identifier suitable for logs. Never contains credentials.
    #[must_use]
    pub fn log_id(&self) -> String {
        format!("{}:{}", self.scheme.to_ascii_lowercase(), self.subject)
    }
}

/// A unique identifier for a request, using UUID v7.
///
/// UUID v7 is time-ordered, which keeps ids sortable in logs.
///
/// ```
/// use relay_core::RequestId;
///
/// let id = RequestId::new();
/// let parsed: RequestId = id.to_string().parse().unwrap();
/// assert_eq!(id, parsed);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(Uuid);

impl RequestId {
    /// Creates a fresh time-ordered request id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Wraps an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for RequestId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

impl From<Uuid> for RequestId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_scopes() {
        let identity = Identity::new("alice", "Bearer").with_scopes(["read", "write"]);
        assert!(identity.has_scope("read"));
        assert!(!identity.has_scope("admin"));
        assert_eq!(identity.log_id(), "bearer:alice");
    }

    #[test]
    fn test_identity_serialization() {
        let identity = Identity::new("svc-orders", "Bearer");
        let json = serde_json::to_string(&identity).unwrap();
        assert_eq!(json, r#"{"subject":"svc-orders","scheme":"Bearer","scopes":[]}"#);

        let parsed: Identity =
            serde_json::from_str(r#"{"subject":"svc-orders","scheme":"Bearer"}"#).unwrap();
        assert_eq!(parsed, identity);
    }

    #[test]
    fn test_request_ids_are_unique() {
        assert_ne!(RequestId::new(), RequestId::new());
    }

    #[test]
    fn test_request_id_is_v7() {
        let id = RequestId::new();
        assert_eq!(id.as_uuid().get_version_num(), 7);
    }

    #[test]
    fn test_request_id_parse_rejects_garbage() {
        assert!("not-a-uuid".parse::<RequestId>().is_err());
    }
}
