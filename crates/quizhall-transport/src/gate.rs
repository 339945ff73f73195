//! The connection-upgrade gate.

use std::collections::HashSet;

/// Headers captured from the HTTP upgrade request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HandshakeInfo {
    /// The `Origin` header, if sent.
    pub origin: Option<String>,
    /// The raw `Cookie` header, if sent. Session resolution reads it.
    pub cookie: Option<String>,
}

/// Allow-list of browser origins permitted to open a socket.
///
/// An empty list allows every origin (development mode). Once any origin
/// is listed, requests without an `Origin` header are refused too.
#[derive(Debug, Clone, Default)]
pub struct OriginGate {
    allowed: HashSet<String>,
}

impl OriginGate {
    /// A gate that lets every request through.
    pub fn allow_any() -> Self {
        Self::default()
    }

    /// A gate that only admits the given origins.
    pub fn new<I, S>(origins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            allowed: origins.into_iter().map(Into::into).collect(),
        }
    }

    /// Returns `true` if a request carrying `origin` may upgrade.
    pub fn allows(&self, origin: Option<&str>) -> bool {
        if self.allowed.is_empty() {
            return true;
        }
        origin.is_some_and(|o| self.allowed.contains(o))
    }

    /// Returns `true` if no allow-list is configured.
    pub fn is_open(&self) -> bool {
        self.allowed.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_gate_allows_everything() {
        let gate = OriginGate::allow_any();
        assert!(gate.is_open());
        assert!(gate.allows(None));
        assert!(gate.allows(Some("https://evil.example")));
    }

    #[test]
    fn test_listed_origin_is_allowed() {
        let gate = OriginGate::new(["https://localhost:5173"]);
        assert!(gate.allows(Some("https://localhost:5173")));
        assert!(!gate.allows(Some("https://127.0.0.1:5173")));
    }

    #[test]
    fn test_missing_origin_is_refused_when_list_configured() {
        let gate = OriginGate::new(["https://localhost:5173"]);
        assert!(!gate.allows(None));
    }
}
