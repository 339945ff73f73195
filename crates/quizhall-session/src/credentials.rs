//! What a client presents when its socket is upgraded.

/// Name of the cookie the HTTP side sets at login.
pub const SESSION_COOKIE: &str = "session_id";

/// Credentials captured from the upgrade request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    /// Value of the `session_id` cookie, if present and non-empty.
    pub session_token: Option<String>,
}

impl Credentials {
    pub fn new(session_token: impl Into<String>) -> Self {
        Self {
            session_token: Some(session_token.into()),
        }
    }

    /// Extracts credentials from a raw `Cookie` header
    /// (`name=value; name2=value2`).
    pub fn from_cookie_header(header: Option<&str>) -> Self {
        let session_token = header.and_then(|h| {
            h.split(';').find_map(|pair| {
                let (name, value) = pair.trim().split_once('=')?;
                (name.trim() == SESSION_COOKIE && !value.trim().is_empty())
                    .then(|| value.trim().to_owned())
            })
        });
        Self { session_token }
    }
}
