use super::Credential;

/// Per-request identity, attached by the session middleware before any handler runs.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    /// Resolved credential, `None` for anonymous requests.
    pub user: Option<Credential>,
    /// Session id from the cookie, if the client sent one.
    pub session_id: Option<String>,
}

impl RequestContext {
    pub fn user_id(&self) -> Option<&str> { self.user.as_ref().map(|c| c.id.as_str()) }
}
