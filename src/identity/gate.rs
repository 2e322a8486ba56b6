use super::credential::Credential;

/// Body of every gate rejection.
pub const LOGIN_REQUIRED: &str = "Please log in first.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    Proceed,
    Reject(&'static str),
}

/// Admit a request only when an identity was resolved for it.
pub fn gate(identity: Option<&Credential>) -> GateDecision {
    match identity {
        Some(_) => GateDecision::Proceed,
        None => GateDecision::Reject(LOGIN_REQUIRED),
    }
}
