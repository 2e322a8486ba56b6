//! Login, session identity and route gating for the board.
//! Keep the public surface thin and split implementation across sub-modules.

mod credential;
mod scheme;
mod manager;
mod session;
mod gate;
mod request_context;

pub use credential::{Credential, CredentialVerifier, VerifyOutcome, find_credential};
pub use scheme::{PasswordScheme, PlaintextScheme, Argon2Scheme, scheme_from_name};
pub use manager::{IdentityManager, IdentityToken};
pub use session::SessionManager;
pub use gate::{gate, GateDecision, LOGIN_REQUIRED};
pub use request_context::RequestContext;
