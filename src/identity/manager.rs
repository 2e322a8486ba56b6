use super::credential::{find_credential, Credential};
use crate::storage::{SharedStore, StoreResult};

/// What a session remembers about its user: the credential identifier alone.
pub type IdentityToken = String;

/// Converts between authenticated credentials and the token kept in the session table.
#[derive(Clone)]
pub struct IdentityManager {
    store: SharedStore,
}

impl IdentityManager {
    pub fn new(store: SharedStore) -> Self { Self { store } }

    /// Project a credential down to the token persisted after login.
    pub fn serialize(&self, record: &Credential) -> IdentityToken {
        record.id.clone()
    }

    /// Rehydrate the full credential for a token. `None` when the credential has been
    /// removed since the token was issued; the request is then anonymous.
    pub fn deserialize(&self, token: &str) -> StoreResult<Option<Credential>> {
        find_credential(&self.store, token)
    }
}
