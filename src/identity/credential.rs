use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use super::scheme::PasswordScheme;
use crate::error::{AppError, AppResult};
use crate::storage::{collections, Document, DocumentStore, Filter, SharedStore, StoreResult};

/// A login record as stored in the `login` collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub id: String,
    pub pw: String,
}

impl Credential {
    fn into_document(self) -> Document {
        let mut doc = Document::new();
        doc.insert("id".into(), Value::String(self.id));
        doc.insert("pw".into(), Value::String(self.pw));
        doc
    }
}

/// Look up the credential whose `id` equals `identifier`.
pub fn find_credential(store: &SharedStore, identifier: &str) -> StoreResult<Option<Credential>> {
    let Some(doc) = store.find_one(collections::LOGIN, &Filter::by("id", identifier))? else { return Ok(None); };
    let cred: Credential = serde_json::from_value(Value::Object(doc))?;
    Ok(Some(cred))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyOutcome {
    /// No credential with that identifier.
    NotFound,
    /// Credential found but the secret does not match.
    Mismatch,
    Authenticated(Credential),
}

impl VerifyOutcome {
    /// Human-readable reason shown on a failed login.
    pub fn message(&self) -> &'static str {
        match self {
            VerifyOutcome::NotFound => "This account does not exist.",
            VerifyOutcome::Mismatch => "Wrong password.",
            VerifyOutcome::Authenticated(_) => "ok",
        }
    }
}

/// Checks submitted credentials against the `login` collection.
///
/// The comparison itself is delegated to a `PasswordScheme`; callers never see it.
#[derive(Clone)]
pub struct CredentialVerifier {
    store: SharedStore,
    scheme: Arc<dyn PasswordScheme>,
}

impl CredentialVerifier {
    pub fn new(store: SharedStore, scheme: Arc<dyn PasswordScheme>) -> Self { Self { store, scheme } }

    pub fn scheme_name(&self) -> &'static str { self.scheme.name() }

    /// Storage faults are returned as errors, never reported as a mismatch.
    pub fn verify(&self, identifier: &str, secret: &str) -> StoreResult<VerifyOutcome> {
        let Some(cred) = find_credential(&self.store, identifier)? else {
            debug!(user = identifier, "login for unknown identifier");
            return Ok(VerifyOutcome::NotFound);
        };
        if self.scheme.matches(&cred.pw, secret) {
            Ok(VerifyOutcome::Authenticated(cred))
        } else {
            debug!(user = identifier, "login secret mismatch");
            Ok(VerifyOutcome::Mismatch)
        }
    }

    /// Store a new credential. Duplicate identifiers are not checked; the first
    /// record wins on lookup.
    pub fn register(&self, identifier: &str, secret: &str) -> AppResult<()> {
        let pw = self.scheme.seal(secret).map_err(|e| AppError::internal("seal_failed".to_string(), e.to_string()))?;
        let cred = Credential { id: identifier.to_string(), pw };
        self.store.insert_one(collections::LOGIN, cred.into_document())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::{Argon2Scheme, PlaintextScheme};
    use crate::storage::MemoryStore;

    fn verifier_with(scheme: Arc<dyn PasswordScheme>) -> (SharedStore, CredentialVerifier) {
        let store: SharedStore = Arc::new(MemoryStore::new());
        (store.clone(), CredentialVerifier::new(store, scheme))
    }

    #[test]
    fn alice_scenario() {
        let (_store, v) = verifier_with(Arc::new(PlaintextScheme));
        v.register("alice", "pw1").unwrap();
        match v.verify("alice", "pw1").unwrap() {
            VerifyOutcome::Authenticated(c) => assert_eq!(c.id, "alice"),
            other => panic!("expected Authenticated, got {other:?}"),
        }
        assert_eq!(v.verify("alice", "wrong").unwrap(), VerifyOutcome::Mismatch);
        assert_eq!(v.verify("bob", "x").unwrap(), VerifyOutcome::NotFound);
    }

    #[test]
    fn authenticated_iff_secret_matches_for_many_pairs() {
        let (_store, v) = verifier_with(Arc::new(PlaintextScheme));
        let pairs = [("u1", "a"), ("u2", ""), ("u3", "with space"), ("u4", "ünïcode"), ("u5", "A")];
        for (id, pw) in pairs { v.register(id, pw).unwrap(); }
        for (id, pw) in pairs {
            for (_, candidate) in pairs {
                let out = v.verify(id, candidate).unwrap();
                if candidate == pw {
                    assert!(matches!(out, VerifyOutcome::Authenticated(ref c) if c.id == id));
                } else {
                    assert_eq!(out, VerifyOutcome::Mismatch, "{id} with {candidate:?}");
                }
            }
        }
        for id in ["nobody", "U1", ""] {
            assert_eq!(v.verify(id, "a").unwrap(), VerifyOutcome::NotFound);
        }
    }

    #[test]
    fn argon2_scheme_stores_hash_not_secret() {
        let (store, v) = verifier_with(Arc::new(Argon2Scheme));
        v.register("alice", "pw1").unwrap();
        let raw = store.find_one(collections::LOGIN, &Filter::by("id", "alice")).unwrap().unwrap();
        assert_ne!(raw["pw"], Value::from("pw1"));
        assert!(matches!(v.verify("alice", "pw1").unwrap(), VerifyOutcome::Authenticated(_)));
        assert_eq!(v.verify("alice", "pw2").unwrap(), VerifyOutcome::Mismatch);
    }

    #[test]
    fn duplicate_registration_keeps_first_record() {
        let (store, v) = verifier_with(Arc::new(PlaintextScheme));
        v.register("alice", "first").unwrap();
        v.register("alice", "second").unwrap();
        assert_eq!(store.find(collections::LOGIN, &Filter::by("id", "alice")).unwrap().len(), 2);
        assert!(matches!(v.verify("alice", "first").unwrap(), VerifyOutcome::Authenticated(_)));
        assert_eq!(v.verify("alice", "second").unwrap(), VerifyOutcome::Mismatch);
    }

    #[test]
    fn outcome_messages_differ() {
        assert_ne!(VerifyOutcome::NotFound.message(), VerifyOutcome::Mismatch.message());
    }
}
