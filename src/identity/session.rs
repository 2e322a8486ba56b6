use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use base64::Engine;
use parking_lot::RwLock;
use tracing::debug;

use super::manager::IdentityToken;

#[derive(Debug, Clone)]
struct SessionEntry {
    token: IdentityToken,
    expires_at: Instant,
}

fn gen_id() -> Result<String, getrandom::Error> {
    // 256-bit random id, base64url without padding
    let mut buf = [0u8; 32];
    getrandom::getrandom(&mut buf)?;
    Ok(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(buf))
}

/// Server-side session table: opaque session id (the cookie value) to identity token.
///
/// A session id present here is `Identified`; anything else is `Anonymous`.
#[derive(Clone)]
pub struct SessionManager {
    ttl: Duration,
    entries: Arc<RwLock<HashMap<String, SessionEntry>>>,
}

impl Default for SessionManager {
    fn default() -> Self { Self::new(Duration::from_secs(60 * 60)) }
}

impl SessionManager {
    pub fn new(ttl: Duration) -> Self {
        Self { ttl, entries: Arc::new(RwLock::new(HashMap::new())) }
    }

    pub fn ttl(&self) -> Duration { self.ttl }

    /// Start an identified session for `token` and return its new session id.
    pub fn issue(&self, token: IdentityToken) -> Result<String, getrandom::Error> {
        let sid = gen_id()?;
        let entry = SessionEntry { token, expires_at: Instant::now() + self.ttl };
        debug!(user = %entry.token, ttl_secs = self.ttl.as_secs(), "session.issue");
        self.entries.write().insert(sid.clone(), entry);
        Ok(sid)
    }

    /// Token for a live session, pushing its expiry out by another `ttl` (idle timeout).
    /// Expired sessions are dropped on sight.
    pub fn resolve(&self, sid: &str) -> Option<IdentityToken> {
        let now = Instant::now();
        let mut map = self.entries.write();
        match map.get_mut(sid) {
            Some(ent) if ent.expires_at > now => {
                ent.expires_at = now + self.ttl;
                return Some(ent.token.clone());
            }
            Some(_) => {}
            None => return None,
        }
        map.remove(sid);
        debug!("session.expired");
        None
    }

    /// Return the session to `Anonymous`. Returns true if it was identified.
    pub fn clear(&self, sid: &str) -> bool {
        let removed = self.entries.write().remove(sid).is_some();
        if removed { debug!("session.clear"); }
        removed
    }

    /// Drop every expired session, returning how many were removed.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut map = self.entries.write();
        let before = map.len();
        map.retain(|_, ent| ent.expires_at > now);
        before - map.len()
    }

    pub fn len(&self) -> usize { self.entries.read().len() }

    pub fn is_empty(&self) -> bool { self.len() == 0 }
}
