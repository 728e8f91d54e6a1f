//! In-memory session store
//!
//! Sessions are 128-bit random tokens with a sliding 4-hour expiry;
//! every authenticated request pushes the deadline forward. One
//! connection profile can be bound per session and the binding replaces
//! any prior one. All operations are short and hold the single lock
//! without doing I/O under it.

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use parking_lot::Mutex;
use rand::RngCore;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use subtle::ConstantTimeEq;

/// Session token length in bytes (128 bits).
const SESSION_ID_BYTES: usize = 16;

#[derive(Clone, Debug)]
struct Session {
    connection_id: Option<i64>,
    expires_at: Instant,
}

/// What the auth middleware hands to handlers via request extensions.
#[derive(Clone, Debug)]
pub struct SessionHandle {
    pub id: String,
    pub connection_id: Option<i64>,
}

/// Mutex-protected map of live sessions.
#[derive(Debug)]
pub struct SessionStore {
    sessions: Mutex<HashMap<String, Session>>,
    ttl: Duration,
}

impl SessionStore {
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    /// Create a fresh session and return its opaque id.
    pub fn create(&self) -> String {
        let mut bytes = [0u8; SESSION_ID_BYTES];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        let id = URL_SAFE_NO_PAD.encode(bytes);
        let mut sessions = self.sessions.lock();
        sweep(&mut sessions);
        sessions.insert(
            id.clone(),
            Session {
                connection_id: None,
                expires_at: Instant::now() + self.ttl,
            },
        );
        id
    }

    /// Validate a session id and slide its expiry forward. Unknown or
    /// expired ids return `None`.
    pub fn authenticate(&self, id: &str) -> Option<SessionHandle> {
        let mut sessions = self.sessions.lock();
        let now = Instant::now();
        let session = sessions.get_mut(id)?;
        if session.expires_at <= now {
            sessions.remove(id);
            return None;
        }
        session.expires_at = now + self.ttl;
        Some(SessionHandle {
            id: id.to_string(),
            connection_id: session.connection_id,
        })
    }

    /// Bind a connection profile to a session, replacing any prior
    /// binding. Returns false when the session is gone.
    pub fn bind_connection(&self, id: &str, connection_id: i64) -> bool {
        let mut sessions = self.sessions.lock();
        match sessions.get_mut(id) {
            Some(session) => {
                session.connection_id = Some(connection_id);
                true
            }
            None => false,
        }
    }

    /// Drop the binding from every session pointing at a deleted
    /// profile.
    pub fn unbind_connection(&self, connection_id: i64) {
        let mut sessions = self.sessions.lock();
        for session in sessions.values_mut() {
            if session.connection_id == Some(connection_id) {
                session.connection_id = None;
            }
        }
    }

    /// Destroy a session.
    pub fn remove(&self, id: &str) {
        self.sessions.lock().remove(id);
    }

    #[cfg(test)]
    fn force_expire(&self, id: &str) {
        if let Some(session) = self.sessions.lock().get_mut(id) {
            session.expires_at = Instant::now() - Duration::from_secs(1);
        }
    }
}

fn sweep(sessions: &mut HashMap<String, Session>) {
    let now = Instant::now();
    sessions.retain(|_, session| session.expires_at > now);
}

/// Constant-time password comparison on raw bytes.
#[must_use]
pub fn verify_password(expected: &[u8], supplied: &[u8]) -> bool {
    expected.ct_eq(supplied).into()
}
