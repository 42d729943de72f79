//! Token → session registry.
//!
//! [`SessionRegistry`] is the single authority for which session a bearer
//! token refers to. It is constructed once at startup, shared via `Arc`, and
//! drained by [`SessionRegistry::shutdown`] on exit. Nothing reaches it
//! through global state.
//!
//! ## Concurrency
//!
//! The map sits behind a std `RwLock`. Lookups take the read lock; `put`,
//! `remove`, sweep and shutdown take the write lock only long enough to
//! mutate the map. Session invalidation (which closes transports and may
//! block) always runs after the lock is dropped, so a slow backend never
//! stalls unrelated lookups.

pub mod session;

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use tracing::info;

use crate::error::{GatewayError, Resource, Result};
use crate::util::token_fingerprint;
pub use session::{InvalidationReport, Session};

#[derive(Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, Arc<Session>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Arc<Session>>> {
        self.sessions.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Arc<Session>>> {
        self.sessions.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Look up the session for `token`.
    pub fn get(&self, token: &str) -> Result<Arc<Session>> {
        self.read()
            .get(token)
            .cloned()
            .ok_or_else(|| GatewayError::not_found(Resource::Session, token_fingerprint(token)))
    }

    /// Register `session` under `token`, returning whatever it replaced.
    ///
    /// A token maps to at most one session; a replaced session is handed back
    /// so the caller can invalidate it.
    pub fn put(&self, token: String, session: Arc<Session>) -> Option<Arc<Session>> {
        let fingerprint = token_fingerprint(&token);
        let user = session.username().to_string();
        let mut sessions = self.write();
        let previous = sessions.insert(token, session);
        info!(token = %fingerprint, user = %user, total = sessions.len(), "Session registered");
        previous
    }

    /// Atomically remove and return the session for `token`.
    pub fn remove(&self, token: &str) -> Result<Arc<Session>> {
        let fingerprint = token_fingerprint(token);
        let mut sessions = self.write();
        let session = sessions
            .remove(token)
            .ok_or_else(|| GatewayError::not_found(Resource::Session, fingerprint.clone()))?;
        info!(token = %fingerprint, user = %session.username(), remaining = sessions.len(), "Session removed");
        Ok(session)
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Evict sessions that own no tunnels and have been idle for `timeout`.
    ///
    /// Returns the number of sessions evicted. Blocking: each evicted session
    /// is invalidated after the map lock is released.
    pub fn sweep_expired(&self, timeout: Duration) -> usize {
        let expired: Vec<(String, Arc<Session>)> = {
            let mut sessions = self.write();
            let tokens: Vec<String> = sessions
                .iter()
                .filter(|(_, s)| s.is_expired(timeout))
                .map(|(token, _)| token.clone())
                .collect();
            tokens
                .into_iter()
                .filter_map(|token| sessions.remove(&token).map(|s| (token, s)))
                .collect()
        };

        for (token, session) in &expired {
            session.invalidate();
            info!(
                token = %token_fingerprint(token),
                user = %session.username(),
                idle_secs = session.idle_for().as_secs(),
                "Session expired"
            );
        }
        expired.len()
    }

    /// Remove and invalidate every session. Used at process shutdown.
    pub fn shutdown(&self) -> usize {
        let drained: Vec<Arc<Session>> = self.write().drain().map(|(_, s)| s).collect();
        let count = drained.len();
        for session in drained {
            session.invalidate();
        }
        if count > 0 {
            info!("Invalidated {count} session(s) at shutdown");
        }
        count
    }
}
