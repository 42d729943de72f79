//! Per-principal session state.
//!
//! A [`Session`] owns the tunnels one authenticated principal currently has
//! open and remembers whether it ever had any. The tunnel map and the
//! `terminated` flag live under one `RwLock` so `add_tunnel` can never slip a
//! tunnel in after `invalidate` has drained the map. That lock is never held
//! across a transport close.
//!
//! Tunnels that stop being open (closed directly, or their transport died)
//! are pruned lazily on the next lookup, so they never count toward
//! `has_tunnels` or keep an idle session from expiring.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant, SystemTime};

use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{GatewayError, Resource, Result};
use crate::tunnel::Tunnel;

#[derive(Default)]
struct TunnelSet {
    tunnels: HashMap<Uuid, Arc<dyn Tunnel>>,
    terminated: bool,
}

/// Outcome of [`Session::invalidate`].
#[derive(Debug, Default)]
pub struct InvalidationReport {
    /// False when the session had already been invalidated.
    pub performed: bool,
    pub closed: Vec<Uuid>,
    pub failed: Vec<(Uuid, GatewayError)>,
}

pub struct Session {
    username: String,
    created_at: SystemTime,
    last_accessed: Mutex<Instant>,
    state: RwLock<TunnelSet>,
    had_tunnels: AtomicBool,
}

impl Session {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            created_at: SystemTime::now(),
            last_accessed: Mutex::new(Instant::now()),
            state: RwLock::new(TunnelSet::default()),
            had_tunnels: AtomicBool::new(false),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, TunnelSet> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, TunnelSet> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn created_at(&self) -> SystemTime {
        self.created_at
    }

    /// Record activity by the principal.
    pub fn touch(&self) {
        *self
            .last_accessed
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Instant::now();
    }

    pub fn idle_for(&self) -> Duration {
        self.last_accessed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .elapsed()
    }

    /// Whether the session may be evicted after `timeout` of inactivity.
    /// Sessions with open tunnels never expire.
    pub fn is_expired(&self, timeout: Duration) -> bool {
        !self.has_tunnels() && self.idle_for() >= timeout
    }

    /// Register `tunnel` under its id.
    ///
    /// Fails with `InvalidState` once the session has been invalidated; the
    /// tunnel is not inserted and the caller stays responsible for closing it.
    pub fn add_tunnel(&self, tunnel: Arc<dyn Tunnel>) -> Result<()> {
        let id = tunnel.id();
        let mut state = self.write();
        if state.terminated {
            return Err(GatewayError::InvalidState(format!(
                "session of {} has been invalidated",
                self.username
            )));
        }
        state.tunnels.insert(id, tunnel);
        self.had_tunnels.store(true, Ordering::Release);
        debug!(tunnel = %id, user = %self.username, count = state.tunnels.len(), "Tunnel added to session");
        Ok(())
    }

    /// Remove and return the tunnel with `id`, if present.
    pub fn remove_tunnel(&self, id: &Uuid) -> Option<Arc<dyn Tunnel>> {
        let removed = self.write().tunnels.remove(id);
        if removed.is_some() {
            debug!(tunnel = %id, user = %self.username, "Tunnel removed from session");
        }
        removed
    }

    /// Drop every tunnel that is no longer open.
    fn prune_closed(&self) {
        if self.read().tunnels.values().all(|t| t.is_open()) {
            return;
        }
        let mut state = self.write();
        let before = state.tunnels.len();
        state.tunnels.retain(|_, t| t.is_open());
        let pruned = before - state.tunnels.len();
        if pruned > 0 {
            debug!(user = %self.username, pruned, remaining = state.tunnels.len(), "Closed tunnels pruned from session");
        }
    }

    pub fn tunnel(&self, id: &Uuid) -> Result<Arc<dyn Tunnel>> {
        self.prune_closed();
        self.read()
            .tunnels
            .get(id)
            .cloned()
            .ok_or_else(|| GatewayError::not_found(Resource::Tunnel, id.to_string()))
    }

    pub fn has_tunnels(&self) -> bool {
        self.prune_closed();
        !self.read().tunnels.is_empty()
    }

    pub fn had_tunnels(&self) -> bool {
        self.had_tunnels.load(Ordering::Acquire)
    }

    pub fn is_terminated(&self) -> bool {
        self.read().terminated
    }

    /// Snapshot of the current tunnels. Later changes to the session are not
    /// reflected in it.
    pub fn tunnels(&self) -> HashMap<Uuid, Arc<dyn Tunnel>> {
        self.prune_closed();
        self.read().tunnels.clone()
    }

    /// Close every tunnel and mark the session terminated. Idempotent.
    ///
    /// Closes are best-effort: a failure is logged and reported but never
    /// stops the remaining tunnels from being closed.
    pub fn invalidate(&self) -> InvalidationReport {
        let to_close: Vec<Arc<dyn Tunnel>> = {
            let mut state = self.write();
            if state.terminated {
                return InvalidationReport::default();
            }
            state.terminated = true;
            state.tunnels.drain().map(|(_, t)| t).collect()
        };

        let mut report = InvalidationReport {
            performed: true,
            ..InvalidationReport::default()
        };
        for tunnel in to_close {
            let id = tunnel.id();
            match tunnel.close() {
                Ok(()) => report.closed.push(id),
                Err(e) => {
                    warn!(tunnel = %id, user = %self.username, "Failed to close tunnel during invalidation: {e}");
                    report.failed.push((id, e));
                }
            }
        }
        debug!(
            user = %self.username,
            closed = report.closed.len(),
            failed = report.failed.len(),
            "Session invalidated"
        );
        report
    }
}
