//! Administrative operations over the session registry.
//!
//! [`ControlPlane`] is independent of data-plane traffic: it only performs
//! in-memory registry lookups, except [`ControlPlane::invalidate_session`],
//! which closes the session's transports and is therefore blocking. The HTTP
//! layer runs that one on the blocking pool.

use std::sync::Arc;
use std::time::SystemTime;

use tracing::info;
use uuid::Uuid;

use crate::error::{GatewayError, Resource, Result};
use crate::sessions::{InvalidationReport, SessionRegistry};
use crate::util::{epoch_secs, token_fingerprint};

/// Tunnel ownership flags of one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionStatus {
    pub has_tunnel: bool,
    pub had_tunnel: bool,
}

#[derive(Clone)]
pub struct ControlPlane {
    registry: Arc<SessionRegistry>,
}

impl ControlPlane {
    pub fn new(registry: Arc<SessionRegistry>) -> Self {
        Self { registry }
    }

    /// Current time in epoch seconds. No side effects.
    pub fn live(&self) -> u64 {
        epoch_secs(SystemTime::now())
    }

    /// Ownership flags for `token`'s session. Does not count as session
    /// activity.
    pub fn session_status(&self, token: &str) -> Result<SessionStatus> {
        let session = self.registry.get(token)?;
        Ok(SessionStatus {
            has_tunnel: session.has_tunnels(),
            had_tunnel: session.had_tunnels(),
        })
    }

    /// Remove `token`'s session from the registry and invalidate it.
    ///
    /// The removal is visible to every other caller before any tunnel is
    /// closed. Repeated calls report `NotFound`.
    pub fn invalidate_session(&self, token: &str) -> Result<InvalidationReport> {
        let session = self.registry.remove(token)?;
        let report = session.invalidate();
        info!(
            token = %token_fingerprint(token),
            user = %session.username(),
            closed = report.closed.len(),
            failed = report.failed.len(),
            "Session invalidated by control plane"
        );
        Ok(report)
    }

    /// Id of one tunnel owned by `token`'s session.
    ///
    /// Which tunnel is returned when there are several is unspecified.
    pub fn session_tunnel(&self, token: &str) -> Result<Uuid> {
        let session = self.registry.get(token)?;
        session
            .tunnels()
            .into_keys()
            .next()
            .ok_or_else(|| GatewayError::not_found(Resource::Tunnel, token_fingerprint(token)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::sessions::Session;
    use crate::transport::mock::MockTransport;
    use crate::tunnel::{SimpleTunnel, Tunnel};

    fn plane() -> (ControlPlane, Arc<SessionRegistry>) {
        let registry = Arc::new(SessionRegistry::new());
        (ControlPlane::new(Arc::clone(&registry)), registry)
    }

    fn add_tunnel(session: &Session) -> Arc<dyn Tunnel> {
        let t: Arc<dyn Tunnel> = Arc::new(SimpleTunnel::new(Box::new(MockTransport::new())));
        session.add_tunnel(Arc::clone(&t)).unwrap();
        t
    }

    #[test]
    fn test_live_is_current_time() {
        let (cp, _) = plane();
        let now = epoch_secs(SystemTime::now());
        assert!(cp.live().abs_diff(now) <= 1);
    }

    #[test]
    fn test_status_unknown_token() {
        let (cp, _) = plane();
        assert_eq!(cp.session_status("abc").unwrap_err().kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_status_reports_flags_without_touching() {
        let (cp, registry) = plane();
        let session = Arc::new(Session::new("alice"));
        registry.put("T".into(), Arc::clone(&session));
        assert_eq!(
            cp.session_status("T").unwrap(),
            SessionStatus {
                has_tunnel: false,
                had_tunnel: false
            }
        );

        let t = add_tunnel(&session);
        assert_eq!(
            cp.session_status("T").unwrap(),
            SessionStatus {
                has_tunnel: true,
                had_tunnel: true
            }
        );

        session.remove_tunnel(&t.id());
        assert_eq!(
            cp.session_status("T").unwrap(),
            SessionStatus {
                has_tunnel: false,
                had_tunnel: true
            }
        );
    }

    #[test]
    fn test_invalidate_removes_then_reports_not_found() {
        let (cp, registry) = plane();
        let session = Arc::new(Session::new("alice"));
        let t = add_tunnel(&session);
        registry.put("T".into(), Arc::clone(&session));

        let report = cp.invalidate_session("T").unwrap();
        assert_eq!(report.closed, vec![t.id()]);
        assert!(!t.is_open());
        assert!(session.is_terminated());

        assert_eq!(cp.session_status("T").unwrap_err().kind(), ErrorKind::NotFound);
        assert_eq!(
            cp.invalidate_session("T").map(|_| ()).unwrap_err().kind(),
            ErrorKind::NotFound
        );
    }

    #[test]
    fn test_session_tunnel_lookup() {
        let (cp, registry) = plane();
        let session = Arc::new(Session::new("alice"));
        registry.put("T".into(), Arc::clone(&session));

        assert_eq!(cp.session_tunnel("T").unwrap_err().kind(), ErrorKind::NotFound);
        assert_eq!(cp.session_tunnel("nope").unwrap_err().kind(), ErrorKind::NotFound);

        let a = add_tunnel(&session);
        let b = add_tunnel(&session);
        let picked = cp.session_tunnel("T").unwrap();
        assert!(picked == a.id() || picked == b.id());
    }

    #[test]
    fn test_closed_tunnel_no_longer_reported() {
        let (cp, registry) = plane();
        let session = Arc::new(Session::new("alice"));
        registry.put("T".into(), Arc::clone(&session));
        let t = add_tunnel(&session);
        t.close().unwrap();

        assert_eq!(
            cp.session_status("T").unwrap(),
            SessionStatus {
                has_tunnel: false,
                had_tunnel: true
            }
        );
        assert_eq!(cp.session_tunnel("T").unwrap_err().kind(), ErrorKind::NotFound);
    }
}
