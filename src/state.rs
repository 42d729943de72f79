//! Shared application state passed to every handler via Axum's `State` extractor.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::audit::TransferLog;
use crate::config::Config;
use crate::control::ControlPlane;
use crate::protocols::{ProtocolCatalog, ProtocolProvider};
use crate::sessions::SessionRegistry;
use crate::streams::StreamInterceptor;

/// Shared application state for the tunnelgate server.
#[derive(Clone)]
pub struct AppState {
    /// Immutable configuration loaded at startup.
    pub config: Arc<Config>,
    /// Monotonic instant when the server started (for uptime calculation).
    pub start_time: Instant,
    /// Token → session map shared by the data plane and the control plane.
    pub registry: Arc<SessionRegistry>,
    /// Administrative operations over `registry`.
    pub control: ControlPlane,
    /// Protocol descriptors keyed by the name a transport reports.
    pub protocols: Arc<dyn ProtocolProvider>,
    /// File-transfer audit journal.
    pub transfer_log: Arc<TransferLog>,
    /// Stream capture collaborator (None until the embedder installs one).
    pub interceptor: Option<Arc<dyn StreamInterceptor>>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let registry = Arc::new(SessionRegistry::new());
        let protocols = Arc::new(ProtocolCatalog::from_config(&config.protocols));

        let mut transfer_log = TransferLog::new(config.audit.max_entries);
        if let Some(ref url) = config.audit.webhook_url {
            transfer_log = transfer_log.with_webhook(
                url.clone(),
                Duration::from_secs(config.audit.webhook_timeout_secs),
            );
        }

        Self {
            config: Arc::new(config),
            start_time: Instant::now(),
            control: ControlPlane::new(Arc::clone(&registry)),
            registry,
            protocols,
            transfer_log: Arc::new(transfer_log),
            interceptor: None,
        }
    }

    #[must_use]
    pub fn with_interceptor(mut self, interceptor: Arc<dyn StreamInterceptor>) -> Self {
        self.interceptor = Some(interceptor);
        self
    }
}
