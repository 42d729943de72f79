//! Tunnel layer that traces lock failures and closes.
//!
//! Handed to collaborators (stream interception) that drive a tunnel on the
//! gateway's behalf, so their lock traffic shows up in the logs tagged with
//! the purpose it was lent out for.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

use tracing::{info, warn};
use uuid::Uuid;

use super::{ClientInfo, ConnectionConfiguration, DelegatingTunnel, ExtraValue, Tunnel};
use crate::error::Result;
use crate::transport::{InstructionReader, InstructionWriter, Transport};

pub struct AuditedTunnel {
    delegate: DelegatingTunnel,
    purpose: String,
    acquisitions: AtomicU64,
    failures: AtomicU64,
}

impl AuditedTunnel {
    pub fn new(inner: Arc<dyn Tunnel>, purpose: impl Into<String>) -> Self {
        Self {
            delegate: DelegatingTunnel::new(inner),
            purpose: purpose.into(),
            acquisitions: AtomicU64::new(0),
            failures: AtomicU64::new(0),
        }
    }

    /// Successful lock acquisitions, both directions.
    pub fn acquisitions(&self) -> u64 {
        self.acquisitions.load(Ordering::Relaxed)
    }

    /// Failed lock acquisitions, both directions.
    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    fn record<T>(&self, direction: &str, result: Result<T>) -> Result<T> {
        match &result {
            Ok(_) => {
                self.acquisitions.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                self.failures.fetch_add(1, Ordering::Relaxed);
                warn!(
                    tunnel = %self.delegate.id(),
                    purpose = %self.purpose,
                    kind = ?e.kind(),
                    "{direction} lock acquisition failed: {e}"
                );
            }
        }
        result
    }
}

impl Tunnel for AuditedTunnel {
    fn id(&self) -> Uuid {
        self.delegate.id()
    }

    fn transport(&self) -> &dyn Transport {
        self.delegate.transport()
    }

    fn created_at(&self) -> SystemTime {
        self.delegate.created_at()
    }

    fn acquire_reader(&self) -> Result<&dyn InstructionReader> {
        self.record("read", self.delegate.acquire_reader())
    }

    fn release_reader(&self) -> Result<()> {
        self.delegate.release_reader()
    }

    fn has_queued_reader_threads(&self) -> bool {
        self.delegate.has_queued_reader_threads()
    }

    fn acquire_writer(&self) -> Result<&dyn InstructionWriter> {
        self.record("write", self.delegate.acquire_writer())
    }

    fn release_writer(&self) -> Result<()> {
        self.delegate.release_writer()
    }

    fn has_queued_writer_threads(&self) -> bool {
        self.delegate.has_queued_writer_threads()
    }

    fn is_open(&self) -> bool {
        self.delegate.is_open()
    }

    fn close(&self) -> Result<()> {
        let result = self.delegate.close();
        info!(
            tunnel = %self.delegate.id(),
            purpose = %self.purpose,
            acquisitions = self.acquisitions(),
            ok = result.is_ok(),
            "Tunnel closed by collaborator"
        );
        result
    }

    fn request_type_name(&self) -> String {
        self.delegate.request_type_name()
    }

    fn set_request_type_name(&self, name: String) {
        self.delegate.set_request_type_name(name);
    }

    fn connection_configuration(&self) -> Option<ConnectionConfiguration> {
        self.delegate.connection_configuration()
    }

    fn set_connection_configuration(&self, configuration: ConnectionConfiguration) {
        self.delegate.set_connection_configuration(configuration);
    }

    fn client_info(&self) -> Option<ClientInfo> {
        self.delegate.client_info()
    }

    fn set_client_info(&self, info: ClientInfo) {
        self.delegate.set_client_info(info);
    }

    fn extra(&self, key: &str) -> Option<ExtraValue> {
        self.delegate.extra(key)
    }

    fn put_extra(&self, key: String, value: ExtraValue) {
        self.delegate.put_extra(key, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::mock::MockTransport;
    use crate::tunnel::{ReaderGuard, SimpleTunnel};

    #[test]
    fn test_counts_acquisitions_and_failures() {
        let inner: Arc<dyn Tunnel> = Arc::new(SimpleTunnel::new(Box::new(MockTransport::new())));
        let audited = AuditedTunnel::new(Arc::clone(&inner), "stream 3");

        drop(ReaderGuard::acquire(&audited).unwrap());
        audited.acquire_writer().unwrap();
        audited.release_writer().unwrap();
        assert_eq!(audited.acquisitions(), 2);
        assert_eq!(audited.failures(), 0);

        audited.close().unwrap();
        assert!(ReaderGuard::acquire(&audited).is_err());
        assert_eq!(audited.failures(), 1);
        assert!(!inner.is_open());
    }
}
