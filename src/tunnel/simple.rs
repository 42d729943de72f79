//! The core [`Tunnel`] implementation.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{PoisonError, RwLock};
use std::time::SystemTime;

use tracing::debug;
use uuid::Uuid;

use super::lock::StreamLock;
use super::{ClientInfo, ConnectionConfiguration, ExtraValue, Tunnel};
use crate::error::{GatewayError, Result};
use crate::transport::{InstructionReader, InstructionWriter, Transport};

/// A tunnel over one exclusively owned transport, with a random v4 id.
pub struct SimpleTunnel {
    id: Uuid,
    created_at: SystemTime,
    transport: Box<dyn Transport>,
    reader_lock: StreamLock,
    writer_lock: StreamLock,
    closed: AtomicBool,
    request_type_name: RwLock<String>,
    connection_configuration: RwLock<Option<ConnectionConfiguration>>,
    client_info: RwLock<Option<ClientInfo>>,
    extras: RwLock<HashMap<String, ExtraValue>>,
}

impl SimpleTunnel {
    /// Wrap `transport`. The tunnel takes ownership, so no other tunnel can
    /// ever share it.
    pub fn new(transport: Box<dyn Transport>) -> Self {
        let id = Uuid::new_v4();
        Self {
            id,
            created_at: SystemTime::now(),
            transport,
            reader_lock: StreamLock::new(id),
            writer_lock: StreamLock::new(id),
            closed: AtomicBool::new(false),
            request_type_name: RwLock::new(String::new()),
            connection_configuration: RwLock::new(None),
            client_info: RwLock::new(None),
            extras: RwLock::new(HashMap::new()),
        }
    }

    /// Take `lock`, then confirm neither the tunnel nor its transport has
    /// been closed meanwhile.
    fn acquire_direction(&self, lock: &StreamLock) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(self.closed_error());
        }
        lock.acquire()?;
        if self.closed.load(Ordering::Acquire) {
            lock.release()?;
            return Err(self.closed_error());
        }
        if !self.transport.is_open() {
            lock.release()?;
            return Err(GatewayError::TransportFailure(format!(
                "transport of tunnel {} is no longer open",
                self.id
            )));
        }
        Ok(())
    }

    fn closed_error(&self) -> GatewayError {
        GatewayError::InvalidState(format!("tunnel {} is closed", self.id))
    }
}

impl Tunnel for SimpleTunnel {
    fn id(&self) -> Uuid {
        self.id
    }

    fn transport(&self) -> &dyn Transport {
        self.transport.as_ref()
    }

    fn created_at(&self) -> SystemTime {
        self.created_at
    }

    fn acquire_reader(&self) -> Result<&dyn InstructionReader> {
        self.acquire_direction(&self.reader_lock)?;
        Ok(self.transport.reader())
    }

    fn release_reader(&self) -> Result<()> {
        self.reader_lock.release()
    }

    fn has_queued_reader_threads(&self) -> bool {
        self.reader_lock.has_queued_threads()
    }

    fn acquire_writer(&self) -> Result<&dyn InstructionWriter> {
        self.acquire_direction(&self.writer_lock)?;
        Ok(self.transport.writer())
    }

    fn release_writer(&self) -> Result<()> {
        self.writer_lock.release()
    }

    fn has_queued_writer_threads(&self) -> bool {
        self.writer_lock.has_queued_threads()
    }

    fn is_open(&self) -> bool {
        !self.closed.load(Ordering::Acquire) && self.transport.is_open()
    }

    /// Idempotent. Waiters are aborted before the transport close starts,
    /// so a slow or failing backend never keeps them blocked.
    fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.reader_lock.close();
        self.writer_lock.close();
        let result = self.transport.close();
        debug!(tunnel = %self.id, ok = result.is_ok(), "Tunnel closed");
        result
    }

    fn request_type_name(&self) -> String {
        self.request_type_name
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set_request_type_name(&self, name: String) {
        *self
            .request_type_name
            .write()
            .unwrap_or_else(PoisonError::into_inner) = name;
    }

    fn connection_configuration(&self) -> Option<ConnectionConfiguration> {
        self.connection_configuration
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set_connection_configuration(&self, configuration: ConnectionConfiguration) {
        *self
            .connection_configuration
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(configuration);
    }

    fn client_info(&self) -> Option<ClientInfo> {
        self.client_info
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set_client_info(&self, info: ClientInfo) {
        *self
            .client_info
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(info);
    }

    fn extra(&self, key: &str) -> Option<ExtraValue> {
        self.extras
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn put_extra(&self, key: String, value: ExtraValue) {
        self.extras
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::transport::mock::MockTransport;
    use crate::tunnel::{extra_as, ReaderGuard, WriterGuard};
    use std::collections::HashSet;
    use std::sync::{mpsc, Arc};
    use std::thread;
    use std::time::{Duration, Instant};

    fn tunnel() -> Arc<SimpleTunnel> {
        Arc::new(SimpleTunnel::new(Box::new(MockTransport::new())))
    }

    fn wait_until(cond: impl Fn() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            thread::sleep(Duration::from_millis(2));
        }
        cond()
    }

    #[test]
    fn test_id_stable_and_unique() {
        let t = tunnel();
        let id = t.id();
        t.set_request_type_name("websocket".into());
        t.close().unwrap();
        assert_eq!(t.id(), id);

        let handles: Vec<_> = (0..4)
            .map(|_| {
                thread::spawn(|| {
                    (0..25_000)
                        .map(|_| SimpleTunnel::new(Box::new(MockTransport::new())).id())
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        let mut seen = HashSet::new();
        for h in handles {
            for id in h.join().unwrap() {
                assert!(seen.insert(id), "duplicate tunnel id {id}");
            }
        }
        assert_eq!(seen.len(), 100_000);
    }

    #[test]
    fn test_reader_and_writer_are_independent() {
        let t = tunnel();
        let reader = t.acquire_reader().unwrap();
        assert!(reader.read().unwrap().is_none());

        // Another thread can take the writer while we hold the reader.
        let other = Arc::clone(&t);
        thread::spawn(move || {
            let writer = WriterGuard::acquire(other.as_ref()).unwrap();
            writer.write(b"4.sync,8.12345678;").unwrap();
        })
        .join()
        .unwrap();

        t.release_reader().unwrap();
    }

    #[test]
    fn test_queued_reader_threads() {
        let t = tunnel();
        t.acquire_reader().unwrap();
        assert!(!t.has_queued_reader_threads());

        let other = Arc::clone(&t);
        let waiter = thread::spawn(move || {
            let _guard = ReaderGuard::acquire(other.as_ref()).unwrap();
        });
        assert!(wait_until(|| t.has_queued_reader_threads()));
        assert!(!t.has_queued_writer_threads());

        t.release_reader().unwrap();
        waiter.join().unwrap();
        assert!(!t.has_queued_reader_threads());
    }

    #[test]
    fn test_close_aborts_blocked_writer() {
        let t = tunnel();
        t.acquire_writer().unwrap();

        let other = Arc::clone(&t);
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            let result = other.acquire_writer().map(|_| ());
            tx.send(result).unwrap();
        });
        assert!(wait_until(|| t.has_queued_writer_threads()));

        t.close().unwrap();
        let result = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(result.unwrap_err().kind(), ErrorKind::ConcurrencyAbort);
        assert!(!t.is_open());
    }

    #[test]
    fn test_slow_transport_close_does_not_hold_back_waiters() {
        let (gate_tx, gate_rx) = mpsc::channel();
        let t = Arc::new(SimpleTunnel::new(Box::new(MockTransport::blocking_close(
            gate_rx,
        ))));
        t.acquire_writer().unwrap();

        let waiter = Arc::clone(&t);
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            tx.send(waiter.acquire_writer().map(|_| ())).unwrap();
        });
        assert!(wait_until(|| t.has_queued_writer_threads()));

        let closer = Arc::clone(&t);
        let closing = thread::spawn(move || closer.close());

        // The queued writer is aborted while the transport close is still pending.
        let result = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(result.unwrap_err().kind(), ErrorKind::ConcurrencyAbort);
        assert!(!closing.is_finished());

        // Fresh acquisitions fail immediately too.
        assert_eq!(
            t.acquire_reader().map(|_| ()).unwrap_err().kind(),
            ErrorKind::InvalidState
        );
        assert!(!t.is_open());

        gate_tx.send(()).unwrap();
        closing.join().unwrap().unwrap();
        t.release_writer().unwrap();
    }

    #[test]
    fn test_acquire_after_close_fails() {
        let t = tunnel();
        t.close().unwrap();
        assert_eq!(
            t.acquire_reader().map(|_| ()).unwrap_err().kind(),
            ErrorKind::InvalidState
        );
        assert_eq!(
            t.acquire_writer().map(|_| ()).unwrap_err().kind(),
            ErrorKind::InvalidState
        );
    }

    #[test]
    fn test_dead_transport_reports_transport_failure() {
        let t = tunnel();
        t.transport().close().unwrap();
        let err = t.acquire_reader().map(|_| ()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TransportFailure);
        // The lock was given back, so the queue is clean.
        assert!(!t.has_queued_reader_threads());
    }

    #[test]
    fn test_close_failure_still_aborts_waiters() {
        let t = Arc::new(SimpleTunnel::new(Box::new(MockTransport::failing_close())));
        assert!(t.close().is_err());
        assert_eq!(
            t.acquire_reader().map(|_| ()).unwrap_err().kind(),
            ErrorKind::InvalidState
        );
        // Second close is a no-op.
        assert!(t.close().is_ok());
    }

    #[test]
    fn test_metadata_accessors() {
        let t = tunnel();
        assert_eq!(t.request_type_name(), "");
        assert!(t.connection_configuration().is_none());
        assert!(t.client_info().is_none());

        t.set_request_type_name("http".into());
        t.set_connection_configuration(ConnectionConfiguration {
            connection_id: Some("42".into()),
            protocol: "rdp".into(),
            parameters: HashMap::from([("hostname".into(), "desk-7".into())]),
        });
        t.set_client_info(ClientInfo {
            optimal_screen_width: 1920,
            optimal_screen_height: 1080,
            optimal_resolution: 96,
            ..ClientInfo::default()
        });

        assert_eq!(t.request_type_name(), "http");
        assert_eq!(t.connection_configuration().unwrap().protocol, "rdp");
        assert_eq!(t.client_info().unwrap().optimal_screen_width, 1920);
    }

    #[test]
    fn test_extras_hold_any_type() {
        let t = tunnel();
        t.put_extra("recording.path".into(), Arc::new("/var/rec/1".to_string()));
        t.put_extra("audit.bytes".into(), Arc::new(1024u64));

        assert_eq!(
            extra_as::<String>(t.as_ref(), "recording.path").as_deref(),
            Some(&"/var/rec/1".to_string())
        );
        assert_eq!(extra_as::<u64>(t.as_ref(), "audit.bytes").as_deref(), Some(&1024));
        // Wrong type or missing key both yield None.
        assert!(extra_as::<u32>(t.as_ref(), "audit.bytes").is_none());
        assert!(t.extra("missing").is_none());
    }
}
