//! Forwarding wrapper over another tunnel.

use std::sync::Arc;
use std::time::SystemTime;

use uuid::Uuid;

use super::{ClientInfo, ConnectionConfiguration, ExtraValue, Tunnel};
use crate::error::Result;
use crate::transport::{InstructionReader, InstructionWriter, Transport};

/// A [`Tunnel`] that relays every call, unchanged, to an inner tunnel.
///
/// Layers that need to add behavior hold a `DelegatingTunnel`, implement
/// [`Tunnel`] themselves, and call through to it for everything they do not
/// override.
#[derive(Clone)]
pub struct DelegatingTunnel {
    inner: Arc<dyn Tunnel>,
}

impl DelegatingTunnel {
    pub fn new(inner: Arc<dyn Tunnel>) -> Self {
        Self { inner }
    }

    pub fn inner(&self) -> &Arc<dyn Tunnel> {
        &self.inner
    }
}

impl Tunnel for DelegatingTunnel {
    fn id(&self) -> Uuid {
        self.inner.id()
    }

    fn transport(&self) -> &dyn Transport {
        self.inner.transport()
    }

    fn created_at(&self) -> SystemTime {
        self.inner.created_at()
    }

    fn acquire_reader(&self) -> Result<&dyn InstructionReader> {
        self.inner.acquire_reader()
    }

    fn release_reader(&self) -> Result<()> {
        self.inner.release_reader()
    }

    fn has_queued_reader_threads(&self) -> bool {
        self.inner.has_queued_reader_threads()
    }

    fn acquire_writer(&self) -> Result<&dyn InstructionWriter> {
        self.inner.acquire_writer()
    }

    fn release_writer(&self) -> Result<()> {
        self.inner.release_writer()
    }

    fn has_queued_writer_threads(&self) -> bool {
        self.inner.has_queued_writer_threads()
    }

    fn is_open(&self) -> bool {
        self.inner.is_open()
    }

    fn close(&self) -> Result<()> {
        self.inner.close()
    }

    fn request_type_name(&self) -> String {
        self.inner.request_type_name()
    }

    fn set_request_type_name(&self, name: String) {
        self.inner.set_request_type_name(name);
    }

    fn connection_configuration(&self) -> Option<ConnectionConfiguration> {
        self.inner.connection_configuration()
    }

    fn set_connection_configuration(&self, configuration: ConnectionConfiguration) {
        self.inner.set_connection_configuration(configuration);
    }

    fn client_info(&self) -> Option<ClientInfo> {
        self.inner.client_info()
    }

    fn set_client_info(&self, info: ClientInfo) {
        self.inner.set_client_info(info);
    }

    fn extra(&self, key: &str) -> Option<ExtraValue> {
        self.inner.extra(key)
    }

    fn put_extra(&self, key: String, value: ExtraValue) {
        self.inner.put_extra(key, value);
    }
}
