//! Tunnels: synchronized access to one backend instruction stream.
//!
//! A tunnel owns exactly one [`Transport`] and hands out its reader and
//! writer under two independent [`lock::StreamLock`]s, so one thread can pump
//! client→backend while another pumps backend→client without ever
//! interleaving partial instructions in either direction.
//!
//! - [`SimpleTunnel`]: the core implementation.
//! - [`DelegatingTunnel`]: forwards every call to an inner tunnel; layers
//!   such as [`AuditedTunnel`] build on it to add behavior without touching
//!   the core type.
//!
//! Rust callers normally use [`ReaderGuard::acquire`] / [`WriterGuard::acquire`],
//! which release on drop. The explicit `acquire_*`/`release_*` pairs exist
//! for layers that hand the lock across call boundaries.

pub mod audited;
pub mod delegating;
pub mod lock;
pub mod simple;

use std::any::Any;
use std::collections::HashMap;
use std::ops::Deref;
use std::sync::Arc;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;
use crate::transport::{InstructionReader, InstructionWriter, Transport};

pub use audited::AuditedTunnel;
pub use delegating::DelegatingTunnel;
pub use simple::SimpleTunnel;

/// Value stored in a tunnel's extras map. Collaborating layers agree on key
/// names and value types among themselves; the core never inspects them.
pub type ExtraValue = Arc<dyn Any + Send + Sync>;

/// Connection parameters negotiated for the tunnel's backend.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionConfiguration {
    /// Identifier of the stored connection this tunnel was opened for.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_id: Option<String>,
    pub protocol: String,
    #[serde(default)]
    pub parameters: HashMap<String, String>,
}

/// Client capabilities captured when the tunnel was requested.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientInfo {
    pub optimal_screen_width: u32,
    pub optimal_screen_height: u32,
    pub optimal_resolution: u32,
    #[serde(default)]
    pub audio_mimetypes: Vec<String>,
    #[serde(default)]
    pub video_mimetypes: Vec<String>,
    #[serde(default)]
    pub image_mimetypes: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
    /// Address the request came from, as seen by the gateway.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_host: Option<String>,
}

/// The capability set shared by every tunnel implementation.
pub trait Tunnel: Send + Sync {
    /// Identifier assigned at creation. Never changes.
    fn id(&self) -> Uuid;

    fn transport(&self) -> &dyn Transport;

    /// When the tunnel was created.
    fn created_at(&self) -> SystemTime;

    /// Block until this thread holds the read lock, then return the reader.
    fn acquire_reader(&self) -> Result<&dyn InstructionReader>;

    fn release_reader(&self) -> Result<()>;

    fn has_queued_reader_threads(&self) -> bool;

    /// Block until this thread holds the write lock, then return the writer.
    fn acquire_writer(&self) -> Result<&dyn InstructionWriter>;

    fn release_writer(&self) -> Result<()>;

    fn has_queued_writer_threads(&self) -> bool;

    fn is_open(&self) -> bool;

    /// Close the transport and abort every thread waiting on either lock.
    fn close(&self) -> Result<()>;

    fn request_type_name(&self) -> String;

    fn set_request_type_name(&self, name: String);

    fn connection_configuration(&self) -> Option<ConnectionConfiguration>;

    fn set_connection_configuration(&self, configuration: ConnectionConfiguration);

    fn client_info(&self) -> Option<ClientInfo>;

    fn set_client_info(&self, info: ClientInfo);

    fn extra(&self, key: &str) -> Option<ExtraValue>;

    fn put_extra(&self, key: String, value: ExtraValue);
}

/// Fetch an extra and downcast it to `T`.
pub fn extra_as<T: Any + Send + Sync>(tunnel: &dyn Tunnel, key: &str) -> Option<Arc<T>> {
    tunnel.extra(key).and_then(|v| v.downcast::<T>().ok())
}

/// Holds a tunnel's read lock; releases it on drop.
pub struct ReaderGuard<'a> {
    tunnel: &'a dyn Tunnel,
    reader: &'a dyn InstructionReader,
}

impl<'a> ReaderGuard<'a> {
    pub fn acquire(tunnel: &'a dyn Tunnel) -> Result<Self> {
        let reader = tunnel.acquire_reader()?;
        Ok(Self { tunnel, reader })
    }
}

impl<'a> Deref for ReaderGuard<'a> {
    type Target = dyn InstructionReader + 'a;

    fn deref(&self) -> &Self::Target {
        self.reader
    }
}

impl Drop for ReaderGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.tunnel.release_reader() {
            tracing::warn!(tunnel = %self.tunnel.id(), "Failed to release read lock: {e}");
        }
    }
}

/// Holds a tunnel's write lock; releases it on drop.
pub struct WriterGuard<'a> {
    tunnel: &'a dyn Tunnel,
    writer: &'a dyn InstructionWriter,
}

impl<'a> WriterGuard<'a> {
    pub fn acquire(tunnel: &'a dyn Tunnel) -> Result<Self> {
        let writer = tunnel.acquire_writer()?;
        Ok(Self { tunnel, writer })
    }
}

impl<'a> Deref for WriterGuard<'a> {
    type Target = dyn InstructionWriter + 'a;

    fn deref(&self) -> &Self::Target {
        self.writer
    }
}

impl Drop for WriterGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.tunnel.release_writer() {
            tracing::warn!(tunnel = %self.tunnel.id(), "Failed to release write lock: {e}");
        }
    }
}
