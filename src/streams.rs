//! Seam for pulling a single byte stream out of a live tunnel.
//!
//! The gateway itself does not understand the instruction protocol spoken
//! over a transport, so it cannot locate stream `N` on its own. An embedding
//! application installs a [`StreamInterceptor`] that does; without one the
//! stream endpoint answers `501 Not Implemented`.

use crate::error::Result;
use crate::tunnel::Tunnel;

/// Bytes captured from one stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterceptedStream {
    pub media_type: String,
    pub data: Vec<u8>,
}

pub trait StreamInterceptor: Send + Sync {
    /// Capture stream `index` of `tunnel`, blocking until it ends.
    ///
    /// Called on the blocking pool. `media_type` is the type the client asked
    /// for and may be returned unchanged.
    fn intercept(&self, tunnel: &dyn Tunnel, index: u32, media_type: &str)
        -> Result<InterceptedStream>;
}
