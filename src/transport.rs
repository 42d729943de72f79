//! Backend transport seam.
//!
//! A [`Transport`] is one connected, bidirectional channel to a display
//! server (RDP, VNC, SSH, ...) together with whatever codec frames its
//! instructions. Connection establishment and the codec itself live outside
//! this crate; the gateway only needs the five operations below.

use crate::error::Result;

/// Read half of an instruction stream.
pub trait InstructionReader: Send + Sync {
    /// Read the next complete instruction, or `None` at end of stream.
    fn read(&self) -> Result<Option<Vec<u8>>>;

    /// Whether an instruction can be read without blocking.
    fn available(&self) -> bool {
        false
    }
}

/// Write half of an instruction stream.
pub trait InstructionWriter: Send + Sync {
    /// Write one or more complete instructions.
    fn write(&self, instructions: &[u8]) -> Result<()>;
}

/// A connected channel to one backend display server.
pub trait Transport: Send + Sync {
    fn reader(&self) -> &dyn InstructionReader;

    fn writer(&self) -> &dyn InstructionWriter;

    /// Protocol name reported by the backend handshake, if exposed.
    fn protocol(&self) -> Option<&str>;

    /// Close the channel. May block until the backend acknowledges.
    fn close(&self) -> Result<()>;

    fn is_open(&self) -> bool;
}
