//! Transport link to the firmware updater

pub mod serial;

pub use serial::SerialLink;

/// Transport level failures. Every variant collapses into the same
/// session-level outcome: the programming session is forced down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportError {
    /// The underlying port resource could not be claimed
    LinkUnavailable,
    /// The peer stopped answering inside the read budget
    ProtocolTimeout,
    /// The peer repeatedly failed the command sync check
    ChecksumMismatch,
}

pub type Result<T> = core::result::Result<T, TransportError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkStatus {
    /// Port not claimed
    Down,
    /// Port claimed, no updater attached
    Listening,
    /// Updater attached and exchanging bytes
    Connected,
}

/// Byte channel carrying programmer traffic from the updater tool.
///
/// The session owns its link exclusively. Reads are bounded: an
/// implementation must give up with `ProtocolTimeout` rather than
/// stall the event loop.
pub trait Link {
    /// Claim the port. Fails with `LinkUnavailable` if the resource
    /// cannot be taken.
    fn open(&mut self) -> Result<()>;

    /// Release the port entirely.
    fn close(&mut self);

    /// Drop the attached updater but keep the port claimed.
    fn disconnect(&mut self);

    fn status(&self) -> LinkStatus;

    /// Check for a newly attached updater. Returns true on the tick a
    /// connection is established.
    fn poll_accept(&mut self) -> bool;

    /// True when at least one byte can be read without waiting.
    fn has_pending(&mut self) -> bool;

    fn read_byte(&mut self) -> Result<u8>;

    fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        for slot in buf.iter_mut() {
            *slot = self.read_byte()?;
        }
        Ok(())
    }

    fn write_all(&mut self, data: &[u8]) -> Result<()>;

    fn write_byte(&mut self, byte: u8) -> Result<()> {
        self.write_all(&[byte])
    }
}
