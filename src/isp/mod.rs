//! In-system-programming seam towards the target AVR

pub mod spi;

pub use spi::SpiProgrammer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgrammerError {
    /// SPI bus or enable-line fault
    Bus,
}

pub type Result<T> = core::result::Result<T, ProgrammerError>;

/// Low-level programmer operations the session drives while Active.
///
/// Implementations own the SPI bus and the target enable line for the
/// whole process lifetime; a session never shares them.
pub trait Programmer {
    /// Put the target into programming mode: sync the bus, pulse the
    /// enable line and issue the program-enable transaction.
    fn begin_session(&mut self) -> Result<()>;

    /// Leave programming mode and hand the target back.
    fn end_session(&mut self) -> Result<()>;

    /// One 4-byte ISP exchange; returns the last reply byte.
    fn transaction(&mut self, frame: [u8; 4]) -> Result<u8>;

    /// Pulse the enable line to restart the target.
    fn reset_target(&mut self) -> Result<()>;

    /// Drive the enable line directly.
    fn set_enable(&mut self, state: bool) -> Result<()>;

    /// Settle delay between page commits and EEPROM bytes.
    fn settle_ms(&mut self, ms: u8);

    fn in_session(&self) -> bool;
}
