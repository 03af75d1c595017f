//! Over-wire firmware update controller for a subordinate AVR.
//!
//! The host MCU bridges an updater tool speaking STK500v1 over a byte
//! link to in-system-programming transactions on the target's SPI bus,
//! under a four-state session lifecycle (idle, pending, active, forced
//! shutdown) exposed to an automation layer.

#![cfg_attr(not(test), no_std)]

pub mod automation;
pub mod config;
pub mod isp;
pub mod link;
pub mod session;
pub mod stk;

pub use isp::{Programmer, ProgrammerError, SpiProgrammer};
pub use link::{Link, LinkStatus, SerialLink, TransportError};
pub use session::{OtaSession, OtaState, RestoreMode, StateStore};

/// Any failure that forces a programming session down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    Transport(TransportError),
    Programmer(ProgrammerError),
}

impl From<TransportError> for Error {
    fn from(err: TransportError) -> Self {
        Error::Transport(err)
    }
}

impl From<ProgrammerError> for Error {
    fn from(err: ProgrammerError) -> Self {
        Error::Programmer(err)
    }
}
