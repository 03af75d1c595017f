//! Serial transport link implementation

use embedded_hal::serial::{Read, Write};

use super::{Link, LinkStatus, Result, TransportError};
use crate::config;

/// Link over a raw serial port. The updater counts as attached from the
/// first byte it sends after the port is claimed; there is no carrier
/// detect on a bare UART.
pub struct SerialLink<U> {
    uart: U,
    status: LinkStatus,
    pushback: Option<u8>,
    read_budget: u32,
}

impl<U> SerialLink<U>
where
    U: Read<u8> + Write<u8>,
{
    pub fn new(uart: U) -> Self {
        Self::with_read_budget(uart, config::READ_TIMEOUT_TICKS)
    }

    /// Ticks a single read may spin before it times out.
    pub fn with_read_budget(uart: U, ticks: u32) -> Self {
        Self {
            uart,
            status: LinkStatus::Down,
            pushback: None,
            read_budget: ticks,
        }
    }

    /// Give the port back to the caller.
    pub fn release(self) -> U {
        self.uart
    }

    fn try_read(&mut self) -> Option<u8> {
        match self.uart.read() {
            Ok(byte) => Some(byte),
            Err(_) => None,
        }
    }
}

impl<U> Link for SerialLink<U>
where
    U: Read<u8> + Write<u8>,
{
    fn open(&mut self) -> Result<()> {
        if self.status != LinkStatus::Down {
            return Err(TransportError::LinkUnavailable);
        }
        self.status = LinkStatus::Listening;
        Ok(())
    }

    fn close(&mut self) {
        self.status = LinkStatus::Down;
        self.pushback = None;
    }

    fn disconnect(&mut self) {
        if self.status == LinkStatus::Connected {
            self.status = LinkStatus::Listening;
        }
        self.pushback = None;
    }

    fn status(&self) -> LinkStatus {
        self.status
    }

    fn poll_accept(&mut self) -> bool {
        if self.status != LinkStatus::Listening {
            return false;
        }
        match self.try_read() {
            Some(byte) => {
                self.pushback = Some(byte);
                self.status = LinkStatus::Connected;
                true
            }
            None => false,
        }
    }

    fn has_pending(&mut self) -> bool {
        if self.pushback.is_some() {
            return true;
        }
        if self.status != LinkStatus::Connected {
            return false;
        }
        if let Some(byte) = self.try_read() {
            self.pushback = Some(byte);
            return true;
        }
        false
    }

    fn read_byte(&mut self) -> Result<u8> {
        if let Some(byte) = self.pushback.take() {
            return Ok(byte);
        }
        if self.status != LinkStatus::Connected {
            return Err(TransportError::ProtocolTimeout);
        }
        for _ in 0..self.read_budget {
            match self.uart.read() {
                Ok(byte) => return Ok(byte),
                Err(nb::Error::WouldBlock) => continue,
                Err(nb::Error::Other(_)) => return Err(TransportError::ProtocolTimeout),
            }
        }
        Err(TransportError::ProtocolTimeout)
    }

    fn write_all(&mut self, data: &[u8]) -> Result<()> {
        if self.status != LinkStatus::Connected {
            return Err(TransportError::ProtocolTimeout);
        }
        for &byte in data {
            nb::block!(self.uart.write(byte)).map_err(|_| TransportError::ProtocolTimeout)?;
        }
        nb::block!(self.uart.flush()).map_err(|_| TransportError::ProtocolTimeout)?;
        Ok(())
    }
}
