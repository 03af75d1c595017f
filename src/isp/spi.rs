//! SPI programmer implementation over embedded-hal traits

use embedded_hal::blocking::delay::{DelayMs, DelayUs};
use embedded_hal::blocking::spi::Transfer;
use embedded_hal::digital::v2::OutputPin;

use super::{Programmer, ProgrammerError, Result};
use crate::config;

/// Program-enable transaction that opens every ISP conversation.
const PROGRAM_ENABLE: [u8; 4] = [0xAC, 0x53, 0x00, 0x00];

/// Enable-line pulse widths while entering programming mode.
const ATTACH_PULSE_US: u8 = 50;
const ATTACH_SETTLE_MS: u8 = 30;

/// Drives the target over a shared-nothing SPI bus plus the enable
/// output wired to the target reset circuit.
pub struct SpiProgrammer<SPI, EN, D> {
    spi: SPI,
    enable: EN,
    delay: D,
    in_session: bool,
}

impl<SPI, EN, D> SpiProgrammer<SPI, EN, D>
where
    SPI: Transfer<u8>,
    EN: OutputPin,
    D: DelayMs<u8> + DelayUs<u8>,
{
    pub fn new(spi: SPI, enable: EN, delay: D) -> Self {
        Self {
            spi,
            enable,
            delay,
            in_session: false,
        }
    }

    pub fn release(self) -> (SPI, EN, D) {
        (self.spi, self.enable, self.delay)
    }

    fn transfer_byte(&mut self, byte: u8) -> Result<u8> {
        let mut buf = [byte];
        let reply = self
            .spi
            .transfer(&mut buf)
            .map_err(|_| ProgrammerError::Bus)?;
        Ok(reply[0])
    }
}

impl<SPI, EN, D> Programmer for SpiProgrammer<SPI, EN, D>
where
    SPI: Transfer<u8>,
    EN: OutputPin,
    D: DelayMs<u8> + DelayUs<u8>,
{
    fn begin_session(&mut self) -> Result<()> {
        // Sync the bus before touching the target.
        self.transfer_byte(0x00)?;

        self.set_enable(true)?;
        self.delay.delay_us(ATTACH_PULSE_US);
        self.set_enable(false)?;
        self.delay.delay_ms(ATTACH_SETTLE_MS);

        self.transaction(PROGRAM_ENABLE)?;
        self.in_session = true;
        Ok(())
    }

    fn end_session(&mut self) -> Result<()> {
        self.in_session = false;
        self.set_enable(true)
    }

    fn transaction(&mut self, frame: [u8; 4]) -> Result<u8> {
        let mut buf = frame;
        let reply = self
            .spi
            .transfer(&mut buf)
            .map_err(|_| ProgrammerError::Bus)?;
        Ok(reply[3])
    }

    fn reset_target(&mut self) -> Result<()> {
        self.set_enable(false)?;
        self.delay.delay_ms(config::RESET_PULSE_MS);
        self.set_enable(true)
    }

    fn set_enable(&mut self, state: bool) -> Result<()> {
        let res = if state {
            self.enable.set_high()
        } else {
            self.enable.set_low()
        };
        res.map_err(|_| ProgrammerError::Bus)
    }

    fn settle_ms(&mut self, ms: u8) {
        self.delay.delay_ms(ms);
    }

    fn in_session(&self) -> bool {
        self.in_session
    }
}
