//! STK500v1 command service loop, run while the session is Active

use log::{debug, info, warn};

use crate::config;
use crate::isp::Programmer;
use crate::link::{Link, TransportError};
use crate::session::restore::StateStore;
use crate::stk::{cmnd, param, resp, DeviceParameters, DEVICE_FRAME_LEN, SIGN_ON_BANNER,
    SYNC_CRC_EOP};
use crate::Error;

use super::OtaSession;

impl<L, P, S> OtaSession<L, P, S>
where
    L: Link,
    P: Programmer,
    S: StateStore,
{
    /// Serve exactly one updater command. Any error escalates to a
    /// forced shutdown in the caller.
    pub(super) fn serve_command(&mut self) -> Result<(), Error> {
        let command = self.getch()?;
        match command {
            cmnd::GET_SYNC => {
                self.sync_errors = 0;
                self.empty_reply()?;
            }

            cmnd::GET_SIGN_ON => {
                if self.getch()? == SYNC_CRC_EOP {
                    self.link.write_byte(resp::INSYNC)?;
                    self.link.write_all(SIGN_ON_BANNER)?;
                    self.link.write_byte(resp::OK)?;
                }
            }

            cmnd::GET_PARAMETER => {
                let id = self.getch()?;
                self.get_parameter(id)?;
            }

            cmnd::SET_DEVICE => {
                let mut frame = [0u8; DEVICE_FRAME_LEN];
                self.link.read_exact(&mut frame)?;
                self.params = DeviceParameters::from_frame(&frame);
                debug!(
                    "device set: code {:#04x}, page size {}, flash size {}",
                    self.params.device_code, self.params.page_size, self.params.flash_size
                );
                self.empty_reply()?;
            }

            cmnd::SET_DEVICE_EXT => {
                let mut ext = [0u8; 5];
                self.link.read_exact(&mut ext)?;
                self.empty_reply()?;
            }

            cmnd::ENTER_PROGMODE => {
                self.programmer.begin_session()?;
                self.empty_reply()?;
            }

            cmnd::LOAD_ADDRESS => {
                let low = self.getch()?;
                let high = self.getch()?;
                self.addr = u16::from(low) | u16::from(high) << 8;
                self.empty_reply()?;
            }

            // Single-byte programming is not served; updaters use pages.
            cmnd::PROG_FLASH => {
                let _low = self.getch()?;
                let _high = self.getch()?;
                self.empty_reply()?;
            }
            cmnd::PROG_DATA => {
                let _data = self.getch()?;
                self.empty_reply()?;
            }

            cmnd::PROG_PAGE => self.program_page()?,
            cmnd::READ_PAGE => self.read_page()?,
            cmnd::UNIVERSAL => self.universal()?,
            cmnd::READ_SIGN => self.read_signature()?,

            cmnd::LEAVE_PROGMODE => {
                self.sync_errors = 0;
                self.programmer.end_session()?;
                self.empty_reply()?;
                info!("updater left programming mode, hanging up");
                self.link.disconnect();
            }

            // A stray sync byte where a command belongs; answering
            // NOSYNC is how both ends find each other again.
            SYNC_CRC_EOP => self.out_of_sync()?,

            unknown => {
                warn!("unknown updater command: {:#04x}", unknown);
                if self.getch()? == SYNC_CRC_EOP {
                    self.link.write_byte(resp::UNKNOWN)?;
                } else {
                    self.out_of_sync()?;
                }
            }
        }
        Ok(())
    }

    fn getch(&mut self) -> Result<u8, Error> {
        Ok(self.link.read_byte()?)
    }

    /// INSYNC/OK handshake closing parameterless commands.
    fn empty_reply(&mut self) -> Result<(), Error> {
        if self.getch()? == SYNC_CRC_EOP {
            self.sync_errors = 0;
            self.link.write_all(&[resp::INSYNC, resp::OK])?;
        } else {
            self.out_of_sync()?;
        }
        Ok(())
    }

    /// INSYNC/value/OK reply for single-byte answers.
    fn byte_reply(&mut self, value: u8) -> Result<(), Error> {
        if self.getch()? == SYNC_CRC_EOP {
            self.sync_errors = 0;
            self.link.write_all(&[resp::INSYNC, value, resp::OK])?;
        } else {
            self.out_of_sync()?;
        }
        Ok(())
    }

    /// Answer NOSYNC. A bounded run of consecutive sync failures is
    /// treated as a broken peer rather than tolerated forever.
    fn out_of_sync(&mut self) -> Result<(), Error> {
        self.sync_errors += 1;
        if self.sync_errors >= config::MAX_SYNC_ERRORS {
            return Err(TransportError::ChecksumMismatch.into());
        }
        self.link.write_byte(resp::NOSYNC)?;
        Ok(())
    }

    fn get_parameter(&mut self, id: u8) -> Result<(), Error> {
        let value = match id {
            param::HW_VER => config::HARDWARE_VERSION,
            param::SW_MAJOR => config::SOFTWARE_MAJOR,
            param::SW_MINOR => config::SOFTWARE_MINOR,
            param::PROGMODE => b'S', // serial programmer
            _ => 0,
        };
        self.byte_reply(value)
    }

    fn program_page(&mut self) -> Result<(), Error> {
        let length = usize::from(self.getch()?) * 256 + usize::from(self.getch()?);
        let memtype = self.getch()?;

        if length > config::PAGE_BUFFER_SIZE {
            // The updater is confused; no point draining the stream.
            return Err(TransportError::ChecksumMismatch.into());
        }

        match memtype {
            b'F' => self.write_flash(length),
            b'E' => {
                let result = self.write_eeprom(length)?;
                if self.getch()? == SYNC_CRC_EOP {
                    self.sync_errors = 0;
                    self.link.write_all(&[resp::INSYNC, result])?;
                } else {
                    self.out_of_sync()?;
                }
                Ok(())
            }
            _ => {
                self.link.write_byte(resp::FAILED)?;
                Ok(())
            }
        }
    }

    fn write_flash(&mut self, length: usize) -> Result<(), Error> {
        let mut page = [0u8; config::PAGE_BUFFER_SIZE];
        self.link.read_exact(&mut page[..length])?;

        if self.getch()? == SYNC_CRC_EOP {
            self.sync_errors = 0;
            self.link.write_byte(resp::INSYNC)?;
            self.write_flash_pages(&page[..length])?;
            self.link.write_byte(resp::OK)?;
        } else {
            self.out_of_sync()?;
        }
        Ok(())
    }

    /// Fill the page buffer word by word, committing at each page
    /// boundary crossing and once at the end.
    fn write_flash_pages(&mut self, data: &[u8]) -> Result<(), Error> {
        let mut page = self.params.page_start(self.addr);
        for word in data.chunks_exact(2) {
            if page != self.params.page_start(self.addr) {
                self.commit(page)?;
                page = self.params.page_start(self.addr);
            }
            self.flash_write(0, self.addr, word[0])?;
            self.flash_write(1, self.addr, word[1])?;
            self.addr = self.addr.wrapping_add(1);
        }
        self.commit(page)?;
        Ok(())
    }

    fn flash_write(&mut self, hilo: u8, addr: u16, data: u8) -> Result<(), Error> {
        self.programmer
            .transaction([0x40 + 8 * hilo, (addr >> 8) as u8, addr as u8, data])?;
        Ok(())
    }

    fn commit(&mut self, page: u16) -> Result<(), Error> {
        self.programmer
            .transaction([0x4C, (page >> 8) as u8, page as u8, 0])?;
        self.programmer.settle_ms(config::PAGE_COMMIT_DELAY_MS);
        Ok(())
    }

    fn write_eeprom(&mut self, length: usize) -> Result<u8, Error> {
        if length > usize::from(self.params.eeprom_size) {
            return Ok(resp::FAILED);
        }

        // The load address counts words; EEPROM is byte addressed.
        let mut start = self.addr.wrapping_mul(2);
        let mut remaining = length;
        while remaining > config::EEPROM_CHUNK {
            self.write_eeprom_chunk(start, config::EEPROM_CHUNK)?;
            start += config::EEPROM_CHUNK as u16;
            remaining -= config::EEPROM_CHUNK;
        }
        self.write_eeprom_chunk(start, remaining)?;
        Ok(resp::OK)
    }

    fn write_eeprom_chunk(&mut self, start: u16, length: usize) -> Result<(), Error> {
        let mut chunk = [0u8; config::EEPROM_CHUNK];
        self.link.read_exact(&mut chunk[..length])?;
        for (offset, &byte) in chunk[..length].iter().enumerate() {
            let addr = start.wrapping_add(offset as u16);
            self.programmer
                .transaction([0xC0, (addr >> 8) as u8, addr as u8, byte])?;
            self.programmer.settle_ms(config::EEPROM_BYTE_DELAY_MS);
        }
        Ok(())
    }

    fn read_page(&mut self) -> Result<(), Error> {
        let length = usize::from(self.getch()?) * 256 + usize::from(self.getch()?);
        let memtype = self.getch()?;
        if self.getch()? != SYNC_CRC_EOP {
            return self.out_of_sync();
        }
        self.sync_errors = 0;
        self.link.write_byte(resp::INSYNC)?;

        match memtype {
            b'F' => self.flash_read_page(length)?,
            b'E' => self.eeprom_read_page(length)?,
            _ => {}
        }
        self.link.write_byte(resp::OK)?;
        Ok(())
    }

    /// Streams whole words; an odd request length is rounded up so the
    /// updater never comes up a byte short.
    fn flash_read_page(&mut self, length: usize) -> Result<(), Error> {
        let mut offset = 0;
        while offset < length {
            let low = self.flash_read(0, self.addr)?;
            let high = self.flash_read(1, self.addr)?;
            self.link.write_all(&[low, high])?;
            self.addr = self.addr.wrapping_add(1);
            offset += 2;
        }
        Ok(())
    }

    fn flash_read(&mut self, hilo: u8, addr: u16) -> Result<u8, Error> {
        let value = self
            .programmer
            .transaction([0x20 + 8 * hilo, (addr >> 8) as u8, addr as u8, 0])?;
        Ok(value)
    }

    fn eeprom_read_page(&mut self, length: usize) -> Result<(), Error> {
        let start = self.addr.wrapping_mul(2);
        for offset in 0..length {
            let addr = start.wrapping_add(offset as u16);
            let value = self
                .programmer
                .transaction([0xA0, (addr >> 8) as u8, addr as u8, 0xFF])?;
            self.link.write_byte(value)?;
        }
        Ok(())
    }

    fn universal(&mut self) -> Result<(), Error> {
        let mut frame = [0u8; 4];
        self.link.read_exact(&mut frame)?;
        let reply = self.programmer.transaction(frame)?;
        self.byte_reply(reply)
    }

    fn read_signature(&mut self) -> Result<(), Error> {
        if self.getch()? != SYNC_CRC_EOP {
            return self.out_of_sync();
        }
        self.sync_errors = 0;
        self.link.write_byte(resp::INSYNC)?;

        let high = self.programmer.transaction([0x30, 0x00, 0x00, 0x00])?;
        let middle = self.programmer.transaction([0x30, 0x00, 0x01, 0x00])?;
        let low = self.programmer.transaction([0x30, 0x00, 0x02, 0x00])?;
        self.link.write_all(&[high, middle, low, resp::OK])?;
        Ok(())
    }
}
