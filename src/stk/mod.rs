//! STK500v1 command subset spoken by common AVR updater tools

/// Command bytes (the ArduinoISP subset of the original STK500).
pub mod cmnd {
    pub const GET_SYNC: u8 = 0x30;
    pub const GET_SIGN_ON: u8 = 0x31;
    pub const GET_PARAMETER: u8 = 0x41;
    pub const SET_DEVICE: u8 = 0x42;
    pub const SET_DEVICE_EXT: u8 = 0x45;
    pub const ENTER_PROGMODE: u8 = 0x50;
    pub const LEAVE_PROGMODE: u8 = 0x51;
    pub const LOAD_ADDRESS: u8 = 0x55;
    pub const UNIVERSAL: u8 = 0x56;
    pub const PROG_FLASH: u8 = 0x60;
    pub const PROG_DATA: u8 = 0x61;
    pub const PROG_PAGE: u8 = 0x64;
    pub const READ_PAGE: u8 = 0x74;
    pub const READ_SIGN: u8 = 0x75;
}

/// Response bytes.
pub mod resp {
    pub const OK: u8 = 0x10;
    pub const FAILED: u8 = 0x11;
    pub const UNKNOWN: u8 = 0x12;
    pub const INSYNC: u8 = 0x14;
    pub const NOSYNC: u8 = 0x15;
}

/// Parameter ids served by GET_PARAMETER.
pub mod param {
    pub const HW_VER: u8 = 0x80;
    pub const SW_MAJOR: u8 = 0x81;
    pub const SW_MINOR: u8 = 0x82;
    pub const PROGMODE: u8 = 0x93;
}

/// Every command frame ends with this sync byte.
pub const SYNC_CRC_EOP: u8 = 0x20;

/// Sign-on banner sent after GET_SIGN_ON.
pub const SIGN_ON_BANNER: &[u8] = b"AVR ISP";

/// Length of the SET_DEVICE parameter frame.
pub const DEVICE_FRAME_LEN: usize = 20;

/// Target device description, set by the updater via SET_DEVICE before
/// programming starts. Multi-byte fields arrive big endian.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeviceParameters {
    pub device_code: u8,
    pub revision: u8,
    pub prog_type: u8,
    pub parallel_mode: u8,
    pub polling: u8,
    pub self_timed: u8,
    pub lock_bytes: u8,
    pub fuse_bytes: u8,
    pub flash_poll: u8,
    pub eeprom_poll: u16,
    pub page_size: u16,
    pub eeprom_size: u16,
    pub flash_size: u32,
}

fn be16(buf: &[u8]) -> u16 {
    u16::from(buf[0]) << 8 | u16::from(buf[1])
}

impl DeviceParameters {
    pub fn from_frame(frame: &[u8; DEVICE_FRAME_LEN]) -> Self {
        Self {
            device_code: frame[0],
            revision: frame[1],
            prog_type: frame[2],
            parallel_mode: frame[3],
            polling: frame[4],
            self_timed: frame[5],
            lock_bytes: frame[6],
            fuse_bytes: frame[7],
            flash_poll: frame[8],
            // frame[9] repeats the flash poll value
            eeprom_poll: be16(&frame[10..]),
            page_size: be16(&frame[12..]),
            eeprom_size: be16(&frame[14..]),
            flash_size: u32::from(frame[16]) << 24
                | u32::from(frame[17]) << 16
                | u32::from(frame[18]) << 8
                | u32::from(frame[19]),
        }
    }

    /// Start-of-page word address containing `addr`, for the page sizes
    /// AVR parts actually ship with. Unknown sizes leave the address
    /// unmasked.
    pub fn page_start(&self, addr: u16) -> u16 {
        match self.page_size {
            32 => addr & 0xFFF0,
            64 => addr & 0xFFE0,
            128 => addr & 0xFFC0,
            256 => addr & 0xFF80,
            _ => addr,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ATmega328P as an updater would describe it.
    const FRAME: [u8; DEVICE_FRAME_LEN] = [
        0x86, 0x00, 0x00, 0x01, 0x01, 0x01, 0x01, 0x03, 0xFF, 0xFF, 0xFF, 0xFF, 0x00, 0x80, 0x04,
        0x00, 0x00, 0x00, 0x80, 0x00,
    ];

    #[test]
    fn frame_fields_map_through() {
        let params = DeviceParameters::from_frame(&FRAME);
        assert_eq!(params.device_code, 0x86);
        assert_eq!(params.lock_bytes, 0x01);
        assert_eq!(params.fuse_bytes, 0x03);
        assert_eq!(params.eeprom_poll, 0xFFFF);
        assert_eq!(params.page_size, 0x0080);
        assert_eq!(params.eeprom_size, 0x0400);
        assert_eq!(params.flash_size, 0x0000_8000);
    }

    #[test]
    fn page_start_masks_by_page_size() {
        let mut params = DeviceParameters::default();

        params.page_size = 32;
        assert_eq!(params.page_start(0x0137), 0x0130);
        params.page_size = 64;
        assert_eq!(params.page_start(0x0137), 0x0120);
        params.page_size = 128;
        assert_eq!(params.page_start(0x0137), 0x0100);
        params.page_size = 256;
        assert_eq!(params.page_start(0x0137), 0x0100);
    }

    #[test]
    fn unknown_page_size_leaves_address_alone() {
        let mut params = DeviceParameters::default();
        params.page_size = 48;
        assert_eq!(params.page_start(0x0137), 0x0137);
    }
}
