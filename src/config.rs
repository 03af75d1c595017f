//! Configuration constants for the AVR OTA session controller

/// Default updater port advertised to the automation layer
pub const DEFAULT_PORT: u16 = 328;

/// Ticks a link read may spin before reporting a protocol timeout
pub const READ_TIMEOUT_TICKS: u32 = 10_000;

/// Consecutive out-of-sync commands tolerated before the session shuts down
pub const MAX_SYNC_ERRORS: u8 = 16;

/// Flash page commit settle time in milliseconds
pub const PAGE_COMMIT_DELAY_MS: u8 = 10;

/// EEPROM write chunk size in bytes
pub const EEPROM_CHUNK: usize = 32;

/// Per-byte EEPROM write settle time in milliseconds
pub const EEPROM_BYTE_DELAY_MS: u8 = 45;

/// Target reset pulse width in milliseconds
pub const RESET_PULSE_MS: u8 = 10;

/// Command payload buffer size (one flash page worst case)
pub const PAGE_BUFFER_SIZE: usize = 256;

/// Programmer identity reported to the updater
pub const HARDWARE_VERSION: u8 = 2;
pub const SOFTWARE_MAJOR: u8 = 1;
pub const SOFTWARE_MINOR: u8 = 18;
