pub const DMX_NULL_START: u8 = 0x00;
/// Number of data slots in one universe.
pub const DMX_UNIVERSE_SIZE: usize = 512;
/// start code + 512 byte package
pub const DMX_MAX_PACKAGE_SIZE: usize = DMX_UNIVERSE_SIZE + 1;

pub const BREAK_MICROS: u32 = 176;
pub const MAB_MICROS: u32 = 12;

/// A device without a break for this long reports a receive error.
pub const RECEIVE_WATCHDOG_MICROS: u32 = 2_000_000;
/// Re-arm interval of the watchdog while the receive error is raised.
pub const SIGNAL_LOSS_BLINK_MICROS: u32 = 500_000;

pub const DEFAULT_DEVICE_ADDRESS: u16 = 1;
