use modular_bitfield::bitfield;
use modular_bitfield::prelude::{B4, B8};

/// How the uart is framing the dmx line.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LineMode {
    /// The uart is switched off and does not own the tx pin. Used while a break or
    /// mark-after-break is driven by hand.
    Disabled,
    /// 250000 baud, 8 data bits, 2 stop bits, transmit enabled. The transmit empty
    /// interrupt has to fire at the end of transmission, after the stop bits of the
    /// last byte left the shift register, not when the holding register frees up.
    /// The break that follows the last slot takes the pin from the uart.
    Transmit,
    /// 250000 baud, 8 data bits, 2 stop bits, receive enabled with the receive interrupt
    /// and break detection.
    Receive,
}

/// Level of the tx pin while it is driven manually.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LineLevel {
    /// Logic low, used for the break.
    Space,
    /// Logic high, used for the mark-after-break and idle.
    Mark,
}

/// One word read from the uart data register. The low byte is the received data, the
/// bits above it are the error flags the peripheral latched for that byte.
#[bitfield]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ReceivedWord {
    pub data: B8,
    pub framing_error: bool,
    pub parity_error: bool,
    pub break_error: bool,
    pub overrun_error: bool,
    #[skip]
    reserved: B4,
}

impl ReceivedWord {
    /// Decode the raw data register value.
    pub fn from_raw(raw: u16) -> Self {
        Self::from_bytes(raw.to_le_bytes())
    }

    /// A plain data byte without any error flag.
    pub fn byte(data: u8) -> Self {
        Self::new().with_data(data)
    }

    /// The word the uart produces when the line was held low for longer than a character.
    pub fn line_break() -> Self {
        Self::new().with_framing_error(true).with_break_error(true)
    }

    /// The dmx break is longer than a character and shows up as a break error or as
    /// a framing error on a zero byte, depending on the peripheral.
    pub fn is_break(&self) -> bool {
        self.break_error() || (self.framing_error() && self.data() == 0)
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for ReceivedWord {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(
            fmt,
            "{:02X} (fe: {}, be: {})",
            self.data(),
            self.framing_error(),
            self.break_error()
        );
    }
}

/// Object to implement access to the uart and the rs485 line driver.
///
/// Every method is called from interrupt context and must not block.
pub trait DmxUartDriver {
    /// Reconfigure the framing of the uart. Any byte in flight is discarded.
    fn set_mode(&mut self, mode: LineMode);

    /// Drive the tx pin by hand. Only called while the mode is [LineMode::Disabled].
    fn set_line_level(&mut self, level: LineLevel);

    /// Enable or disable the rs485 driver. Disabled means the transceiver listens.
    fn set_driver_enabled(&mut self, enabled: bool);

    /// Hand one byte to the transmitter. The transmit empty interrupt fires once the
    /// byte, stop bits included, was shifted out on the line.
    fn write_byte(&mut self, byte: u8);
}

impl<D: DmxUartDriver + ?Sized> DmxUartDriver for &mut D {
    fn set_mode(&mut self, mode: LineMode) {
        (**self).set_mode(mode)
    }

    fn set_line_level(&mut self, level: LineLevel) {
        (**self).set_line_level(level)
    }

    fn set_driver_enabled(&mut self, enabled: bool) {
        (**self).set_driver_enabled(enabled)
    }

    fn write_byte(&mut self, byte: u8) {
        (**self).write_byte(byte)
    }
}
