use crate::consts::{DMX_MAX_PACKAGE_SIZE, DMX_NULL_START, DMX_UNIVERSE_SIZE};
use crate::types::{ChannelCount, DmxAddress, OutOfRange};

/// A vector that contains one DmxFrame. The first byte is the start code. 0x00 is the dmx start code.
pub type DmxFrame = heapless::Vec<u8, DMX_MAX_PACKAGE_SIZE>;

/// The channel values of one universe. Index 0 holds dmx channel 1.
///
/// Single byte reads and writes are the only consistency guarantee. Reading several
/// channels while a state machine is running may observe values from two different frames.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FrameBuffer {
    slots: [u8; DMX_UNIVERSE_SIZE],
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameBuffer {
    pub const fn new() -> Self {
        Self {
            slots: [0; DMX_UNIVERSE_SIZE],
        }
    }

    /// Get the value of a channel. Channels are addressed 1..=512.
    pub fn get_channel(&self, channel: u16) -> Result<u8, OutOfRange> {
        let address = DmxAddress::new(channel)?;
        Ok(self.slots[address.index()])
    }

    /// Set the value of a channel. Channels are addressed 1..=512.
    pub fn set_channel(&mut self, channel: u16, value: u8) -> Result<(), OutOfRange> {
        let address = DmxAddress::new(channel)?;
        self.slots[address.index()] = value;

        Ok(())
    }

    /// Sets every channel to zero.
    pub fn clear(&mut self) {
        self.fill(0);
    }

    /// Sets every channel to the same value.
    pub fn fill(&mut self, value: u8) {
        self.slots.fill(value);
    }

    /// Get the slot at a zero based index. Used by the state machines.
    #[inline]
    pub fn slot(&self, index: usize) -> u8 {
        self.slots[index]
    }

    #[inline]
    pub fn store_slot(&mut self, index: usize, value: u8) {
        self.slots[index] = value;
    }

    /// Up to `len` channels starting at `start`. The window is cut at channel 512.
    pub fn window(&self, start: DmxAddress, len: usize) -> &[u8] {
        let start_index = start.index();
        let end_index = (start_index + len).min(DMX_UNIVERSE_SIZE);

        &self.slots[start_index..end_index]
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.slots
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.slots
    }

    /// Copies the first `count` channels into a frame prefixed with the null start code.
    pub fn to_frame(&self, count: ChannelCount) -> DmxFrame {
        // 1 + count never exceeds the capacity of a frame
        let mut frame = DmxFrame::new();
        let _ = frame.push(DMX_NULL_START);
        let _ = frame.extend_from_slice(&self.slots[..count.get()]);

        frame
    }
}
