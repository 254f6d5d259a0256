use crate::consts::DMX_UNIVERSE_SIZE;

/// A value was outside the range the operation accepts. Contains the offending value.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct OutOfRange(pub u16);

impl core::fmt::Display for OutOfRange {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "value {} is out of range", self.0)
    }
}

#[cfg(feature = "std")]
impl std::error::Error for OutOfRange {}

/// The role the engine currently plays on the dmx line.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Role {
    /// Receives frames and exposes a sub-range of channels to local outputs.
    Device = 0x00,
    /// Periodically transmits frames.
    Controller = 0x01,
}

impl TryFrom<u16> for Role {
    type Error = OutOfRange;

    fn try_from(value: u16) -> Result<Self, OutOfRange> {
        match value {
            0x00 => Ok(Self::Device),
            0x01 => Ok(Self::Controller),
            _ => Err(OutOfRange(value)),
        }
    }
}

/// A dmx channel address in the range 1..=512.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DmxAddress(u16);

impl DmxAddress {
    pub const FIRST: Self = Self(1);
    pub const LAST: Self = Self(DMX_UNIVERSE_SIZE as u16);

    pub fn new(address: u16) -> Result<Self, OutOfRange> {
        if !(1..=DMX_UNIVERSE_SIZE as u16).contains(&address) {
            return Err(OutOfRange(address));
        }

        Ok(Self(address))
    }

    pub fn as_u16(&self) -> u16 {
        self.0
    }

    /// Zero based slot index of this address.
    pub fn index(&self) -> usize {
        self.0 as usize - 1
    }
}

impl TryFrom<u16> for DmxAddress {
    type Error = OutOfRange;

    fn try_from(value: u16) -> Result<Self, OutOfRange> {
        Self::new(value)
    }
}

impl core::fmt::Display for DmxAddress {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{:03}", self.0)
    }
}

/// The amount of slots a controller transmits per frame, 1..=512.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ChannelCount(u16);

impl ChannelCount {
    pub const MAX: Self = Self(DMX_UNIVERSE_SIZE as u16);

    pub fn new(count: u16) -> Result<Self, OutOfRange> {
        if !(1..=DMX_UNIVERSE_SIZE as u16).contains(&count) {
            return Err(OutOfRange(count));
        }

        Ok(Self(count))
    }

    pub fn get(&self) -> usize {
        self.0 as usize
    }
}

impl Default for ChannelCount {
    fn default() -> Self {
        Self::MAX
    }
}

impl TryFrom<u16> for ChannelCount {
    type Error = OutOfRange;

    fn try_from(value: u16) -> Result<Self, OutOfRange> {
        Self::new(value)
    }
}
