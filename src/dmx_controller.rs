use crate::consts::{BREAK_MICROS, DMX_NULL_START, MAB_MICROS};
use crate::dmx_timer::{PhaseTimer, TimerPurpose, TimingController};
use crate::dmx_uart_driver::{DmxUartDriver, LineLevel, LineMode};
use crate::frame_buffer::FrameBuffer;
use crate::types::ChannelCount;

/// Phase of the frame that is currently being transmitted.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TransmitState {
    /// No frame is being sent. Left only by [TransmitEvent::Start].
    Idle,
    /// The line is held at space level.
    Break,
    /// The line is back at mark level.
    MarkAfterBreak,
    /// The start code was handed to the uart.
    StartCode,
    /// The slot with this zero based index was handed to the uart.
    Data(u16),
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TransmitEvent {
    /// Begin a new frame. Restarts from the break if a frame is in flight.
    Start,
    /// A deadline armed by the transmitter elapsed.
    PhaseElapsed(TimerPurpose),
    /// The last byte was shifted out completely and the uart can take the next one.
    TransmitEmpty,
}

/// Side effect of a transition. Applied by [DmxTransmitter::handle].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TransmitAction {
    /// Nothing to do, the event was not meant for the current state.
    None,
    /// Take the pin from the uart, pull it to space and time the break.
    DriveBreak,
    /// Release the line to mark and time the mark-after-break.
    DriveMark,
    /// Hand the pin back to the uart and write the null start code.
    SendStartCode,
    /// Write the slot with this index.
    SendSlot(u16),
    /// The frame is done and no other one follows. Release the line.
    Halt,
}

impl TransmitState {
    /// Process an event and return the next state together with the action that
    /// has to be applied to the hardware.
    pub fn transition(
        self,
        event: TransmitEvent,
        channel_count: ChannelCount,
        continuous: bool,
    ) -> (Self, TransmitAction) {
        use TransmitAction::*;
        use TransmitEvent::*;
        use TransmitState::*;

        match (self, event) {
            (_, Start) => (Break, DriveBreak),

            (Break, PhaseElapsed(TimerPurpose::Break)) => (MarkAfterBreak, DriveMark),
            (MarkAfterBreak, PhaseElapsed(TimerPurpose::MarkAfterBreak)) => {
                (StartCode, SendStartCode)
            },

            (StartCode, TransmitEmpty) => (Data(0), SendSlot(0)),
            (Data(slot), TransmitEmpty) if (slot as usize + 1) < channel_count.get() => {
                (Data(slot + 1), SendSlot(slot + 1))
            },
            (Data(_), TransmitEmpty) if continuous => (Break, DriveBreak),
            (Data(_), TransmitEmpty) => (Idle, Halt),

            (state, _) => (state, None),
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self, TransmitState::Idle)
    }
}

/// The transmit state machine of a dmx controller.
#[derive(Debug)]
pub struct DmxTransmitter {
    state: TransmitState,
    channel_count: ChannelCount,
    continuous: bool,
    frames_sent: u32,
}

impl Default for DmxTransmitter {
    fn default() -> Self {
        Self::new()
    }
}

impl DmxTransmitter {
    pub const fn new() -> Self {
        Self {
            state: TransmitState::Idle,
            channel_count: ChannelCount::MAX,
            continuous: false,
            frames_sent: 0,
        }
    }

    pub fn state(&self) -> TransmitState {
        self.state
    }

    pub fn channel_count(&self) -> ChannelCount {
        self.channel_count
    }

    /// Takes effect immediately. A frame in flight ends once its slot index reaches the new count.
    pub fn set_channel_count(&mut self, channel_count: ChannelCount) {
        self.channel_count = channel_count;
    }

    pub fn continuous(&self) -> bool {
        self.continuous
    }

    /// Turning continuous off lets the current frame finish before going idle.
    pub fn set_continuous(&mut self, continuous: bool) {
        self.continuous = continuous;
    }

    /// Amount of frames that were transmitted up to the last slot.
    pub fn frames_sent(&self) -> u32 {
        self.frames_sent
    }

    /// Abandon the frame in flight without touching the hardware.
    pub fn reset(&mut self) {
        self.state = TransmitState::Idle;
    }

    /// Advance the state machine and apply the resulting action.
    pub fn handle<D: DmxUartDriver, T: PhaseTimer>(
        &mut self,
        event: TransmitEvent,
        frame_buffer: &FrameBuffer,
        uart: &mut D,
        timing: &mut TimingController<T>,
    ) -> TransmitAction {
        let (next_state, action) =
            self.state
                .transition(event, self.channel_count, self.continuous);

        if matches!(self.state, TransmitState::Data(_))
            && matches!(next_state, TransmitState::Break | TransmitState::Idle)
        {
            self.frames_sent = self.frames_sent.wrapping_add(1);
        }

        self.state = next_state;

        match action {
            TransmitAction::None => {
                trace!("transmitter ignored {:?} in {:?}", event, next_state);
            },
            TransmitAction::DriveBreak => {
                uart.set_mode(LineMode::Disabled);
                uart.set_driver_enabled(true);
                uart.set_line_level(LineLevel::Space);
                timing.arm(TimerPurpose::Break, BREAK_MICROS);
            },
            TransmitAction::DriveMark => {
                uart.set_line_level(LineLevel::Mark);
                timing.arm(TimerPurpose::MarkAfterBreak, MAB_MICROS);
            },
            TransmitAction::SendStartCode => {
                uart.set_mode(LineMode::Transmit);
                uart.write_byte(DMX_NULL_START);
            },
            TransmitAction::SendSlot(slot) => {
                uart.write_byte(frame_buffer.slot(slot as usize));
            },
            TransmitAction::Halt => {
                uart.set_mode(LineMode::Disabled);
                uart.set_line_level(LineLevel::Mark);
                uart.set_driver_enabled(false);
            },
        }

        action
    }
}
