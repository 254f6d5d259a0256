use crate::consts::{
    DMX_NULL_START, DMX_UNIVERSE_SIZE, RECEIVE_WATCHDOG_MICROS, SIGNAL_LOSS_BLINK_MICROS,
};
use crate::dmx_timer::{PhaseTimer, TimerPurpose, TimingController};
use crate::dmx_uart_driver::ReceivedWord;
use crate::frame_buffer::FrameBuffer;

/// Position of the receiver inside the frame.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ReceiveState {
    /// Waiting for a break. Every other byte is dropped.
    AwaitBreak,
    /// A break was seen. The next byte has to be the null start code.
    MarkAfterBreak,
    /// The next byte is stored into the slot with this zero based index.
    Data(u16),
    /// A byte arrived that does not fit the current state. Never held between two
    /// words, [DmxReceiver::handle] resolves it to [ReceiveState::AwaitBreak].
    Error,
}

/// A word from the uart, classified for the receive state machine.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ReceiveEvent {
    /// The line was held low for longer than a character.
    Break,
    /// A correctly framed byte.
    Byte(u8),
    /// A byte with a parity, overrun or framing error that is not a break.
    Garbled,
}

impl From<ReceivedWord> for ReceiveEvent {
    fn from(word: ReceivedWord) -> Self {
        if word.is_break() {
            return Self::Break;
        }

        if word.framing_error() || word.parity_error() || word.overrun_error() {
            return Self::Garbled;
        }

        Self::Byte(word.data())
    }
}

/// Side effect of a transition. Applied by [DmxReceiver::handle].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ReceiveAction {
    /// Nothing to do.
    None,
    /// A new frame begins. Restart the watchdog and clear the receive error.
    BreakDetected,
    /// The null start code was received.
    StartCodeAccepted,
    /// Store the value into the slot with this index.
    StoreSlot(u16, u8),
    /// Store the value into the last slot. The frame is complete.
    CompleteFrame(u16, u8),
    /// The byte did not fit the current state.
    Desync,
}

impl ReceiveState {
    /// Process an event and return the next state together with the action that
    /// has to be applied.
    pub fn transition(self, event: ReceiveEvent) -> (Self, ReceiveAction) {
        use ReceiveAction::*;
        use ReceiveEvent::*;
        use ReceiveState::*;

        match (self, event) {
            (_, Break) => (MarkAfterBreak, BreakDetected),

            (AwaitBreak, _) => (AwaitBreak, None),

            (MarkAfterBreak, Byte(DMX_NULL_START)) => (Data(0), StartCodeAccepted),

            (Data(slot), Byte(value)) if (slot as usize + 1) < DMX_UNIVERSE_SIZE => {
                (Data(slot + 1), StoreSlot(slot, value))
            },
            (Data(slot), Byte(value)) => (AwaitBreak, CompleteFrame(slot, value)),

            (Error, _) => (AwaitBreak, None),

            (MarkAfterBreak | Data(_), _) => (Error, Desync),
        }
    }
}

/// Status of the receiver for leds or other indicators.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ReceiveStatus {
    /// Flips every time a complete frame of 512 slots was received.
    pub frame_toggle: bool,
    /// No break was received within the watchdog timeout.
    pub receive_error: bool,
    /// Flips on every watchdog re-arm while the receive error is raised.
    pub error_blink: bool,
    /// Amount of slots stored by the last frame that ended, either complete or cut by a break.
    pub last_frame_slots: u16,
    /// Amount of complete frames.
    pub frames_received: u32,
    /// Amount of bytes that arrived in a state they didn't fit.
    pub desyncs: u32,
}

/// The receive state machine of a dmx device.
#[derive(Debug)]
pub struct DmxReceiver {
    state: ReceiveState,
    status: ReceiveStatus,
}

impl Default for DmxReceiver {
    fn default() -> Self {
        Self::new()
    }
}

impl DmxReceiver {
    pub const fn new() -> Self {
        Self {
            state: ReceiveState::AwaitBreak,
            status: ReceiveStatus {
                frame_toggle: false,
                receive_error: false,
                error_blink: false,
                last_frame_slots: 0,
                frames_received: 0,
                desyncs: 0,
            },
        }
    }

    pub fn state(&self) -> ReceiveState {
        self.state
    }

    pub fn status(&self) -> ReceiveStatus {
        self.status
    }

    /// Return to [ReceiveState::AwaitBreak] and drop the signal loss indication.
    pub fn reset(&mut self) {
        self.state = ReceiveState::AwaitBreak;
        self.status.receive_error = false;
        self.status.error_blink = false;
    }

    /// Reset and start the silence watchdog.
    pub fn start<T: PhaseTimer>(&mut self, timing: &mut TimingController<T>) {
        self.reset();
        timing.arm(TimerPurpose::Watchdog, RECEIVE_WATCHDOG_MICROS);
    }

    /// Call this from the receive interrupt for every word read from the uart.
    pub fn handle<T: PhaseTimer>(
        &mut self,
        word: ReceivedWord,
        frame_buffer: &mut FrameBuffer,
        timing: &mut TimingController<T>,
    ) -> ReceiveAction {
        let previous_state = self.state;
        let (next_state, action) = previous_state.transition(word.into());

        match action {
            ReceiveAction::None | ReceiveAction::StartCodeAccepted => {},
            ReceiveAction::BreakDetected => {
                if let ReceiveState::Data(slots) = previous_state {
                    self.status.last_frame_slots = slots;
                }

                if self.status.receive_error {
                    info!("dmx signal recovered");
                }

                self.status.receive_error = false;
                self.status.error_blink = false;
                timing.arm(TimerPurpose::Watchdog, RECEIVE_WATCHDOG_MICROS);
            },
            ReceiveAction::StoreSlot(slot, value) => {
                frame_buffer.store_slot(slot as usize, value);
            },
            ReceiveAction::CompleteFrame(slot, value) => {
                frame_buffer.store_slot(slot as usize, value);
                self.status.last_frame_slots = slot + 1;
                self.status.frames_received = self.status.frames_received.wrapping_add(1);
                self.status.frame_toggle = !self.status.frame_toggle;
            },
            ReceiveAction::Desync => {
                trace!("receive desync in {:?}", previous_state);
                self.status.desyncs = self.status.desyncs.wrapping_add(1);
            },
        }

        // The error state only marks the desync, it heals right away.
        self.state = match next_state {
            ReceiveState::Error => ReceiveState::AwaitBreak,
            state => state,
        };

        action
    }

    /// Call this when the watchdog deadline elapsed. Raises the receive error and re-arms.
    pub fn handle_watchdog<T: PhaseTimer>(&mut self, timing: &mut TimingController<T>) {
        if self.status.receive_error {
            self.status.error_blink = !self.status.error_blink;
        } else {
            warn!("no dmx break within {} us", RECEIVE_WATCHDOG_MICROS);
            self.status.receive_error = true;
        }

        timing.arm(TimerPurpose::Watchdog, SIGNAL_LOSS_BLINK_MICROS);
    }
}
