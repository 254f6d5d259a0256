use crate::config_store::{ConfigError, ConfigKey, ConfigStore, EngineConfig};
use crate::dmx_controller::{DmxTransmitter, TransmitAction, TransmitEvent, TransmitState};
use crate::dmx_receiver::{DmxReceiver, ReceiveAction, ReceiveState, ReceiveStatus};
use crate::dmx_timer::{PhaseTimer, TimerPurpose, TimingController};
use crate::dmx_uart_driver::{DmxUartDriver, LineLevel, LineMode, ReceivedWord};
use crate::frame_buffer::{DmxFrame, FrameBuffer};
use crate::types::{ChannelCount, DmxAddress, OutOfRange, Role};

#[derive(Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum EngineError<E> {
    /// A channel, address or count was outside of 1..=512.
    OutOfRange(OutOfRange),
    /// The command is only valid in the other role. Contains the current role.
    WrongRole(Role),
    /// The configuration could not be persisted.
    Config(ConfigError<E>),
}

impl<E: core::fmt::Display> core::fmt::Display for EngineError<E> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            EngineError::OutOfRange(error) => error.fmt(f),
            EngineError::WrongRole(role) => write!(f, "command not available as {:?}", role),
            EngineError::Config(error) => error.fmt(f),
        }
    }
}

#[cfg(feature = "std")]
impl<E: core::fmt::Display + core::fmt::Debug> std::error::Error for EngineError<E> {}

impl<E> From<OutOfRange> for EngineError<E> {
    fn from(value: OutOfRange) -> Self {
        Self::OutOfRange(value)
    }
}

impl<E> From<ConfigError<E>> for EngineError<E> {
    fn from(value: ConfigError<E>) -> Self {
        Self::Config(value)
    }
}

/// The dmx frame engine. Owns the frame buffer, both state machines, the uart, the
/// phase timer and the configuration store.
///
/// The `on_*` methods are the interrupt entry points. They must be called with
/// exclusive access to the engine, which the interrupt priorities of the platform
/// provide. Everything else is called from the main loop.
pub struct DmxEngine<D: DmxUartDriver, T: PhaseTimer, S: ConfigStore> {
    uart: D,
    timing: TimingController<T>,
    store: S,
    config: EngineConfig,
    frame_buffer: FrameBuffer,
    transmitter: DmxTransmitter,
    receiver: DmxReceiver,
}

impl<D: DmxUartDriver, T: PhaseTimer, S: ConfigStore> DmxEngine<D, T, S> {
    /// Reads the configuration and configures the peripherals for the stored role.
    ///
    /// A configuration that can't be read is fatal, the engine won't start without one.
    pub fn boot(uart: D, timer: T, mut store: S) -> Result<Self, ConfigError<S::Error>> {
        let config = EngineConfig::load(&mut store)?;
        info!(
            "booting as {:?} with device address {}",
            config.role,
            config.device_address.as_u16()
        );

        let mut engine = Self {
            uart,
            timing: TimingController::new(timer),
            store,
            config,
            frame_buffer: FrameBuffer::new(),
            transmitter: DmxTransmitter::new(),
            receiver: DmxReceiver::new(),
        };
        engine.configure_role();

        Ok(engine)
    }

    /// Tear down whatever the line was doing and set it up for the configured role.
    /// A frame in flight is abandoned and no deadline of the previous role survives.
    fn configure_role(&mut self) {
        self.timing.cancel();
        self.transmitter.reset();
        self.receiver.reset();

        match self.config.role {
            Role::Controller => {
                self.uart.set_mode(LineMode::Disabled);
                self.uart.set_line_level(LineLevel::Mark);
                self.uart.set_driver_enabled(false);

                if self.transmitter.continuous() {
                    self.start_transmitter();
                }
            },
            Role::Device => {
                self.uart.set_driver_enabled(false);
                self.uart.set_mode(LineMode::Receive);
                self.receiver.start(&mut self.timing);
            },
        }
    }

    fn start_transmitter(&mut self) -> TransmitAction {
        self.transmitter.handle(
            TransmitEvent::Start,
            &self.frame_buffer,
            &mut self.uart,
            &mut self.timing,
        )
    }

    /// Switch the role. Both state machines restart from their initial state even if
    /// the role doesn't change. The role is persisted when it changes.
    pub fn set_role(&mut self, role: Role) -> Result<(), EngineError<S::Error>> {
        if role != self.config.role {
            self.store.set(ConfigKey::Role, role as u16)?;
            info!("switching to {:?}", role);
        }

        self.config.role = role;
        self.configure_role();

        Ok(())
    }

    pub fn enter_controller_mode(&mut self) -> Result<(), EngineError<S::Error>> {
        self.set_role(Role::Controller)
    }

    pub fn enter_device_mode(&mut self) -> Result<(), EngineError<S::Error>> {
        self.set_role(Role::Device)
    }

    pub fn role(&self) -> Role {
        self.config.role
    }

    pub fn config(&self) -> EngineConfig {
        self.config
    }

    pub fn device_address(&self) -> DmxAddress {
        self.config.device_address
    }

    /// Set and persist the first channel the device exposes to its outputs. Only
    /// available as [Role::Device].
    pub fn set_device_address(&mut self, address: u16) -> Result<(), EngineError<S::Error>> {
        if self.config.role != Role::Device {
            return Err(EngineError::WrongRole(self.config.role));
        }

        let address = DmxAddress::new(address)?;
        self.store.set(ConfigKey::DeviceAddress, address.as_u16())?;
        self.config.device_address = address;
        debug!("device address set to {}", address.as_u16());

        Ok(())
    }

    pub fn active_channel_count(&self) -> ChannelCount {
        self.transmitter.channel_count()
    }

    /// Set how many slots the controller transmits per frame.
    pub fn set_active_channel_count(&mut self, count: u16) -> Result<(), OutOfRange> {
        self.transmitter.set_channel_count(ChannelCount::new(count)?);
        Ok(())
    }

    pub fn continuous(&self) -> bool {
        self.transmitter.continuous()
    }

    /// Turn continuous transmission on or off. Turning it on starts transmitting right
    /// away when the controller is idle. Turning it off lets the current frame finish.
    pub fn set_continuous(&mut self, continuous: bool) {
        self.transmitter.set_continuous(continuous);

        if continuous && self.config.role == Role::Controller && self.transmitter.state().is_idle()
        {
            self.start_transmitter();
        }
    }

    /// Transmit one frame. A frame in flight is restarted from the break.
    pub fn start_frame(&mut self) -> Result<(), EngineError<S::Error>> {
        if self.config.role != Role::Controller {
            return Err(EngineError::WrongRole(self.config.role));
        }

        self.start_transmitter();
        Ok(())
    }

    /// Get the value of a channel. Channels are addressed 1..=512.
    pub fn get_channel(&self, channel: u16) -> Result<u8, OutOfRange> {
        self.frame_buffer.get_channel(channel)
    }

    /// Set the value of a channel. Channels are addressed 1..=512.
    pub fn set_channel(&mut self, channel: u16, value: u8) -> Result<(), OutOfRange> {
        self.frame_buffer.set_channel(channel, value)
    }

    pub fn clear_channels(&mut self) {
        self.frame_buffer.clear();
    }

    pub fn fill_channels(&mut self, value: u8) {
        self.frame_buffer.fill(value);
    }

    pub fn frame_buffer(&self) -> &FrameBuffer {
        &self.frame_buffer
    }

    pub fn frame_buffer_mut(&mut self) -> &mut FrameBuffer {
        &mut self.frame_buffer
    }

    /// The frame the controller puts on the line: the null start code followed by the
    /// active channels.
    pub fn frame(&self) -> DmxFrame {
        self.frame_buffer.to_frame(self.transmitter.channel_count())
    }

    /// Up to `len` channels starting at the device address.
    pub fn device_channels(&self, len: usize) -> &[u8] {
        self.frame_buffer.window(self.config.device_address, len)
    }

    pub fn status(&self) -> ReceiveStatus {
        self.receiver.status()
    }

    pub fn transmit_state(&self) -> TransmitState {
        self.transmitter.state()
    }

    pub fn receive_state(&self) -> ReceiveState {
        self.receiver.state()
    }

    /// Amount of frames the controller transmitted up to the last slot.
    pub fn frames_sent(&self) -> u32 {
        self.transmitter.frames_sent()
    }

    /// Call this from the uart end of transmission interrupt.
    pub fn on_transmit_empty(&mut self) -> TransmitAction {
        if self.config.role != Role::Controller {
            return TransmitAction::None;
        }

        self.transmitter.handle(
            TransmitEvent::TransmitEmpty,
            &self.frame_buffer,
            &mut self.uart,
            &mut self.timing,
        )
    }

    /// Call this from the uart interrupt for every word read from the data register.
    pub fn on_receive(&mut self, word: ReceivedWord) -> ReceiveAction {
        if self.config.role != Role::Device {
            return ReceiveAction::None;
        }

        self.receiver
            .handle(word, &mut self.frame_buffer, &mut self.timing)
    }

    /// Call this from the timer interrupt.
    pub fn on_timer_expired(&mut self) {
        let purpose = match self.timing.expire() {
            None => return,
            Some(purpose) => purpose,
        };

        match (self.config.role, purpose) {
            (Role::Controller, TimerPurpose::Break | TimerPurpose::MarkAfterBreak) => {
                self.transmitter.handle(
                    TransmitEvent::PhaseElapsed(purpose),
                    &self.frame_buffer,
                    &mut self.uart,
                    &mut self.timing,
                );
            },
            (Role::Device, TimerPurpose::Watchdog) => {
                self.receiver.handle_watchdog(&mut self.timing);
            },
            (role, purpose) => {
                trace!("dropping {:?} expiry as {:?}", purpose, role);
            },
        }
    }

    /// Get a reference to the underlying driver.
    pub fn get_driver(&mut self) -> &mut D {
        &mut self.uart
    }

    /// Get a reference to the underlying timer.
    pub fn get_timer(&mut self) -> &mut T {
        self.timing.get_timer()
    }

    /// Get a reference to the underlying configuration store.
    pub fn get_store(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn timing(&self) -> &TimingController<T> {
        &self.timing
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config_store::MemoryConfigStore;
    use crate::consts::{BREAK_MICROS, DMX_NULL_START, MAB_MICROS, RECEIVE_WATCHDOG_MICROS};
    use crate::dmx_timer::Deadline;
    use crate::testing::{ManualTimer, RecordingUart};
    use proptest::prelude::*;
    use std::vec::Vec;

    type TestEngine = DmxEngine<RecordingUart, ManualTimer, MemoryConfigStore>;

    fn boot(role: Role) -> TestEngine {
        let store = MemoryConfigStore::with_config(EngineConfig {
            role,
            device_address: DmxAddress::new(10).unwrap(),
        });

        DmxEngine::boot(RecordingUart::default(), ManualTimer::default(), store).unwrap()
    }

    /// Plays the hardware of a controller: fires the pending deadline, or the transmit
    /// empty interrupt after a byte was written, until `frames` frames were sent or
    /// the transmitter went idle.
    fn run_controller(engine: &mut TestEngine, frames: u32) {
        let target = engine.frames_sent() + frames;

        while engine.frames_sent() < target && !engine.transmit_state().is_idle() {
            if engine.timing().pending().is_some() {
                fire(engine);
            } else {
                engine.on_transmit_empty();
            }
        }
    }

    /// Runs the pending countdown out and services the timer interrupt.
    fn fire(engine: &mut TestEngine) {
        let micros = engine.get_timer().remaining();
        engine.get_timer().elapse(micros);
        engine.on_timer_expired();
    }

    fn feed(device: &mut TestEngine, words: &[ReceivedWord]) {
        for word in words {
            device.on_receive(*word);
        }
    }

    #[test]
    fn test_boot_fails_without_config() {
        let result = TestEngine::boot(
            RecordingUart::default(),
            ManualTimer::default(),
            MemoryConfigStore::new(),
        );

        assert!(matches!(
            result,
            Err(ConfigError::Missing(ConfigKey::Role))
        ));
    }

    #[test]
    fn test_boot_as_device_listens() {
        let mut engine = boot(Role::Device);

        assert_eq!(engine.role(), Role::Device);
        assert_eq!(engine.device_address().as_u16(), 10);
        assert_eq!(engine.receive_state(), ReceiveState::AwaitBreak);
        assert_eq!(engine.get_driver().mode, Some(LineMode::Receive));
        assert!(!engine.get_driver().driver_enabled);
        assert_eq!(
            engine.timing().pending().unwrap().micros,
            RECEIVE_WATCHDOG_MICROS
        );
    }

    #[test]
    fn test_boot_as_controller_is_idle() {
        let engine = boot(Role::Controller);

        assert_eq!(engine.transmit_state(), TransmitState::Idle);
        assert_eq!(engine.timing().pending(), None);
    }

    #[test]
    fn test_minimal_frame() {
        let mut engine = boot(Role::Controller);
        engine.set_channel(1, 0x7F).unwrap();
        engine.set_active_channel_count(1).unwrap();
        engine.get_driver().ops.clear();

        engine.start_frame().unwrap();
        run_controller(&mut engine, 1);

        assert_eq!(engine.transmit_state(), TransmitState::Idle);
        assert_eq!(
            engine.get_driver().take_words(),
            [
                ReceivedWord::line_break(),
                ReceivedWord::byte(DMX_NULL_START),
                ReceivedWord::byte(0x7F),
            ]
        );
    }

    #[test]
    fn test_break_and_mab_durations() {
        let mut engine = boot(Role::Controller);
        engine.start_frame().unwrap();

        assert_eq!(engine.transmit_state(), TransmitState::Break);
        assert_eq!(engine.timing().pending().unwrap().micros, BREAK_MICROS);

        fire(&mut engine);
        assert_eq!(engine.transmit_state(), TransmitState::MarkAfterBreak);
        assert_eq!(engine.timing().pending().unwrap().micros, MAB_MICROS);

        fire(&mut engine);
        assert_eq!(engine.transmit_state(), TransmitState::StartCode);
        assert_eq!(engine.get_driver().mode, Some(LineMode::Transmit));
        assert_eq!(engine.get_driver().last_write(), Some(DMX_NULL_START));
    }

    #[test]
    fn test_maximal_frame() {
        let mut engine = boot(Role::Controller);
        for channel in 1..=512u16 {
            engine.set_channel(channel, (channel % 251) as u8).unwrap();
        }
        engine.get_driver().ops.clear();

        engine.start_frame().unwrap();
        run_controller(&mut engine, 1);

        let words = engine.get_driver().take_words();
        assert_eq!(words.len(), 2 + 512);
        assert_eq!(words[513], ReceivedWord::byte((512 % 251) as u8));
    }

    #[test]
    fn test_continuous_controller_to_device() {
        let mut controller = boot(Role::Controller);
        controller.set_channel(1, 10).unwrap();
        controller.set_channel(2, 20).unwrap();
        controller.set_channel(3, 30).unwrap();
        controller.set_channel(4, 40).unwrap();
        controller.set_active_channel_count(3).unwrap();
        controller.get_driver().ops.clear();

        controller.set_continuous(true);
        run_controller(&mut controller, 3);
        assert_eq!(controller.transmit_state(), TransmitState::Break);
        // release the fourth break
        fire(&mut controller);

        let mut device = boot(Role::Device);
        let words = controller.get_driver().take_words();
        assert_eq!(
            words
                .iter()
                .filter(|word| word.is_break())
                .count(),
            4
        );
        feed(&mut device, &words);

        assert_eq!(device.receive_state(), ReceiveState::MarkAfterBreak);
        assert_eq!(&device.frame_buffer().as_slice()[..4], &[10, 20, 30, 0]);
        let status = device.status();
        assert_eq!(status.last_frame_slots, 3);
        assert!(!status.receive_error);
    }

    #[test]
    fn test_continuous_off_finishes_frame() {
        let mut engine = boot(Role::Controller);
        engine.set_active_channel_count(4).unwrap();
        engine.set_continuous(true);
        run_controller(&mut engine, 1);

        engine.set_continuous(false);
        run_controller(&mut engine, 5);

        assert_eq!(engine.frames_sent(), 2);
        assert_eq!(engine.transmit_state(), TransmitState::Idle);
        assert!(!engine.get_driver().driver_enabled);
    }

    #[test]
    fn test_silence_sets_receive_error() {
        let mut device = boot(Role::Device);
        feed(
            &mut device,
            &[
                ReceivedWord::line_break(),
                ReceivedWord::byte(0x00),
                ReceivedWord::byte(0x05),
            ],
        );
        assert_eq!(device.get_channel(1).unwrap(), 5);

        // 3 seconds without a break
        let mut elapsed = 0;
        while elapsed < 3_000_000 {
            let micros = device.get_timer().remaining();
            device.get_timer().elapse(micros);
            device.on_timer_expired();
            elapsed += micros;

            assert_eq!(device.status().receive_error, elapsed >= RECEIVE_WATCHDOG_MICROS);
        }
        assert!(device.status().receive_error);

        device.on_receive(ReceivedWord::line_break());
        assert!(!device.status().receive_error);
        assert_eq!(device.receive_state(), ReceiveState::MarkAfterBreak);
    }

    #[test]
    fn test_enter_device_mode_twice() {
        let mut engine = boot(Role::Device);
        feed(
            &mut engine,
            &[ReceivedWord::line_break(), ReceivedWord::byte(0x00)],
        );
        assert_eq!(engine.receive_state(), ReceiveState::Data(0));

        engine.enter_device_mode().unwrap();
        engine.enter_device_mode().unwrap();

        assert_eq!(engine.role(), Role::Device);
        assert_eq!(engine.receive_state(), ReceiveState::AwaitBreak);
        assert_eq!(engine.transmit_state(), TransmitState::Idle);
    }

    #[test]
    fn test_switch_to_device_mid_frame() {
        let mut engine = boot(Role::Controller);
        engine.set_continuous(true);
        while engine.transmit_state() != TransmitState::Data(50) {
            if engine.timing().pending().is_some() {
                fire(&mut engine);
            } else {
                engine.on_transmit_empty();
            }
        }

        engine.enter_device_mode().unwrap();
        assert_eq!(engine.transmit_state(), TransmitState::Idle);
        assert_eq!(engine.receive_state(), ReceiveState::AwaitBreak);
        assert_eq!(engine.get_store().get(ConfigKey::Role).unwrap(), Some(0));

        // a late transmit empty interrupt of the old role changes nothing
        engine.get_driver().ops.clear();
        assert_eq!(engine.on_transmit_empty(), TransmitAction::None);
        assert!(engine.get_driver().ops.is_empty());

        // the only deadline left is the watchdog of the device
        let deadline = engine.timing().pending().unwrap();
        assert_eq!(deadline.purpose, TimerPurpose::Watchdog);
        assert_eq!(deadline.micros, RECEIVE_WATCHDOG_MICROS);
    }

    #[test]
    fn test_switch_to_device_during_break() {
        let mut engine = boot(Role::Controller);
        engine.start_frame().unwrap();
        engine.get_timer().elapse(BREAK_MICROS);
        assert_eq!(engine.transmit_state(), TransmitState::Break);

        engine.enter_device_mode().unwrap();
        // the break interrupt arrives after the switch
        engine.on_timer_expired();

        assert_eq!(engine.transmit_state(), TransmitState::Idle);
        assert_eq!(engine.receive_state(), ReceiveState::AwaitBreak);
        assert!(!engine.status().receive_error);
        assert_eq!(
            engine.timing().pending(),
            Some(Deadline {
                purpose: TimerPurpose::Watchdog,
                micros: RECEIVE_WATCHDOG_MICROS,
            })
        );
        assert_eq!(engine.get_timer().remaining(), RECEIVE_WATCHDOG_MICROS);
    }

    #[test]
    fn test_switch_to_controller_drops_watchdog() {
        let mut engine = boot(Role::Device);
        engine.enter_controller_mode().unwrap();

        assert_eq!(engine.timing().pending(), None);
        engine.on_timer_expired();
        assert!(!engine.status().receive_error);
        assert_eq!(engine.on_receive(ReceivedWord::line_break()), ReceiveAction::None);
    }

    #[test]
    fn test_start_frame_as_device_is_rejected() {
        let mut engine = boot(Role::Device);

        assert!(matches!(
            engine.start_frame(),
            Err(EngineError::WrongRole(Role::Device))
        ));
        assert_eq!(engine.receive_state(), ReceiveState::AwaitBreak);
    }

    #[test]
    fn test_set_device_address_as_controller_is_rejected() {
        let mut engine = boot(Role::Controller);

        assert!(matches!(
            engine.set_device_address(42),
            Err(EngineError::WrongRole(Role::Controller))
        ));
        assert_eq!(engine.device_address().as_u16(), 10);
        assert_eq!(
            engine.get_store().get(ConfigKey::DeviceAddress).unwrap(),
            Some(10)
        );
    }

    #[test]
    fn test_frame_snapshot_follows_channel_count() {
        let mut engine = boot(Role::Controller);
        engine.set_channel(1, 10).unwrap();
        engine.set_channel(2, 20).unwrap();
        engine.set_active_channel_count(2).unwrap();

        assert_eq!(engine.frame().as_slice(), &[DMX_NULL_START, 10, 20]);

        engine.set_active_channel_count(512).unwrap();
        assert_eq!(engine.frame().len(), 513);
    }

    #[test]
    fn test_device_address_is_persisted() {
        let mut engine = boot(Role::Device);

        assert!(matches!(
            engine.set_device_address(513),
            Err(EngineError::OutOfRange(OutOfRange(513)))
        ));
        assert_eq!(engine.device_address().as_u16(), 10);

        engine.set_device_address(510).unwrap();
        assert_eq!(
            engine.get_store().get(ConfigKey::DeviceAddress).unwrap(),
            Some(510)
        );

        engine.frame_buffer_mut().fill(3);
        assert_eq!(engine.device_channels(3), &[3, 3, 3]);
        assert_eq!(engine.device_channels(8).len(), 3);
    }

    #[test]
    fn test_rejected_commands_leave_state_alone() {
        let mut engine = boot(Role::Controller);

        assert_eq!(engine.set_active_channel_count(0), Err(OutOfRange(0)));
        assert_eq!(engine.set_active_channel_count(513), Err(OutOfRange(513)));
        assert_eq!(engine.active_channel_count(), ChannelCount::MAX);
        assert_eq!(engine.set_channel(0, 1), Err(OutOfRange(0)));
        assert_eq!(engine.get_channel(513), Err(OutOfRange(513)));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn test_n_slots_then_resync(count in 1u16..=512, seed in any::<u8>()) {
            let mut controller = boot(Role::Controller);
            for channel in 1..=512u16 {
                controller
                    .set_channel(channel, (channel as u8).wrapping_add(seed) | 1)
                    .unwrap();
            }
            controller.set_active_channel_count(count).unwrap();
            controller.set_continuous(true);
            run_controller(&mut controller, 1);
            fire(&mut controller);

            let mut device = boot(Role::Device);
            let words: Vec<ReceivedWord> = controller.get_driver().take_words();
            feed(&mut device, &words);

            let received = device.frame_buffer().as_slice();
            let sent = controller.frame_buffer().as_slice();
            prop_assert_eq!(&received[..count as usize], &sent[..count as usize]);
            prop_assert!(received[count as usize..].iter().all(|value| *value == 0));

            prop_assert_eq!(device.receive_state(), ReceiveState::MarkAfterBreak);
            prop_assert_eq!(device.status().last_frame_slots, count);
            prop_assert_eq!(device.status().frames_received, u32::from(count == 512));
        }
    }
}
