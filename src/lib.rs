//! Interrupt driven DMX512 (ANSI E1.11) frame engine for microcontrollers that act
//! either as a controller, transmitting a frame of up to 512 channels over and over,
//! or as a device, receiving frames and exposing a sub-range of channels to local outputs.
//! This library features no-std as well as no-alloc support (no heap allocation).
//!
//! Please refer to the [official specifications](https://tsp.esta.org/) published by the ESTA.
//!
//! The engine never blocks. Break and mark-after-break are timed by a one-shot timer
//! that re-arms itself from its own interrupt, data slots are paced by the transmit
//! empty interrupt of the uart and the receiver is advanced by every received word.
//! The platform glue implements [dmx_uart_driver::DmxUartDriver], [dmx_timer::PhaseTimer]
//! and [config_store::ConfigStore] and forwards its interrupts to the `on_*` methods of
//! [engine::DmxEngine].
//!
//! # Usage
//!
//! ```rust
//! use dmx_engine::config_store::{EngineConfig, MemoryConfigStore};
//! use dmx_engine::dmx_timer::PhaseTimer;
//! use dmx_engine::dmx_uart_driver::{DmxUartDriver, LineLevel, LineMode, ReceivedWord};
//! use dmx_engine::engine::DmxEngine;
//! use dmx_engine::types::{DmxAddress, Role};
//!
//! struct Uart;
//!
//! impl DmxUartDriver for Uart {
//!     fn set_mode(&mut self, _mode: LineMode) {}
//!     fn set_line_level(&mut self, _level: LineLevel) {}
//!     fn set_driver_enabled(&mut self, _enabled: bool) {}
//!     fn write_byte(&mut self, _byte: u8) {}
//! }
//!
//! struct Timer;
//!
//! impl PhaseTimer for Timer {
//!     fn disable(&mut self) {}
//!     fn load(&mut self, _micros: u32) {}
//!     fn enable(&mut self) {}
//!     fn is_expired(&self) -> bool { false }
//! }
//!
//! let store = MemoryConfigStore::with_config(EngineConfig {
//!     role: Role::Device,
//!     device_address: DmxAddress::new(10).unwrap(),
//! });
//! let mut engine = DmxEngine::boot(Uart, Timer, store).unwrap();
//!
//! // What the receive interrupt would do for a frame that starts with 0xFF on slot 1.
//! engine.on_receive(ReceivedWord::line_break());
//! engine.on_receive(ReceivedWord::byte(0x00));
//! engine.on_receive(ReceivedWord::byte(0xFF));
//! assert_eq!(engine.get_channel(1).unwrap(), 0xFF);
//!
//! // Switch to controller and transmit the first three channels continuously.
//! engine.enter_controller_mode().unwrap();
//! engine.set_active_channel_count(3).unwrap();
//! engine.set_channel(2, 128).unwrap();
//! engine.set_continuous(true);
//! ```

#![cfg_attr(not(any(feature = "std", test)), no_std)]
#![cfg_attr(docsrs, feature(doc_cfg))]

#[macro_use]
mod fmt;

pub mod config_store;
pub mod consts;
/// Transmit state machine of the controller role.
pub mod dmx_controller;
/// Receive state machine of the device role.
pub mod dmx_receiver;
/// One-shot timer that sequences the protocol phases.
pub mod dmx_timer;
/// Port to the uart and line driver the engine talks to.
pub mod dmx_uart_driver;
/// The engine aggregate and role switching.
pub mod engine;
pub mod frame_buffer;
mod layouts;
pub mod types;
mod utils;

#[cfg(test)]
mod testing;
