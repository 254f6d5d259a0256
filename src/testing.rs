//! Hardware doubles for the unit tests.

use std::vec::Vec;

use crate::dmx_timer::PhaseTimer;
use crate::dmx_uart_driver::{DmxUartDriver, LineLevel, LineMode, ReceivedWord};

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TimerOp {
    Disable,
    Load(u32),
    Enable,
}

/// A countdown timer that only moves when the test says so.
#[derive(Debug, Default)]
pub struct ManualTimer {
    pub ops: Vec<TimerOp>,
    pub loaded: u32,
    pub running: bool,
    left: u32,
}

impl ManualTimer {
    /// Microseconds until the running countdown reaches zero.
    pub fn remaining(&self) -> u32 {
        self.left
    }

    pub fn elapse(&mut self, micros: u32) {
        if self.running {
            self.left = self.left.saturating_sub(micros);
        }
    }
}

impl PhaseTimer for ManualTimer {
    fn disable(&mut self) {
        self.ops.push(TimerOp::Disable);
        self.running = false;
    }

    fn load(&mut self, micros: u32) {
        assert!(!self.running, "timer reprogrammed while counting");
        self.ops.push(TimerOp::Load(micros));
        self.loaded = micros;
        self.left = micros;
    }

    fn enable(&mut self) {
        self.ops.push(TimerOp::Enable);
        self.running = true;
    }

    fn is_expired(&self) -> bool {
        self.running && self.left == 0
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum LineOp {
    Mode(LineMode),
    Level(LineLevel),
    DriverEnabled(bool),
    Write(u8),
}

/// A uart that records everything done to it.
#[derive(Debug, Default)]
pub struct RecordingUart {
    pub ops: Vec<LineOp>,
    pub mode: Option<LineMode>,
    pub driver_enabled: bool,
}

impl RecordingUart {
    /// Translate the recorded line activity into the words a receiver on the same
    /// line would read. A space level that is released to mark reads as a break.
    pub fn take_words(&mut self) -> Vec<ReceivedWord> {
        let mut words = Vec::new();
        let mut line_low = false;

        for op in self.ops.drain(..) {
            match op {
                LineOp::Level(LineLevel::Space) => line_low = true,
                LineOp::Level(LineLevel::Mark) if line_low => {
                    line_low = false;
                    words.push(ReceivedWord::line_break());
                },
                LineOp::Write(byte) => words.push(ReceivedWord::byte(byte)),
                _ => {},
            }
        }

        words
    }

    pub fn last_write(&self) -> Option<u8> {
        self.ops.iter().rev().find_map(|op| match op {
            LineOp::Write(byte) => Some(*byte),
            _ => None,
        })
    }
}

impl DmxUartDriver for RecordingUart {
    fn set_mode(&mut self, mode: LineMode) {
        self.ops.push(LineOp::Mode(mode));
        self.mode = Some(mode);
    }

    fn set_line_level(&mut self, level: LineLevel) {
        self.ops.push(LineOp::Level(level));
    }

    fn set_driver_enabled(&mut self, enabled: bool) {
        self.ops.push(LineOp::DriverEnabled(enabled));
        self.driver_enabled = enabled;
    }

    fn write_byte(&mut self, byte: u8) {
        self.ops.push(LineOp::Write(byte));
    }
}
