/// Object to implement access to a one-shot hardware countdown timer.
///
/// The [TimingController] drives it in the order disable, load, enable so a timer
/// that is still counting never fires with a half programmed deadline.
pub trait PhaseTimer {
    /// Stop counting and clear an expiry that is pending but not yet serviced.
    fn disable(&mut self);

    /// Program the countdown in microseconds. Only called while disabled.
    fn load(&mut self, micros: u32);

    /// Start counting down from the loaded value.
    fn enable(&mut self);

    /// Whether the countdown started by the last [PhaseTimer::enable] reached zero.
    fn is_expired(&self) -> bool;
}

impl<T: PhaseTimer + ?Sized> PhaseTimer for &mut T {
    fn disable(&mut self) {
        (**self).disable()
    }

    fn load(&mut self, micros: u32) {
        (**self).load(micros)
    }

    fn enable(&mut self) {
        (**self).enable()
    }

    fn is_expired(&self) -> bool {
        (**self).is_expired()
    }
}

/// What a pending deadline is for. Expiries are dispatched by this tag.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TimerPurpose {
    /// End of the break driven by the transmitter.
    Break,
    /// End of the mark-after-break driven by the transmitter.
    MarkAfterBreak,
    /// No break arrived at the receiver in time.
    Watchdog,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Deadline {
    pub purpose: TimerPurpose,
    pub micros: u32,
}

/// Reprogrammable one-shot timer shared by both state machines.
///
/// Only one deadline is pending at a time. Arming replaces it, which is how the
/// protocol phases are chained from inside an expiry.
pub struct TimingController<T: PhaseTimer> {
    timer: T,
    pending: Option<Deadline>,
}

impl<T: PhaseTimer> TimingController<T> {
    pub fn new(mut timer: T) -> Self {
        timer.disable();

        Self {
            timer,
            pending: None,
        }
    }

    /// Schedule a one-shot expiry in `micros` microseconds. Replaces any pending deadline.
    pub fn arm(&mut self, purpose: TimerPurpose, micros: u32) {
        self.timer.disable();
        self.timer.load(micros);
        self.pending = Some(Deadline { purpose, micros });
        self.timer.enable();
    }

    /// Stop a pending expiry. Does nothing if none is pending.
    pub fn cancel(&mut self) {
        self.timer.disable();
        self.pending = None;
    }

    /// Call this from the timer interrupt. Returns the purpose of the deadline that
    /// elapsed, or `None` if the expiry belongs to a deadline that was cancelled.
    /// An interrupt while the countdown is still running leaves the deadline pending.
    ///
    /// The deadline is consumed. Re-arm from the handler to chain the next phase.
    pub fn expire(&mut self) -> Option<TimerPurpose> {
        if !self.timer.is_expired() {
            trace!("discarding expiry of a running countdown");
            return None;
        }

        self.timer.disable();

        let deadline = self.pending.take();
        if deadline.is_none() {
            trace!("discarding expiry without pending deadline");
        }

        deadline.map(|deadline| deadline.purpose)
    }

    pub fn pending(&self) -> Option<Deadline> {
        self.pending
    }

    /// Get a reference to the underlying timer.
    pub fn get_timer(&mut self) -> &mut T {
        &mut self.timer
    }
}
