//! Liveness LED boundary.
//!
//! The LED only gives visual feedback while samples stream; nothing in the
//! data path depends on it.

use tracing::trace;

use crate::audio::STATUS_OK;

/// Contract for an on/off indicator.
pub trait Indicator {
    /// Prepare the LED. Negative status means failure.
    fn init(&mut self) -> i32;

    fn set(&mut self, on: bool);
}

impl<I: Indicator + ?Sized> Indicator for &mut I {
    fn init(&mut self) -> i32 {
        (**self).init()
    }

    fn set(&mut self, on: bool) {
        (**self).set(on)
    }
}

/// Host stand-in for the board LED: remembers its state and traces changes.
#[derive(Debug, Default)]
pub struct TraceIndicator {
    lit: bool,
    times_lit: usize,
}

impl TraceIndicator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_lit(&self) -> bool {
        self.lit
    }

    /// Number of off → on transitions seen.
    pub fn times_lit(&self) -> usize {
        self.times_lit
    }
}

impl Indicator for TraceIndicator {
    fn init(&mut self) -> i32 {
        self.lit = false;
        STATUS_OK
    }

    fn set(&mut self, on: bool) {
        if on && !self.lit {
            self.times_lit += 1;
        }
        if on != self.lit {
            trace!(on, "led");
        }
        self.lit = on;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_only_off_to_on_transitions() {
        let mut led = TraceIndicator::new();
        assert_eq!(led.init(), STATUS_OK);

        led.set(true);
        led.set(true);
        led.set(false);
        led.set(true);

        assert!(led.is_lit());
        assert_eq!(led.times_lit(), 2);
    }
}
