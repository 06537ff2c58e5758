// Capabilities the core consumes from the board. Digital inputs use
// `embedded_hal::digital::InputPin` directly.

use crate::error::Error;

/// A single ADC channel returning 12-bit samples.
pub trait AnalogInput {
    fn read_raw(&mut self) -> Result<u16, Error>;
}

/// Monotonic time since boot.
pub trait Clock {
    fn now_us(&self) -> u64;

    fn now_ms(&self) -> u64 {
        self.now_us() / 1_000
    }
}

impl<T: Clock + ?Sized> Clock for &T {
    fn now_us(&self) -> u64 {
        (**self).now_us()
    }
}
