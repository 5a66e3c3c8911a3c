//! A mock output pin.
//! Remembers what it was told instead of driving hardware.
//!
//! Clones share state, so a test can keep one clone
//! and hand the other to the bridge.

use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc,
};

use super::pin::OutputPin;
use crate::error::Error;

#[derive(Debug, Default)]
struct Shared {
    high: AtomicBool,
    writes: AtomicUsize,
    released: AtomicBool,
}

/// See the module documentation.
#[derive(Debug, Clone, Default)]
pub struct MockPin {
    shared: Arc<Shared>,
    broken: bool,
}

impl MockPin {
    /// A pin which starts low.
    pub fn new() -> Self {
        Self::default()
    }

    /// A pin on which every write fails.
    pub fn broken() -> Self {
        Self {
            broken: true,
            ..Self::default()
        }
    }

    /// The level last written.
    pub fn is_high(&self) -> bool {
        self.shared.high.load(Ordering::SeqCst)
    }

    /// How many writes succeeded. Writes after release fail.
    pub fn writes(&self) -> usize {
        self.shared.writes.load(Ordering::SeqCst)
    }

    /// Whether the pin was released.
    pub fn is_released(&self) -> bool {
        self.shared.released.load(Ordering::SeqCst)
    }
}

impl OutputPin for MockPin {
    fn write(&mut self, high: bool) -> Result<(), Error> {
        if self.broken {
            return Err(Error::Gpio {
                pin: 0,
                problem: "mock pin is broken".into(),
            });
        }

        if self.is_released() {
            return Err(Error::Gpio {
                pin: 0,
                problem: "mock pin was released".into(),
            });
        }

        self.shared.high.store(high, Ordering::SeqCst);
        self.shared.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn release(&mut self) -> Result<(), Error> {
        self.shared.released.store(true, Ordering::SeqCst);
        Ok(())
    }
}
