//! The air-assist valve.
//!
//! A binary output with configurable polarity.
//! When disabled (by configuration, or because the pin could not be set up)
//! every call is a no-op and the valve is always reported as closed.

use std::{fmt::Display, sync::Arc};

use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::{config::AirConfig, state::StateStore};

/// The output pin abstraction, and a sysfs implementation.
pub mod pin;

/// A pin for running without hardware.
pub mod mock;

use pin::{OutputPin, SysfsPin};

/// Why the valve was switched. Shows up in the logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reason {
    /// A job started.
    StreamStart,

    /// A job ended.
    StreamEnd,

    /// The controller echoed M7 or M8.
    M8,

    /// The controller echoed M9.
    M9,

    /// The bridge is going down.
    Shutdown,
}

impl Display for Reason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tag = match self {
            Reason::StreamStart => "STREAM_START",
            Reason::StreamEnd => "STREAM_END",
            Reason::M8 => "M8",
            Reason::M9 => "M9",
            Reason::Shutdown => "SHUTDOWN",
        };

        write!(f, "{tag}")
    }
}

/// The physical level which gives the logical state `on`.
pub fn level(on: bool, active_high: bool) -> bool {
    on == active_high
}

/// Handle to the valve. Clones control the same pin.
#[derive(Clone)]
pub struct AirAssist {
    pin: Option<Arc<Mutex<Box<dyn OutputPin>>>>,
    pin_number: u32,
    active_high: bool,
    override_force: bool,
    store: StateStore,
}

impl std::fmt::Debug for AirAssist {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AirAssist")
            .field("enabled", &self.is_enabled())
            .field("pin_number", &self.pin_number)
            .field("active_high", &self.active_high)
            .field("override_force", &self.override_force)
            .finish()
    }
}

impl AirAssist {
    /// A valve which is never driven.
    pub fn disabled(config: &AirConfig, store: StateStore) -> Self {
        Self {
            pin: None,
            pin_number: config.pin,
            active_high: config.active_high,
            override_force: config.override_force,
            store,
        }
    }

    /// Take control of `pin` and close the valve.
    ///
    /// If the pin can't be driven, air assist stays disabled.
    pub async fn new(config: &AirConfig, mut pin: Box<dyn OutputPin>, store: StateStore) -> Self {
        if let Err(e) = pin.write(level(false, config.active_high)) {
            warn!(%e, "GPIO failed, air assist disabled");
            return Self::disabled(config, store);
        }

        info!(pin = config.pin, "GPIO ready");

        Self {
            pin: Some(Arc::new(Mutex::new(pin))),
            ..Self::disabled(config, store)
        }
    }

    /// Set up from configuration, using the sysfs GPIO interface.
    pub async fn from_config(config: &AirConfig, store: StateStore) -> Self {
        if !config.enable {
            info!("Air assist disabled");
            return Self::disabled(config, store);
        }

        match SysfsPin::open(config.pin) {
            Ok(pin) => Self::new(config, Box::new(pin), store).await,
            Err(e) => {
                warn!(%e, "GPIO failed, air assist disabled");
                Self::disabled(config, store)
            }
        }
    }

    /// True if there is a pin to drive.
    pub fn is_enabled(&self) -> bool {
        self.pin.is_some()
    }

    /// True if automatic control is turned off by configuration.
    pub fn is_forced(&self) -> bool {
        self.override_force
    }

    /// Open (`on`) or close the valve, then publish the new state.
    ///
    /// Repeating the current state drives the pin and publishes again.
    pub async fn set(&self, on: bool, reason: Reason) {
        let Some(pin) = &self.pin else { return };

        // Holding the pin keeps the pin level and the published state in step.
        let mut pin = pin.lock().await;

        if let Err(e) = pin.write(level(on, self.active_high)) {
            error!(%e, %reason, "Could not drive air assist");
            return;
        }

        self.store.update(|state| state.air_state = on).await;

        info!("AIR {} [{reason}]", if on { "ON" } else { "OFF" });
    }

    /// Close the valve and let go of the pin.
    pub async fn shutdown(&self) {
        self.set(false, Reason::Shutdown).await;

        if let Some(pin) = &self.pin {
            if let Err(e) = pin.lock().await.release() {
                warn!(%e, "Could not release air assist pin");
            }
        }
    }
}
