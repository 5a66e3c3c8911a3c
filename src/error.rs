use std::io;

use thiserror::Error;

/// Errors thay may occur in this library.
#[derive(Debug, Error)]
pub enum Error {
    /// The configuration could not be used.
    #[error("Bad configuration: {0}")]
    BadConfig(String),

    /// The serial device could not be opened.
    /// The bridge has no purpose without it.
    #[error("Could not open serial device `{device}`, problem: {problem}")]
    SerialOpen {
        /// Path to the device.
        device: String,

        /// What went wrong.
        problem: String,
    },

    /// Driving or setting up a GPIO pin failed.
    #[error("GPIO pin {pin}: {problem}")]
    Gpio {
        /// The pin number.
        pin: u32,

        /// What went wrong.
        problem: String,
    },

    /// Re-executing the process failed.
    #[error("Could not restart: {0}")]
    Restart(String),

    /// The HTTP server failed to bind or serve.
    #[error("HTTP server problem: {0}")]
    Http(String),

    /// Something could not be turned into text.
    #[error("Could not serialize: {0}")]
    Serialization(String),

    /// IO related errors.
    #[error("Underlying IO problem")]
    Io(#[from] io::Error),
}

impl Error {
    /// If this is a [`Error::BadConfig`], get the problem description.
    pub fn try_into_bad_config(self) -> Result<String, Self> {
        if let Self::BadConfig(v) = self {
            Ok(v)
        } else {
            Err(self)
        }
    }
}
