use std::{io, string};

use thiserror::Error;

/// Any error the serial transport might encounter.
#[derive(Debug, Error)]
pub enum SerialPortError {
    /// IO related errors.
    #[error("Underlying IO problem")]
    IO(#[from] io::Error),

    /// Utf8 related errors.
    #[error("Problem with UTF8 conversion")]
    Utf8(#[from] string::FromUtf8Error),

    /// A line did not end within the given number of bytes.
    #[error("Line longer than {0} bytes")]
    LineTooLong(usize),

    /// The wire tasks are gone, nothing more can be sent or received.
    #[error("Serial port disconnected")]
    Disconnected,
}
