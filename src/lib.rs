#![deny(missing_docs)]

//! This crate bridges a TCP client to a GRBL style motion controller on a serial port.
//!
//! Lines are relayed unchanged in both directions, one client at a time.
//! While relaying, the traffic is watched:
//!
//! - The first job command from an idle client marks a job as started.
//!   The job ends when the client disconnects.
//! - Coolant commands (M7/M8/M9) echoed by the controller open and close
//!   an air-assist valve on a GPIO.
//!
//! The resulting state is served as JSON at `/status`, and pushed to every
//! websocket connected to `/ws` whenever it changes.

/// Wires the parts of a bridge together.
pub mod bridge;

/// The TCP relay: accepts a client and relays it to the serial device.
pub mod relay;

/// Guesses whether a job is running from the relayed traffic.
pub mod streaming;

/// Finds coolant commands in serial traffic.
pub mod sniffer;

/// The air-assist valve.
pub mod air;

/// The observable state, and its single point of mutation.
pub mod state;

/// Fans state changes out to observers.
pub mod hub;

/// Serial port driver.
pub mod serial;

/// Code relating to setting up the status API server.
pub mod server;

/// Handles incoming websockets.
pub(crate) mod websocket;

/// Re-executing the process.
pub mod restart;

/// The command line interface.
pub mod cli;

/// Relates to config files.
pub mod config;

/// Possible errors in this library.
pub mod error;

/// Logging/tracing setup.
pub mod logging;
