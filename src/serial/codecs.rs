/// Newline framing for the serial device and the relay socket.
pub mod lines;
