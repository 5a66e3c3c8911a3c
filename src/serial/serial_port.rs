use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    sync::{mpsc, Mutex},
    task::JoinHandle,
};
use tokio_serial::{SerialPortBuilderExt, SerialStream};
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, error, info, info_span, trace, warn, Instrument};

use crate::{
    error::Error,
    serial::{codecs::lines::StringCodec, error::SerialPortError, SerialMessage},
};

/// How many lines read from the device may wait for a reader.
/// When full, the device is not read further until someone catches up.
const FROM_WIRE_CAPACITY: usize = 1024;

/// Builder for a [`SerialPortHandle`].
#[derive(Debug, Default)]
pub struct SerialPortBuilder {
    baud: Option<u32>,
    flow_control: Option<serialport::FlowControl>,
    path: String,
}

fn try_create_serial_port(
    baud: u32,
    flow_control: serialport::FlowControl,
    path: &str,
) -> Result<SerialStream, Error> {
    tokio_serial::new(path, baud)
        .data_bits(tokio_serial::DataBits::Eight)
        .parity(tokio_serial::Parity::None)
        .stop_bits(tokio_serial::StopBits::One)
        .flow_control(flow_control)
        .open_native_async()
        .map_err(|e| Error::SerialOpen {
            device: path.to_owned(),
            problem: e.to_string(),
        })
}

impl SerialPortBuilder {
    /// Start a new builder.
    /// The tty should likely be along the lines of `/dev/ttyUSB0` on unix, and `COMx` on Windows.
    pub fn new(tty: &str) -> Self {
        Self {
            path: tty.to_string(),
            ..Default::default()
        }
    }

    /// Set the serial port builder's baud.
    /// Will use 115_200 if not set.
    pub fn set_baud(mut self, baud: u32) -> Self {
        self.baud = Some(baud);
        self
    }

    /// Set the flow control.
    /// Will use no flow control if not set.
    pub fn set_flow_control(mut self, flow_control: serialport::FlowControl) -> Self {
        self.flow_control = Some(flow_control);
        self
    }

    /// Open the port and start its wire tasks.
    ///
    /// Failing to open the port is reported, not retried.
    pub fn build(self) -> Result<SerialPortHandle, Error> {
        let baud = self.baud.unwrap_or(115_200);
        let flow_control = self.flow_control.unwrap_or(serialport::FlowControl::None);

        info!(%self.path, %baud, ?flow_control, "Opening serial port");

        let serial_stream = try_create_serial_port(baud, flow_control, &self.path)?;

        Ok(SerialPortHandle::new(
            serial_stream,
            &self.path,
            StringCodec::default(),
        ))
    }
}

/// The open connection to the motion controller.
///
/// Reading and writing are independent: each direction is owned by its own task,
/// so a pending read never holds up a write and vice versa.
#[derive(Debug)]
pub struct SerialPortHandle {
    device: String,
    to_wire: mpsc::UnboundedSender<SerialMessage>,
    from_wire: Mutex<mpsc::Receiver<SerialMessage>>,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl SerialPortHandle {
    /// Start the wire tasks over any byte stream.
    /// A real port comes from [`SerialPortBuilder::build`], but anything
    /// duplex works, such as one end of [`tokio::io::duplex`].
    pub fn new<IO>(io: IO, device: &str, codec: StringCodec) -> Self
    where
        IO: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (read_half, write_half) = tokio::io::split(io);

        // Stream: receive things (from serial port), sink: send things (to serial port)
        let mut stream = FramedRead::new(read_half, codec.clone());
        let mut sink = FramedWrite::new(write_half, codec);

        let (from_wire_sender, from_wire_receiver) = mpsc::channel(FROM_WIRE_CAPACITY);
        let (to_wire_sender, mut to_wire_receiver) = mpsc::unbounded_channel::<SerialMessage>();

        let tty_span = info_span!("tty", %device);

        let reader = tokio::spawn(
            async move {
                // After a decode error the stream yields one `None`, then resumes framing
                // once the device sends more.
                let mut resuming = false;

                loop {
                    let frame = stream.next().await;

                    match frame {
                        Some(Ok(message)) => {
                            resuming = false;
                            trace!(%message, "Message from port");

                            if from_wire_sender.send(message).await.is_err() {
                                debug!("Nobody left to read from the port");
                                break;
                            }
                        }
                        Some(Err(SerialPortError::LineTooLong(max))) => {
                            warn!(%max, "Dropping overlong line from port");
                            resuming = true;
                        }
                        Some(Err(e)) => {
                            error!(?e, "Serial port error in receive, exiting");
                            break;
                        }
                        None if resuming => resuming = false,
                        None => break,
                    }
                }

                debug!("Serial port read side closed");
            }
            .instrument(tty_span.clone()),
        );

        let writer = tokio::spawn(
            async move {
                while let Some(message) = to_wire_receiver.recv().await {
                    trace!(%message, "Message to port");

                    // The device outlives any single message, so keep going.
                    if let Err(e) = sink.send(message).await {
                        error!(?e, "Serial port error in send");
                    }
                }

                debug!("Serial port write side closed");
            }
            .instrument(tty_span),
        );

        Self {
            device: device.to_owned(),
            to_wire: to_wire_sender,
            from_wire: Mutex::new(from_wire_receiver),
            reader,
            writer,
        }
    }

    /// The device path (or name) this handle was opened with.
    pub fn device(&self) -> &str {
        &self.device
    }

    /// Queue a line for the device. The codec appends the line terminator.
    pub fn write_line(&self, message: SerialMessage) -> Result<(), SerialPortError> {
        self.to_wire
            .send(message)
            .map_err(|_| SerialPortError::Disconnected)
    }

    /// Wait at most `wait` for the next line from the device.
    ///
    /// `Ok(None)` means nothing arrived in time.
    /// Only one caller reads at a time; others wait their turn within the same deadline.
    pub async fn read_line(
        &self,
        wait: Duration,
    ) -> Result<Option<SerialMessage>, SerialPortError> {
        let next = async {
            let mut from_wire = self.from_wire.lock().await;
            from_wire.recv().await
        };

        match tokio::time::timeout(wait, next).await {
            Err(_elapsed) => Ok(None),
            Ok(Some(message)) => Ok(Some(message)),
            Ok(None) => Err(SerialPortError::Disconnected),
        }
    }
}

impl Drop for SerialPortHandle {
    fn drop(&mut self) {
        self.reader.abort();
        self.writer.abort();
    }
}
