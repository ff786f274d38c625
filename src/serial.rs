use std::io::{self, Read};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use log::{debug, info, warn};
use serialport::SerialPort;
use tokio::sync::mpsc;

use crate::config::JoystickConfig;
use crate::errors::{ConnectError, ReadError, Result};
use crate::transport::{Connector, ReadOutcome, Transport};

const POLL_INTERVAL_MS: u64 = 100;
const READ_BUFFER_SIZE: usize = 256;
const CHANNEL_DEPTH: usize = 32;

type ChunkResult = std::result::Result<ReadOutcome, ReadError>;

/// Opens a serial device node (e.g. `/dev/ttyUSB0`, `COM3`) as a joystick transport.
///
/// The port is read by a dedicated thread. Its read timeout is only a poll
/// interval: timeouts are retried silently so that a close request is
/// noticed within `poll_interval`, and never reach the read loop.
#[derive(Debug, Clone)]
pub struct SerialConnector {
    pub path: String,
    pub poll_interval: Duration,
    pub read_buffer_size: usize,
    pub channel_depth: usize,
}

impl SerialConnector {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            poll_interval: Duration::from_millis(POLL_INTERVAL_MS),
            read_buffer_size: READ_BUFFER_SIZE,
            channel_depth: CHANNEL_DEPTH,
        }
    }
}

impl Connector for SerialConnector {
    fn open(&self, config: &JoystickConfig) -> Result<Box<dyn Transport>> {
        debug!(
            "opening serial port: path={}, baud={}",
            self.path, config.baud_rate
        );

        let port = serialport::new(&self.path, config.baud_rate)
            .timeout(self.poll_interval)
            .open()
            .map_err(|e| {
                warn!("serial open failed: path={}, error={}", self.path, e);
                ConnectError::from(e)
            })?;

        let transport = SerialTransport::spawn(port, self.read_buffer_size, self.channel_depth)
            .map_err(|e| ConnectError::DeviceRejected(format!("reader thread: {e}")))?;

        info!(
            "serial link established: path={}, baud={}",
            self.path, config.baud_rate
        );
        Ok(Box::new(transport))
    }
}

/// Serial port handed to a reader thread; chunks arrive over a bounded channel.
pub struct SerialTransport {
    rx: mpsc::Receiver<ChunkResult>,
    stop: Arc<AtomicBool>,
    reader: Option<JoinHandle<()>>,
}

impl SerialTransport {
    fn spawn(
        port: Box<dyn SerialPort>,
        buffer_size: usize,
        channel_depth: usize,
    ) -> io::Result<Self> {
        let (tx, rx) = mpsc::channel(channel_depth.max(1));
        let stop = Arc::new(AtomicBool::new(false));

        let thread_stop = Arc::clone(&stop);
        let reader = thread::Builder::new()
            .name("joystick-serial-rx".into())
            .spawn(move || reader_loop(port, tx, thread_stop, buffer_size))?;

        Ok(Self {
            rx,
            stop,
            reader: Some(reader),
        })
    }
}

impl Transport for SerialTransport {
    fn read(&mut self) -> BoxFuture<'_, ChunkResult> {
        async move {
            match self.rx.recv().await {
                Some(chunk) => chunk,
                // Reader thread gone without a final message.
                None => Err(ReadError::TransportClosed("serial reader stopped".into())),
            }
        }
        .boxed()
    }

    fn close(mut self: Box<Self>) -> BoxFuture<'static, io::Result<()>> {
        let reader = self.reader.take();
        // Drop raises the stop flag and closes the channel.
        drop(self);

        async move {
            let Some(reader) = reader else {
                return Ok(());
            };
            tokio::task::spawn_blocking(move || reader.join())
                .await
                .map_err(io::Error::other)?
                .map_err(|_| io::Error::other("serial reader thread panicked"))
        }
        .boxed()
    }
}

impl Drop for SerialTransport {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Release);
        self.rx.close();
    }
}

fn reader_loop(
    mut port: Box<dyn SerialPort>,
    tx: mpsc::Sender<ChunkResult>,
    stop: Arc<AtomicBool>,
    buffer_size: usize,
) {
    let mut buf = vec![0u8; buffer_size.max(1)];

    while !stop.load(Ordering::Acquire) {
        let chunk = match port.read(&mut buf) {
            Ok(0) => Ok(ReadOutcome::EndOfStream),
            Ok(n) => Ok(ReadOutcome::Data(buf[..n].to_vec())),
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::TimedOut
                        | io::ErrorKind::WouldBlock
                        | io::ErrorKind::Interrupted
                ) =>
            {
                continue;
            }
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::BrokenPipe
                        | io::ErrorKind::NotConnected
                        | io::ErrorKind::UnexpectedEof
                ) =>
            {
                Err(ReadError::TransportClosed(e.to_string()))
            }
            Err(e) => Err(ReadError::TransportFault(e.to_string())),
        };

        let last = !matches!(chunk, Ok(ReadOutcome::Data(_)));
        if tx.blocking_send(chunk).is_err() || last {
            break;
        }
    }

    debug!("serial reader exiting, port closed");
}
