//! Joystick connection lifecycle and read loop.
//!
//! A [`ConnectionManager`] owns one logical link to a joystick: it opens the
//! transport, runs a single read loop task that decodes and normalizes every
//! frame, and tears everything down on [`ConnectionManager::disconnect`].
//!
//! # Ordering
//!
//! The read loop only yields while waiting for the next chunk (or for a
//! cancellation). Decoding, normalizing and emitting a chunk's readings all
//! happen before the next read is issued, so readings reach the sink in
//! exactly the order the device sent them.
//!
//! # Teardown
//!
//! The transport is moved into the read loop and closed by it exactly once,
//! whichever way the loop ends: end of stream, read error, or cancellation
//! from `disconnect()`. Dropping the manager cancels the loop as well.
//! A close failure after the loop ended on its own is reported by the loop
//! itself; only a cancelled session hands it back to `disconnect()`.

use std::io;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::config::{AxisConfig, JoystickConfig};
use crate::errors::{ConnectError, DecodeError, DisconnectError, ReadError, Result};
use crate::events::{ErrorKind, EventSink};
use crate::frame::{FrameParser, RawReading};
use crate::normalize::{normalize, NormalizedReading};
use crate::transport::{Connector, ReadOutcome, Transport};

// ============================================================================
// Data Types
// ============================================================================

/// Lifecycle of a joystick link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConnectionState {
    #[default]
    Idle,
    Connecting,
    Connected,
    /// The last connect or read failed. Recover with an explicit `connect()`.
    Faulted,
}

impl ConnectionState {
    /// `connect()` is only legal from these states.
    pub fn can_connect(self) -> bool {
        matches!(self, ConnectionState::Idle | ConnectionState::Faulted)
    }
}

/// Most recent reading emitted by the loop, in both raw and normalized form.
///
/// Stays at its last value across malformed frames; reset to the neutral
/// default by `disconnect()`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct LastReading {
    pub raw: RawReading,
    pub normalized: NormalizedReading,
}

/// Per-session frame counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct SessionStats {
    /// Frames decoded and emitted.
    pub frames: u64,
    /// Lines dropped because they did not decode.
    pub malformed: u64,
}

// ============================================================================
// Shared link state
// ============================================================================

#[derive(Default)]
struct Shared {
    state: ConnectionState,
    last: LastReading,
    stats: SessionStats,
}

/// State visible to both the manager and its read loop.
struct Link {
    shared: Mutex<Shared>,
    sink: Arc<dyn EventSink>,
}

impl Link {
    fn lock(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Move to `to`, emitting a state change only if the state differs.
    fn transition(&self, to: ConnectionState) {
        let from = std::mem::replace(&mut self.lock().state, to);
        if from == to {
            return;
        }
        debug!("connection state: {:?} -> {:?}", from, to);
        self.sink.on_state_change(to);
    }

    fn report(&self, kind: ErrorKind, message: &str) {
        self.sink.on_error(kind, message);
    }

    fn handle_frame(
        &self,
        frame: std::result::Result<RawReading, DecodeError>,
        axis: &AxisConfig,
    ) {
        match frame {
            Ok(raw) => {
                let normalized = normalize(&raw, axis);
                {
                    let mut shared = self.lock();
                    shared.last = LastReading { raw, normalized };
                    shared.stats.frames += 1;
                }
                self.sink.on_reading(&normalized);
            }
            Err(e) => {
                let malformed = {
                    let mut shared = self.lock();
                    shared.stats.malformed += 1;
                    shared.stats.malformed
                };
                warn!("skipping frame: {} (malformed this session: {})", e, malformed);
            }
        }
    }
}

// ============================================================================
// Connection Manager
// ============================================================================

/// A running read loop and the means to stop it.
struct Session {
    cancel: oneshot::Sender<()>,
    task: JoinHandle<io::Result<()>>,
}

/// Owner of one joystick link.
///
/// # Example (Rust)
/// ```ignore
/// let (sink, mut events) = ChannelSink::new();
/// let mut manager = ConnectionManager::new(SerialConnector::new("/dev/ttyUSB0"), Arc::new(sink));
///
/// let config = JoystickConfig::new(9600, WireFormat::Tagged, AxisConfig::default());
/// manager.connect(&config).await?;
/// while let Some(event) = events.recv().await {
///     println!("{event:?}");
/// }
/// manager.disconnect().await?;
/// ```
pub struct ConnectionManager {
    connector: Arc<dyn Connector>,
    link: Arc<Link>,
    session: Option<Session>,
}

impl ConnectionManager {
    pub fn new(connector: impl Connector + 'static, sink: Arc<dyn EventSink>) -> Self {
        Self {
            connector: Arc::new(connector),
            link: Arc::new(Link {
                shared: Mutex::new(Shared::default()),
                sink,
            }),
            session: None,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.link.lock().state
    }

    pub fn last_reading(&self) -> LastReading {
        self.link.lock().last
    }

    pub fn stats(&self) -> SessionStats {
        self.link.lock().stats
    }

    // ------------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------------

    /// Open a transport and start the read loop.
    ///
    /// Must be called inside a tokio runtime. Legal only from `Idle` or
    /// `Faulted`; open failures leave the manager `Faulted`.
    pub async fn connect(&mut self, config: &JoystickConfig) -> Result<()> {
        config.validate()?;

        let state = self.state();
        if !state.can_connect() {
            return Err(ConnectError::AlreadyConnected(state));
        }

        // A loop that ended on its own has already closed its transport.
        if let Err(e) = self.reap().await {
            warn!("previous session ended uncleanly: {}", e);
        }
        self.link.lock().stats = SessionStats::default();

        self.link.transition(ConnectionState::Connecting);
        let connector = Arc::clone(&self.connector);
        let open_config = config.clone();
        let opened = tokio::task::spawn_blocking(move || connector.open(&open_config))
            .await
            .unwrap_or_else(|e| Err(ConnectError::DeviceRejected(format!("open task: {e}"))));
        let transport = match opened {
            Ok(transport) => transport,
            Err(e) => {
                warn!("connect failed: {}", e);
                self.link.report(ErrorKind::Connect, &e.to_string());
                self.link.transition(ConnectionState::Faulted);
                return Err(e);
            }
        };
        self.link.transition(ConnectionState::Connected);

        let (cancel, cancelled) = oneshot::channel();
        let task = tokio::spawn(read_loop(
            Arc::clone(&self.link),
            transport,
            FrameParser::new(config.wire_format),
            config.axis,
            cancelled,
        ));
        self.session = Some(Session { cancel, task });

        info!(
            "joystick connected: baud={}, format={:?}, axis_max={}, deadzone={}",
            config.baud_rate,
            config.wire_format,
            config.axis.device_axis_max(),
            config.axis.deadzone()
        );
        Ok(())
    }

    /// Stop the read loop, release the transport and return to `Idle`.
    ///
    /// Callable from any state; a pending read is abandoned rather than
    /// awaited. Calling it when already idle does nothing.
    pub async fn disconnect(&mut self) -> std::result::Result<(), DisconnectError> {
        if self.session.is_none() && self.state() == ConnectionState::Idle {
            return Ok(());
        }

        let result = self.reap().await;

        {
            let mut shared = self.link.lock();
            shared.last = LastReading::default();
            shared.stats = SessionStats::default();
        }
        self.link.transition(ConnectionState::Idle);

        match &result {
            Ok(()) => info!("joystick disconnected"),
            Err(e) => {
                error!("disconnect: {}", e);
                self.link.report(ErrorKind::Disconnect, &e.to_string());
            }
        }
        result
    }

    /// Cancel the current read loop, if any, and wait for it to finish.
    async fn reap(&mut self) -> std::result::Result<(), DisconnectError> {
        let Some(Session { cancel, task }) = self.session.take() else {
            return Ok(());
        };

        // Fails only if the loop already exited.
        let _ = cancel.send(());

        match task.await {
            Ok(closed) => closed.map_err(DisconnectError::from),
            Err(e) => Err(DisconnectError::ReadLoop(e.to_string())),
        }
    }
}

// ============================================================================
// Read Loop
// ============================================================================

enum LoopExit {
    Cancelled,
    EndOfStream,
    Failed(ReadError),
}

async fn read_loop(
    link: Arc<Link>,
    mut transport: Box<dyn Transport>,
    mut parser: FrameParser,
    axis: AxisConfig,
    mut cancelled: oneshot::Receiver<()>,
) -> io::Result<()> {
    let exit = loop {
        let outcome = tokio::select! {
            biased;
            // Sender fired or dropped: either way the owner is gone.
            _ = &mut cancelled => break LoopExit::Cancelled,
            outcome = transport.read() => outcome,
        };

        match outcome {
            Ok(ReadOutcome::Data(bytes)) => {
                for frame in parser.push_bytes(&bytes) {
                    link.handle_frame(frame, &axis);
                }
            }
            Ok(ReadOutcome::EndOfStream) => {
                if let Some(frame) = parser.finish() {
                    link.handle_frame(frame, &axis);
                }
                break LoopExit::EndOfStream;
            }
            Err(e) => break LoopExit::Failed(e),
        }
    };

    let closed = transport.close().await;
    if let Err(e) = &closed {
        error!("failed to close transport: {}", e);
    }

    let next = match exit {
        // disconnect() owns the outcome of a cancelled session.
        LoopExit::Cancelled => {
            debug!("read loop cancelled");
            return closed;
        }
        LoopExit::EndOfStream => {
            info!("joystick stream ended");
            ConnectionState::Idle
        }
        LoopExit::Failed(e) => {
            warn!("joystick read failed: {}", e);
            link.report(ErrorKind::Read, &e.to_string());
            ConnectionState::Faulted
        }
    };

    if let Err(e) = closed {
        link.report(ErrorKind::Disconnect, &e.to_string());
    }
    link.transition(next);
    Ok(())
}
