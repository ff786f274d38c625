#![allow(dead_code)]

use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{mpsc as std_mpsc, Arc, Mutex};
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::sync::mpsc;

use serial_joystick::{
    AxisConfig, ConnectError, ConnectionState, Connector, Event, JoystickConfig, ReadError,
    ReadOutcome, Transport, WireFormat,
};

const EVENT_TIMEOUT: Duration = Duration::from_secs(2);
const OPEN_HOLD_LIMIT: Duration = Duration::from_secs(1);

type Step = Result<ReadOutcome, ReadError>;

/// Test-side handle feeding one scripted transport.
pub struct Feed {
    tx: mpsc::UnboundedSender<Step>,
}

impl Feed {
    pub fn chunk(&self, text: &str) {
        let _ = self.tx.send(Ok(ReadOutcome::Data(text.as_bytes().to_vec())));
    }

    pub fn end(&self) {
        let _ = self.tx.send(Ok(ReadOutcome::EndOfStream));
    }

    pub fn fail(&self, err: ReadError) {
        let _ = self.tx.send(Err(err));
    }
}

struct ScriptedTransport {
    rx: mpsc::UnboundedReceiver<Step>,
    closes: Arc<AtomicUsize>,
    close_fails: bool,
}

impl Transport for ScriptedTransport {
    fn read(&mut self) -> BoxFuture<'_, Step> {
        async move {
            self.rx
                .recv()
                .await
                .unwrap_or(Ok(ReadOutcome::EndOfStream))
        }
        .boxed()
    }

    fn close(self: Box<Self>) -> BoxFuture<'static, io::Result<()>> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        let result = if self.close_fails {
            Err(io::Error::other("port wedged"))
        } else {
            Ok(())
        };
        futures::future::ready(result).boxed()
    }
}

enum Planned {
    Link(mpsc::UnboundedReceiver<Step>),
    Failure(ConnectError),
}

#[derive(Default)]
struct Script {
    planned: Mutex<VecDeque<Planned>>,
    opens: AtomicUsize,
    closes: Arc<AtomicUsize>,
    close_fails: AtomicBool,
    hold: Mutex<Option<std_mpsc::Receiver<()>>>,
}

/// Connector handing out transports queued by the test, in order.
#[derive(Clone, Default)]
pub struct ScriptedConnector {
    script: Arc<Script>,
}

impl ScriptedConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a transport for the next `open` and return its feed.
    pub fn push_link(&self) -> Feed {
        let (tx, rx) = mpsc::unbounded_channel();
        self.script
            .planned
            .lock()
            .unwrap()
            .push_back(Planned::Link(rx));
        Feed { tx }
    }

    pub fn push_failure(&self, err: ConnectError) {
        self.script
            .planned
            .lock()
            .unwrap()
            .push_back(Planned::Failure(err));
    }

    /// Make every transport opened from now on fail its close.
    pub fn fail_closes(&self) {
        self.script.close_fails.store(true, Ordering::SeqCst);
    }

    /// Block the next `open` until the returned sender fires.
    pub fn hold_open(&self) -> std_mpsc::Sender<()> {
        let (tx, rx) = std_mpsc::channel();
        *self.script.hold.lock().unwrap() = Some(rx);
        tx
    }

    pub fn opens(&self) -> usize {
        self.script.opens.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.script.closes.load(Ordering::SeqCst)
    }
}

impl Connector for ScriptedConnector {
    fn open(&self, _config: &JoystickConfig) -> serial_joystick::Result<Box<dyn Transport>> {
        self.script.opens.fetch_add(1, Ordering::SeqCst);
        let hold = self.script.hold.lock().unwrap().take();
        if let Some(release) = hold {
            if release.recv_timeout(OPEN_HOLD_LIMIT).is_err() {
                return Err(ConnectError::DeviceRejected("open was never released".into()));
            }
        }

        match self.script.planned.lock().unwrap().pop_front() {
            Some(Planned::Link(rx)) => Ok(Box::new(ScriptedTransport {
                rx,
                closes: Arc::clone(&self.script.closes),
                close_fails: self.script.close_fails.load(Ordering::SeqCst),
            })),
            Some(Planned::Failure(err)) => Err(err),
            None => Err(ConnectError::DeviceRejected("no device scripted".into())),
        }
    }
}

pub fn config(format: WireFormat) -> JoystickConfig {
    JoystickConfig::new(9600, format, AxisConfig::default())
}

pub async fn next_event(events: &mut mpsc::UnboundedReceiver<Event>) -> Event {
    tokio::time::timeout(EVENT_TIMEOUT, events.recv())
        .await
        .expect("timed out waiting for event")
        .expect("event channel closed")
}

/// Collect events up to and including the change to `state`.
pub async fn events_until(
    events: &mut mpsc::UnboundedReceiver<Event>,
    state: ConnectionState,
) -> Vec<Event> {
    let mut seen = Vec::new();
    loop {
        let event = next_event(events).await;
        let done = event == Event::StateChange { state };
        seen.push(event);
        if done {
            return seen;
        }
    }
}

pub fn readings(events: &[Event]) -> Vec<serial_joystick::NormalizedReading> {
    events
        .iter()
        .filter_map(|e| match e {
            Event::Reading(r) => Some(*r),
            _ => None,
        })
        .collect()
}

pub fn states(events: &[Event]) -> Vec<ConnectionState> {
    events
        .iter()
        .filter_map(|e| match e {
            Event::StateChange { state } => Some(*state),
            _ => None,
        })
        .collect()
}
