//! Outbound notifications for whatever renders or consumes the joystick.

use serde::Serialize;
use tokio::sync::mpsc;

use crate::connection::ConnectionState;
use crate::normalize::NormalizedReading;

/// Which part of a session an error came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorKind {
    Connect,
    Read,
    Disconnect,
}

/// Receiver of session events.
///
/// Called from the read loop task, one event at a time and in arrival
/// order. Implementations must not block for long.
pub trait EventSink: Send + Sync {
    fn on_reading(&self, reading: &NormalizedReading);
    fn on_state_change(&self, state: ConnectionState);
    fn on_error(&self, kind: ErrorKind, message: &str);
}

/// Owned form of a sink callback.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Event {
    Reading(NormalizedReading),
    StateChange { state: ConnectionState },
    Error { kind: ErrorKind, message: String },
}

/// Forwards every callback as an [`Event`] over an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<Event>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Event>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn send(&self, event: Event) {
        // A dropped receiver just means nobody is listening any more.
        let _ = self.tx.send(event);
    }
}

impl EventSink for ChannelSink {
    fn on_reading(&self, reading: &NormalizedReading) {
        self.send(Event::Reading(*reading));
    }

    fn on_state_change(&self, state: ConnectionState) {
        self.send(Event::StateChange { state });
    }

    fn on_error(&self, kind: ErrorKind, message: &str) {
        self.send(Event::Error {
            kind,
            message: message.to_string(),
        });
    }
}
