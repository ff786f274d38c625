//! Serial joystick link.
//!
//! This crate connects to a joystick that streams ASCII frames over a serial
//! port (X/Y axis from a 10-bit ADC plus one button) and turns them into
//! normalized control values.
//!
//! # Pipeline
//!
//! transport bytes → [`FrameParser`] → [`RawReading`] → [`normalize()`] →
//! [`NormalizedReading`] → [`EventSink`]
//!
//! [`ConnectionManager`] owns the lifecycle (`Idle → Connecting → Connected →
//! Idle | Faulted`) and the single read loop per connection.
//!
//! # Firmware settings
//!
//! Baud rate and wire format differ between firmware builds (9600 vs 115200,
//! tagged `X:.. Y:.. BTN:..` vs delimited `x,y,btn`) and are never guessed:
//! they are required fields of [`JoystickConfig`].

mod config;
mod connection;
mod errors;
mod events;
mod frame;
pub mod logging;
mod normalize;
mod serial;
mod transport;

pub use config::{
    AxisConfig, JoystickConfig, WireFormat, COMMON_BAUD_RATES, DEFAULT_AXIS_MAX, DEFAULT_DEADZONE,
};
pub use connection::{ConnectionManager, ConnectionState, LastReading, SessionStats};
pub use errors::*;
pub use events::{ChannelSink, ErrorKind, Event, EventSink};
pub use frame::{FrameParser, Frames, RawReading, MAX_FRAME_LEN};
pub use normalize::{normalize, NormalizedReading, AXIS_LIMIT};
pub use serial::{SerialConnector, SerialTransport};
pub use transport::{Connector, ReadOutcome, Transport};
