//! Byte-stream transport seam.
//!
//! The connection manager never touches a concrete port type: a
//! [`Connector`] opens a boxed [`Transport`], and the read loop owns it
//! until it is closed.

use std::io;

use futures::future::BoxFuture;

use crate::config::JoystickConfig;
use crate::errors::{ReadError, Result};

/// Result of one transport read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    Data(Vec<u8>),
    EndOfStream,
}

/// An open byte stream.
pub trait Transport: Send {
    /// Wait for the next chunk. Dropping the returned future abandons the
    /// read without closing the transport.
    fn read(&mut self) -> BoxFuture<'_, std::result::Result<ReadOutcome, ReadError>>;

    /// Release the stream. Consumes the handle, so it runs at most once.
    fn close(self: Box<Self>) -> BoxFuture<'static, io::Result<()>>;
}

/// Opens transports for a given configuration.
///
/// `open` runs on tokio's blocking pool, so it may block on the device.
pub trait Connector: Send + Sync {
    fn open(&self, config: &JoystickConfig) -> Result<Box<dyn Transport>>;
}
