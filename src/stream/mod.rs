//! Raw byte transports.
//!
//! A [`Stream`] moves raw binary data over a concrete medium and knows
//! nothing about packets; framing happens one layer up in
//! [`protocol`](crate::protocol). Additional media (serial lines, test
//! harness loopbacks) plug in by implementing the trait.

mod tcp;

pub use tcp::TcpSocketStream;

use crate::Result;

/// A connected byte transport.
///
/// `read` and `write` may be called concurrently from two execution
/// contexts; implementations must synchronize internally where the medium
/// requires it. `disconnect` may be called from any context and must cause a
/// blocked `read` to return promptly.
pub trait Stream: Send + Sync {
    /// Mark the stream connected, performing any medium-specific setup.
    ///
    /// # Errors
    /// Medium-specific connect failures.
    fn connect(&self) -> Result<()>;

    /// Whether the transport is currently usable.
    fn connected(&self) -> bool;

    /// Tear the transport down. Not reusable afterwards: a disconnected
    /// stream stays disconnected, reconnection means a new stream.
    fn disconnect(&self);

    /// Block until some bytes arrive, the configured read timeout elapses
    /// ([`Error::Timeout`](crate::Error::Timeout)), or the peer closes the
    /// stream (empty result).
    ///
    /// # Errors
    /// [`Error::Timeout`](crate::Error::Timeout) on timeout; medium errors
    /// otherwise.
    fn read(&self) -> Result<Vec<u8>>;

    /// Return whatever bytes are immediately available, never blocking.
    /// Empty result when nothing is pending.
    ///
    /// # Errors
    /// Medium errors other than "nothing available".
    fn read_nonblock(&self) -> Result<Vec<u8>>;

    /// Block until the transport accepts all of `data` or the configured
    /// write timeout elapses.
    ///
    /// # Errors
    /// [`Error::Timeout`](crate::Error::Timeout) on timeout; medium errors
    /// otherwise.
    fn write(&self, data: &[u8]) -> Result<()>;
}
