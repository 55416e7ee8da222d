use std::io::{ErrorKind, Read, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use tracing::debug;

use super::Stream;
use crate::{Error, Result};

/// Largest chunk pulled off the socket per read call.
const READ_CHUNK: usize = 65535;

/// [`Stream`] over a TCP socket with independent read and write timeouts.
///
/// The write half is guarded by a mutex because commands may arrive from
/// more than one source; reads happen serially from a single context and
/// need no lock. `disconnect` shuts the socket down, which forces a read
/// blocked in the kernel to return.
pub struct TcpSocketStream {
    socket: TcpStream,
    read_timeout: Option<Duration>,
    write_mutex: Mutex<()>,
    connected: AtomicBool,
}

impl TcpSocketStream {
    /// Open a connection to `addr`. Timeouts are in seconds; `None` blocks
    /// until the socket is ready.
    ///
    /// # Errors
    /// Connection or socket-option failures.
    pub fn connect<A: ToSocketAddrs>(
        addr: A,
        write_timeout: Option<f64>,
        read_timeout: Option<f64>,
    ) -> Result<Self> {
        let socket = TcpStream::connect(addr)?;
        Self::from_socket(socket, write_timeout, read_timeout)
    }

    /// Wrap an already-accepted socket, e.g. on the server side of a
    /// listening interface.
    ///
    /// # Errors
    /// Socket-option failures.
    pub fn from_socket(
        socket: TcpStream,
        write_timeout: Option<f64>,
        read_timeout: Option<f64>,
    ) -> Result<Self> {
        let read_timeout = read_timeout.map(Duration::from_secs_f64);
        socket.set_read_timeout(read_timeout)?;
        socket.set_write_timeout(write_timeout.map(Duration::from_secs_f64))?;
        Ok(TcpSocketStream {
            socket,
            read_timeout,
            write_mutex: Mutex::new(()),
            connected: AtomicBool::new(true),
        })
    }
}

fn is_closed(kind: ErrorKind) -> bool {
    matches!(
        kind,
        ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::BrokenPipe
            | ErrorKind::NotConnected
    )
}

fn is_timeout(kind: ErrorKind) -> bool {
    // The kernel reports an elapsed SO_RCVTIMEO as either of these
    // depending on platform.
    matches!(kind, ErrorKind::WouldBlock | ErrorKind::TimedOut)
}

impl Stream for TcpSocketStream {
    fn connect(&self) -> Result<()> {
        // The socket is opened at construction; nothing more to do.
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
        // Unblocks a reader stuck in the kernel. Errors are irrelevant here,
        // the peer may already be gone.
        let _ = self.socket.shutdown(Shutdown::Both);
        debug!("tcp stream disconnected");
    }

    fn read(&self) -> Result<Vec<u8>> {
        if !self.connected() {
            return Ok(Vec::new());
        }
        let mut buf = vec![0u8; READ_CHUNK];
        match (&self.socket).read(&mut buf) {
            Ok(0) => Ok(Vec::new()),
            Ok(n) => {
                buf.truncate(n);
                Ok(buf)
            }
            Err(err) if self.read_timeout.is_some() && is_timeout(err.kind()) => {
                Err(Error::Timeout("Read"))
            }
            Err(err) if is_closed(err.kind()) => Ok(Vec::new()),
            Err(err) => Err(Error::Io(err)),
        }
    }

    fn read_nonblock(&self) -> Result<Vec<u8>> {
        if !self.connected() {
            return Ok(Vec::new());
        }
        self.socket.set_nonblocking(true)?;
        let mut buf = vec![0u8; READ_CHUNK];
        let zult = (&self.socket).read(&mut buf);
        self.socket.set_nonblocking(false)?;
        match zult {
            Ok(0) => Ok(Vec::new()),
            Ok(n) => {
                buf.truncate(n);
                Ok(buf)
            }
            Err(err) if err.kind() == ErrorKind::WouldBlock => Ok(Vec::new()),
            Err(err) if is_closed(err.kind()) => Ok(Vec::new()),
            Err(err) => Err(Error::Io(err)),
        }
    }

    fn write(&self, data: &[u8]) -> Result<()> {
        if !self.connected() {
            return Err(Error::NotConnected);
        }
        let _guard = self.write_mutex.lock().expect("tcp write lock poisoned");
        match (&self.socket).write_all(data) {
            Ok(()) => Ok(()),
            Err(err) if is_timeout(err.kind()) => Err(Error::Timeout("Write")),
            Err(err) => Err(Error::Io(err)),
        }
    }
}
