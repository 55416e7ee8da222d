use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crossbeam::channel::{unbounded, Receiver, Sender};

use gndlink::stream::Stream;
use gndlink::{Error, Result};

/// In-memory [`Stream`]: tests feed read data through a channel and inspect
/// captured writes through a [`StreamHandle`] that outlives handing the
/// stream to a protocol. Reads block like a real socket and a disconnect
/// from another thread unblocks them.
pub struct MemoryStream {
    feed: Receiver<Vec<u8>>,
    shutdown_tx: Sender<()>,
    shutdown_rx: Receiver<()>,
    writes: Arc<Mutex<Vec<u8>>>,
    connected: AtomicBool,
    read_timeout: Duration,
}

/// Test-side view of a [`MemoryStream`].
pub struct StreamHandle {
    feed: Sender<Vec<u8>>,
    writes: Arc<Mutex<Vec<u8>>>,
}

#[allow(dead_code)] // not every integration test drives every method
impl StreamHandle {
    /// Queue bytes for the stream's next read.
    pub fn feed(&self, data: &[u8]) {
        self.feed.send(data.to_vec()).expect("stream dropped");
    }

    /// Simulate the peer closing the connection.
    pub fn close(&self) {
        let _ = self.feed.send(Vec::new());
    }

    /// Everything written to the stream so far.
    pub fn written(&self) -> Vec<u8> {
        self.writes.lock().unwrap().clone()
    }

    pub fn clear_written(&self) {
        self.writes.lock().unwrap().clear();
    }
}

impl MemoryStream {
    pub fn new(read_timeout: Duration) -> (Self, StreamHandle) {
        let (feed_tx, feed_rx) = unbounded();
        let (shutdown_tx, shutdown_rx) = unbounded();
        let writes = Arc::new(Mutex::new(Vec::new()));
        (
            MemoryStream {
                feed: feed_rx,
                shutdown_tx,
                shutdown_rx,
                writes: writes.clone(),
                connected: AtomicBool::new(false),
                read_timeout,
            },
            StreamHandle {
                feed: feed_tx,
                writes,
            },
        )
    }
}

impl Stream for MemoryStream {
    fn connect(&self) -> Result<()> {
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
        let _ = self.shutdown_tx.send(());
    }

    fn read(&self) -> Result<Vec<u8>> {
        if !self.connected() {
            return Ok(Vec::new());
        }
        crossbeam::select! {
            recv(self.feed) -> msg => Ok(msg.unwrap_or_default()),
            recv(self.shutdown_rx) -> _ => Ok(Vec::new()),
            default(self.read_timeout) => Err(Error::Timeout("Read")),
        }
    }

    fn read_nonblock(&self) -> Result<Vec<u8>> {
        Ok(self.feed.try_recv().unwrap_or_default())
    }

    fn write(&self, data: &[u8]) -> Result<()> {
        if !self.connected() {
            return Err(Error::NotConnected);
        }
        self.writes.lock().unwrap().extend_from_slice(data);
        Ok(())
    }
}
