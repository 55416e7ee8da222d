//! Stream framing.
//!
//! A [`StreamProtocol`] accumulates bytes read from a [`Stream`] into an
//! internal buffer, applies sync-pattern detection and leading-byte discard,
//! and delegates to a framing strategy to carve exactly one packet's worth
//! of bytes at a time. On write it applies the inverse: strategy write hooks
//! (length fill, termination append, template substitution) followed by sync
//! pattern reconstruction.
//!
//! Strategies are a closed set selected at construction through
//! [`FramingConfig`]:
//!
//! - [`BurstFraming`] -- everything buffered is one packet
//! - [`LengthFraming`] -- an embedded length field delimits packets
//! - [`TerminatedFraming`] -- a termination byte sequence delimits packets
//! - [`TemplateFraming`] -- command/response templating over terminated
//!   framing

mod burst;
mod length;
mod terminated;
mod template;

pub use burst::BurstFraming;
pub use length::{LengthConfig, LengthFraming};
pub use template::{TemplateConfig, TemplateFraming};
pub use terminated::{TerminatedConfig, TerminatedFraming};

use std::sync::{Arc, Mutex, RwLock};
use std::time::SystemTime;

use tracing::{debug, error};
use typed_builder::TypedBuilder;

use crate::accessor::{self, Endianness, FieldType, FieldValue, Overflow};
use crate::integrity::{CrcChecker, CrcConfig, CrcOutcome};
use crate::interface::Interface;
use crate::packet::Packet;
use crate::stream::Stream;
use crate::{Error, Result};

/// Parse a hex string literal such as `"0x1ACFFC1D"` into raw bytes.
/// The `0x` prefix is optional and an odd digit count gets a leading zero.
pub(crate) fn hex_to_bytes(text: &str) -> Result<Vec<u8>> {
    let digits = text
        .trim()
        .strip_prefix("0x")
        .or_else(|| text.trim().strip_prefix("0X"))
        .unwrap_or_else(|| text.trim());
    if digits.is_empty() {
        return Err(Error::HexPattern(text.to_string()));
    }
    let padded = if digits.len() % 2 == 0 {
        digits.to_string()
    } else {
        format!("0{digits}")
    };
    let mut bytes = Vec::with_capacity(padded.len() / 2);
    for i in (0..padded.len()).step_by(2) {
        let pair = padded
            .get(i..i + 2)
            .ok_or_else(|| Error::HexPattern(text.to_string()))?;
        bytes.push(
            u8::from_str_radix(pair, 16).map_err(|_| Error::HexPattern(text.to_string()))?,
        );
    }
    Ok(bytes)
}

/// First index of `needle` within `haystack`.
pub(crate) fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Growable accumulation buffer consumed strictly from the front.
///
/// Once bytes are taken off the front they are gone; the buffer never
/// revisits a consumed prefix.
#[derive(Debug, Default)]
pub struct AccumBuffer {
    data: Vec<u8>,
}

impl AccumBuffer {
    #[must_use]
    pub fn new() -> Self {
        AccumBuffer::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn append(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    /// Remove and return the first `n` bytes.
    ///
    /// # Panics
    /// If fewer than `n` bytes are buffered.
    pub fn take_front(&mut self, n: usize) -> Vec<u8> {
        assert!(n <= self.data.len(), "take_front past end of buffer");
        self.data.drain(..n).collect()
    }

    /// Drop the first `n` bytes (capped at the buffered length).
    pub fn discard_front(&mut self, n: usize) {
        self.data.drain(..n.min(self.data.len()));
    }

    /// Remove and return everything buffered.
    pub fn take_all(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.data)
    }

    pub fn clear(&mut self) {
        self.data.clear();
    }
}

/// Outcome of a strategy's attempt to carve one packet off the buffer.
#[derive(Debug, PartialEq)]
pub enum Reduced {
    /// One packet's worth of bytes, sliced off the front.
    Packet(Vec<u8>),
    /// The buffer does not hold a complete packet yet.
    NeedMoreData,
}

/// A framing strategy: packet boundary detection plus the write-side
/// transforms that make the inverse true.
pub trait Framing: Send + Sync {
    /// Carve exactly one packet's worth of bytes off the front of `buffer`,
    /// leaving any remainder for the next call.
    ///
    /// # Errors
    /// Fatal framing violations (for example a length field past its
    /// configured maximum).
    fn reduce_to_single_packet(&self, buffer: &mut AccumBuffer) -> Result<Reduced>;

    /// Fill strategy-owned fields directly inside the packet buffer before
    /// transmission, so logged packets match the wire.
    ///
    /// # Errors
    /// Accessor errors writing the fields.
    fn fill_packet(&self, _packet: &mut Packet, _shared: &SharedConfig) -> Result<()> {
        Ok(())
    }

    /// Transform the packet's wire payload into framed bytes: append
    /// terminations, restore discarded leading bytes and the sync pattern.
    ///
    /// # Errors
    /// Fatal framing violations (for example a payload containing the
    /// termination sequence).
    fn frame_write_data(&self, data: Vec<u8>, shared: &SharedConfig) -> Result<Vec<u8>> {
        shared.apply_leading_fill(data)
    }
}

/// Sync/discard/fill configuration shared by every strategy.
#[derive(Debug, Clone, Default)]
pub struct SharedConfig {
    pub discard_leading_bytes: usize,
    pub sync_pattern: Option<Vec<u8>>,
    pub fill_fields: bool,
}

impl SharedConfig {
    /// Restore the leading bytes a read would discard: zero fill plus the
    /// sync pattern at the very front.
    pub(crate) fn apply_leading_fill(&self, data: Vec<u8>) -> Result<Vec<u8>> {
        if !self.fill_fields || self.discard_leading_bytes == 0 {
            return Ok(data);
        }
        let mut out = vec![0u8; self.discard_leading_bytes];
        out.extend(data);
        if let Some(sync) = &self.sync_pattern {
            accessor::write(
                &FieldValue::Block(sync.clone()),
                0,
                sync.len() as u32 * 8,
                FieldType::Block,
                &mut out,
                Endianness::Big,
                Overflow::Error,
            )?;
        }
        Ok(out)
    }

    /// When nothing is discarded on read the sync pattern is part of the
    /// packet itself, so fill it directly in the packet buffer.
    fn fill_sync_in_packet(&self, packet: &mut Packet) -> Result<()> {
        if !self.fill_fields || self.discard_leading_bytes != 0 {
            return Ok(());
        }
        if let Some(sync) = &self.sync_pattern {
            accessor::write(
                &FieldValue::Block(sync.clone()),
                0,
                sync.len() as u32 * 8,
                FieldType::Block,
                packet.buffer_mut(),
                Endianness::Big,
                Overflow::Error,
            )?;
        }
        Ok(())
    }
}

/// Scan `buffer` for `pattern`, discarding everything in front of the first
/// full match. Returns true once the buffer starts with the pattern, false
/// when more data is needed.
///
/// A pattern occurrence embedded in payload bytes before the real sync is
/// indistinguishable from the real sync; that ambiguity is inherent to
/// sync-based framing and accepted here.
pub(crate) fn handle_sync_pattern(pattern: &[u8], buffer: &mut AccumBuffer) -> bool {
    loop {
        if buffer.len() < pattern.len() {
            return false;
        }
        let data = buffer.as_slice();
        match data.iter().position(|&b| b == pattern[0]) {
            Some(index) => {
                if data.len() < index + pattern.len() {
                    // Candidate runs off the end of the buffer; wait for
                    // more data before judging it.
                    return false;
                }
                if &data[index..index + pattern.len()] == pattern {
                    if index != 0 {
                        log_discard(data, index, true);
                        buffer.discard_front(index);
                    }
                    return true;
                }
                log_discard(data, index + 1, false);
                buffer.discard_front(index + 1);
            }
            None => {
                log_discard(data, data.len(), false);
                buffer.clear();
                return false;
            }
        }
    }
}

fn log_discard(data: &[u8], length: usize, found: bool) {
    error!(
        "Sync {}found. Discarding {length} bytes of data.",
        if found { "" } else { "not " }
    );
    if data.len() >= 6 {
        error!(
            "Starting: 0x{:02X} 0x{:02X} 0x{:02X} 0x{:02X} 0x{:02X} 0x{:02X}",
            data[0], data[1], data[2], data[3], data[4], data[5]
        );
    }
}

/// Options common to every framing strategy.
#[derive(Debug, Clone, TypedBuilder)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize), serde(default))]
pub struct ProtocolOptions {
    /// Bytes to discard from the front of every packet after framing. Often
    /// used to remove the sync pattern from the final packet data.
    #[builder(default)]
    pub discard_leading_bytes: usize,
    /// Hex string ("0x1ACFFC1D") searched for in the raw stream. Bytes
    /// encountered before this pattern is found are discarded.
    #[builder(default, setter(strip_option, into))]
    pub sync_pattern: Option<String>,
    /// Fill sync/length fields when writing packets.
    #[builder(default)]
    pub fill_fields: bool,
    /// Drop any buffered partial packet when a new stream is connected.
    /// Setting this false preserves a packet straddling a reconnect, at the
    /// cost of possibly leaking stale bytes from the previous stream.
    #[builder(default = true)]
    pub clear_buffer_on_connect: bool,
    /// Optional per-packet CRC verification and generation.
    #[builder(default, setter(strip_option))]
    pub crc: Option<CrcConfig>,
}

impl Default for ProtocolOptions {
    fn default() -> Self {
        ProtocolOptions::builder().build()
    }
}

/// Framing strategy selection: an explicit mapping from protocol kind to
/// constructor, resolved at [`StreamProtocol`] construction.
#[derive(Debug, Clone)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(tag = "kind", rename_all = "snake_case")
)]
pub enum FramingConfig {
    Burst,
    Length(LengthConfig),
    Terminated(TerminatedConfig),
    Template(TemplateConfig),
}

pub(crate) enum Strategy {
    Burst(BurstFraming),
    Length(LengthFraming),
    Terminated(TerminatedFraming),
    Template(TemplateFraming),
}

impl Strategy {
    fn framing(&self) -> &dyn Framing {
        match self {
            Strategy::Burst(s) => s,
            Strategy::Length(s) => s,
            Strategy::Terminated(s) => s,
            Strategy::Template(s) => s,
        }
    }
}

impl FramingConfig {
    fn build(&self) -> Result<Strategy> {
        Ok(match self {
            FramingConfig::Burst => Strategy::Burst(BurstFraming),
            FramingConfig::Length(config) => Strategy::Length(LengthFraming::new(config.clone())),
            FramingConfig::Terminated(config) => {
                Strategy::Terminated(TerminatedFraming::new(config)?)
            }
            FramingConfig::Template(config) => Strategy::Template(TemplateFraming::new(config)?),
        })
    }
}

struct ReadState {
    buffer: AccumBuffer,
    /// Sync pattern found and consumed for the packet currently being
    /// accumulated.
    sync_found: bool,
    bytes_read: u64,
}

struct WriteState {
    bytes_written: u64,
}

enum Refill {
    More,
    Closed,
    TimedOut,
}

/// Processes a [`Stream`] on behalf of an [`Interface`]: the stream moves
/// raw binary data, the protocol operates at the packet abstraction level.
///
/// One reader context and one writer context may use the same protocol
/// instance concurrently; the read and write paths lock independent state.
/// Disconnecting from any context causes a blocked [`read`](Self::read) to
/// return promptly.
pub struct StreamProtocol {
    shared: SharedConfig,
    clear_buffer_on_connect: bool,
    crc: Option<CrcChecker>,
    strategy: Strategy,
    stream: RwLock<Option<Arc<dyn Stream>>>,
    interface: RwLock<Option<Arc<dyn Interface>>>,
    reader: Mutex<ReadState>,
    writer: Mutex<WriteState>,
}

impl StreamProtocol {
    /// Construct with default [`ProtocolOptions`].
    ///
    /// # Errors
    /// Invalid strategy configuration (bad hex strings, bad CRC width).
    pub fn new(framing: FramingConfig) -> Result<Self> {
        Self::with_options(framing, ProtocolOptions::default())
    }

    /// # Errors
    /// Invalid strategy or option configuration.
    pub fn with_options(framing: FramingConfig, options: ProtocolOptions) -> Result<Self> {
        let sync_pattern = options
            .sync_pattern
            .as_deref()
            .map(hex_to_bytes)
            .transpose()?;
        let crc = options.crc.map(CrcChecker::new).transpose()?;
        Ok(StreamProtocol {
            shared: SharedConfig {
                discard_leading_bytes: options.discard_leading_bytes,
                sync_pattern,
                fill_fields: options.fill_fields,
            },
            clear_buffer_on_connect: options.clear_buffer_on_connect,
            crc,
            strategy: framing.build()?,
            stream: RwLock::new(None),
            interface: RwLock::new(None),
            reader: Mutex::new(ReadState {
                buffer: AccumBuffer::new(),
                sync_found: false,
                bytes_read: 0,
            }),
            writer: Mutex::new(WriteState { bytes_written: 0 }),
        })
    }

    /// Attach the interface collaborator whose callbacks run at data and
    /// packet boundaries.
    pub fn set_interface(&self, interface: Arc<dyn Interface>) {
        *self.interface.write().expect("interface lock poisoned") = Some(interface);
    }

    /// Bind a stream and reset the byte counters. Whether a buffered partial
    /// packet from a previous stream survives is controlled by
    /// [`ProtocolOptions::clear_buffer_on_connect`].
    ///
    /// # Errors
    /// Stream connect failures.
    pub fn connect(&self, stream: Box<dyn Stream>) -> Result<()> {
        stream.connect()?;
        let stream: Arc<dyn Stream> = Arc::from(stream);
        {
            let mut state = self.reader.lock().expect("reader lock poisoned");
            if self.clear_buffer_on_connect {
                state.buffer.clear();
                state.sync_found = false;
            }
            state.bytes_read = 0;
        }
        self.writer.lock().expect("writer lock poisoned").bytes_written = 0;
        if let Strategy::Template(t) = &self.strategy {
            t.handle_connect(stream.as_ref())?;
        }
        *self.stream.write().expect("stream lock poisoned") = Some(stream);
        debug!("protocol connected");
        Ok(())
    }

    /// Whether the underlying stream is attached and connected.
    #[must_use]
    pub fn connected(&self) -> bool {
        self.stream_handle().is_some_and(|s| s.connected())
    }

    /// Detach and tear down the stream. Unblocks a reader blocked in
    /// [`read`](Self::read). The stream is not reusable afterwards;
    /// reconnection requires a fresh stream.
    pub fn disconnect(&self) {
        let stream = self.stream.write().expect("stream lock poisoned").take();
        if let Some(stream) = stream {
            stream.disconnect();
        }
        if let Strategy::Template(t) = &self.strategy {
            t.handle_disconnect();
        }
        debug!("protocol disconnected");
    }

    #[must_use]
    pub fn bytes_read(&self) -> u64 {
        self.reader.lock().expect("reader lock poisoned").bytes_read
    }

    #[must_use]
    pub fn bytes_written(&self) -> u64 {
        self.writer.lock().expect("writer lock poisoned").bytes_written
    }

    fn stream_handle(&self) -> Option<Arc<dyn Stream>> {
        self.stream.read().expect("stream lock poisoned").clone()
    }

    fn interface_handle(&self) -> Option<Arc<dyn Interface>> {
        self.interface.read().expect("interface lock poisoned").clone()
    }

    /// Read one packet.
    ///
    /// Returns `Ok(None)` on a read timeout (retryable), on connection loss,
    /// or when the protocol is disconnected. Framing violations are fatal
    /// and propagate as errors.
    ///
    /// # Errors
    /// Fatal framing violations; I/O errors other than timeout.
    pub fn read(&self) -> Result<Option<Packet>> {
        // Template framing reads only from its response queue; all stream
        // I/O happens on the write path.
        if let Strategy::Template(t) = &self.strategy {
            if self.stream_handle().is_none() {
                return Ok(None);
            }
            return t.recv_response();
        }

        let Some(stream) = self.stream_handle() else {
            return Ok(None);
        };
        let interface = self.interface_handle();
        let mut state = self.reader.lock().expect("reader lock poisoned");

        loop {
            let aligned = state.sync_found
                || match &self.shared.sync_pattern {
                    Some(pattern) => handle_sync_pattern(pattern, &mut state.buffer),
                    None => true,
                };
            if aligned {
                state.sync_found = true;
                match self.strategy.framing().reduce_to_single_packet(&mut state.buffer)? {
                    Reduced::Packet(mut data) => {
                        state.sync_found = false;
                        if self.shared.discard_leading_bytes > 0 {
                            let n = self.shared.discard_leading_bytes.min(data.len());
                            data.drain(..n);
                        }
                        if data.is_empty() {
                            continue;
                        }
                        if let Some(interface) = &interface {
                            match interface.post_read_data(data) {
                                None => {
                                    state.buffer.clear();
                                    state.sync_found = false;
                                    return Ok(None);
                                }
                                Some(d) if d.is_empty() => continue,
                                Some(d) => data = d,
                            }
                        }
                        if let Some(crc) = &self.crc {
                            match crc.check_read(data)? {
                                CrcOutcome::Data(d) => data = d,
                                CrcOutcome::Disconnect => {
                                    state.buffer.clear();
                                    state.sync_found = false;
                                    return Ok(None);
                                }
                            }
                        }
                        let mut packet = Packet::from_buffer(data);
                        packet.received_time = Some(SystemTime::now());
                        if let Some(interface) = &interface {
                            packet = interface.post_read_packet(packet);
                        }
                        return Ok(Some(packet));
                    }
                    Reduced::NeedMoreData => {}
                }
            }

            match Self::read_and_handle_timeout(stream.as_ref(), &mut state)? {
                Refill::More => {}
                Refill::Closed | Refill::TimedOut => return Ok(None),
            }
        }
    }

    fn read_and_handle_timeout(stream: &dyn Stream, state: &mut ReadState) -> Result<Refill> {
        match stream.read() {
            Ok(data) if data.is_empty() => {
                // Zero-length read means the stream was closed.
                state.buffer.clear();
                state.sync_found = false;
                Ok(Refill::Closed)
            }
            Ok(data) => {
                state.bytes_read += data.len() as u64;
                state.buffer.append(&data);
                Ok(Refill::More)
            }
            Err(Error::Timeout(_)) => {
                error!("Timeout waiting for data to be read");
                // The buffered partial packet is kept; a slow link is not a
                // closed link.
                Ok(Refill::TimedOut)
            }
            Err(err) => Err(err),
        }
    }

    /// Frame and transmit a packet.
    ///
    /// The packet is mutable because fill-field configuration writes the
    /// sync pattern and length into the packet's own buffer, keeping later
    /// logging of the packet consistent with what went out on the wire.
    ///
    /// # Errors
    /// [`Error::NotConnected`] without a stream; fatal framing violations;
    /// stream write failures.
    pub fn write(&self, packet: &mut Packet) -> Result<()> {
        let Some(stream) = self.stream_handle() else {
            return Err(Error::NotConnected);
        };
        let interface = self.interface_handle();
        let mut state = self.writer.lock().expect("writer lock poisoned");

        if let Strategy::Template(t) = &self.strategy {
            let (command, response) = t.prepare_write(packet)?;
            let data = t.frame_write_data(command.into_bytes(), &self.shared)?;
            stream.write(&data)?;
            state.bytes_written += data.len() as u64;
            if let Some(response) = response {
                t.handle_response(stream.as_ref(), response, interface.as_deref())?;
            }
            return Ok(());
        }

        self.shared.fill_sync_in_packet(packet)?;
        self.strategy.framing().fill_packet(packet, &self.shared)?;
        // CRC goes in last so it covers the filled sync/length fields
        if let Some(crc) = &self.crc {
            if crc.fill_on_write() && crc.write_field_name().is_some() {
                crc.fill_packet(packet)?;
            }
        }

        let payload = match &interface {
            Some(interface) => interface.pre_write_packet(packet),
            None => packet.buffer().to_vec(),
        };
        let mut data = self.strategy.framing().frame_write_data(payload, &self.shared)?;
        if let Some(crc) = &self.crc {
            crc.fill_data(&mut data)?;
        }

        stream.write(&data)?;
        state.bytes_written += data.len() as u64;
        Ok(())
    }

    /// Write bytes directly, bypassing all framing. An escape hatch for
    /// diagnostics and template prefix injection.
    ///
    /// # Errors
    /// [`Error::NotConnected`] without a stream; stream write failures.
    pub fn write_raw(&self, data: &[u8]) -> Result<()> {
        let Some(stream) = self.stream_handle() else {
            return Err(Error::NotConnected);
        };
        let mut state = self.writer.lock().expect("writer lock poisoned");
        stream.write(data)?;
        state.bytes_written += data.len() as u64;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_parses_with_and_without_prefix() {
        assert_eq!(
            hex_to_bytes("0x1ACFFC1D").unwrap(),
            vec![0x1a, 0xcf, 0xfc, 0x1d]
        );
        assert_eq!(hex_to_bytes("ABCD").unwrap(), vec![0xab, 0xcd]);
        assert_eq!(hex_to_bytes("0xA").unwrap(), vec![0x0a]);
    }

    #[test]
    fn hex_rejects_garbage() {
        assert!(matches!(hex_to_bytes("0xZZ"), Err(Error::HexPattern(_))));
        assert!(matches!(hex_to_bytes(""), Err(Error::HexPattern(_))));
    }

    #[test]
    fn accum_buffer_consumes_from_the_front() {
        let mut buffer = AccumBuffer::new();
        buffer.append(&[1, 2, 3]);
        buffer.append(&[4, 5]);
        assert_eq!(buffer.len(), 5);
        assert_eq!(buffer.take_front(2), vec![1, 2]);
        assert_eq!(buffer.as_slice(), &[3, 4, 5]);
        buffer.discard_front(1);
        assert_eq!(buffer.take_all(), vec![4, 5]);
        assert!(buffer.is_empty());
    }

    #[test]
    fn sync_aligns_buffer_to_pattern() {
        let mut buffer = AccumBuffer::new();
        buffer.append(&[0x00, 0x11, 0x1a, 0xcf, 0xfc, 0x1d, 0xaa]);
        assert!(handle_sync_pattern(&[0x1a, 0xcf, 0xfc, 0x1d], &mut buffer));
        assert_eq!(buffer.as_slice(), &[0x1a, 0xcf, 0xfc, 0x1d, 0xaa]);
    }

    #[test]
    fn sync_skips_false_positive_partial_match() {
        let mut buffer = AccumBuffer::new();
        // 0x1a 0xcf starts a candidate that fails, followed by the real sync
        buffer.append(&[0x1a, 0xcf, 0x00, 0x1a, 0xcf, 0xfc, 0x1d, 0x42]);
        assert!(handle_sync_pattern(&[0x1a, 0xcf, 0xfc, 0x1d], &mut buffer));
        assert_eq!(buffer.as_slice(), &[0x1a, 0xcf, 0xfc, 0x1d, 0x42]);
    }

    #[test]
    fn sync_waits_when_candidate_is_truncated() {
        let mut buffer = AccumBuffer::new();
        buffer.append(&[0x00, 0x1a, 0xcf]);
        assert!(!handle_sync_pattern(&[0x1a, 0xcf, 0xfc, 0x1d], &mut buffer));
        // Candidate kept for when the rest arrives
        assert_eq!(buffer.as_slice(), &[0x00, 0x1a, 0xcf]);
        buffer.append(&[0xfc, 0x1d]);
        assert!(handle_sync_pattern(&[0x1a, 0xcf, 0xfc, 0x1d], &mut buffer));
        assert_eq!(buffer.as_slice(), &[0x1a, 0xcf, 0xfc, 0x1d]);
    }

    #[test]
    fn sync_discards_unmatchable_data() {
        let mut buffer = AccumBuffer::new();
        buffer.append(&[0x01, 0x02, 0x03, 0x04]);
        assert!(!handle_sync_pattern(&[0x1a, 0xcf], &mut buffer));
        assert!(buffer.is_empty());
    }

    #[test]
    fn leading_fill_restores_discarded_bytes_and_sync() {
        let shared = SharedConfig {
            discard_leading_bytes: 4,
            sync_pattern: Some(vec![0x1a, 0xcf, 0xfc, 0x1d]),
            fill_fields: true,
        };
        let out = shared.apply_leading_fill(vec![0xaa, 0xbb]).unwrap();
        assert_eq!(out, vec![0x1a, 0xcf, 0xfc, 0x1d, 0xaa, 0xbb]);
    }

    #[test]
    fn leading_fill_is_identity_without_fill_fields() {
        let shared = SharedConfig {
            discard_leading_bytes: 4,
            sync_pattern: Some(vec![0x1a, 0xcf, 0xfc, 0x1d]),
            fill_fields: false,
        };
        let out = shared.apply_leading_fill(vec![0xaa, 0xbb]).unwrap();
        assert_eq!(out, vec![0xaa, 0xbb]);
    }
}
