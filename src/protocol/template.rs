use std::sync::Mutex;
use std::thread;
use std::time::{Duration, Instant, SystemTime};

use crossbeam::channel::{unbounded, Receiver, Sender};
use regex::Regex;
use tracing::debug;
use typed_builder::TypedBuilder;

use super::{AccumBuffer, Framing, Reduced, SharedConfig, TerminatedConfig, TerminatedFraming};
use crate::accessor::FieldValue;
use crate::interface::Interface;
use crate::packet::Packet;
use crate::stream::Stream;
use crate::{Error, Result};

#[cfg(feature = "serde")]
fn default_true() -> bool {
    true
}
#[cfg(feature = "serde")]
fn default_one() -> u32 {
    1
}
#[cfg(feature = "serde")]
fn default_timeout() -> Option<f64> {
    Some(5.0)
}

/// Configuration for [`TemplateFraming`].
#[derive(Debug, Clone, TypedBuilder)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TemplateConfig {
    /// Terminator appended to outgoing commands, as a hex string.
    #[builder(setter(into))]
    pub write_termination: String,
    /// Terminator delimiting incoming response lines, as a hex string.
    #[builder(setter(into))]
    pub read_termination: String,
    /// Response lines thrown away before the response body (echoes,
    /// prompts).
    #[builder(default = 0)]
    #[cfg_attr(feature = "serde", serde(default))]
    pub ignore_lines: u32,
    /// Seconds to wait after connecting before flushing stale data sitting
    /// in a freshly opened line.
    #[builder(default, setter(strip_option))]
    #[cfg_attr(feature = "serde", serde(default))]
    pub initial_read_delay: Option<f64>,
    /// Lines which together comprise one response.
    #[builder(default = 1)]
    #[cfg_attr(feature = "serde", serde(default = "default_one"))]
    pub response_lines: u32,
    #[builder(default = true)]
    #[cfg_attr(feature = "serde", serde(default = "default_true"))]
    pub strip_read_termination: bool,
    /// Seconds to wait for a complete response before giving up; `None`
    /// waits forever.
    #[builder(default = Some(5.0))]
    #[cfg_attr(feature = "serde", serde(default = "default_timeout"))]
    pub response_timeout: Option<f64>,
}

/// What a command packet told us to expect back.
pub(crate) struct ResponseSpec {
    template: String,
    packet_name: String,
    target: Option<String>,
}

/// Command/response templating over terminated framing, for text based
/// instrument protocols (SCPI style ASCII command sets).
///
/// The outgoing packet's `CMD_TEMPLATE` field holds the command text with
/// `<VARIABLE>` placeholders substituted from the packet's own fields. When
/// `RSP_TEMPLATE` and `RSP_PACKET` are present the write path reads the
/// response lines, matches them against the response template, fills a clone
/// of the named response packet, and queues it for [`read`] to deliver.
///
/// The write path performs all response stream I/O against its own private
/// buffer; the read path only drains the queue. Those two paths may run on
/// different threads, which is why the queue is a channel.
///
/// [`read`]: crate::protocol::StreamProtocol::read
pub struct TemplateFraming {
    terminated: TerminatedFraming,
    ignore_lines: u32,
    response_lines: u32,
    initial_read_delay: Option<Duration>,
    response_timeout: Option<Duration>,
    placeholder_re: Regex,
    response_tx: Sender<Option<Packet>>,
    response_rx: Receiver<Option<Packet>>,
    response_buffer: Mutex<AccumBuffer>,
}

impl TemplateFraming {
    /// # Errors
    /// [`Error::HexPattern`] for unparseable termination strings.
    pub fn new(config: &TemplateConfig) -> Result<Self> {
        let terminated = TerminatedFraming::new(
            &TerminatedConfig::builder()
                .write_termination(config.write_termination.clone())
                .read_termination(config.read_termination.clone())
                .strip_read_termination(config.strip_read_termination)
                .build(),
        )?;
        let (response_tx, response_rx) = unbounded();
        Ok(TemplateFraming {
            terminated,
            ignore_lines: config.ignore_lines,
            response_lines: config.response_lines,
            initial_read_delay: config.initial_read_delay.map(Duration::from_secs_f64),
            response_timeout: config.response_timeout.map(Duration::from_secs_f64),
            placeholder_re: Regex::new("<(.*?)>").expect("placeholder regex is valid"),
            response_tx,
            response_rx,
            response_buffer: Mutex::new(AccumBuffer::new()),
        })
    }

    /// Drop stale state and flush junk (welcome banners, prompts) sitting in
    /// a freshly opened line.
    pub(crate) fn handle_connect(&self, stream: &dyn Stream) -> Result<()> {
        while self.response_rx.try_recv().is_ok() {}
        self.response_buffer
            .lock()
            .expect("response buffer lock poisoned")
            .clear();
        if let Some(delay) = self.initial_read_delay {
            thread::sleep(delay);
            loop {
                let data = stream.read_nonblock()?;
                if data.is_empty() {
                    break;
                }
                debug!("discarding {} bytes of stale connect data", data.len());
            }
        }
        Ok(())
    }

    /// Deliver the sentinel that unblocks a reader waiting on the queue.
    pub(crate) fn handle_disconnect(&self) {
        let _ = self.response_tx.send(None);
    }

    /// Block until a completed response packet (or the disconnect sentinel)
    /// is available.
    pub(crate) fn recv_response(&self) -> Result<Option<Packet>> {
        match self.response_rx.recv() {
            Ok(packet) => Ok(packet),
            Err(_) => Ok(None),
        }
    }

    /// Build the command text from `CMD_TEMPLATE` and capture what response
    /// to expect, substituting `<VARIABLE>` placeholders in both.
    pub(crate) fn prepare_write(&self, packet: &Packet) -> Result<(String, Option<ResponseSpec>)> {
        let rsp_template = read_text_field(packet, "RSP_TEMPLATE");
        let mut rsp_packet_name = read_text_field(packet, "RSP_PACKET");

        let mut command = match packet.read_field("CMD_TEMPLATE")? {
            FieldValue::String(s) => s,
            other => other.to_string(),
        };

        let names: Vec<String> = self
            .placeholder_re
            .captures_iter(&command)
            .map(|caps| caps[1].to_string())
            .collect();
        for name in names {
            let value = packet.read_field(&name)?.to_string();
            let placeholder = format!("<{name}>");
            command = command.replace(&placeholder, &value);
            if let Some(rsp_name) = &mut rsp_packet_name {
                *rsp_name = rsp_name.replace(&placeholder, &value);
            }
        }

        let response = match (rsp_template, rsp_packet_name) {
            (Some(template), Some(packet_name)) => Some(ResponseSpec {
                template,
                packet_name,
                target: packet.target().map(str::to_string),
            }),
            _ => None,
        };
        Ok((command, response))
    }

    /// Read and correlate the response to a just-written command, pushing
    /// the filled response packet onto the queue.
    ///
    /// # Errors
    /// [`Error::Timeout`] when no complete response arrives in time;
    /// [`Error::ResponseMismatch`] when the response does not match the
    /// template; [`Error::UnknownResponsePacket`] when no definition
    /// resolves. A silent partial match is worse than a loud failure for
    /// instrument control.
    pub(crate) fn handle_response(
        &self,
        stream: &dyn Stream,
        spec: ResponseSpec,
        interface: Option<&dyn Interface>,
    ) -> Result<()> {
        let deadline = self.response_timeout.map(|t| Instant::now() + t);
        let lines_needed = (self.ignore_lines + self.response_lines) as usize;
        let mut lines: Vec<Vec<u8>> = Vec::with_capacity(lines_needed);

        let mut buffer = self
            .response_buffer
            .lock()
            .expect("response buffer lock poisoned");
        while lines.len() < lines_needed {
            match self.terminated.reduce_to_single_packet(&mut buffer)? {
                Reduced::Packet(line) => lines.push(line),
                Reduced::NeedMoreData => match stream.read() {
                    Ok(data) if data.is_empty() => {
                        return Err(Error::ResponseMismatch(
                            "connection closed waiting for response".to_string(),
                        ))
                    }
                    Ok(data) => buffer.append(&data),
                    Err(Error::Timeout(_)) => {
                        if deadline.is_some_and(|d| Instant::now() >= d) {
                            return Err(Error::Timeout("Response"));
                        }
                    }
                    Err(err) => return Err(err),
                },
            }
        }
        drop(buffer);

        let body: Vec<u8> = lines
            .into_iter()
            .skip(self.ignore_lines as usize)
            .flatten()
            .collect();
        let response_string = String::from_utf8_lossy(&body).into_owned();

        let (regexp, names) = self.template_to_regex(&spec.template)?;
        let captures = regexp
            .captures(&response_string)
            .ok_or_else(|| Error::ResponseMismatch(response_string.clone()))?;

        let mut targets: Vec<String> = Vec::new();
        targets.extend(spec.target.iter().cloned());
        if let Some(interface) = interface {
            targets.extend(interface.target_names());
        }
        let definition = interface.and_then(|interface| {
            targets
                .iter()
                .find_map(|target| interface.response_definition(target, &spec.packet_name))
        });
        let Some(mut result) = definition else {
            return Err(Error::UnknownResponsePacket(spec.packet_name));
        };

        result.received_time = Some(SystemTime::now());
        for (i, name) in names.iter().enumerate() {
            let value = captures.get(i + 1).map_or("", |m| m.as_str());
            result.write_field_str(name, value).map_err(|err| {
                Error::ResponseMismatch(format!("could not write value {value:?} to {name}: {err}"))
            })?;
        }

        if self.response_tx.send(Some(result)).is_err() {
            debug!("response queue receiver dropped");
        }
        Ok(())
    }

    /// Convert a response template into a regular expression: literal
    /// segments escaped, one capturing group per `<VARIABLE>`.
    fn template_to_regex(&self, template: &str) -> Result<(Regex, Vec<String>)> {
        let mut pattern = String::new();
        let mut names = Vec::new();
        let mut last = 0;
        for caps in self.placeholder_re.captures_iter(template) {
            let whole = caps.get(0).expect("capture 0 always present");
            pattern.push_str(&regex::escape(&template[last..whole.start()]));
            pattern.push_str("(.*)");
            names.push(caps[1].to_string());
            last = whole.end();
        }
        pattern.push_str(&regex::escape(&template[last..]));
        let regexp = Regex::new(&pattern).map_err(|err| {
            Error::ResponseMismatch(format!("invalid response template {template:?}: {err}"))
        })?;
        Ok((regexp, names))
    }
}

/// Read a string-ish field, treating absence and emptiness as "not set" so
/// commands can omit response handling entirely.
fn read_text_field(packet: &Packet, name: &str) -> Option<String> {
    let value = packet.read_field(name).ok()?;
    let text = match value {
        FieldValue::String(s) => s,
        other => other.to_string(),
    };
    let text = text.trim().to_string();
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

impl Framing for TemplateFraming {
    fn reduce_to_single_packet(&self, buffer: &mut AccumBuffer) -> Result<Reduced> {
        self.terminated.reduce_to_single_packet(buffer)
    }

    fn frame_write_data(&self, data: Vec<u8>, shared: &SharedConfig) -> Result<Vec<u8>> {
        self.terminated.frame_write_data(data, shared)
    }
}
