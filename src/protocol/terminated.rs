use typed_builder::TypedBuilder;

use super::{find_subsequence, hex_to_bytes, AccumBuffer, Framing, Reduced, SharedConfig};
use crate::{Error, Result};

#[cfg(feature = "serde")]
fn default_true() -> bool {
    true
}

/// Configuration for [`TerminatedFraming`].
///
/// Termination sequences are hex string literals (`"0xABCD"`). The read and
/// write terminators may differ, e.g. an instrument that accepts `CR` but
/// answers with `CRLF`.
#[derive(Debug, Clone, TypedBuilder)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TerminatedConfig {
    /// Terminator appended to outgoing packets.
    #[builder(setter(into))]
    pub write_termination: String,
    /// Terminator delimiting incoming packets.
    #[builder(setter(into))]
    pub read_termination: String,
    /// Remove the terminator from delivered packets.
    #[builder(default = true)]
    #[cfg_attr(feature = "serde", serde(default = "default_true"))]
    pub strip_read_termination: bool,
}

/// Delineates packets with a termination sequence at the end of each packet
/// rather than an embedded length.
pub struct TerminatedFraming {
    write_termination: Vec<u8>,
    read_termination: Vec<u8>,
    strip_read_termination: bool,
}

impl TerminatedFraming {
    /// # Errors
    /// [`Error::HexPattern`] for unparseable termination strings.
    pub fn new(config: &TerminatedConfig) -> Result<Self> {
        Ok(TerminatedFraming {
            write_termination: hex_to_bytes(&config.write_termination)?,
            read_termination: hex_to_bytes(&config.read_termination)?,
            strip_read_termination: config.strip_read_termination,
        })
    }
}

impl Framing for TerminatedFraming {
    fn reduce_to_single_packet(&self, buffer: &mut AccumBuffer) -> Result<Reduced> {
        match find_subsequence(buffer.as_slice(), &self.read_termination) {
            Some(index) => {
                if self.strip_read_termination {
                    let packet = buffer.take_front(index);
                    buffer.discard_front(self.read_termination.len());
                    Ok(Reduced::Packet(packet))
                } else {
                    Ok(Reduced::Packet(
                        buffer.take_front(index + self.read_termination.len()),
                    ))
                }
            }
            None => Ok(Reduced::NeedMoreData),
        }
    }

    fn frame_write_data(&self, data: Vec<u8>, shared: &SharedConfig) -> Result<Vec<u8>> {
        // A payload containing the terminator would produce an ambiguous
        // frame on the wire.
        if find_subsequence(&data, &self.write_termination).is_some() {
            return Err(Error::TerminationConflict);
        }
        let mut out = data;
        out.extend_from_slice(&self.write_termination);
        shared.apply_leading_fill(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn framing(strip: bool) -> TerminatedFraming {
        TerminatedFraming::new(
            &TerminatedConfig::builder()
                .write_termination("0xABCD")
                .read_termination("0xABCD")
                .strip_read_termination(strip)
                .build(),
        )
        .unwrap()
    }

    #[test]
    fn strips_terminator_when_configured() {
        let framing = framing(true);
        let mut buffer = AccumBuffer::new();
        buffer.append(&[0x00, 0x01, 0x02, 0xab]);
        assert_eq!(
            framing.reduce_to_single_packet(&mut buffer).unwrap(),
            Reduced::NeedMoreData
        );
        buffer.append(&[0xcd, 0x44, 0x02, 0x03]);
        assert_eq!(
            framing.reduce_to_single_packet(&mut buffer).unwrap(),
            Reduced::Packet(vec![0x00, 0x01, 0x02])
        );
        // Bytes after the terminator stay for the next packet
        assert_eq!(buffer.as_slice(), &[0x44, 0x02, 0x03]);
    }

    #[test]
    fn keeps_terminator_when_configured() {
        let framing = framing(false);
        let mut buffer = AccumBuffer::new();
        buffer.append(&[0x00, 0x01, 0x02, 0xab, 0xcd, 0x44]);
        assert_eq!(
            framing.reduce_to_single_packet(&mut buffer).unwrap(),
            Reduced::Packet(vec![0x00, 0x01, 0x02, 0xab, 0xcd])
        );
        assert_eq!(buffer.as_slice(), &[0x44]);
    }

    #[test]
    fn write_appends_terminator() {
        let framing = framing(true);
        let out = framing
            .frame_write_data(vec![0x00, 0x01], &SharedConfig::default())
            .unwrap();
        assert_eq!(out, vec![0x00, 0x01, 0xab, 0xcd]);
    }

    #[test]
    fn write_rejects_payload_containing_terminator() {
        let framing = framing(true);
        let zult = framing.frame_write_data(vec![0x00, 0xab, 0xcd, 0x01], &SharedConfig::default());
        assert!(matches!(zult, Err(Error::TerminationConflict)));
    }

    #[test]
    fn different_read_and_write_terminators() {
        let framing = TerminatedFraming::new(
            &TerminatedConfig::builder()
                .write_termination("0x0D")
                .read_termination("0x0D0A")
                .build(),
        )
        .unwrap();
        let mut buffer = AccumBuffer::new();
        buffer.append(b"OK\r\n");
        assert_eq!(
            framing.reduce_to_single_packet(&mut buffer).unwrap(),
            Reduced::Packet(b"OK".to_vec())
        );
        let out = framing
            .frame_write_data(b"*IDN?".to_vec(), &SharedConfig::default())
            .unwrap();
        assert_eq!(out, b"*IDN?\r");
    }
}
