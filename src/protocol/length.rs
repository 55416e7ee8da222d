use tracing::trace;
use typed_builder::TypedBuilder;

use super::{AccumBuffer, Framing, Reduced, SharedConfig};
use crate::accessor::{self, Endianness, FieldType, FieldValue, Overflow};
use crate::packet::Packet;
use crate::{Error, Result};

/// Configuration for [`LengthFraming`].
///
/// The length field's decoded value times `bytes_per_count` plus
/// `value_offset` must equal the total byte count of the packet as it sits
/// in the stream, including any discarded leading bytes.
#[derive(Debug, Clone, TypedBuilder)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize), serde(default))]
pub struct LengthConfig {
    /// Bit offset of the length field within the stream.
    #[builder(default = 0)]
    pub bit_offset: u32,
    /// Size of the length field in bits.
    #[builder(default = 16)]
    pub bit_size: u32,
    /// Added to the decoded length. A field that carries "length - 1" uses 1
    /// here.
    #[builder(default = 0)]
    pub value_offset: i64,
    /// Bytes per length-field count, for fields counting words rather than
    /// bytes.
    #[builder(default = 1)]
    pub bytes_per_count: u64,
    #[builder(default)]
    pub endianness: Endianness,
    /// Maximum permitted decoded length value. Exceeding it is a fatal
    /// framing error, protecting against runaway buffer growth from a
    /// corrupted field.
    #[builder(default, setter(strip_option))]
    pub max_length: Option<u64>,
}

impl Default for LengthConfig {
    fn default() -> Self {
        LengthConfig::builder().build()
    }
}

/// Delineates packets with a length field at a fixed location in each
/// packet.
pub struct LengthFraming {
    config: LengthConfig,
    /// Bytes that must be buffered before the length field is fully present.
    length_bytes_needed: usize,
}

impl LengthFraming {
    #[must_use]
    pub fn new(config: LengthConfig) -> Self {
        // A big endian field (or a byte-aligned little endian one) is fully
        // present once the byte containing its last bit arrives. A little
        // endian field that is not byte aligned ends within the byte that
        // holds its offset, so only that byte is required.
        let length_bytes_needed = if config.endianness == Endianness::Big
            || config.bit_offset % 8 == 0
        {
            let mut bits_needed = config.bit_offset + config.bit_size;
            if bits_needed % 8 != 0 {
                bits_needed += 8;
            }
            (((bits_needed - 1) / 8) + 1) as usize
        } else {
            (config.bit_offset / 8 + 1) as usize
        };
        LengthFraming {
            config,
            length_bytes_needed,
        }
    }

    /// The length field value implied by an outgoing buffer of
    /// `buffer_length` bytes.
    fn calculate_length(&self, buffer_length: usize, shared: &SharedConfig) -> Result<u64> {
        let total = (buffer_length + shared.discard_leading_bytes) as i64;
        let length = total / self.config.bytes_per_count as i64 - self.config.value_offset;
        if length < 0 {
            return Err(Error::FieldParams(format!(
                "buffer length {buffer_length} computes a negative length field value"
            )));
        }
        let length = length as u64;
        if let Some(max_length) = self.config.max_length {
            if length > max_length {
                return Err(Error::LengthExceedsMax { length, max_length });
            }
        }
        Ok(length)
    }

    fn write_length(
        &self,
        length: u64,
        bit_offset: i64,
        buffer: &mut [u8],
    ) -> Result<()> {
        accessor::write(
            &FieldValue::Uint(length),
            bit_offset,
            self.config.bit_size,
            FieldType::Uint,
            buffer,
            self.config.endianness,
            Overflow::Error,
        )
    }
}

impl Framing for LengthFraming {
    fn reduce_to_single_packet(&self, buffer: &mut AccumBuffer) -> Result<Reduced> {
        if buffer.len() < self.length_bytes_needed {
            return Ok(Reduced::NeedMoreData);
        }

        let length = match accessor::read(
            i64::from(self.config.bit_offset),
            self.config.bit_size,
            FieldType::Uint,
            buffer.as_slice(),
            self.config.endianness,
        )? {
            FieldValue::Uint(v) => v,
            _ => unreachable!("UINT read returns a uint"),
        };
        if let Some(max_length) = self.config.max_length {
            if length > max_length {
                return Err(Error::LengthExceedsMax { length, max_length });
            }
        }

        let packet_length =
            length as i64 * self.config.bytes_per_count as i64 + self.config.value_offset;
        if packet_length <= 0 {
            return Err(Error::FieldParams(format!(
                "length field computed a {packet_length} byte packet"
            )));
        }
        let packet_length = packet_length as usize;
        trace!(packet_length, buffered = buffer.len());

        if buffer.len() < packet_length {
            return Ok(Reduced::NeedMoreData);
        }
        Ok(Reduced::Packet(buffer.take_front(packet_length)))
    }

    fn fill_packet(&self, packet: &mut Packet, shared: &SharedConfig) -> Result<()> {
        if !shared.fill_fields {
            return Ok(());
        }
        // When the length field starts past the discarded bytes it lives
        // inside the packet buffer itself.
        let discard_bits = shared.discard_leading_bytes as u32 * 8;
        if self.config.bit_offset >= discard_bits {
            let length = self.calculate_length(packet.buffer().len(), shared)?;
            let offset = i64::from(self.config.bit_offset - discard_bits);
            self.write_length(length, offset, packet.buffer_mut())?;
        }
        Ok(())
    }

    fn frame_write_data(&self, data: Vec<u8>, shared: &SharedConfig) -> Result<Vec<u8>> {
        let discard_bits = shared.discard_leading_bytes as u32 * 8;
        if shared.fill_fields && self.config.bit_offset < discard_bits {
            // The length field lives in the discarded region outside the
            // packet, so it has to be written into the restored prefix.
            let length = self.calculate_length(data.len(), shared)?;
            let mut out = vec![0u8; shared.discard_leading_bytes];
            out.extend(data);
            if let Some(sync) = &shared.sync_pattern {
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
            self.write_length(length, i64::from(self.config.bit_offset), &mut out)?;
            Ok(out)
        } else {
            shared.apply_leading_fill(data)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reduce(framing: &LengthFraming, buffer: &mut AccumBuffer) -> Result<Reduced> {
        framing.reduce_to_single_packet(buffer)
    }

    #[test]
    fn waits_for_length_field_then_for_body() {
        let framing = LengthFraming::new(
            LengthConfig::builder()
                .bit_offset(16)
                .bit_size(16)
                .value_offset(1)
                .build(),
        );
        let mut buffer = AccumBuffer::new();

        buffer.append(&[0x00, 0x01, 0x00]);
        assert_eq!(reduce(&framing, &mut buffer).unwrap(), Reduced::NeedMoreData);

        // Length value 5 plus value_offset 1 = 6 total bytes
        buffer.append(&[0x05]);
        assert_eq!(reduce(&framing, &mut buffer).unwrap(), Reduced::NeedMoreData);

        buffer.append(&[0x03, 0x04]);
        assert_eq!(
            reduce(&framing, &mut buffer).unwrap(),
            Reduced::Packet(vec![0x00, 0x01, 0x00, 0x05, 0x03, 0x04])
        );
        assert!(buffer.is_empty());
    }

    #[test]
    fn bytes_per_count_scales_the_length_value() {
        let framing = LengthFraming::new(
            LengthConfig::builder()
                .bit_offset(16)
                .bit_size(16)
                .value_offset(1)
                .bytes_per_count(2)
                .build(),
        );
        let mut buffer = AccumBuffer::new();
        buffer.append(&[0x00, 0x01, 0x00, 0x05]);
        assert_eq!(reduce(&framing, &mut buffer).unwrap(), Reduced::NeedMoreData);

        // 5 counts * 2 bytes + 1 = 11 total bytes
        buffer.append(&[0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09]);
        match reduce(&framing, &mut buffer).unwrap() {
            Reduced::Packet(data) => assert_eq!(data.len(), 11),
            Reduced::NeedMoreData => panic!("expected a packet"),
        }
    }

    #[test]
    fn leftover_bytes_stay_buffered_for_the_next_packet() {
        let framing = LengthFraming::new(LengthConfig::builder().bit_size(8).build());
        let mut buffer = AccumBuffer::new();
        buffer.append(&[0x02, 0xaa, 0x03, 0xbb, 0xcc]);
        assert_eq!(
            reduce(&framing, &mut buffer).unwrap(),
            Reduced::Packet(vec![0x02, 0xaa])
        );
        assert_eq!(
            reduce(&framing, &mut buffer).unwrap(),
            Reduced::Packet(vec![0x03, 0xbb, 0xcc])
        );
    }

    #[test]
    fn length_past_max_is_fatal() {
        let framing = LengthFraming::new(
            LengthConfig::builder()
                .bit_offset(16)
                .bit_size(16)
                .max_length(50)
                .build(),
        );
        let mut buffer = AccumBuffer::new();
        buffer.append(&[0x00, 0x01, 0xff, 0xff]);
        assert!(matches!(
            reduce(&framing, &mut buffer),
            Err(Error::LengthExceedsMax {
                length: 0xffff,
                max_length: 50
            })
        ));
    }

    #[test]
    fn little_endian_length_field() {
        let framing = LengthFraming::new(
            LengthConfig::builder()
                .bit_size(16)
                .endianness(Endianness::Little)
                .build(),
        );
        let mut buffer = AccumBuffer::new();
        buffer.append(&[0x04, 0x00, 0xaa, 0xbb, 0xcc]);
        assert_eq!(
            reduce(&framing, &mut buffer).unwrap(),
            Reduced::Packet(vec![0x04, 0x00, 0xaa, 0xbb])
        );
    }

    #[test]
    fn unaligned_little_endian_needs_only_the_offset_byte() {
        let framing = LengthFraming::new(
            LengthConfig::builder()
                .bit_offset(4)
                .bit_size(4)
                .endianness(Endianness::Little)
                .build(),
        );
        assert_eq!(framing.length_bytes_needed, 1);
    }

    #[test]
    fn fill_writes_length_inside_the_packet() {
        let framing = LengthFraming::new(
            LengthConfig::builder().bit_offset(16).bit_size(16).build(),
        );
        let shared = SharedConfig {
            fill_fields: true,
            ..Default::default()
        };
        let mut packet = Packet::from_buffer(vec![0u8; 8]);
        framing.fill_packet(&mut packet, &shared).unwrap();
        assert_eq!(&packet.buffer()[2..4], &[0x00, 0x08]);
    }

    #[test]
    fn fill_writes_length_into_discarded_prefix() {
        // Sync (2) + length (2) live outside the visible packet
        let framing = LengthFraming::new(
            LengthConfig::builder().bit_offset(16).bit_size(16).build(),
        );
        let shared = SharedConfig {
            discard_leading_bytes: 4,
            sync_pattern: Some(vec![0xde, 0xad]),
            fill_fields: true,
        };
        let out = framing
            .frame_write_data(vec![0xaa, 0xbb, 0xcc], &shared)
            .unwrap();
        // Total stream bytes = 4 discarded + 3 payload = 7
        assert_eq!(out, vec![0xde, 0xad, 0x00, 0x07, 0xaa, 0xbb, 0xcc]);
    }

    #[test]
    fn fill_rejects_length_past_max() {
        let framing = LengthFraming::new(
            LengthConfig::builder().bit_size(16).max_length(4).build(),
        );
        let shared = SharedConfig {
            fill_fields: true,
            ..Default::default()
        };
        let mut packet = Packet::from_buffer(vec![0u8; 100]);
        assert!(matches!(
            framing.fill_packet(&mut packet, &shared),
            Err(Error::LengthExceedsMax { .. })
        ));
    }
}
