//! Per-packet CRC verification and generation.
//!
//! Incoming packets can be checked against an embedded CRC and outgoing
//! packets can have one filled in, either into a named packet field (so
//! embedded length fields naturally cover it) or appended to the framed wire
//! bytes. The CRC location is a bit offset into the packet; negative offsets
//! are measured from the end, so the default of `-bit_size` is a trailing
//! CRC.

use crc::{Crc, CRC_16_IBM_3740, CRC_32_ISO_HDLC, CRC_64_XZ};
use tracing::error;
use typed_builder::TypedBuilder;

use crate::accessor::{self, Endianness, FieldType, FieldValue, Overflow};
use crate::packet::Packet;
use crate::{Error, Result};

/// What to do with a packet whose CRC does not verify.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum BadCrc {
    /// Log the mismatch and deliver the packet anyway.
    #[default]
    Error,
    /// Treat the connection as lost.
    Disconnect,
}

#[derive(Debug, Clone, TypedBuilder)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize), serde(default))]
pub struct CrcConfig {
    /// CRC width in bits. Must be 16, 32, or 64.
    #[builder(default = 32)]
    pub bit_size: u32,
    /// Bit offset of the CRC within the packet; negative counts from the
    /// end. `None` means `-bit_size` (trailing).
    #[builder(default, setter(strip_option))]
    pub bit_offset: Option<i64>,
    #[builder(default)]
    pub endianness: Endianness,
    /// Remove the CRC bytes from delivered packets.
    #[builder(default)]
    pub strip_crc: bool,
    #[builder(default)]
    pub bad_strategy: BadCrc,
    /// Compute and insert the CRC on write.
    #[builder(default = true)]
    pub fill_on_write: bool,
    /// Packet field to place the outgoing CRC in. When unset the CRC is
    /// appended to the framed wire bytes instead.
    #[builder(default, setter(strip_option, into))]
    pub write_field_name: Option<String>,
}

impl Default for CrcConfig {
    fn default() -> Self {
        CrcConfig::builder().build()
    }
}

enum Calc {
    W16(Crc<u16>),
    W32(Crc<u32>),
    W64(Crc<u64>),
}

impl Calc {
    fn checksum(&self, data: &[u8]) -> u64 {
        match self {
            Calc::W16(c) => u64::from(c.checksum(data)),
            Calc::W32(c) => u64::from(c.checksum(data)),
            Calc::W64(c) => c.checksum(data),
        }
    }
}

/// What became of a packet's CRC check.
pub enum CrcOutcome {
    /// CRC verified (or policy is [`BadCrc::Error`]); possibly stripped data.
    Data(Vec<u8>),
    /// Mismatch under [`BadCrc::Disconnect`].
    Disconnect,
}

pub struct CrcChecker {
    config: CrcConfig,
    calc: Calc,
}

impl CrcChecker {
    /// # Errors
    /// [`Error::FieldParams`] for a bit size other than 16, 32, or 64.
    pub fn new(config: CrcConfig) -> Result<Self> {
        let calc = match config.bit_size {
            16 => Calc::W16(Crc::<u16>::new(&CRC_16_IBM_3740)),
            32 => Calc::W32(Crc::<u32>::new(&CRC_32_ISO_HDLC)),
            64 => Calc::W64(Crc::<u64>::new(&CRC_64_XZ)),
            other => {
                return Err(Error::FieldParams(format!(
                    "invalid CRC bit size {other}, must be 16, 32, or 64"
                )))
            }
        };
        Ok(CrcChecker { config, calc })
    }

    fn bit_offset(&self) -> i64 {
        self.config
            .bit_offset
            .unwrap_or(-i64::from(self.config.bit_size))
    }

    #[must_use]
    pub fn checksum(&self, data: &[u8]) -> u64 {
        self.calc.checksum(data)
    }

    /// Verify the CRC embedded in `data`, covering all bytes before it.
    ///
    /// # Errors
    /// Accessor errors locating the CRC field (a packet shorter than the
    /// CRC itself).
    pub fn check_read(&self, data: Vec<u8>) -> Result<CrcOutcome> {
        let bit_offset = self.bit_offset();
        let bit_size = self.config.bit_size;
        let found = match accessor::read(
            bit_offset,
            bit_size,
            FieldType::Uint,
            &data,
            self.config.endianness,
        )? {
            FieldValue::Uint(v) => v,
            _ => unreachable!("UINT read returns a uint"),
        };

        let crc_start = byte_offset(bit_offset, data.len());
        let calculated = self.calc.checksum(&data[..crc_start]);
        if calculated != found {
            error!("Invalid CRC detected! Calculated {calculated:#X} vs found {found:#X}.");
            if self.config.bad_strategy == BadCrc::Disconnect {
                return Ok(CrcOutcome::Disconnect);
            }
        }

        if self.config.strip_crc {
            let crc_end = crc_start + (bit_size / 8) as usize;
            let mut stripped = data[..crc_start].to_vec();
            stripped.extend_from_slice(&data[crc_end..]);
            return Ok(CrcOutcome::Data(stripped));
        }
        Ok(CrcOutcome::Data(data))
    }

    /// Compute the CRC over the bytes preceding `write_field_name` and write
    /// it into that field. No-op unless configured with a field name.
    ///
    /// # Errors
    /// [`Error::UnknownField`] or accessor errors writing the field.
    pub fn fill_packet(&self, packet: &mut Packet) -> Result<()> {
        let Some(name) = &self.config.write_field_name else {
            return Ok(());
        };
        let field = packet
            .field(name)
            .ok_or_else(|| Error::UnknownField(name.clone()))?;
        let end = byte_offset(field.bit_offset, packet.buffer().len());
        let crc = self.calc.checksum(&packet.buffer()[..end]);
        packet.write_field(name, &FieldValue::Uint(crc))
    }

    /// Append the CRC of `data` to it. No-op when a field name is configured
    /// (the CRC already went into the packet).
    ///
    /// # Errors
    /// Accessor errors writing the appended field.
    pub fn fill_data(&self, data: &mut Vec<u8>) -> Result<()> {
        if !self.config.fill_on_write || self.config.write_field_name.is_some() {
            return Ok(());
        }
        let crc = self.calc.checksum(data);
        let num_bytes = (self.config.bit_size / 8) as usize;
        data.extend(std::iter::repeat(0).take(num_bytes));
        accessor::write(
            &FieldValue::Uint(crc),
            -i64::from(self.config.bit_size),
            self.config.bit_size,
            FieldType::Uint,
            data,
            self.config.endianness,
            Overflow::Error,
        )
    }

    #[must_use]
    pub fn fill_on_write(&self) -> bool {
        self.config.fill_on_write
    }

    #[must_use]
    pub fn write_field_name(&self) -> Option<&str> {
        self.config.write_field_name.as_deref()
    }
}

fn byte_offset(bit_offset: i64, buffer_len: usize) -> usize {
    if bit_offset >= 0 {
        (bit_offset / 8) as usize
    } else {
        let resolved = buffer_len as i64 * 8 + bit_offset;
        (resolved.max(0) / 8) as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(16 ; "crc16")]
    #[test_case(32 ; "crc32")]
    #[test_case(64 ; "crc64")]
    fn fill_then_check_round_trip(bit_size: u32) {
        let checker = CrcChecker::new(CrcConfig::builder().bit_size(bit_size).build()).unwrap();
        let mut data = vec![0x01, 0x02, 0x03, 0x04];
        checker.fill_data(&mut data).unwrap();
        assert_eq!(data.len(), 4 + (bit_size / 8) as usize);

        match checker.check_read(data).unwrap() {
            CrcOutcome::Data(d) => assert_eq!(d.len(), 4 + (bit_size / 8) as usize),
            CrcOutcome::Disconnect => panic!("expected CRC to verify"),
        }
    }

    #[test]
    fn strip_removes_crc_bytes() {
        let config = CrcConfig::builder().bit_size(32).strip_crc(true).build();
        let checker = CrcChecker::new(config).unwrap();
        let mut data = vec![0xaa, 0xbb];
        checker.fill_data(&mut data).unwrap();
        match checker.check_read(data).unwrap() {
            CrcOutcome::Data(d) => assert_eq!(d, vec![0xaa, 0xbb]),
            CrcOutcome::Disconnect => panic!("expected CRC to verify"),
        }
    }

    #[test]
    fn mismatch_with_error_strategy_still_delivers() {
        let checker = CrcChecker::new(CrcConfig::default()).unwrap();
        let data = vec![0x01, 0x02, 0x03, 0x04, 0xde, 0xad, 0xbe, 0xef];
        match checker.check_read(data.clone()).unwrap() {
            CrcOutcome::Data(d) => assert_eq!(d, data),
            CrcOutcome::Disconnect => panic!("Error strategy must not disconnect"),
        }
    }

    #[test]
    fn mismatch_with_disconnect_strategy() {
        let config = CrcConfig::builder().bad_strategy(BadCrc::Disconnect).build();
        let checker = CrcChecker::new(config).unwrap();
        let data = vec![0x01, 0x02, 0x03, 0x04, 0xde, 0xad, 0xbe, 0xef];
        assert!(matches!(
            checker.check_read(data).unwrap(),
            CrcOutcome::Disconnect
        ));
    }

    #[test]
    fn rejects_odd_bit_size() {
        let zult = CrcChecker::new(CrcConfig::builder().bit_size(24).build());
        assert!(matches!(zult, Err(Error::FieldParams(_))));
    }

    #[test]
    fn fill_packet_field_covers_preceding_bytes() {
        use crate::packet::FieldDef;

        let config = CrcConfig::builder()
            .bit_size(16)
            .write_field_name("CRC")
            .build();
        let checker = CrcChecker::new(config).unwrap();

        let mut packet = Packet::new("TGT", "CMD");
        packet.set_buffer(vec![0x01, 0x02, 0x00, 0x00]);
        packet.add_field(FieldDef::new("CRC", 16, 16, FieldType::Uint));
        checker.fill_packet(&mut packet).unwrap();

        let expected = checker.checksum(&[0x01, 0x02]);
        assert_eq!(
            packet.read_field("CRC").unwrap(),
            FieldValue::Uint(expected)
        );
    }
}
