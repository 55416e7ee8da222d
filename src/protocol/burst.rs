use super::{AccumBuffer, Framing, Reduced};
use crate::Result;

/// Reads all data available on the stream and emits it as one packet.
///
/// Used when the underlying transport already delivers one message per read
/// (UDP datagrams, message pipes) and delimiting is the transport's job.
pub struct BurstFraming;

impl Framing for BurstFraming {
    fn reduce_to_single_packet(&self, buffer: &mut AccumBuffer) -> Result<Reduced> {
        if buffer.is_empty() {
            return Ok(Reduced::NeedMoreData);
        }
        Ok(Reduced::Packet(buffer.take_all()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_buffer_needs_more_data() {
        let mut buffer = AccumBuffer::new();
        let zult = BurstFraming.reduce_to_single_packet(&mut buffer).unwrap();
        assert_eq!(zult, Reduced::NeedMoreData);
    }

    #[test]
    fn whole_buffer_becomes_one_packet() {
        let mut buffer = AccumBuffer::new();
        buffer.append(&[1, 2, 3]);
        buffer.append(&[4]);
        let zult = BurstFraming.reduce_to_single_packet(&mut buffer).unwrap();
        assert_eq!(zult, Reduced::Packet(vec![1, 2, 3, 4]));
        assert!(buffer.is_empty());
    }
}
