//! Contract between a [`StreamProtocol`](crate::protocol::StreamProtocol)
//! and the rest of a ground system.

use crate::packet::Packet;

/// Callbacks invoked at data and packet boundaries, plus target-name
/// resolution for protocol logic that must look up packet definitions.
///
/// All methods have pass-through defaults so an implementation only overrides
/// the seams it cares about.
pub trait Interface: Send + Sync {
    /// Inspect or rewrite raw packet bytes before they become a [`Packet`].
    ///
    /// Return the (possibly modified) bytes to continue, an empty vec to veto
    /// this packet and go back to reading, or `None` to signal the connection
    /// should be treated as lost.
    fn post_read_data(&self, data: Vec<u8>) -> Option<Vec<u8>> {
        Some(data)
    }

    /// Inspect or rewrite a completed packet before it is returned.
    fn post_read_packet(&self, packet: Packet) -> Packet {
        packet
    }

    /// Convert a command packet into its wire payload before framing.
    /// The default is an identity return of the packet's raw buffer.
    fn pre_write_packet(&self, packet: &Packet) -> Vec<u8> {
        packet.buffer().to_vec()
    }

    /// Target names this interface commands, in configuration order.
    /// Template framing searches these to resolve response packets.
    fn target_names(&self) -> Vec<String> {
        Vec::new()
    }

    /// Resolve a response packet definition by target and packet name.
    /// The returned packet is a prototype; the protocol clones and fills it.
    fn response_definition(&self, _target: &str, _packet: &str) -> Option<Packet> {
        None
    }
}

/// An [`Interface`] that passes everything through unchanged.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullInterface;

impl Interface for NullInterface {}
