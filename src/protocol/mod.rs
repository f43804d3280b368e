// protocol/mod.rs - The layered protocol stack.
//
// Every frame the client sends is a nest of layers: encapsulation around
// SendRRData around UnconnectedSend around MessageRouter around a service
// body. Each layer implements the same four-operation contract and holds
// exactly one child, so the whole stack composes like a set of shells.

use bytes::{Buf, Bytes, BytesMut};

use crate::error::Result;

pub mod encapsulation;
pub mod message_router;
pub mod multi;
pub mod send_rr_data;
pub mod services;
pub mod unconnected_send;

pub use encapsulation::{Command, Encapsulation};
pub use message_router::MessageRouter;
pub use multi::CipMultiRequest;
pub use send_rr_data::SendRRData;
pub use services::{
    CipReadData, CipWriteData, GetShortAttribute, GetStringAttribute, ListServices,
    RegisterSession, ServiceItem,
};
pub use unconnected_send::UnconnectedSend;

/// CIP service codes used by this client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CipService {
    /// Get_Attribute_Single.
    GetAttributeSingle = 0x0E,
    /// Multiple Service Packet.
    MultiRequest = 0x0A,
    /// Read Tag.
    ReadData = 0x4C,
    /// Write Tag.
    WriteData = 0x4D,
    /// CM Unconnected Send.
    UnconnectedSend = 0x52,
}

impl CipService {
    /// Request service code.
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Reply service code: the request code with the high bit set.
    pub fn reply_code(self) -> u8 {
        self as u8 | 0x80
    }
}

/// One layer of the protocol stack.
///
/// A request is encoded top-down: each layer writes its header and then
/// delegates to its child. A response is decoded bottom-up through the same
/// objects: each layer consumes its header, verifies it, and hands the
/// remaining byte count to its child.
///
/// The default method bodies are the "adapter": zero-size request, no-op
/// encode/decode, empty body. Leaf bodies override what they use.
pub trait Protocol {
    /// Total encoded size of this layer including its nested body.
    fn request_size(&self) -> usize {
        0
    }

    /// Appends this layer (header plus body) to `buf`.
    fn encode(&self, buf: &mut BytesMut) -> Result<()> {
        let _ = buf;
        Ok(())
    }

    /// Minimum number of buffered bytes required before [`Protocol::decode`]
    /// can run. May inspect bytes already received, e.g. the encapsulation
    /// length field, to resolve the full frame size.
    fn response_size(&self, buf: &[u8]) -> usize {
        let _ = buf;
        0
    }

    /// Consumes this layer's header from `buf` and delegates the remaining
    /// `available` bytes to the body.
    fn decode(&mut self, buf: &mut Bytes, available: usize) -> Result<()> {
        let _ = (buf, available);
        Ok(())
    }
}

/// Placeholder body for requests that carry none, e.g. UnRegisterSession.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProtocolAdapter;

impl Protocol for ProtocolAdapter {}

/// Skips `available` body bytes that a layer chooses to ignore.
pub(crate) fn skip_body(buf: &mut Bytes, available: usize) {
    buf.advance(available.min(buf.remaining()));
}
