// unconnected_send.rs - CM Unconnected Send: routes an embedded CIP message
// from the Ethernet module across the backplane to the controller slot.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::cip_path::CipPath;
use crate::error::Result;
use crate::protocol::message_router::error_for_status;
use crate::protocol::{CipService, Protocol};

const DEFAULT_PRIORITY_TICKS: u8 = 0x06;
const DEFAULT_TIMEOUT_TICKS: u8 = 0x9A;

/// Unconnected Send wrapper (service 0x52 on the ConnectionManager).
///
/// The embedded message is length-prefixed, padded to a 16-bit boundary,
/// and followed by the backplane route: port 1, then the controller slot.
/// On success the device strips the wrapper, so the response decodes
/// directly as the embedded reply.
#[derive(Debug)]
pub struct UnconnectedSend<B> {
    slot: u8,
    priority_ticks: u8,
    timeout_ticks: u8,
    path: CipPath,
    body: B,
}

impl<B: Protocol> UnconnectedSend<B> {
    pub fn new(slot: u8, body: B) -> Self {
        Self {
            slot,
            priority_ticks: DEFAULT_PRIORITY_TICKS,
            timeout_ticks: DEFAULT_TIMEOUT_TICKS,
            path: CipPath::connection_manager(),
            body,
        }
    }

    /// The embedded CIP message.
    pub fn body(&self) -> &B {
        &self.body
    }

    /// Mutable access to the embedded CIP message.
    pub fn body_mut(&mut self) -> &mut B {
        &mut self.body
    }

    /// Consumes the layer, returning the embedded CIP message.
    pub fn into_body(self) -> B {
        self.body
    }

    fn embedded_size(&self) -> usize {
        self.body.request_size()
    }
}

impl<B: Protocol> Protocol for UnconnectedSend<B> {
    fn request_size(&self) -> usize {
        let embedded = self.embedded_size();
        // service + path + ticks + embedded length + message + pad + route
        1 + self.path.request_size() + 2 + 2 + embedded + (embedded & 1) + 3
    }

    fn encode(&self, buf: &mut BytesMut) -> Result<()> {
        buf.put_u8(CipService::UnconnectedSend.code());
        self.path.encode(buf);
        buf.put_u8(self.priority_ticks);
        buf.put_u8(self.timeout_ticks);
        let embedded = self.embedded_size();
        buf.put_u16_le(embedded as u16);
        self.body.encode(buf)?;
        if embedded & 1 == 1 {
            buf.put_u8(0);
        }
        // Route: one path word, port 1 (backplane), target slot.
        buf.put_u8(0x01);
        buf.put_u8(0x01);
        buf.put_u8(self.slot);
        Ok(())
    }

    fn response_size(&self, buf: &[u8]) -> usize {
        self.body.response_size(buf)
    }

    fn decode(&mut self, buf: &mut Bytes, available: usize) -> Result<()> {
        // A reply framed with our own service code means the routing itself
        // failed; the embedded reply never happened.
        if available >= 4
            && buf.remaining() >= 4
            && buf[0] == CipService::UnconnectedSend.reply_code()
        {
            let _service = buf.get_u8();
            let _reserved = buf.get_u8();
            let status = buf.get_u8();
            let extended_count = buf.get_u8() as usize;
            let mut extended = Vec::with_capacity(extended_count);
            for _ in 0..extended_count {
                if buf.remaining() < 2 {
                    break;
                }
                extended.push(buf.get_u16_le());
            }
            if status != 0 {
                return Err(error_for_status(status, extended));
            }
            let consumed = 4 + extended.len() * 2;
            return self.body.decode(buf, available.saturating_sub(consumed));
        }
        self.body.decode(buf, available)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EtherNetIpError;

    #[derive(Debug, Default)]
    struct Stub {
        bytes: Vec<u8>,
        decoded: usize,
    }

    impl Protocol for Stub {
        fn request_size(&self) -> usize {
            self.bytes.len()
        }

        fn encode(&self, buf: &mut BytesMut) -> Result<()> {
            buf.put_slice(&self.bytes);
            Ok(())
        }

        fn decode(&mut self, buf: &mut Bytes, available: usize) -> Result<()> {
            self.decoded = available;
            buf.advance(available.min(buf.remaining()));
            Ok(())
        }
    }

    #[test]
    fn frame_layout_with_padding() {
        let layer = UnconnectedSend::new(
            1,
            Stub {
                bytes: vec![0x4C, 0x02, 0x91],
                decoded: 0,
            },
        );
        let mut buf = BytesMut::new();
        layer.encode(&mut buf).unwrap();
        assert_eq!(
            buf.to_vec(),
            vec![
                0x52, // service
                0x02, 0x20, 0x06, 0x24, 0x01, // ConnectionManager path
                0x06, 0x9A, // priority, timeout ticks
                0x03, 0x00, // embedded length
                0x4C, 0x02, 0x91, // embedded message
                0x00, // pad to word boundary
                0x01, 0x01, 0x01, // route: 1 word, port 1, slot 1
            ]
        );
        assert_eq!(layer.request_size(), buf.len());
    }

    #[test]
    fn even_embedded_message_is_not_padded() {
        let layer = UnconnectedSend::new(
            3,
            Stub {
                bytes: vec![0xAA, 0xBB],
                decoded: 0,
            },
        );
        let mut buf = BytesMut::new();
        layer.encode(&mut buf).unwrap();
        assert_eq!(&buf[buf.len() - 5..], &[0xAA, 0xBB, 0x01, 0x01, 0x03]);
        assert_eq!(layer.request_size(), buf.len());
    }

    #[test]
    fn successful_reply_is_passed_through() {
        let mut layer = UnconnectedSend::new(1, Stub::default());
        let response = vec![0xCC, 0x00, 0x00, 0x00, 0xC4, 0x00, 0x2A, 0x00, 0x00, 0x00];
        let mut bytes = Bytes::copy_from_slice(&response);
        layer.decode(&mut bytes, response.len()).unwrap();
        assert_eq!(layer.body().decoded, response.len());
    }

    #[test]
    fn routing_failure_is_reported() {
        let mut layer = UnconnectedSend::new(1, Stub::default());
        // 0xD2 reply with status 0x01 and one extended word.
        let response = vec![0xD2, 0x00, 0x01, 0x01, 0x04, 0x03];
        let mut bytes = Bytes::copy_from_slice(&response);
        let err = layer.decode(&mut bytes, response.len()).unwrap_err();
        assert!(matches!(
            err,
            EtherNetIpError::Protocol { status: 0x01, .. }
        ));
    }
}
