// message_router.rs - CIP service framing: service code + request path on
// the way out, service reply + general/extended status on the way back.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::cip_data::CipData;
use crate::cip_path::CipPath;
use crate::error::{EtherNetIpError, Result};
use crate::protocol::multi::CipMultiRequest;
use crate::protocol::services::{CipReadData, CipWriteData};
use crate::protocol::{CipService, Protocol};

const EMBEDDED_SERVICE_ERROR: u8 = 0x1E;

/// Turns a non-zero CIP general status into the matching error kind.
///
/// ControlLogix reports a write with the wrong data type as general status
/// 0xFF with extended status 0x2107; that case gets its own kind so callers
/// can distinguish a caller bug from other controller complaints.
pub(crate) fn error_for_status(status: u8, extended: Vec<u16>) -> EtherNetIpError {
    if status == 0xFF && extended.contains(&0x2107) {
        return EtherNetIpError::TypeMismatch(
            "the written value's CIP type disagrees with the tag's stored type".into(),
        );
    }
    EtherNetIpError::Protocol { status, extended }
}

/// MessageRouter layer: dispatches a CIP service to the object addressed by
/// the path, and verifies the mirrored reply.
///
/// The reply must carry the request's service code with the high bit set;
/// anything else is a framing error. A non-zero general status becomes a
/// protocol error, except status 0x1E on a multi-service container, where
/// the individual sub-responses carry the real outcomes.
#[derive(Debug)]
pub struct MessageRouter<B> {
    service: CipService,
    path: CipPath,
    body: B,
    tolerate_embedded_error: bool,
    status: u8,
    extended: Vec<u16>,
}

impl<B: Protocol> MessageRouter<B> {
    pub fn new(service: CipService, path: CipPath, body: B) -> Self {
        Self {
            service,
            path,
            body,
            tolerate_embedded_error: false,
            status: 0,
            extended: Vec::new(),
        }
    }

    /// General status from the decoded reply.
    pub fn status(&self) -> u8 {
        self.status
    }

    /// Extended status words from the decoded reply.
    pub fn extended_status(&self) -> &[u16] {
        &self.extended
    }

    /// The nested service body.
    pub fn body(&self) -> &B {
        &self.body
    }

    /// Mutable access to the nested service body.
    pub fn body_mut(&mut self) -> &mut B {
        &mut self.body
    }

    /// Consumes the layer, returning the nested service body.
    pub fn into_body(self) -> B {
        self.body
    }
}

impl MessageRouter<CipReadData> {
    /// Read Tag request for `elements` elements of the named tag.
    pub fn read_tag(tag: &str, elements: u16) -> Result<Self> {
        if elements == 0 {
            return Err(EtherNetIpError::Argument(
                "element count must be at least 1".into(),
            ));
        }
        Ok(Self::new(
            CipService::ReadData,
            CipPath::symbol(tag)?,
            CipReadData::new(elements),
        ))
    }
}

impl MessageRouter<CipWriteData> {
    /// Write Tag request carrying the value's type, element count and
    /// payload.
    pub fn write_tag(tag: &str, data: CipData) -> Result<Self> {
        Ok(Self::new(
            CipService::WriteData,
            CipPath::symbol(tag)?,
            CipWriteData::new(data),
        ))
    }
}

impl<P: Protocol> MessageRouter<CipMultiRequest<P>> {
    /// Multiple Service Packet addressed to the MessageRouter object.
    /// Outer status 0x1E is tolerated; each sub-response reports its own.
    pub fn multi_service(body: CipMultiRequest<P>) -> Self {
        let mut layer = Self::new(CipService::MultiRequest, CipPath::message_router(), body);
        layer.tolerate_embedded_error = true;
        layer
    }
}

impl<B: Protocol> Protocol for MessageRouter<B> {
    fn request_size(&self) -> usize {
        1 + self.path.request_size() + self.body.request_size()
    }

    fn encode(&self, buf: &mut BytesMut) -> Result<()> {
        buf.put_u8(self.service.code());
        self.path.encode(buf);
        self.body.encode(buf)
    }

    fn response_size(&self, buf: &[u8]) -> usize {
        self.body.response_size(buf)
    }

    fn decode(&mut self, buf: &mut Bytes, available: usize) -> Result<()> {
        if available < 4 || buf.remaining() < 4 {
            return Err(EtherNetIpError::Framing(
                "truncated MessageRouter reply".into(),
            ));
        }
        let reply = buf.get_u8();
        if reply != self.service.reply_code() {
            return Err(EtherNetIpError::Framing(format!(
                "expected reply 0x{:02X} to service 0x{:02X}, device answered 0x{:02X}",
                self.service.reply_code(),
                self.service.code(),
                reply
            )));
        }
        let _reserved = buf.get_u8();
        self.status = buf.get_u8();
        let extended_count = buf.get_u8() as usize;
        if buf.remaining() < extended_count * 2 {
            return Err(EtherNetIpError::Framing(
                "truncated extended status".into(),
            ));
        }
        self.extended = (0..extended_count).map(|_| buf.get_u16_le()).collect();

        if self.status != 0
            && !(self.status == EMBEDDED_SERVICE_ERROR && self.tolerate_embedded_error)
        {
            return Err(error_for_status(self.status, self.extended.clone()));
        }

        let consumed = 4 + extended_count * 2;
        self.body.decode(buf, available.saturating_sub(consumed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cip_data::CipType;

    #[test]
    fn read_request_bytes() {
        let request = MessageRouter::read_tag("Counter", 1).unwrap();
        let mut buf = BytesMut::new();
        request.encode(&mut buf).unwrap();
        assert_eq!(
            buf.to_vec(),
            vec![
                0x4C, // Read Tag
                0x05, 0x91, 0x07, b'C', b'o', b'u', b'n', b't', b'e', b'r', 0x00, // path
                0x01, 0x00, // elements
            ]
        );
        assert_eq!(request.request_size(), buf.len());
    }

    #[test]
    fn write_request_bytes() {
        let request = MessageRouter::write_tag("Setpoint", CipData::real(3.5)).unwrap();
        let mut buf = BytesMut::new();
        request.encode(&mut buf).unwrap();
        assert_eq!(
            buf.to_vec(),
            vec![
                0x4D, // Write Tag
                0x05, 0x91, 0x08, b'S', b'e', b't', b'p', b'o', b'i', b'n', b't', // path
                0xCA, 0x00, // REAL
                0x01, 0x00, // elements
                0x00, 0x00, 0x60, 0x40, // 3.5
            ]
        );
    }

    #[test]
    fn decode_read_reply() {
        let mut request = MessageRouter::read_tag("Counter", 1).unwrap();
        let response = vec![0xCC, 0x00, 0x00, 0x00, 0xC4, 0x00, 0x2A, 0x00, 0x00, 0x00];
        let mut bytes = Bytes::copy_from_slice(&response);
        request.decode(&mut bytes, response.len()).unwrap();
        let data = request.into_body().take_data().unwrap();
        assert_eq!(data.tag_type(), CipType::Dint);
        assert_eq!(data.get_i32(0).unwrap(), 42);
    }

    #[test]
    fn decode_rejects_service_mismatch() {
        let mut request = MessageRouter::read_tag("Counter", 1).unwrap();
        let response = vec![0xCD, 0x00, 0x00, 0x00];
        let mut bytes = Bytes::copy_from_slice(&response);
        assert!(matches!(
            request.decode(&mut bytes, response.len()),
            Err(EtherNetIpError::Framing(_))
        ));
    }

    #[test]
    fn decode_surfaces_general_status() {
        let mut request = MessageRouter::read_tag("Missing", 1).unwrap();
        // 0x04 path segment error with one extended word
        let response = vec![0xCC, 0x00, 0x04, 0x01, 0x00, 0x00];
        let mut bytes = Bytes::copy_from_slice(&response);
        let err = request.decode(&mut bytes, response.len()).unwrap_err();
        assert!(matches!(
            err,
            EtherNetIpError::Protocol { status: 0x04, .. }
        ));
    }

    #[test]
    fn write_type_conflict_maps_to_type_mismatch() {
        let mut request = MessageRouter::write_tag("Counter", CipData::real(1.0)).unwrap();
        let response = vec![0xCD, 0x00, 0xFF, 0x01, 0x07, 0x21];
        let mut bytes = Bytes::copy_from_slice(&response);
        assert!(matches!(
            request.decode(&mut bytes, response.len()),
            Err(EtherNetIpError::TypeMismatch(_))
        ));
    }
}
