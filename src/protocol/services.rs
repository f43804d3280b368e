// services.rs - Leaf service bodies: session registration, service listing,
// Identity attribute readers, and the tag read/write payloads.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::cip_data::CipData;
use crate::error::{EtherNetIpError, Result};
use crate::protocol::{skip_body, Protocol};

/// RegisterSession body: protocol version 1, no option flags. The device
/// echoes both; the allocated handle arrives in the encapsulation header.
#[derive(Debug, Clone, Copy, Default)]
pub struct RegisterSession {
    version: u16,
}

impl RegisterSession {
    /// Protocol version reported by the device.
    pub fn version(&self) -> u16 {
        self.version
    }
}

impl Protocol for RegisterSession {
    fn request_size(&self) -> usize {
        4
    }

    fn encode(&self, buf: &mut BytesMut) -> Result<()> {
        buf.put_u16_le(1); // protocol version
        buf.put_u16_le(0); // option flags
        Ok(())
    }

    fn decode(&mut self, buf: &mut Bytes, available: usize) -> Result<()> {
        if available < 4 || buf.remaining() < 4 {
            return Err(EtherNetIpError::Framing(
                "truncated RegisterSession reply".into(),
            ));
        }
        self.version = buf.get_u16_le();
        let _flags = buf.get_u16_le();
        Ok(())
    }
}

/// One service advertised in a ListServices reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceItem {
    /// Item type code (0x0100 for the communications service).
    pub type_code: u16,
    /// Encapsulation protocol version.
    pub version: u16,
    /// Capability flags.
    pub capabilities: u16,
    /// Service name, NUL padding stripped.
    pub name: String,
}

/// ListServices body. The request is empty; the reply is an item list from
/// which the facade checks that the device actually speaks EtherNet/IP.
#[derive(Debug, Clone, Default)]
pub struct ListServices {
    services: Vec<ServiceItem>,
}

impl ListServices {
    /// Services advertised by the device.
    pub fn services(&self) -> &[ServiceItem] {
        &self.services
    }
}

impl Protocol for ListServices {
    fn decode(&mut self, buf: &mut Bytes, available: usize) -> Result<()> {
        if available < 2 || buf.remaining() < 2 {
            return Err(EtherNetIpError::Framing(
                "truncated ListServices reply".into(),
            ));
        }
        let count = buf.get_u16_le();
        for _ in 0..count {
            if buf.remaining() < 4 {
                return Err(EtherNetIpError::Framing(
                    "truncated service item header".into(),
                ));
            }
            let type_code = buf.get_u16_le();
            let length = buf.get_u16_le() as usize;
            if buf.remaining() < length {
                return Err(EtherNetIpError::Framing(
                    "truncated service item".into(),
                ));
            }
            if length < 4 {
                skip_body(buf, length);
                continue;
            }
            let version = buf.get_u16_le();
            let capabilities = buf.get_u16_le();
            let mut name = vec![0; length - 4];
            buf.copy_to_slice(&mut name);
            let end = name.iter().position(|&b| b == 0).unwrap_or(name.len());
            self.services.push(ServiceItem {
                type_code,
                version,
                capabilities,
                name: String::from_utf8_lossy(&name[..end]).into_owned(),
            });
        }
        Ok(())
    }
}

/// Get_Attribute_Single reader for a 16-bit attribute value.
#[derive(Debug, Clone, Copy, Default)]
pub struct GetShortAttribute {
    value: u16,
}

impl GetShortAttribute {
    /// The decoded attribute value.
    pub fn value(&self) -> u16 {
        self.value
    }
}

impl Protocol for GetShortAttribute {
    fn decode(&mut self, buf: &mut Bytes, available: usize) -> Result<()> {
        if available < 2 || buf.remaining() < 2 {
            return Err(EtherNetIpError::Framing(
                "truncated attribute value".into(),
            ));
        }
        self.value = buf.get_u16_le();
        skip_body(buf, available - 2);
        Ok(())
    }
}

/// Get_Attribute_Single reader for a length-prefixed ASCII attribute.
#[derive(Debug, Clone, Default)]
pub struct GetStringAttribute {
    value: String,
}

impl GetStringAttribute {
    /// The decoded attribute value.
    pub fn value(&self) -> &str {
        &self.value
    }
}

impl Protocol for GetStringAttribute {
    fn decode(&mut self, buf: &mut Bytes, available: usize) -> Result<()> {
        if available < 1 || buf.remaining() < 1 {
            return Err(EtherNetIpError::Framing(
                "truncated attribute value".into(),
            ));
        }
        let length = buf.get_u8() as usize;
        if available < 1 + length || buf.remaining() < length {
            return Err(EtherNetIpError::Framing(
                "truncated attribute string".into(),
            ));
        }
        let mut name = vec![0; length];
        buf.copy_to_slice(&mut name);
        self.value = String::from_utf8_lossy(&name).into_owned();
        skip_body(buf, available - 1 - length);
        Ok(())
    }
}

/// Read Tag body: the request is just the element count, the reply carries
/// the type code and raw payload.
#[derive(Debug, Clone, Default)]
pub struct CipReadData {
    elements: u16,
    data: Option<CipData>,
}

impl CipReadData {
    pub fn new(elements: u16) -> Self {
        Self {
            elements,
            data: None,
        }
    }

    /// The decoded value, if the reply carried one.
    pub fn data(&self) -> Option<&CipData> {
        self.data.as_ref()
    }

    /// Takes the decoded value out of the body.
    pub fn take_data(&mut self) -> Option<CipData> {
        self.data.take()
    }
}

impl Protocol for CipReadData {
    fn request_size(&self) -> usize {
        2
    }

    fn encode(&self, buf: &mut BytesMut) -> Result<()> {
        buf.put_u16_le(self.elements);
        Ok(())
    }

    fn decode(&mut self, buf: &mut Bytes, available: usize) -> Result<()> {
        if available == 0 {
            self.data = None;
            return Ok(());
        }
        if available < 2 || buf.remaining() < available {
            return Err(EtherNetIpError::Framing(
                "truncated tag data".into(),
            ));
        }
        let type_code = buf.get_u16_le();
        let mut raw = vec![0; available - 2];
        buf.copy_to_slice(&mut raw);
        self.data = Some(CipData::from_raw(type_code, &raw)?);
        Ok(())
    }
}

/// Write Tag body: type code, element count and the raw value payload. A
/// successful reply is empty.
#[derive(Debug, Clone)]
pub struct CipWriteData {
    data: CipData,
}

impl CipWriteData {
    pub fn new(data: CipData) -> Self {
        Self { data }
    }

    /// The value being written.
    pub fn data(&self) -> &CipData {
        &self.data
    }
}

impl Protocol for CipWriteData {
    fn request_size(&self) -> usize {
        4 + self.data.payload_len()
    }

    fn encode(&self, buf: &mut BytesMut) -> Result<()> {
        buf.put_u16_le(self.data.type_code());
        buf.put_u16_le(self.data.elements());
        self.data.encode(buf);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cip_data::CipType;

    #[test]
    fn register_session_body() {
        let body = RegisterSession::default();
        let mut buf = BytesMut::new();
        body.encode(&mut buf).unwrap();
        assert_eq!(buf.to_vec(), vec![0x01, 0x00, 0x00, 0x00]);
        assert_eq!(body.request_size(), 4);
    }

    #[test]
    fn list_services_reply() {
        let mut body = ListServices::default();
        let mut reply = vec![0x01, 0x00]; // one item
        reply.extend_from_slice(&[0x00, 0x01]); // type 0x0100
        reply.extend_from_slice(&[0x14, 0x00]); // 20 bytes
        reply.extend_from_slice(&[0x01, 0x00]); // version
        reply.extend_from_slice(&[0x20, 0x01]); // capabilities
        reply.extend_from_slice(b"Communications\0\0");
        let mut bytes = Bytes::copy_from_slice(&reply);
        body.decode(&mut bytes, reply.len()).unwrap();
        assert_eq!(body.services().len(), 1);
        assert_eq!(body.services()[0].name, "Communications");
        assert_eq!(body.services()[0].version, 1);
    }

    #[test]
    fn short_attribute_reply() {
        let mut body = GetShortAttribute::default();
        let mut bytes = Bytes::copy_from_slice(&[0x01, 0x00]);
        body.decode(&mut bytes, 2).unwrap();
        assert_eq!(body.value(), 1);
    }

    #[test]
    fn string_attribute_reply() {
        let mut body = GetStringAttribute::default();
        let reply = [&[4u8][..], b"PLC1"].concat();
        let mut bytes = Bytes::copy_from_slice(&reply);
        body.decode(&mut bytes, reply.len()).unwrap();
        assert_eq!(body.value(), "PLC1");
    }

    #[test]
    fn read_body_round_trip() {
        let body = CipReadData::new(3);
        let mut buf = BytesMut::new();
        body.encode(&mut buf).unwrap();
        assert_eq!(buf.to_vec(), vec![0x03, 0x00]);

        let mut body = CipReadData::new(1);
        let reply = vec![0xCA, 0x00, 0x00, 0x00, 0x60, 0x40];
        let mut bytes = Bytes::copy_from_slice(&reply);
        body.decode(&mut bytes, reply.len()).unwrap();
        let data = body.take_data().unwrap();
        assert_eq!(data.tag_type(), CipType::Real);
        assert_eq!(data.get_f64(0).unwrap(), 3.5);
    }

    #[test]
    fn empty_read_reply_yields_no_data() {
        let mut body = CipReadData::new(1);
        let mut bytes = Bytes::new();
        body.decode(&mut bytes, 0).unwrap();
        assert!(body.data().is_none());
    }

    #[test]
    fn write_body_layout() {
        let body = CipWriteData::new(CipData::dint(1500));
        let mut buf = BytesMut::new();
        body.encode(&mut buf).unwrap();
        assert_eq!(
            buf.to_vec(),
            vec![0xC4, 0x00, 0x01, 0x00, 0xDC, 0x05, 0x00, 0x00]
        );
        assert_eq!(body.request_size(), buf.len());
    }
}
