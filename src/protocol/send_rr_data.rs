// send_rr_data.rs - SendRRData envelope and the Common Packet Format item
// list that carries an unconnected CIP message.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{EtherNetIpError, Result};
use crate::protocol::{skip_body, Protocol};

const NULL_ADDRESS_ITEM: u16 = 0x0000;
const UNCONNECTED_DATA_ITEM: u16 = 0x00B2;

// interface handle + timeout + item count + two item headers
const ENVELOPE_SIZE: usize = 4 + 2 + 2 + 4 + 4;

/// SendRRData payload: a fixed envelope plus a two-item CPF list whose data
/// item wraps the nested CIP message.
#[derive(Debug)]
pub struct SendRRData<B> {
    body: B,
}

impl<B: Protocol> SendRRData<B> {
    pub fn new(body: B) -> Self {
        Self { body }
    }

    /// The nested CIP message.
    pub fn body(&self) -> &B {
        &self.body
    }

    /// Mutable access to the nested CIP message.
    pub fn body_mut(&mut self) -> &mut B {
        &mut self.body
    }

    /// Consumes the layer, returning the nested CIP message.
    pub fn into_body(self) -> B {
        self.body
    }
}

impl<B: Protocol> Protocol for SendRRData<B> {
    fn request_size(&self) -> usize {
        ENVELOPE_SIZE + self.body.request_size()
    }

    fn encode(&self, buf: &mut BytesMut) -> Result<()> {
        buf.put_u32_le(0); // interface handle: CIP
        buf.put_u16_le(0); // timeout, unused for unconnected messaging
        buf.put_u16_le(2); // item count
        buf.put_u16_le(NULL_ADDRESS_ITEM);
        buf.put_u16_le(0);
        buf.put_u16_le(UNCONNECTED_DATA_ITEM);
        buf.put_u16_le(self.body.request_size() as u16);
        self.body.encode(buf)
    }

    fn decode(&mut self, buf: &mut Bytes, available: usize) -> Result<()> {
        if available < 8 || buf.remaining() < 8 {
            return Err(EtherNetIpError::Framing(
                "truncated SendRRData envelope".into(),
            ));
        }
        let _interface = buf.get_u32_le();
        let _timeout = buf.get_u16_le();
        let item_count = buf.get_u16_le();

        for _ in 0..item_count {
            if buf.remaining() < 4 {
                return Err(EtherNetIpError::Framing(
                    "truncated CPF item header".into(),
                ));
            }
            let item_type = buf.get_u16_le();
            let item_length = buf.get_u16_le() as usize;
            if buf.remaining() < item_length {
                return Err(EtherNetIpError::Framing(format!(
                    "CPF item 0x{:04X} of {} bytes is truncated",
                    item_type, item_length
                )));
            }
            if item_type == UNCONNECTED_DATA_ITEM {
                return self.body.decode(buf, item_length);
            }
            skip_body(buf, item_length);
        }
        Err(EtherNetIpError::Framing(
            "response carries no unconnected data item".into(),
        ))
    }
}
