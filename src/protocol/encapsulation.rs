// encapsulation.rs - The outermost EtherNet/IP frame.
//
// Every exchange starts with the same 24-byte little-endian header:
// command, body length, session handle, status, an opaque 8-byte sender
// context echoed by the device, and an options word.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{EtherNetIpError, Result};
use crate::protocol::Protocol;

/// Size of the encapsulation header.
pub const HEADER_SIZE: usize = 24;

/// Encapsulation commands used by this client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum Command {
    /// Query the services a device supports.
    ListServices = 0x0004,
    /// Open a session; the reply carries the allocated handle.
    RegisterSession = 0x0065,
    /// Close a session. The device may drop the connection right after.
    UnRegisterSession = 0x0066,
    /// Carry an unconnected CIP request/response pair.
    SendRRData = 0x006F,
}

impl Command {
    /// The 16-bit command code.
    pub fn code(self) -> u16 {
        self as u16
    }
}

/// The encapsulation layer: 24-byte header plus a command-specific body.
///
/// On decode the header is verified field by field: the command must match
/// the request, the status must be zero, and the sender context must echo
/// what was sent. The length field resolves how many bytes the whole
/// response occupies, which is what drives the connection's read loop.
#[derive(Debug)]
pub struct Encapsulation<B> {
    command: Command,
    session: u32,
    context: [u8; 8],
    response_session: u32,
    body: B,
}

impl<B: Protocol> Encapsulation<B> {
    /// New frame with an all-zero sender context.
    pub fn new(command: Command, session: u32, body: B) -> Self {
        Self::with_context(command, session, body, [0; 8])
    }

    /// New frame with a caller-supplied sender context. The context is
    /// echoed by the device and verified on decode, which catches framing
    /// bugs even though responses on one connection arrive in order.
    pub fn with_context(command: Command, session: u32, body: B, context: [u8; 8]) -> Self {
        Self {
            command,
            session,
            context,
            response_session: 0,
            body,
        }
    }

    /// Session handle from the response header. For RegisterSession this is
    /// the handle the device allocated.
    pub fn response_session(&self) -> u32 {
        self.response_session
    }

    /// The nested body.
    pub fn body(&self) -> &B {
        &self.body
    }

    /// Mutable access to the nested body.
    pub fn body_mut(&mut self) -> &mut B {
        &mut self.body
    }

    /// Consumes the frame, returning the nested body.
    pub fn into_body(self) -> B {
        self.body
    }
}

impl<B: Protocol> Protocol for Encapsulation<B> {
    fn request_size(&self) -> usize {
        HEADER_SIZE + self.body.request_size()
    }

    fn encode(&self, buf: &mut BytesMut) -> Result<()> {
        buf.put_u16_le(self.command.code());
        buf.put_u16_le(self.body.request_size() as u16);
        buf.put_u32_le(self.session);
        buf.put_u32_le(0); // status
        buf.put_slice(&self.context);
        buf.put_u32_le(0); // options
        self.body.encode(buf)
    }

    fn response_size(&self, buf: &[u8]) -> usize {
        if buf.len() < 4 {
            return HEADER_SIZE;
        }
        HEADER_SIZE + u16::from_le_bytes([buf[2], buf[3]]) as usize
    }

    fn decode(&mut self, buf: &mut Bytes, available: usize) -> Result<()> {
        if available < HEADER_SIZE || buf.remaining() < HEADER_SIZE {
            return Err(EtherNetIpError::Framing(
                "truncated encapsulation header".into(),
            ));
        }
        let command = buf.get_u16_le();
        let length = buf.get_u16_le() as usize;
        let session = buf.get_u32_le();
        let status = buf.get_u32_le();
        let mut context = [0u8; 8];
        buf.copy_to_slice(&mut context);
        let _options = buf.get_u32_le();

        if command != self.command.code() {
            return Err(EtherNetIpError::Framing(format!(
                "expected encapsulation command 0x{:04X}, device answered 0x{:04X}",
                self.command.code(),
                command
            )));
        }
        if status != 0 {
            return Err(EtherNetIpError::Framing(format!(
                "encapsulation status 0x{:08X}",
                status
            )));
        }
        if context != self.context {
            return Err(EtherNetIpError::Framing(
                "sender context mismatch".into(),
            ));
        }
        if self.session != 0 && session != self.session {
            return Err(EtherNetIpError::Framing(format!(
                "session mismatch: sent 0x{:08X}, received 0x{:08X}",
                self.session, session
            )));
        }
        if available < HEADER_SIZE + length || buf.remaining() < length {
            return Err(EtherNetIpError::Framing(
                "truncated encapsulation body".into(),
            ));
        }
        self.response_session = session;
        self.body.decode(buf, length)
    }
}
