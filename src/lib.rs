// lib.rs - EtherNet/IP client for Allen-Bradley ControlLogix/CompactLogix
// =========================================================================
//
// # etherip
//
// A client for the EtherNet/IP encapsulation protocol and the CIP services
// carried over it, sufficient to read and write named tags on ControlLogix
// and CompactLogix controllers over a single TCP connection.
//
// The wire protocol is built as a stack of nested layers, each implementing
// the same encode/decode contract and delegating its body to the layer
// below:
//
// ```text
// Encapsulation (ENIP header, session, command)
//  └─ SendRRData    (interface handle, timeout, CPF items)
//      └─ UnconnectedSend (route to backplane slot, CIP timeout)
//          └─ MessageRouter (CIP service code + path)
//              └─ Body: read / write / multi-request / attribute
// ```
//
// [`EipClient`] drives the stack: it opens the connection, registers a
// session, and exposes tag-level operations.

use std::time::Duration;

use log::{debug, info, warn};

pub mod cip_data;
pub mod cip_path;
pub mod connection;
pub mod error;
pub mod protocol;

pub use cip_data::{CipData, CipType, MAX_STRING_LENGTH};
pub use cip_path::{CipPath, PathSegment};
pub use error::{EtherNetIpError, Result};

use connection::Connection;
use protocol::{
    CipMultiRequest, CipService, Command, Encapsulation, GetShortAttribute,
    GetStringAttribute, ListServices, MessageRouter, ProtocolAdapter, RegisterSession,
    SendRRData, UnconnectedSend,
};

/// Default EtherNet/IP TCP port.
pub const DEFAULT_PORT: u16 = 0xAF12;

/// Connection options for [`EipClient::connect_with_options`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientOptions {
    /// TCP port of the device, 0xAF12 unless remapped.
    pub port: u16,
    /// Deadline applied to every individual send and receive.
    pub timeout: Duration,
    /// Size of the shared request/response buffer. 600 bytes covers every
    /// non-fragmented request this client issues; larger multi-requests
    /// need a larger buffer.
    pub buffer_size: usize,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            timeout: Duration::from_millis(2000),
            buffer_size: 600,
        }
    }
}

/// Identity of a connected device, read during the connect handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    /// Vendor id (0x0001 = Rockwell/Allen-Bradley).
    pub vendor: u16,
    /// Device type code.
    pub device_type: u16,
    /// Firmware revision.
    pub revision: u16,
    /// Serial number (low word).
    pub serial: u16,
    /// Product name.
    pub name: String,
}

impl std::fmt::Display for DeviceInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "'{}', vendor 0x{:04X}, type 0x{:04X}, revision 0x{:04X}, serial 0x{:04X}",
            self.name, self.vendor, self.device_type, self.revision, self.serial
        )
    }
}

/// EtherNet/IP client session for one controller.
///
/// All operations share a single TCP connection and a single buffer, so a
/// client must be driven from one task at a time; responses on the
/// connection arrive in request order.
///
/// # Examples
///
/// ```rust,no_run
/// use etherip::{CipData, EipClient};
///
/// #[tokio::main]
/// async fn main() -> etherip::Result<()> {
///     // Controller CPU in slot 0 of the chassis at 192.168.1.10.
///     let mut plc = EipClient::connect("192.168.1.10", 0).await?;
///
///     let counter = plc.read_tag("Counter").await?;
///     println!("Counter = {}", counter.get_i32(0)?);
///
///     plc.write_tag("Setpoint", CipData::real(3.5)).await?;
///
///     plc.close().await
/// }
/// ```
#[derive(Debug)]
pub struct EipClient {
    connection: Option<Connection>,
    session: u32,
    slot: u8,
    device_info: Option<DeviceInfo>,
}

impl EipClient {
    /// Connects to `host` with default options and performs the handshake:
    /// service check, session registration, identity read.
    ///
    /// `slot` is the chassis slot of the controller CPU, the terminus of
    /// the backplane route for every tag operation.
    pub async fn connect(host: &str, slot: u8) -> Result<Self> {
        Self::connect_with_options(host, slot, ClientOptions::default()).await
    }

    /// Connects with explicit port, timeout and buffer size.
    pub async fn connect_with_options(
        host: &str,
        slot: u8,
        options: ClientOptions,
    ) -> Result<Self> {
        let connection =
            Connection::connect(host, options.port, options.buffer_size, options.timeout)
                .await?;
        let mut client = Self {
            connection: Some(connection),
            session: 0,
            slot,
            device_info: None,
        };
        client.list_services().await?;
        client.register_session().await?;
        client.read_device_info().await?;
        if let Some(info) = &client.device_info {
            info!("connected to {}", info);
        }
        Ok(client)
    }

    /// Identity of the connected device.
    pub fn device_info(&self) -> Option<&DeviceInfo> {
        self.device_info.as_ref()
    }

    /// Session handle allocated by the device, 0 when closed.
    pub fn session_handle(&self) -> u32 {
        self.session
    }

    /// True while the session is open.
    pub fn is_connected(&self) -> bool {
        self.connection.is_some() && self.session != 0
    }

    /// Reads one element of the named tag.
    pub async fn read_tag(&mut self, tag: &str) -> Result<CipData> {
        self.read_tag_with_context(tag, 1, [0; 8]).await
    }

    /// Reads `elements` consecutive elements starting at the named tag.
    pub async fn read_tag_elements(&mut self, tag: &str, elements: u16) -> Result<CipData> {
        self.read_tag_with_context(tag, elements, [0; 8]).await
    }

    /// Reads a tag with a caller-supplied sender context. The context is
    /// echoed in the response header and verified, which catches frame
    /// correlation bugs early.
    pub async fn read_tag_with_context(
        &mut self,
        tag: &str,
        elements: u16,
        context: [u8; 8],
    ) -> Result<CipData> {
        let (session, slot) = self.session_and_slot()?;
        let read = MessageRouter::read_tag(tag, elements)?;
        let mut frame = Encapsulation::with_context(
            Command::SendRRData,
            session,
            SendRRData::new(UnconnectedSend::new(slot, read)),
            context,
        );
        self.connection_mut()?.execute(&mut frame).await?;
        frame
            .body_mut()
            .body_mut()
            .body_mut()
            .body_mut()
            .take_data()
            .ok_or_else(|| EtherNetIpError::Framing("read reply carried no data".into()))
    }

    /// Writes a value to the named tag. The value's CIP type must match the
    /// tag's stored type or the controller rejects the write.
    pub async fn write_tag(&mut self, tag: &str, value: CipData) -> Result<()> {
        self.write_tag_with_context(tag, value, [0; 8]).await
    }

    /// Writes a tag with a caller-supplied sender context.
    pub async fn write_tag_with_context(
        &mut self,
        tag: &str,
        value: CipData,
        context: [u8; 8],
    ) -> Result<()> {
        let (session, slot) = self.session_and_slot()?;
        let write = MessageRouter::write_tag(tag, value)?;
        let mut frame = Encapsulation::with_context(
            Command::SendRRData,
            session,
            SendRRData::new(UnconnectedSend::new(slot, write)),
            context,
        );
        self.connection_mut()?.execute(&mut frame).await?;
        Ok(())
    }

    /// Reads several tags in one round trip. Results come back in request
    /// order; a tag the controller rejects yields an error in its slot
    /// without failing the rest of the batch.
    pub async fn read_tags(&mut self, tags: &[&str]) -> Result<Vec<Result<CipData>>> {
        if tags.is_empty() {
            return Ok(Vec::new());
        }
        let (session, slot) = self.session_and_slot()?;
        let mut requests = Vec::with_capacity(tags.len());
        for tag in tags {
            requests.push(MessageRouter::read_tag(tag, 1)?);
        }
        let multi = MessageRouter::multi_service(CipMultiRequest::new(requests));
        let mut frame = Encapsulation::new(
            Command::SendRRData,
            session,
            SendRRData::new(UnconnectedSend::new(slot, multi)),
        );
        self.connection_mut()?.execute(&mut frame).await?;
        let results = frame
            .into_body()
            .into_body()
            .into_body()
            .into_body()
            .into_results();
        Ok(results
            .into_iter()
            .map(|result| {
                result.and_then(|mut reply| {
                    reply.body_mut().take_data().ok_or_else(|| {
                        EtherNetIpError::Framing("sub-response carried no data".into())
                    })
                })
            })
            .collect())
    }

    /// Writes several tags in one round trip. `tags` and `values` must have
    /// equal lengths; outcomes come back per tag in request order.
    pub async fn write_tags(
        &mut self,
        tags: &[&str],
        values: Vec<CipData>,
    ) -> Result<Vec<Result<()>>> {
        if tags.len() != values.len() {
            return Err(EtherNetIpError::Argument(format!(
                "got {} tags but {} values",
                tags.len(),
                values.len()
            )));
        }
        if tags.is_empty() {
            return Ok(Vec::new());
        }
        let (session, slot) = self.session_and_slot()?;
        let mut requests = Vec::with_capacity(tags.len());
        for (tag, value) in tags.iter().zip(values) {
            requests.push(MessageRouter::write_tag(tag, value)?);
        }
        let multi = MessageRouter::multi_service(CipMultiRequest::new(requests));
        let mut frame = Encapsulation::new(
            Command::SendRRData,
            session,
            SendRRData::new(UnconnectedSend::new(slot, multi)),
        );
        self.connection_mut()?.execute(&mut frame).await?;
        let results = frame
            .into_body()
            .into_body()
            .into_body()
            .into_body()
            .into_results();
        Ok(results.into_iter().map(|result| result.map(|_| ())).collect())
    }

    /// Closes the session: a best-effort unregister write (never read back,
    /// the device may drop the connection immediately) followed by a socket
    /// shutdown. Idempotent.
    pub async fn close(&mut self) -> Result<()> {
        if let Some(mut connection) = self.connection.take() {
            if self.session != 0 {
                let frame = Encapsulation::new(
                    Command::UnRegisterSession,
                    self.session,
                    ProtocolAdapter,
                );
                if let Err(e) = connection.write(&frame).await {
                    warn!("error un-registering session: {}", e);
                }
                self.session = 0;
            }
            connection.close().await;
        }
        Ok(())
    }

    fn session_and_slot(&self) -> Result<(u32, u8)> {
        if self.connection.is_none() || self.session == 0 {
            return Err(EtherNetIpError::NotConnected);
        }
        Ok((self.session, self.slot))
    }

    fn connection_mut(&mut self) -> Result<&mut Connection> {
        self.connection
            .as_mut()
            .ok_or(EtherNetIpError::NotConnected)
    }

    async fn list_services(&mut self) -> Result<()> {
        let mut frame =
            Encapsulation::new(Command::ListServices, 0, ListServices::default());
        self.connection_mut()?.execute(&mut frame).await?;
        let first = frame.body().services().first().cloned().ok_or_else(|| {
            EtherNetIpError::UnsupportedService("device advertises no services".into())
        })?;
        if !first.name.to_ascii_lowercase().starts_with("comm") {
            return Err(EtherNetIpError::UnsupportedService(format!(
                "expected a communications service, device advertises '{}'",
                first.name
            )));
        }
        debug!("device service: {}", first.name);
        Ok(())
    }

    async fn register_session(&mut self) -> Result<()> {
        let mut frame =
            Encapsulation::new(Command::RegisterSession, 0, RegisterSession::default());
        self.connection_mut()?.execute(&mut frame).await?;
        let session = frame.response_session();
        if session == 0 {
            return Err(EtherNetIpError::Framing(
                "device allocated a null session handle".into(),
            ));
        }
        self.session = session;
        debug!("session 0x{:08X} registered", session);
        Ok(())
    }

    async fn read_device_info(&mut self) -> Result<()> {
        let vendor = self.read_short_attribute(1).await?;
        let device_type = self.read_short_attribute(2).await?;
        let revision = self.read_short_attribute(4).await?;
        let serial = self.read_short_attribute(6).await?;
        let name = self.read_string_attribute(7).await?;
        self.device_info = Some(DeviceInfo {
            vendor,
            device_type,
            revision,
            serial,
            name,
        });
        Ok(())
    }

    async fn read_short_attribute(&mut self, attribute: u8) -> Result<u16> {
        let session = self.session;
        let mut frame = Encapsulation::new(
            Command::SendRRData,
            session,
            SendRRData::new(MessageRouter::new(
                CipService::GetAttributeSingle,
                CipPath::identity().attr(attribute),
                GetShortAttribute::default(),
            )),
        );
        self.connection_mut()?.execute(&mut frame).await?;
        Ok(frame.body().body().body().value())
    }

    async fn read_string_attribute(&mut self, attribute: u8) -> Result<String> {
        let session = self.session;
        let mut frame = Encapsulation::new(
            Command::SendRRData,
            session,
            SendRRData::new(MessageRouter::new(
                CipService::GetAttributeSingle,
                CipPath::identity().attr(attribute),
                GetStringAttribute::default(),
            )),
        );
        self.connection_mut()?.execute(&mut frame).await?;
        Ok(frame.body().body().body().value().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_options() {
        let options = ClientOptions::default();
        assert_eq!(options.port, 0xAF12);
        assert_eq!(options.timeout, Duration::from_millis(2000));
        assert_eq!(options.buffer_size, 600);
    }

    #[test]
    fn device_info_display() {
        let info = DeviceInfo {
            vendor: 1,
            device_type: 0x000E,
            revision: 0x0B02,
            serial: 0x1234,
            name: "1756-L61".into(),
        };
        let text = info.to_string();
        assert!(text.contains("1756-L61"));
        assert!(text.contains("0x0001"));
    }
}
