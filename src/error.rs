// error.rs - Error types for the EtherNet/IP client

use std::time::Duration;

use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, EtherNetIpError>;

/// Errors reported by the EtherNet/IP client.
///
/// Every failure carries enough context to tell a caller whether the
/// connection is still usable: I/O and framing errors mean the TCP stream
/// should be closed, while a CIP status from the controller leaves the
/// session intact.
#[derive(Debug, Error)]
pub enum EtherNetIpError {
    /// Underlying socket failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Deadline exceeded during a read or write.
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    /// Encapsulation length/command/session mismatch, or a truncated body.
    #[error("framing error: {0}")]
    Framing(String),

    /// Non-zero CIP general status reported by the controller.
    #[error("{}", format_protocol_status(.status, .extended))]
    Protocol {
        /// General status code from the MessageRouter reply.
        status: u8,
        /// Extended status words that followed the general status.
        extended: Vec<u16>,
    },

    /// Write value's CIP type disagrees with the tag's stored type.
    #[error("type mismatch: {0}")]
    TypeMismatch(String),

    /// Operation attempted before `connect` or after `close`.
    #[error("not connected")]
    NotConnected,

    /// The device did not advertise the EtherNet/IP communications service.
    #[error("device does not support EtherNet/IP: {0}")]
    UnsupportedService(String),

    /// Caller error, e.g. mismatched batch lengths or an oversize request.
    #[error("invalid argument: {0}")]
    Argument(String),
}

fn format_protocol_status(status: &u8, extended: &Vec<u16>) -> String {
    if extended.is_empty() {
        format!(
            "device returned CIP status 0x{:02X}: {}",
            status,
            cip_status_message(*status)
        )
    } else {
        format!(
            "device returned CIP status 0x{:02X}: {} (extended {:04X?})",
            status,
            cip_status_message(*status),
            extended
        )
    }
}

/// Human-readable text for a CIP general status code.
pub fn cip_status_message(status: u8) -> &'static str {
    match status {
        0x00 => "Success",
        0x01 => "Connection failure",
        0x02 => "Resource unavailable",
        0x03 => "Invalid parameter value",
        0x04 => "Path segment error",
        0x05 => "Path destination unknown",
        0x06 => "Partial transfer",
        0x07 => "Connection lost",
        0x08 => "Service not supported",
        0x09 => "Invalid attribute value",
        0x0A => "Attribute list error",
        0x0B => "Already in requested mode/state",
        0x0C => "Object state conflict",
        0x0D => "Object already exists",
        0x0E => "Attribute not settable",
        0x0F => "Privilege violation",
        0x10 => "Device state conflict",
        0x11 => "Reply data too large",
        0x12 => "Fragmentation of a primitive value",
        0x13 => "Not enough data",
        0x14 => "Attribute not supported",
        0x15 => "Too much data",
        0x16 => "Object does not exist",
        0x17 => "Service fragmentation sequence not in progress",
        0x18 => "No stored attribute data",
        0x19 => "Store operation failure",
        0x1A => "Routing failure, request packet too large",
        0x1B => "Routing failure, response packet too large",
        0x1C => "Missing attribute list entry data",
        0x1D => "Invalid attribute value list",
        0x1E => "Embedded service error",
        0x1F => "Vendor specific error",
        0x20 => "Invalid parameter",
        0x21 => "Write-once value or medium already written",
        0x22 => "Invalid reply received",
        0x23 => "Buffer overflow",
        0x24 => "Invalid message format",
        0x25 => "Key failure in path",
        0x26 => "Path size invalid",
        0x27 => "Unexpected attribute in list",
        0x28 => "Invalid member ID",
        0x29 => "Member not settable",
        0xFF => "General error",
        _ => "Unknown CIP error code",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protocol_status_display_includes_message() {
        let err = EtherNetIpError::Protocol {
            status: 0x05,
            extended: vec![],
        };
        let text = err.to_string();
        assert!(text.contains("0x05"));
        assert!(text.contains("Path destination unknown"));
    }

    #[test]
    fn protocol_status_display_includes_extended_words() {
        let err = EtherNetIpError::Protocol {
            status: 0xFF,
            extended: vec![0x2107],
        };
        assert!(err.to_string().contains("2107"));
    }
}
