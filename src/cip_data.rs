// cip_data.rs - CIP typed value codec
//
// Values travel on the wire as a 16-bit type code followed by one or more
// little-endian element encodings. Array values are simply consecutive
// elements; the element count lives in the enclosing read/write service
// body, never in the payload itself.

use bytes::{BufMut, BytesMut};

use crate::error::{EtherNetIpError, Result};

/// Structure handle carried by Allen-Bradley STRING values.
pub const STRING_HANDLE: u16 = 0x0FCE;

/// Longest string a ControlLogix STRING tag can hold.
pub const MAX_STRING_LENGTH: usize = 82;

// STRING payload: handle(2) + pad(2) + length(4) + 82-char slot.
const STRING_PAYLOAD_SIZE: usize = 2 + 2 + 4 + MAX_STRING_LENGTH;

/// CIP elementary data types supported by ControlLogix controllers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CipType {
    /// Single byte, 0 = false, non-zero = true (0x00C1).
    Bool,
    /// Signed 8-bit integer (0x00C2).
    Sint,
    /// Signed 16-bit integer (0x00C3).
    Int,
    /// Signed 32-bit integer (0x00C4).
    Dint,
    /// Signed 64-bit integer (0x00C5).
    Lint,
    /// IEEE-754 binary32 (0x00CA).
    Real,
    /// IEEE-754 binary64 (0x00CB).
    Lreal,
    /// 32-bit bit pack (0x00D3).
    Bits,
    /// Allen-Bradley STRING structure (0x02A0, handle 0x0FCE).
    String,
}

impl CipType {
    /// Looks up a type by its 16-bit CIP code.
    pub fn from_code(code: u16) -> Result<Self> {
        match code {
            0x00C1 => Ok(CipType::Bool),
            0x00C2 => Ok(CipType::Sint),
            0x00C3 => Ok(CipType::Int),
            0x00C4 => Ok(CipType::Dint),
            0x00C5 => Ok(CipType::Lint),
            0x00CA => Ok(CipType::Real),
            0x00CB => Ok(CipType::Lreal),
            0x00D3 => Ok(CipType::Bits),
            0x02A0 => Ok(CipType::String),
            _ => Err(EtherNetIpError::Framing(format!(
                "unsupported CIP type code 0x{:04X}",
                code
            ))),
        }
    }

    /// The 16-bit CIP code for this type.
    pub fn code(self) -> u16 {
        match self {
            CipType::Bool => 0x00C1,
            CipType::Sint => 0x00C2,
            CipType::Int => 0x00C3,
            CipType::Dint => 0x00C4,
            CipType::Lint => 0x00C5,
            CipType::Real => 0x00CA,
            CipType::Lreal => 0x00CB,
            CipType::Bits => 0x00D3,
            CipType::String => 0x02A0,
        }
    }

    /// Bytes per element, `None` for the variable-size STRING structure.
    pub fn element_size(self) -> Option<usize> {
        match self {
            CipType::Bool | CipType::Sint => Some(1),
            CipType::Int => Some(2),
            CipType::Dint | CipType::Real | CipType::Bits => Some(4),
            CipType::Lint | CipType::Lreal => Some(8),
            CipType::String => None,
        }
    }
}

/// A typed CIP value: type code, element count and raw element payload.
///
/// The payload holds exactly what travels on the wire after the type code,
/// so decoding a read response and re-encoding it for a write is loss-free.
/// Numeric accessors widen (or truncate) between the stored type and the
/// requested one the way the controller itself would.
#[derive(Debug, Clone, PartialEq)]
pub struct CipData {
    typ: CipType,
    elements: u16,
    data: Vec<u8>,
}

impl CipData {
    /// Allocates a zero-filled value of `elements` elements, ready to be
    /// filled via [`CipData::set_i32`] / [`CipData::set_f64`] before a write.
    pub fn new(typ: CipType, elements: u16) -> Result<Self> {
        if elements == 0 {
            return Err(EtherNetIpError::Argument(
                "element count must be at least 1".into(),
            ));
        }
        match typ.element_size() {
            Some(size) => Ok(Self {
                typ,
                elements,
                data: vec![0; size * elements as usize],
            }),
            None => {
                if elements != 1 {
                    return Err(EtherNetIpError::Argument(
                        "STRING tags hold a single element".into(),
                    ));
                }
                let mut data = vec![0; STRING_PAYLOAD_SIZE];
                data[0..2].copy_from_slice(&STRING_HANDLE.to_le_bytes());
                Ok(Self {
                    typ,
                    elements,
                    data,
                })
            }
        }
    }

    /// Reconstructs a value from a read response: the type code the device
    /// reported and the raw payload that followed it.
    pub fn from_raw(type_code: u16, raw: &[u8]) -> Result<Self> {
        let typ = CipType::from_code(type_code)?;
        match typ.element_size() {
            Some(size) => {
                if raw.is_empty() || raw.len() % size != 0 {
                    return Err(EtherNetIpError::Framing(format!(
                        "payload of {} bytes is not a whole number of {}-byte elements",
                        raw.len(),
                        size
                    )));
                }
                let elements = raw.len() / size;
                if elements > u16::MAX as usize {
                    return Err(EtherNetIpError::Framing(format!(
                        "payload of {} elements exceeds the element count field",
                        elements
                    )));
                }
                Ok(Self {
                    typ,
                    elements: elements as u16,
                    data: raw.to_vec(),
                })
            }
            None => {
                if raw.len() < 8 {
                    return Err(EtherNetIpError::Framing(
                        "truncated STRING structure".into(),
                    ));
                }
                let handle = u16::from_le_bytes([raw[0], raw[1]]);
                if handle != STRING_HANDLE {
                    return Err(EtherNetIpError::Framing(format!(
                        "unexpected structure handle 0x{:04X}",
                        handle
                    )));
                }
                let len = u32::from_le_bytes([raw[4], raw[5], raw[6], raw[7]]) as usize;
                if len > MAX_STRING_LENGTH || raw.len() < 8 + len {
                    return Err(EtherNetIpError::Framing(format!(
                        "STRING length {} does not fit payload of {} bytes",
                        len,
                        raw.len()
                    )));
                }
                Ok(Self {
                    typ,
                    elements: 1,
                    data: raw.to_vec(),
                })
            }
        }
    }

    /// Single BOOL value.
    pub fn boolean(value: bool) -> Self {
        Self {
            typ: CipType::Bool,
            elements: 1,
            data: vec![if value { 0xFF } else { 0x00 }],
        }
    }

    /// Single SINT value.
    pub fn sint(value: i8) -> Self {
        Self {
            typ: CipType::Sint,
            elements: 1,
            data: value.to_le_bytes().to_vec(),
        }
    }

    /// Single INT value.
    pub fn int(value: i16) -> Self {
        Self {
            typ: CipType::Int,
            elements: 1,
            data: value.to_le_bytes().to_vec(),
        }
    }

    /// Single DINT value.
    pub fn dint(value: i32) -> Self {
        Self {
            typ: CipType::Dint,
            elements: 1,
            data: value.to_le_bytes().to_vec(),
        }
    }

    /// Single LINT value.
    pub fn lint(value: i64) -> Self {
        Self {
            typ: CipType::Lint,
            elements: 1,
            data: value.to_le_bytes().to_vec(),
        }
    }

    /// Single REAL value.
    pub fn real(value: f32) -> Self {
        Self {
            typ: CipType::Real,
            elements: 1,
            data: value.to_le_bytes().to_vec(),
        }
    }

    /// Single LREAL value.
    pub fn lreal(value: f64) -> Self {
        Self {
            typ: CipType::Lreal,
            elements: 1,
            data: value.to_le_bytes().to_vec(),
        }
    }

    /// STRING value. Rejects text beyond the controller's 82-character slot
    /// and non-ASCII content, which the controller cannot represent.
    pub fn string(value: &str) -> Result<Self> {
        if value.len() > MAX_STRING_LENGTH {
            return Err(EtherNetIpError::Argument(format!(
                "string of {} characters exceeds the {}-character STRING slot",
                value.len(),
                MAX_STRING_LENGTH
            )));
        }
        if !value.is_ascii() {
            return Err(EtherNetIpError::Argument(
                "STRING tags only hold ASCII text".into(),
            ));
        }
        let mut data = vec![0; STRING_PAYLOAD_SIZE];
        data[0..2].copy_from_slice(&STRING_HANDLE.to_le_bytes());
        data[4..8].copy_from_slice(&(value.len() as u32).to_le_bytes());
        data[8..8 + value.len()].copy_from_slice(value.as_bytes());
        Ok(Self {
            typ: CipType::String,
            elements: 1,
            data,
        })
    }

    /// The CIP type of this value.
    pub fn tag_type(&self) -> CipType {
        self.typ
    }

    /// The 16-bit type code carried in read responses and write requests.
    pub fn type_code(&self) -> u16 {
        self.typ.code()
    }

    /// Number of elements in the payload.
    pub fn elements(&self) -> u16 {
        self.elements
    }

    /// Raw element payload (excluding the type code).
    pub fn raw(&self) -> &[u8] {
        &self.data
    }

    /// Payload size in bytes.
    pub fn payload_len(&self) -> usize {
        self.data.len()
    }

    /// Appends the element payload to `buf`. The type code and element
    /// count are written by the enclosing write service body.
    pub fn encode(&self, buf: &mut BytesMut) {
        buf.put_slice(&self.data);
    }

    fn element(&self, index: usize) -> Result<&[u8]> {
        let size = self.typ.element_size().ok_or_else(|| {
            EtherNetIpError::Argument("STRING values are not numeric".into())
        })?;
        let start = index * size;
        if index >= self.elements as usize || start + size > self.data.len() {
            return Err(EtherNetIpError::Argument(format!(
                "element {} out of range, value holds {}",
                index, self.elements
            )));
        }
        Ok(&self.data[start..start + size])
    }

    fn element_mut(&mut self, index: usize) -> Result<&mut [u8]> {
        let size = self.typ.element_size().ok_or_else(|| {
            EtherNetIpError::Argument("STRING values are not numeric".into())
        })?;
        let start = index * size;
        if index >= self.elements as usize || start + size > self.data.len() {
            return Err(EtherNetIpError::Argument(format!(
                "element {} out of range, value holds {}",
                index, self.elements
            )));
        }
        Ok(&mut self.data[start..start + size])
    }

    /// Element at `index` as an `i32`, widening or truncating as needed.
    pub fn get_i32(&self, index: usize) -> Result<i32> {
        let e = self.element(index)?;
        Ok(match self.typ {
            CipType::Bool => i32::from(e[0] != 0),
            CipType::Sint => i32::from(e[0] as i8),
            CipType::Int => i32::from(i16::from_le_bytes([e[0], e[1]])),
            CipType::Dint => i32::from_le_bytes([e[0], e[1], e[2], e[3]]),
            CipType::Bits => u32::from_le_bytes([e[0], e[1], e[2], e[3]]) as i32,
            CipType::Lint => {
                i64::from_le_bytes([e[0], e[1], e[2], e[3], e[4], e[5], e[6], e[7]]) as i32
            }
            CipType::Real => f32::from_le_bytes([e[0], e[1], e[2], e[3]]) as i32,
            CipType::Lreal => {
                f64::from_le_bytes([e[0], e[1], e[2], e[3], e[4], e[5], e[6], e[7]]) as i32
            }
            CipType::String => unreachable!("rejected by element()"),
        })
    }

    /// Element at `index` as an `f64`, widening from any numeric type.
    pub fn get_f64(&self, index: usize) -> Result<f64> {
        let e = self.element(index)?;
        Ok(match self.typ {
            CipType::Bool => f64::from(u8::from(e[0] != 0)),
            CipType::Sint => f64::from(e[0] as i8),
            CipType::Int => f64::from(i16::from_le_bytes([e[0], e[1]])),
            CipType::Dint => f64::from(i32::from_le_bytes([e[0], e[1], e[2], e[3]])),
            CipType::Bits => f64::from(u32::from_le_bytes([e[0], e[1], e[2], e[3]])),
            CipType::Lint => {
                i64::from_le_bytes([e[0], e[1], e[2], e[3], e[4], e[5], e[6], e[7]]) as f64
            }
            CipType::Real => f64::from(f32::from_le_bytes([e[0], e[1], e[2], e[3]])),
            CipType::Lreal => {
                f64::from_le_bytes([e[0], e[1], e[2], e[3], e[4], e[5], e[6], e[7]])
            }
            CipType::String => unreachable!("rejected by element()"),
        })
    }

    /// Stores `value` into element `index`, narrowing to the stored type.
    pub fn set_i32(&mut self, index: usize, value: i32) -> Result<()> {
        let typ = self.typ;
        let e = self.element_mut(index)?;
        match typ {
            CipType::Bool => e[0] = if value != 0 { 0xFF } else { 0x00 },
            CipType::Sint => e.copy_from_slice(&(value as i8).to_le_bytes()),
            CipType::Int => e.copy_from_slice(&(value as i16).to_le_bytes()),
            CipType::Dint => e.copy_from_slice(&value.to_le_bytes()),
            CipType::Bits => e.copy_from_slice(&(value as u32).to_le_bytes()),
            CipType::Lint => e.copy_from_slice(&i64::from(value).to_le_bytes()),
            CipType::Real => e.copy_from_slice(&(value as f32).to_le_bytes()),
            CipType::Lreal => e.copy_from_slice(&f64::from(value).to_le_bytes()),
            CipType::String => unreachable!("rejected by element_mut()"),
        }
        Ok(())
    }

    /// Stores `value` into element `index`, narrowing to the stored type.
    pub fn set_f64(&mut self, index: usize, value: f64) -> Result<()> {
        let typ = self.typ;
        let e = self.element_mut(index)?;
        match typ {
            CipType::Bool => e[0] = if value != 0.0 { 0xFF } else { 0x00 },
            CipType::Sint => e.copy_from_slice(&(value as i8).to_le_bytes()),
            CipType::Int => e.copy_from_slice(&(value as i16).to_le_bytes()),
            CipType::Dint => e.copy_from_slice(&(value as i32).to_le_bytes()),
            CipType::Bits => e.copy_from_slice(&(value as u32).to_le_bytes()),
            CipType::Lint => e.copy_from_slice(&(value as i64).to_le_bytes()),
            CipType::Real => e.copy_from_slice(&(value as f32).to_le_bytes()),
            CipType::Lreal => e.copy_from_slice(&value.to_le_bytes()),
            CipType::String => unreachable!("rejected by element_mut()"),
        }
        Ok(())
    }

    /// Text content of a STRING value.
    pub fn get_string(&self) -> Result<String> {
        if self.typ != CipType::String {
            return Err(EtherNetIpError::Argument(format!(
                "tag holds {:?}, not a STRING",
                self.typ
            )));
        }
        let len = u32::from_le_bytes([self.data[4], self.data[5], self.data[6], self.data[7]])
            as usize;
        let len = len.min(self.data.len() - 8);
        Ok(String::from_utf8_lossy(&self.data[8..8 + len]).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_round_trips() {
        for value in [
            CipData::boolean(true),
            CipData::sint(-5),
            CipData::int(-12345),
            CipData::dint(0x1234_5678),
            CipData::lint(-1),
            CipData::real(3.5),
            CipData::lreal(-2.25),
        ] {
            let decoded = CipData::from_raw(value.type_code(), value.raw()).unwrap();
            assert_eq!(decoded, value);
        }
    }

    #[test]
    fn array_round_trip() {
        let mut value = CipData::new(CipType::Dint, 3).unwrap();
        value.set_i32(0, 10).unwrap();
        value.set_i32(1, -20).unwrap();
        value.set_i32(2, 30).unwrap();
        assert_eq!(value.payload_len(), 12);

        let decoded = CipData::from_raw(0x00C4, value.raw()).unwrap();
        assert_eq!(decoded.elements(), 3);
        assert_eq!(decoded.get_i32(1).unwrap(), -20);
        assert_eq!(decoded, value);
    }

    #[test]
    fn real_encoding_matches_ieee754() {
        let value = CipData::real(3.5);
        assert_eq!(value.raw(), &[0x00, 0x00, 0x60, 0x40]);
    }

    #[test]
    fn zero_elements_rejected() {
        assert!(matches!(
            CipData::new(CipType::Dint, 0),
            Err(EtherNetIpError::Argument(_))
        ));
    }

    #[test]
    fn string_layout() {
        let value = CipData::string("AB").unwrap();
        let raw = value.raw();
        assert_eq!(raw.len(), 90);
        assert_eq!(&raw[0..2], &[0xCE, 0x0F]);
        assert_eq!(&raw[2..4], &[0x00, 0x00]);
        assert_eq!(&raw[4..8], &[0x02, 0x00, 0x00, 0x00]);
        assert_eq!(&raw[8..10], b"AB");
        assert!(raw[10..].iter().all(|&b| b == 0));
        assert_eq!(value.get_string().unwrap(), "AB");
    }

    #[test]
    fn string_round_trip() {
        let value = CipData::string("Hello PLC").unwrap();
        let decoded = CipData::from_raw(0x02A0, value.raw()).unwrap();
        assert_eq!(decoded.get_string().unwrap(), "Hello PLC");
        assert_eq!(decoded, value);
    }

    #[test]
    fn oversize_string_rejected() {
        let long = "x".repeat(83);
        assert!(matches!(
            CipData::string(&long),
            Err(EtherNetIpError::Argument(_))
        ));
    }

    #[test]
    fn bad_structure_handle_rejected() {
        let mut raw = vec![0u8; 90];
        raw[0] = 0xAA;
        assert!(matches!(
            CipData::from_raw(0x02A0, &raw),
            Err(EtherNetIpError::Framing(_))
        ));
    }

    #[test]
    fn widening_accessors() {
        let value = CipData::int(-7);
        assert_eq!(value.get_i32(0).unwrap(), -7);
        assert_eq!(value.get_f64(0).unwrap(), -7.0);

        let value = CipData::real(1.5);
        assert_eq!(value.get_f64(0).unwrap(), 1.5);
        assert_eq!(value.get_i32(0).unwrap(), 1);

        let value = CipData::boolean(true);
        assert_eq!(value.get_i32(0).unwrap(), 1);
    }

    #[test]
    fn truncated_payload_rejected() {
        assert!(matches!(
            CipData::from_raw(0x00C4, &[0x01, 0x02, 0x03]),
            Err(EtherNetIpError::Framing(_))
        ));
        assert!(matches!(
            CipData::from_raw(0x00C4, &[]),
            Err(EtherNetIpError::Framing(_))
        ));
    }

    #[test]
    fn unknown_type_code_rejected() {
        assert!(matches!(
            CipData::from_raw(0x0099, &[0x00]),
            Err(EtherNetIpError::Framing(_))
        ));
    }
}
