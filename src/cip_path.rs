// cip_path.rs - CIP path segments and the symbolic tag addressing used by
// ControlLogix controllers.
//
// Paths address either a CIP object (class/instance/attribute) or a named
// tag ("Motor.Speed", "Data[3]"). On the wire a path is a word-length
// prefix followed by packed segments, each padded to a 16-bit boundary.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{EtherNetIpError, Result};

const CLASS_SEGMENT: u8 = 0x20;
const INSTANCE_SEGMENT: u8 = 0x24;
const ATTRIBUTE_SEGMENT: u8 = 0x30;
const SYMBOL_SEGMENT: u8 = 0x91;
const ELEMENT_SEGMENT: u8 = 0x28;
const ELEMENT_SEGMENT_WIDE: u8 = 0x29;

/// One step of a CIP path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    /// Logical class id (0x01 = Identity, 0x02 = MessageRouter, ...).
    Class(u8),
    /// Logical instance id within the class.
    Instance(u8),
    /// Attribute id within the instance.
    Attribute(u8),
    /// ANSI extended symbol segment: one component of a tag name.
    Symbol(String),
    /// Numeric array subscript following a symbolic segment.
    Element(u16),
}

impl PathSegment {
    fn encoded_len(&self) -> usize {
        match self {
            PathSegment::Class(_)
            | PathSegment::Instance(_)
            | PathSegment::Attribute(_) => 2,
            PathSegment::Symbol(name) => 2 + name.len() + (name.len() & 1),
            PathSegment::Element(n) => {
                if *n < 256 {
                    2
                } else {
                    4
                }
            }
        }
    }
}

/// An ordered CIP path, built fluently and encoded with its word-length
/// prefix.
///
/// ```
/// use etherip::CipPath;
///
/// let identity_vendor = CipPath::identity().attr(1);
/// let array_element = CipPath::symbol("Data[3]").unwrap();
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CipPath {
    segments: Vec<PathSegment>,
}

impl CipPath {
    /// Path to a logical class, instance 1.
    pub fn class(class: u8) -> Self {
        Self {
            segments: vec![PathSegment::Class(class), PathSegment::Instance(1)],
        }
    }

    /// Identity object (class 0x01), instance 1.
    pub fn identity() -> Self {
        Self::class(0x01)
    }

    /// MessageRouter object (class 0x02), instance 1.
    pub fn message_router() -> Self {
        Self::class(0x02)
    }

    /// ConnectionManager object (class 0x06), instance 1.
    pub fn connection_manager() -> Self {
        Self::class(0x06)
    }

    /// Symbolic path to a named tag. Dotted components become separate
    /// symbol segments, `[n]` subscripts become numeric element segments.
    pub fn symbol(tag: &str) -> Result<Self> {
        if tag.is_empty() {
            return Err(EtherNetIpError::Argument("empty tag name".into()));
        }
        let mut segments = Vec::new();
        for component in tag.split('.') {
            let (name, mut subscripts) = match component.find('[') {
                Some(pos) => component.split_at(pos),
                None => (component, ""),
            };
            if name.is_empty() {
                return Err(EtherNetIpError::Argument(format!(
                    "tag '{}' has an empty component",
                    tag
                )));
            }
            if !name.is_ascii() || name.len() > 255 {
                return Err(EtherNetIpError::Argument(format!(
                    "tag component '{}' is not a valid symbol",
                    name
                )));
            }
            segments.push(PathSegment::Symbol(name.to_string()));
            while !subscripts.is_empty() {
                let close = subscripts.find(']').ok_or_else(|| {
                    EtherNetIpError::Argument(format!("unbalanced subscript in '{}'", tag))
                })?;
                let index: u16 = subscripts[1..close].parse().map_err(|_| {
                    EtherNetIpError::Argument(format!(
                        "invalid array subscript in '{}'",
                        tag
                    ))
                })?;
                segments.push(PathSegment::Element(index));
                subscripts = &subscripts[close + 1..];
                if !subscripts.is_empty() && !subscripts.starts_with('[') {
                    return Err(EtherNetIpError::Argument(format!(
                        "unexpected text after subscript in '{}'",
                        tag
                    )));
                }
            }
        }
        Ok(Self { segments })
    }

    /// Replaces the instance id (appending one if the path has none).
    pub fn instance(mut self, instance: u8) -> Self {
        for segment in self.segments.iter_mut().rev() {
            if let PathSegment::Instance(value) = segment {
                *value = instance;
                return self;
            }
        }
        self.segments.push(PathSegment::Instance(instance));
        self
    }

    /// Appends an attribute segment.
    pub fn attr(mut self, attribute: u8) -> Self {
        self.segments.push(PathSegment::Attribute(attribute));
        self
    }

    /// Appends a numeric element segment.
    pub fn element(mut self, index: u16) -> Self {
        self.segments.push(PathSegment::Element(index));
        self
    }

    /// The path's segments in order.
    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }

    /// Packed segment bytes, excluding the word-length prefix.
    pub fn encoded_len(&self) -> usize {
        self.segments.iter().map(PathSegment::encoded_len).sum()
    }

    /// Total on-wire size including the word-length prefix.
    pub fn request_size(&self) -> usize {
        1 + self.encoded_len()
    }

    /// Writes the word-length prefix followed by the packed segments.
    pub fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8((self.encoded_len() / 2) as u8);
        for segment in &self.segments {
            match segment {
                PathSegment::Class(id) => {
                    buf.put_u8(CLASS_SEGMENT);
                    buf.put_u8(*id);
                }
                PathSegment::Instance(id) => {
                    buf.put_u8(INSTANCE_SEGMENT);
                    buf.put_u8(*id);
                }
                PathSegment::Attribute(id) => {
                    buf.put_u8(ATTRIBUTE_SEGMENT);
                    buf.put_u8(*id);
                }
                PathSegment::Symbol(name) => {
                    buf.put_u8(SYMBOL_SEGMENT);
                    buf.put_u8(name.len() as u8);
                    buf.put_slice(name.as_bytes());
                    if name.len() & 1 == 1 {
                        buf.put_u8(0);
                    }
                }
                PathSegment::Element(index) => {
                    if *index < 256 {
                        buf.put_u8(ELEMENT_SEGMENT);
                        buf.put_u8(*index as u8);
                    } else {
                        buf.put_u8(ELEMENT_SEGMENT_WIDE);
                        buf.put_u8(0);
                        buf.put_u16_le(*index);
                    }
                }
            }
        }
    }

    /// Parses a word-length-prefixed path back into segments.
    pub fn decode(buf: &mut Bytes) -> Result<Self> {
        if buf.remaining() < 1 {
            return Err(EtherNetIpError::Framing("truncated path".into()));
        }
        let total = buf.get_u8() as usize * 2;
        if buf.remaining() < total {
            return Err(EtherNetIpError::Framing("truncated path".into()));
        }
        let mut segments = Vec::new();
        let mut consumed = 0;
        while consumed < total {
            if buf.remaining() < 2 {
                return Err(EtherNetIpError::Framing("truncated path segment".into()));
            }
            let kind = buf.get_u8();
            match kind {
                CLASS_SEGMENT => {
                    segments.push(PathSegment::Class(buf.get_u8()));
                    consumed += 2;
                }
                INSTANCE_SEGMENT => {
                    segments.push(PathSegment::Instance(buf.get_u8()));
                    consumed += 2;
                }
                ATTRIBUTE_SEGMENT => {
                    segments.push(PathSegment::Attribute(buf.get_u8()));
                    consumed += 2;
                }
                ELEMENT_SEGMENT => {
                    segments.push(PathSegment::Element(u16::from(buf.get_u8())));
                    consumed += 2;
                }
                ELEMENT_SEGMENT_WIDE => {
                    let _pad = buf.get_u8();
                    if buf.remaining() < 2 {
                        return Err(EtherNetIpError::Framing(
                            "truncated element segment".into(),
                        ));
                    }
                    segments.push(PathSegment::Element(buf.get_u16_le()));
                    consumed += 4;
                }
                SYMBOL_SEGMENT => {
                    let len = buf.get_u8() as usize;
                    let padded = len + (len & 1);
                    if buf.remaining() < padded {
                        return Err(EtherNetIpError::Framing(
                            "truncated symbol segment".into(),
                        ));
                    }
                    let mut name = vec![0; len];
                    buf.copy_to_slice(&mut name);
                    if len & 1 == 1 {
                        let _pad = buf.get_u8();
                    }
                    let name = String::from_utf8(name).map_err(|_| {
                        EtherNetIpError::Framing("symbol segment is not ASCII".into())
                    })?;
                    segments.push(PathSegment::Symbol(name));
                    consumed += 2 + padded;
                }
                other => {
                    return Err(EtherNetIpError::Framing(format!(
                        "unknown path segment type 0x{:02X}",
                        other
                    )));
                }
            }
        }
        Ok(Self { segments })
    }
}
