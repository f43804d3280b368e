// multi.rs - Multiple Service Packet: several MessageRouter-framed requests
// packed behind a count and an offset table, answered the same way.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{EtherNetIpError, Result};
use crate::protocol::Protocol;

/// Body of a Multiple Service Packet (service 0x0A).
///
/// Offsets are measured from the start of the body, i.e. from the count
/// field. Each sub-response is sliced out by its offset and decoded with the
/// same logic as a standalone reply; the outcome is recorded per item so one
/// failed sub-request does not poison the rest of the batch.
#[derive(Debug)]
pub struct CipMultiRequest<P> {
    requests: Vec<P>,
    outcomes: Vec<Result<()>>,
}

impl<P: Protocol> CipMultiRequest<P> {
    pub fn new(requests: Vec<P>) -> Self {
        Self {
            requests,
            outcomes: Vec::new(),
        }
    }

    /// Number of packed sub-requests.
    pub fn len(&self) -> usize {
        self.requests.len()
    }

    /// True when the packet carries no sub-requests.
    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    /// The packed sub-requests.
    pub fn requests(&self) -> &[P] {
        &self.requests
    }

    /// Pairs every sub-request with its decode outcome, in request order.
    pub fn into_results(mut self) -> Vec<Result<P>> {
        // Sub-responses that were never reached decode as framing errors.
        while self.outcomes.len() < self.requests.len() {
            self.outcomes.push(Err(EtherNetIpError::Framing(
                "missing sub-response".into(),
            )));
        }
        self.requests
            .into_iter()
            .zip(self.outcomes)
            .map(|(request, outcome)| outcome.map(|_| request))
            .collect()
    }
}

impl<P: Protocol> Protocol for CipMultiRequest<P> {
    fn request_size(&self) -> usize {
        2 + 2 * self.requests.len()
            + self
                .requests
                .iter()
                .map(Protocol::request_size)
                .sum::<usize>()
    }

    fn encode(&self, buf: &mut BytesMut) -> Result<()> {
        buf.put_u16_le(self.requests.len() as u16);
        let mut offset = 2 + 2 * self.requests.len();
        for request in &self.requests {
            buf.put_u16_le(offset as u16);
            offset += request.request_size();
        }
        for request in &self.requests {
            request.encode(buf)?;
        }
        Ok(())
    }

    fn decode(&mut self, buf: &mut Bytes, available: usize) -> Result<()> {
        if available < 2 || buf.remaining() < available {
            return Err(EtherNetIpError::Framing(
                "truncated multi-service reply".into(),
            ));
        }
        let body = buf.copy_to_bytes(available);
        let count = u16::from_le_bytes([body[0], body[1]]) as usize;
        if count != self.requests.len() {
            return Err(EtherNetIpError::Framing(format!(
                "sent {} sub-requests, device answered {}",
                self.requests.len(),
                count
            )));
        }
        let table_end = 2 + 2 * count;
        if available < table_end {
            return Err(EtherNetIpError::Framing(
                "truncated sub-response offset table".into(),
            ));
        }
        let offsets: Vec<usize> = (0..count)
            .map(|i| u16::from_le_bytes([body[2 + 2 * i], body[3 + 2 * i]]) as usize)
            .collect();

        self.outcomes = Vec::with_capacity(count);
        for i in 0..count {
            let start = offsets[i];
            let end = if i + 1 < count {
                offsets[i + 1]
            } else {
                available
            };
            if start < table_end || end > available || start > end {
                self.outcomes.push(Err(EtherNetIpError::Framing(format!(
                    "sub-response {} has invalid bounds {}..{}",
                    i, start, end
                ))));
                continue;
            }
            let mut sub = body.slice(start..end);
            self.outcomes
                .push(self.requests[i].decode(&mut sub, end - start));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cip_data::CipType;
    use crate::protocol::MessageRouter;

    fn reads(tags: &[&str]) -> CipMultiRequest<MessageRouter<crate::protocol::CipReadData>> {
        CipMultiRequest::new(
            tags.iter()
                .map(|tag| MessageRouter::read_tag(tag, 1).unwrap())
                .collect(),
        )
    }

    #[test]
    fn offset_table_layout() {
        let multi = reads(&["A", "B"]);
        let mut buf = BytesMut::new();
        multi.encode(&mut buf).unwrap();
        // Each read: service + 1-word path (0x91 len 'X' pad) + elements = 8 bytes.
        assert_eq!(
            buf.to_vec(),
            vec![
                0x02, 0x00, // count
                0x06, 0x00, // first sub-request right after the table
                0x0E, 0x00, // second, 8 bytes later
                0x4C, 0x02, 0x91, 0x01, b'A', 0x00, 0x01, 0x00, // read A
                0x4C, 0x02, 0x91, 0x01, b'B', 0x00, 0x01, 0x00, // read B
            ]
        );
        assert_eq!(multi.request_size(), buf.len());
    }

    fn reply_for(sub_replies: &[&[u8]]) -> Vec<u8> {
        let count = sub_replies.len();
        let mut body = Vec::new();
        body.extend_from_slice(&(count as u16).to_le_bytes());
        let mut offset = 2 + 2 * count;
        for sub in sub_replies {
            body.extend_from_slice(&(offset as u16).to_le_bytes());
            offset += sub.len();
        }
        for sub in sub_replies {
            body.extend_from_slice(sub);
        }
        body
    }

    #[test]
    fn decode_two_reads_in_order() {
        let mut outer = MessageRouter::multi_service(reads(&["A", "B"]));
        let dint: &[u8] = &[0xCC, 0x00, 0x00, 0x00, 0xC4, 0x00, 0x2A, 0x00, 0x00, 0x00];
        let real: &[u8] = &[0xCC, 0x00, 0x00, 0x00, 0xCA, 0x00, 0x00, 0x00, 0x60, 0x40];
        let mut reply = vec![0x8A, 0x00, 0x00, 0x00];
        reply.extend_from_slice(&reply_for(&[dint, real]));

        let mut bytes = Bytes::copy_from_slice(&reply);
        outer.decode(&mut bytes, reply.len()).unwrap();

        let results = outer.into_body().into_results();
        assert_eq!(results.len(), 2);
        let a = results[0].as_ref().unwrap().body().data().unwrap();
        assert_eq!(a.tag_type(), CipType::Dint);
        assert_eq!(a.get_i32(0).unwrap(), 42);
        let b = results[1].as_ref().unwrap().body().data().unwrap();
        assert_eq!(b.tag_type(), CipType::Real);
        assert_eq!(b.get_f64(0).unwrap(), 3.5);
    }

    #[test]
    fn embedded_error_reported_per_item() {
        let mut outer = MessageRouter::multi_service(reads(&["A", "B"]));
        let good: &[u8] = &[0xCC, 0x00, 0x00, 0x00, 0xC4, 0x00, 0x2A, 0x00, 0x00, 0x00];
        let bad: &[u8] = &[0xCC, 0x00, 0x04, 0x00]; // path segment error
        // Outer status 0x1E: at least one sub-request failed.
        let mut reply = vec![0x8A, 0x00, 0x1E, 0x00];
        reply.extend_from_slice(&reply_for(&[good, bad]));

        let mut bytes = Bytes::copy_from_slice(&reply);
        outer.decode(&mut bytes, reply.len()).unwrap();
        assert_eq!(outer.status(), 0x1E);

        let results = outer.into_body().into_results();
        assert!(results[0].is_ok());
        assert!(matches!(
            results[1].as_ref().unwrap_err(),
            EtherNetIpError::Protocol { status: 0x04, .. }
        ));
    }

    #[test]
    fn count_mismatch_is_a_framing_error() {
        let mut multi = reads(&["A", "B"]);
        let reply = reply_for(&[&[0xCC, 0x00, 0x00, 0x00][..]]);
        let mut bytes = Bytes::copy_from_slice(&reply);
        assert!(matches!(
            multi.decode(&mut bytes, reply.len()),
            Err(EtherNetIpError::Framing(_))
        ));
    }
}
