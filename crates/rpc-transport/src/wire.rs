//! The request/response unit carried inside one frame, and the
//! `SpanBuffers` assembly that lays it out on the wire.
//!
//! A unit's sections are written in the fixed order *authHeader? ‖
//! methodAuthHeader? ‖ payload ‖ headerUnit*; this ordering is an interop
//! contract, not an implementation detail, and every peer must produce and
//! consume it identically. The header is written last because its own
//! encoding needs the lengths of the sections that precede it, which are
//! only known once those sections are finished; a 4-byte length trails the
//! frame so a reader can find the header without scanning forward.
use core_types::ObjectId;

use crate::error::TransportError;

#[derive(Debug, Clone)]
pub struct RequestUnit {
    pub id: ObjectId,
    pub service: String,
    pub method: String,
    pub topic: String,
    pub tenancy: String,
    pub session_id: Option<String>,
    pub message: Vec<u8>,
    pub auth_header: Option<Vec<u8>>,
    pub method_auth_header: Option<Vec<u8>>,
}

impl RequestUnit {
    /// Sections in the fixed `SpanBuffers` order, ready for a vectored
    /// write; the last section is the header trailer.
    pub fn assemble(&self) -> [Vec<u8>; 4] {
        let header = self.encode_header();
        [
            self.auth_header.clone().unwrap_or_default(),
            self.method_auth_header.clone().unwrap_or_default(),
            self.message.clone(),
            header,
        ]
    }

    fn encode_header(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(self.id.as_bytes());
        write_str(&mut buf, &self.service);
        write_str(&mut buf, &self.method);
        write_str(&mut buf, &self.topic);
        write_str(&mut buf, &self.tenancy);
        write_opt_str(&mut buf, self.session_id.as_deref());
        buf.extend_from_slice(&auth_len(&self.auth_header).to_be_bytes());
        buf.extend_from_slice(&auth_len(&self.method_auth_header).to_be_bytes());
        buf.extend_from_slice(&(self.message.len() as u32).to_be_bytes());
        buf
    }

    /// Parses one complete frame body (all four sections concatenated, plus
    /// the trailing 4-byte header length) back into a unit.
    pub fn decode(frame: &[u8]) -> Result<Self, TransportError> {
        if frame.len() < 4 {
            return Err(TransportError::MalformedUnit("frame shorter than trailer".into()));
        }
        let (body, trailer) = frame.split_at(frame.len() - 4);
        let header_len = u32::from_be_bytes(trailer.try_into().unwrap()) as usize;
        if header_len > body.len() {
            return Err(TransportError::MalformedUnit("header length exceeds frame".into()));
        }
        let (rest, header) = body.split_at(body.len() - header_len);
        let mut cursor = header;
        let id_bytes: [u8; 12] = take(&mut cursor, 12)?
            .try_into()
            .map_err(|_| TransportError::MalformedUnit("short object id".into()))?;
        let id = ObjectId::from_bytes(id_bytes);
        let service = read_str(&mut cursor)?;
        let method = read_str(&mut cursor)?;
        let topic = read_str(&mut cursor)?;
        let tenancy = read_str(&mut cursor)?;
        let session_id = read_opt_str(&mut cursor)?;
        let auth_len = read_u32(&mut cursor)? as usize;
        let method_auth_len = read_u32(&mut cursor)? as usize;
        let payload_len = read_u32(&mut cursor)? as usize;

        if auth_len + method_auth_len + payload_len != rest.len() {
            return Err(TransportError::MalformedUnit("section lengths do not cover the frame body".into()));
        }
        let (auth, rest) = rest.split_at(auth_len);
        let (method_auth, payload) = rest.split_at(method_auth_len);
        debug_assert_eq!(payload.len(), payload_len);

        Ok(RequestUnit {
            id,
            service,
            method,
            topic,
            tenancy,
            session_id,
            message: payload.to_vec(),
            auth_header: (!auth.is_empty()).then(|| auth.to_vec()),
            method_auth_header: (!method_auth.is_empty()).then(|| method_auth.to_vec()),
        })
    }
}

fn auth_len(header: &Option<Vec<u8>>) -> u32 {
    header.as_ref().map(|h| h.len() as u32).unwrap_or(0)
}

fn write_str(buf: &mut Vec<u8>, s: &str) {
    buf.extend_from_slice(&(s.len() as u32).to_be_bytes());
    buf.extend_from_slice(s.as_bytes());
}

fn write_opt_str(buf: &mut Vec<u8>, s: Option<&str>) {
    match s {
        Some(s) => write_str(buf, s),
        None => buf.extend_from_slice(&u32::MAX.to_be_bytes()),
    }
}

fn take<'a>(cursor: &mut &'a [u8], n: usize) -> Result<&'a [u8], TransportError> {
    if cursor.len() < n {
        return Err(TransportError::MalformedUnit("header truncated".into()));
    }
    let (head, tail) = cursor.split_at(n);
    *cursor = tail;
    Ok(head)
}

fn read_u32(cursor: &mut &[u8]) -> Result<u32, TransportError> {
    let bytes = take(cursor, 4)?;
    Ok(u32::from_be_bytes(bytes.try_into().unwrap()))
}

fn read_str(cursor: &mut &[u8]) -> Result<String, TransportError> {
    let len = read_u32(cursor)? as usize;
    let bytes = take(cursor, len)?;
    String::from_utf8(bytes.to_vec()).map_err(|e| TransportError::MalformedUnit(e.to_string()))
}

fn read_opt_str(cursor: &mut &[u8]) -> Result<Option<String>, TransportError> {
    if cursor.len() < 4 {
        return Err(TransportError::MalformedUnit("header truncated".into()));
    }
    if cursor[0..4] == u32::MAX.to_be_bytes() {
        *cursor = &cursor[4..];
        return Ok(None);
    }
    read_str(cursor).map(Some)
}
