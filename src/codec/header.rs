//! Vector header (de)serialization (spec.md §4.2, §3).

use crate::codec::vbyte;
use crate::core::error::{Error, Result};
use crate::core::types::{VectorLocation, VectorType};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VectorPayload {
    Inline(Vec<u8>),
    InVectorFile { fileno: u32, offset: u64 },
}

/// A vocabulary entry's pointer to a posting list: type, location, size,
/// and document/collection frequency summary stats.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VectorHeader {
    pub vtype: VectorType,
    pub f_t: u32,
    pub big_f_t: u64,
    pub payload_size: u64,
    pub payload: VectorPayload,
}

impl VectorHeader {
    pub fn location(&self) -> VectorLocation {
        match self.payload {
            VectorPayload::Inline(_) => VectorLocation::Inline,
            VectorPayload::InVectorFile { .. } => VectorLocation::InVectorFile,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.push(match self.vtype {
            VectorType::Docwp => 0,
            VectorType::Impact => 1,
        });
        out.push(match self.location() {
            VectorLocation::Inline => 0,
            VectorLocation::InVectorFile => 1,
        });
        vbyte::encode_into(self.payload_size, &mut out);
        vbyte::encode_into(self.f_t as u64, &mut out);
        vbyte::encode_into(self.big_f_t, &mut out);
        match &self.payload {
            VectorPayload::Inline(bytes) => out.extend_from_slice(bytes),
            VectorPayload::InVectorFile { fileno, offset } => {
                vbyte::encode_into(*fileno as u64, &mut out);
                vbyte::encode_into(*offset, &mut out);
            }
        }
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<(Self, usize)> {
        if bytes.len() < 2 {
            return Err(Error::format_invalid("truncated vector header"));
        }
        let vtype = match bytes[0] {
            0 => VectorType::Docwp,
            1 => VectorType::Impact,
            other => return Err(Error::format_invalid(format!("bad vector type tag {}", other))),
        };
        let location = match bytes[1] {
            0 => VectorLocation::Inline,
            1 => VectorLocation::InVectorFile,
            other => {
                return Err(Error::format_invalid(format!("bad vector location tag {}", other)))
            }
        };
        let mut pos = 2;
        let (payload_size, n) = vbyte::decode(&bytes[pos..])?;
        pos += n;
        let (f_t, n) = vbyte::decode(&bytes[pos..])?;
        pos += n;
        let (big_f_t, n) = vbyte::decode(&bytes[pos..])?;
        pos += n;
        let payload = match location {
            VectorLocation::Inline => {
                let end = pos + payload_size as usize;
                if end > bytes.len() {
                    return Err(Error::format_invalid("inline payload runs past header bytes"));
                }
                let payload = VectorPayload::Inline(bytes[pos..end].to_vec());
                pos = end;
                payload
            }
            VectorLocation::InVectorFile => {
                let (fileno, n) = vbyte::decode(&bytes[pos..])?;
                pos += n;
                let (offset, n) = vbyte::decode(&bytes[pos..])?;
                pos += n;
                VectorPayload::InVectorFile { fileno: fileno as u32, offset }
            }
        };
        Ok((VectorHeader { vtype, f_t: f_t as u32, big_f_t, payload_size, payload }, pos))
    }
}

/// Encodes one or more headers under a single vocabulary key (spec.md
/// §4.7: impact-ordered builds store both a docwp and an impact header so
/// non-impact metrics stay queryable). A leading count byte, then each
/// header back to back — `VectorHeader::decode`'s returned length makes
/// each entry self-delimiting.
pub fn encode_headers(headers: &[VectorHeader]) -> Vec<u8> {
    let mut out = Vec::new();
    out.push(headers.len() as u8);
    for header in headers {
        out.extend_from_slice(&header.encode());
    }
    out
}

pub fn decode_headers(bytes: &[u8]) -> Result<Vec<VectorHeader>> {
    if bytes.is_empty() {
        return Err(Error::format_invalid("truncated vocabulary entry"));
    }
    let count = bytes[0] as usize;
    let mut pos = 1;
    let mut out = Vec::with_capacity(count);
    for _ in 0..count {
        let (header, n) = VectorHeader::decode(&bytes[pos..])?;
        pos += n;
        out.push(header);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_inline_header() {
        let header = VectorHeader {
            vtype: VectorType::Docwp,
            f_t: 3,
            big_f_t: 7,
            payload_size: 4,
            payload: VectorPayload::Inline(vec![1, 2, 3, 4]),
        };
        let bytes = header.encode();
        let (decoded, consumed) = VectorHeader::decode(&bytes).unwrap();
        assert_eq!(decoded, header);
        assert_eq!(consumed, bytes.len());
    }

    #[test]
    fn round_trips_file_header() {
        let header = VectorHeader {
            vtype: VectorType::Impact,
            f_t: 100,
            big_f_t: 4096,
            payload_size: 512,
            payload: VectorPayload::InVectorFile { fileno: 3, offset: 65536 },
        };
        let bytes = header.encode();
        let (decoded, _) = VectorHeader::decode(&bytes).unwrap();
        assert_eq!(decoded, header);
    }

    #[test]
    fn round_trips_two_headers_under_one_entry() {
        let docwp = VectorHeader {
            vtype: VectorType::Docwp,
            f_t: 3,
            big_f_t: 7,
            payload_size: 4,
            payload: VectorPayload::Inline(vec![1, 2, 3, 4]),
        };
        let impact = VectorHeader {
            vtype: VectorType::Impact,
            f_t: 3,
            big_f_t: 7,
            payload_size: 2,
            payload: VectorPayload::Inline(vec![9, 9]),
        };
        let bytes = encode_headers(&[docwp.clone(), impact.clone()]);
        let decoded = decode_headers(&bytes).unwrap();
        assert_eq!(decoded, vec![docwp, impact]);
    }
}
