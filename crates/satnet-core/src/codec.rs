//! Bundle wire format
//!
//! Fixed-order binary encoding, big-endian integers, length-prefixed
//! strings and payload:
//!
//! ```text
//! version        u8   (= 7)
//! id             [u8; 16]
//! source         u16 len + utf-8
//! destination    u16 len + utf-8
//! report_to      u16 len + utf-8
//! created_ms     i64
//! lifetime_ms    u64
//! priority       u8   (0 bulk, 1 normal, 2 expedited)
//! hop_count      u8
//! previous_node  u16 len + utf-8 (empty = none)
//! payload        u32 len + bytes
//! hash           [u8; 32]
//! ```
//!
//! A JSON form carrying the same logical fields is provided for debug and
//! control-plane paths.

use bytes::{BufMut, Bytes, BytesMut};
use chrono::DateTime;

use crate::bundle::{BUNDLE_VERSION, Bundle, BundleId, IntegrityHash, Priority};
use crate::eid::Eid;
use crate::error::CodecError;

const HASH_LEN: usize = 32;

/// Encode a bundle into its binary wire form
pub fn encode(bundle: &Bundle) -> Result<Bytes, CodecError> {
    let previous = bundle.previous_node.as_ref().map(Eid::as_str).unwrap_or("");
    let mut buf = BytesMut::with_capacity(encoded_len(bundle, previous));

    buf.put_u8(bundle.version);
    buf.put_slice(bundle.id.as_bytes());
    put_str(&mut buf, "source", bundle.source.as_str())?;
    put_str(&mut buf, "destination", bundle.destination.as_str())?;
    put_str(&mut buf, "report_to", bundle.report_to.as_str())?;
    buf.put_i64(bundle.creation_timestamp.timestamp_millis());
    buf.put_u64(u64::try_from(bundle.lifetime.as_millis()).unwrap_or(u64::MAX));
    buf.put_u8(bundle.priority.as_u8());
    buf.put_u8(bundle.hop_count);
    put_str(&mut buf, "previous_node", previous)?;

    let payload_len = u32::try_from(bundle.payload.len()).map_err(|_| CodecError::FieldTooLong {
        field: "payload",
        len: bundle.payload.len(),
    })?;
    buf.put_u32(payload_len);
    buf.put_slice(&bundle.payload);
    buf.put_slice(bundle.integrity_hash.as_bytes());

    Ok(buf.freeze())
}

/// Decode a bundle from its binary wire form
///
/// The integrity hash is recomputed and compared, so a successfully decoded
/// bundle is known to be uncorrupted.
pub fn decode(data: &[u8]) -> Result<Bundle, CodecError> {
    let mut reader = Reader::new(data);

    let version = reader.u8()?;
    if version != BUNDLE_VERSION {
        return Err(CodecError::MalformedHeader(format!(
            "unsupported version {version}"
        )));
    }

    let id = BundleId::from_bytes(reader.array::<16>()?);
    let source = Eid::new(reader.string()?);
    let destination = Eid::new(reader.string()?);
    let report_to = Eid::new(reader.string()?);
    let created_ms = reader.i64()?;
    let creation_timestamp = DateTime::from_timestamp_millis(created_ms).ok_or_else(|| {
        CodecError::MalformedHeader(format!("creation timestamp out of range: {created_ms}"))
    })?;
    let lifetime = std::time::Duration::from_millis(reader.u64()?);
    let raw_priority = reader.u8()?;
    let priority = Priority::from_u8(raw_priority)
        .ok_or_else(|| CodecError::MalformedHeader(format!("unknown priority {raw_priority}")))?;
    let hop_count = reader.u8()?;
    let previous = reader.string()?;
    let previous_node = (!previous.is_empty()).then(|| Eid::new(previous));

    let payload_len = reader.u32()? as usize;
    let payload = reader.body(payload_len)?.to_vec();
    let hash: [u8; HASH_LEN] = reader
        .body(HASH_LEN)?
        .try_into()
        .map_err(|_| CodecError::HashMismatch)?;

    if reader.remaining() > 0 {
        return Err(CodecError::MalformedHeader(format!(
            "{} trailing bytes after bundle",
            reader.remaining()
        )));
    }

    let bundle = Bundle {
        id,
        version,
        source,
        destination,
        report_to,
        creation_timestamp,
        lifetime,
        priority,
        hop_count,
        previous_node,
        payload,
        integrity_hash: IntegrityHash(hash),
    };

    if !bundle.verify_integrity() {
        return Err(CodecError::HashMismatch);
    }
    Ok(bundle)
}

/// Encode a bundle as JSON
pub fn to_json(bundle: &Bundle) -> Result<String, CodecError> {
    serde_json::to_string(bundle).map_err(|e| CodecError::Json(e.to_string()))
}

/// Decode a bundle from JSON, verifying its integrity hash
pub fn from_json(json: &str) -> Result<Bundle, CodecError> {
    let bundle: Bundle = serde_json::from_str(json).map_err(|e| CodecError::Json(e.to_string()))?;
    if !bundle.verify_integrity() {
        return Err(CodecError::HashMismatch);
    }
    Ok(bundle)
}

fn encoded_len(bundle: &Bundle, previous: &str) -> usize {
    1 + 16
        + 2 * 4
        + bundle.source.as_str().len()
        + bundle.destination.as_str().len()
        + bundle.report_to.as_str().len()
        + previous.len()
        + 8
        + 8
        + 1
        + 1
        + 4
        + bundle.payload.len()
        + HASH_LEN
}

fn put_str(buf: &mut BytesMut, field: &'static str, value: &str) -> Result<(), CodecError> {
    let len = u16::try_from(value.len()).map_err(|_| CodecError::FieldTooLong {
        field,
        len: value.len(),
    })?;
    buf.put_u16(len);
    buf.put_slice(value.as_bytes());
    Ok(())
}

/// Bounds-checked big-endian reader
///
/// Running out of bytes in the header is a malformed header; running out
/// inside the payload or hash is a truncated payload.
struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn header(&mut self, len: usize) -> Result<&'a [u8], CodecError> {
        if self.remaining() < len {
            return Err(CodecError::MalformedHeader(format!(
                "header truncated at offset {}",
                self.pos
            )));
        }
        let slice = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    fn body(&mut self, len: usize) -> Result<&'a [u8], CodecError> {
        if self.remaining() < len {
            return Err(CodecError::TruncatedPayload {
                expected: len,
                actual: self.remaining(),
            });
        }
        let slice = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], CodecError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.header(N)?);
        Ok(out)
    }

    fn u8(&mut self) -> Result<u8, CodecError> {
        Ok(self.array::<1>()?[0])
    }

    fn u16(&mut self) -> Result<u16, CodecError> {
        Ok(u16::from_be_bytes(self.array()?))
    }

    fn u32(&mut self) -> Result<u32, CodecError> {
        Ok(u32::from_be_bytes(self.array()?))
    }

    fn u64(&mut self) -> Result<u64, CodecError> {
        Ok(u64::from_be_bytes(self.array()?))
    }

    fn i64(&mut self) -> Result<i64, CodecError> {
        Ok(i64::from_be_bytes(self.array()?))
    }

    fn string(&mut self) -> Result<String, CodecError> {
        let len = self.u16()? as usize;
        let raw = self.header(len)?;
        String::from_utf8(raw.to_vec())
            .map_err(|e| CodecError::MalformedHeader(format!("invalid utf-8: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::Utc;

    use super::*;
    use crate::validation::{BundleLimits, validate};

    fn sample() -> Bundle {
        let mut bundle = Bundle::new(
            "dtn://earth/jpl",
            "dtn://mars/rover",
            b"telemetry frame".to_vec(),
            Priority::Expedited,
            Duration::from_secs(600),
        )
        .with_report_to("dtn://earth/ops");
        bundle.hop_count = 4;
        bundle.previous_node = Some(Eid::new("dtn://relay-1"));
        bundle
    }

    #[test]
    fn test_binary_round_trip() {
        let bundle = sample();
        let bytes = encode(&bundle).unwrap();
        let decoded = decode(&bytes).unwrap();
        assert_eq!(decoded, bundle);
    }

    #[test]
    fn test_round_trip_without_previous_node_and_empty_payload() {
        let bundle = Bundle::new(
            "dtn://a",
            "dtn://b",
            Vec::new(),
            Priority::Bulk,
            Duration::from_millis(1),
        );
        let decoded = decode(&encode(&bundle).unwrap()).unwrap();
        assert_eq!(decoded, bundle);
        assert!(decoded.previous_node.is_none());
    }

    #[test]
    fn test_sub_millisecond_lifetime_round_trips() {
        let bundle = Bundle::new(
            "dtn://earth",
            "dtn://mars",
            b"ping".to_vec(),
            Priority::Normal,
            Duration::from_micros(3_600_000_500),
        );
        assert!(validate(&bundle, Utc::now(), &BundleLimits::default()).is_ok());
        assert_eq!(bundle.lifetime, Duration::from_millis(3_600_000));

        assert_eq!(decode(&encode(&bundle).unwrap()).unwrap(), bundle);
        assert_eq!(from_json(&to_json(&bundle).unwrap()).unwrap(), bundle);
    }

    #[test]
    fn test_json_round_trip_matches_binary() {
        let bundle = sample();
        let from_json = from_json(&to_json(&bundle).unwrap()).unwrap();
        let from_binary = decode(&encode(&bundle).unwrap()).unwrap();
        assert_eq!(from_json, from_binary);
    }

    #[test]
    fn test_wire_layout_prefix() {
        let bundle = sample();
        let bytes = encode(&bundle).unwrap();

        assert_eq!(bytes[0], BUNDLE_VERSION);
        assert_eq!(&bytes[1..17], bundle.id.as_bytes());
        assert_eq!(u16::from_be_bytes([bytes[17], bytes[18]]), 15);
        assert_eq!(&bytes[19..34], b"dtn://earth/jpl");
        assert_eq!(&bytes[bytes.len() - 32..], bundle.integrity_hash.as_bytes());
    }

    #[test]
    fn test_bad_version_is_malformed() {
        let mut bytes = encode(&sample()).unwrap().to_vec();
        bytes[0] = 6;
        assert!(matches!(decode(&bytes), Err(CodecError::MalformedHeader(_))));
    }

    #[test]
    fn test_empty_input_is_malformed() {
        assert!(matches!(decode(&[]), Err(CodecError::MalformedHeader(_))));
    }

    #[test]
    fn test_short_header_is_malformed() {
        let bytes = encode(&sample()).unwrap();
        assert!(matches!(
            decode(&bytes[..30]),
            Err(CodecError::MalformedHeader(_))
        ));
    }

    #[test]
    fn test_bad_priority_is_malformed() {
        let bundle = sample();
        let mut bytes = encode(&bundle).unwrap().to_vec();
        // version + id + 3 strings + created + lifetime
        let offset = 1
            + 16
            + 2
            + bundle.source.as_str().len()
            + 2
            + bundle.destination.as_str().len()
            + 2
            + bundle.report_to.as_str().len()
            + 16;
        assert_eq!(bytes[offset], 2);
        bytes[offset] = 9;
        assert!(matches!(decode(&bytes), Err(CodecError::MalformedHeader(_))));
    }

    #[test]
    fn test_truncated_payload() {
        let bytes = encode(&sample()).unwrap();
        let cut = &bytes[..bytes.len() - 40];
        assert!(matches!(
            decode(cut),
            Err(CodecError::TruncatedPayload { .. })
        ));
    }

    #[test]
    fn test_missing_hash_is_truncated() {
        let bytes = encode(&sample()).unwrap();
        let cut = &bytes[..bytes.len() - 10];
        assert!(matches!(
            decode(cut),
            Err(CodecError::TruncatedPayload { expected: 32, actual: 22 })
        ));
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        let mut bytes = encode(&sample()).unwrap().to_vec();
        bytes.push(0);
        assert!(matches!(decode(&bytes), Err(CodecError::MalformedHeader(_))));
    }

    #[test]
    fn test_corrupted_payload_is_hash_mismatch() {
        let bundle = sample();
        let mut bytes = encode(&bundle).unwrap().to_vec();
        let payload_start = bytes.len() - 32 - bundle.payload.len();
        bytes[payload_start] ^= 0x01;
        assert_eq!(decode(&bytes), Err(CodecError::HashMismatch));
    }

    #[test]
    fn test_oversized_eid_rejected_on_encode() {
        let bundle = Bundle::new(
            "x".repeat(70_000),
            "dtn://b",
            vec![],
            Priority::Normal,
            Duration::from_secs(1),
        );
        assert!(matches!(
            encode(&bundle),
            Err(CodecError::FieldTooLong { field: "source", .. })
        ));
    }
}
