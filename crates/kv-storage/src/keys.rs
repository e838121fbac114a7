//! Binary key encoding: the object key, the secondary-index key grammar,
//! and the TTL key. Every encoding here is chosen so that a byte-wise
//! lexicographic comparison of keys matches the declared sort order of the
//! values they encode — the property §8's "binary-lex order equals declared
//! sort order" law depends on.

use core_types::ObjectId;

/// One value a field can hold for indexing purposes. This is the typed
/// slice of a dataunit field that the key encoder understands; richer
/// nested structures are not index targets.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Bool(bool),
    Uint(u64),
    Int(i64),
    Float(f64),
    Str(String),
    DateTimeMillis(i64),
    ObjectId(ObjectId),
    Null,
}

const TAG_BOOL: u8 = 0x01;
const TAG_UINT: u8 = 0x02;
const TAG_INT: u8 = 0x03;
const TAG_FLOAT: u8 = 0x04;
const TAG_STRING: u8 = 0x05;
const TAG_DATETIME: u8 = 0x06;
const TAG_OBJECT_ID: u8 = 0x07;
const TAG_NULL: u8 = 0x00;

/// Order-preserving sign-bit flip: two's-complement integers compare
/// correctly as unsigned once the sign bit is inverted. The classic varint
/// ZigZag transform (`(n << 1) ^ (n >> 63)`) does not actually preserve the
/// signed order once the bytes are compared as unsigned big-endian (e.g.
/// -2 and 2 land on opposite sides of 0 and -1), which would violate the
/// key-ordering invariant index scans rely on, so this encodes the
/// sign-flip variant instead. See DESIGN.md.
fn order_preserving_i64(n: i64) -> u64 {
    (n as u64) ^ (1u64 << 63)
}

fn order_preserving_f64(f: f64) -> u64 {
    let bits = f.to_bits();
    let mask = if bits & (1u64 << 63) != 0 {
        u64::MAX
    } else {
        1u64 << 63
    };
    bits ^ mask
}

/// Append one field's encoded bytes (`encType ‖ encBytes`) to `out`.
pub fn encode_field(value: &FieldValue, out: &mut Vec<u8>) {
    match value {
        FieldValue::Null => out.push(TAG_NULL),
        FieldValue::Bool(b) => {
            out.push(TAG_BOOL);
            out.push(u8::from(*b));
        }
        FieldValue::Uint(v) => {
            out.push(TAG_UINT);
            out.extend_from_slice(&v.to_be_bytes());
        }
        FieldValue::Int(v) => {
            out.push(TAG_INT);
            out.extend_from_slice(&order_preserving_i64(*v).to_be_bytes());
        }
        FieldValue::Float(v) => {
            out.push(TAG_FLOAT);
            out.extend_from_slice(&order_preserving_f64(*v).to_be_bytes());
        }
        FieldValue::Str(s) => {
            out.push(TAG_STRING);
            for &byte in s.as_bytes() {
                if byte == 0x00 {
                    out.push(0x00);
                    out.push(0xFF);
                } else {
                    out.push(byte);
                }
            }
            out.push(0x00);
            out.push(0x00);
        }
        FieldValue::DateTimeMillis(millis) => {
            out.push(TAG_DATETIME);
            out.extend_from_slice(&order_preserving_i64(*millis).to_be_bytes());
        }
        FieldValue::ObjectId(id) => {
            out.push(TAG_OBJECT_ID);
            out.extend_from_slice(id.as_bytes());
        }
    }
}

pub fn encode_fields(values: &[FieldValue]) -> Vec<u8> {
    let mut out = Vec::new();
    for value in values {
        encode_field(value, &mut out);
    }
    out
}

/// `modelId(8B) ‖ topic ‖ 0x00 ‖ objectId(12B)`.
pub fn object_key(model_id: u64, topic: &str, id: &ObjectId) -> Vec<u8> {
    let mut key = Vec::with_capacity(8 + topic.len() + 1 + 12);
    key.extend_from_slice(&model_id.to_be_bytes());
    key.extend_from_slice(topic.as_bytes());
    key.push(0x00);
    key.extend_from_slice(id.as_bytes());
    key
}

/// `modelId(8B) topic 0x00 indexId(4B BE) fieldEnc* objectId(12B)`.
pub fn index_key(model_id: u64, topic: &str, index_id: u32, fields: &[FieldValue], id: &ObjectId) -> Vec<u8> {
    let mut key = Vec::with_capacity(8 + topic.len() + 1 + 4 + 32 + 12);
    key.extend_from_slice(&model_id.to_be_bytes());
    key.extend_from_slice(topic.as_bytes());
    key.push(0x00);
    key.extend_from_slice(&index_id.to_be_bytes());
    encode_fields_into(fields, &mut key);
    key.extend_from_slice(id.as_bytes());
    key
}

/// The index-key prefix shared by every key under one (model, topic, index,
/// leading-field-values) combination — everything up to but not including
/// the trailing `objectId`. Used to build scan bounds.
pub fn index_key_prefix(model_id: u64, topic: &str, index_id: u32, fields: &[FieldValue]) -> Vec<u8> {
    let mut key = Vec::with_capacity(8 + topic.len() + 1 + 4 + 32);
    key.extend_from_slice(&model_id.to_be_bytes());
    key.extend_from_slice(topic.as_bytes());
    key.push(0x00);
    key.extend_from_slice(&index_id.to_be_bytes());
    encode_fields_into(fields, &mut key);
    key
}

fn encode_fields_into(fields: &[FieldValue], out: &mut Vec<u8>) {
    for value in fields {
        encode_field(value, out);
    }
}

/// `expiryUnixSeconds(u32 BE) ‖ objectIdBytes`.
pub fn ttl_key(expiry_unix_secs: u32, id: &ObjectId) -> Vec<u8> {
    let mut key = Vec::with_capacity(4 + 12);
    key.extend_from_slice(&expiry_unix_secs.to_be_bytes());
    key.extend_from_slice(id.as_bytes());
    key
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn int_encoding_preserves_signed_order() {
        let mut values: Vec<i64> = vec![-1_000_000, -2, -1, 0, 1, 2, 1_000_000];
        let mut encoded: Vec<Vec<u8>> = values
            .iter()
            .map(|v| {
                let mut out = Vec::new();
                encode_field(&FieldValue::Int(*v), &mut out);
                out
            })
            .collect();
        let mut sorted_pairs: Vec<(i64, Vec<u8>)> = values.drain(..).zip(encoded.drain(..)).collect();
        sorted_pairs.sort_by(|a, b| a.1.cmp(&b.1));
        let recovered: Vec<i64> = sorted_pairs.iter().map(|(v, _)| *v).collect();
        let mut expected = recovered.clone();
        expected.sort();
        assert_eq!(recovered, expected);
    }

    #[test]
    fn float_encoding_preserves_order_across_sign() {
        let values = [-3.5, -0.001, 0.0, 0.001, 3.5];
        let mut encoded: Vec<Vec<u8>> = values
            .iter()
            .map(|v| {
                let mut out = Vec::new();
                encode_field(&FieldValue::Float(*v), &mut out);
                out
            })
            .collect();
        let sorted = encoded.clone();
        encoded.sort();
        assert_eq!(encoded, sorted);
    }

    #[test]
    fn string_escaping_round_trips_through_ordering() {
        let a = {
            let mut out = Vec::new();
            encode_field(&FieldValue::Str("abc".into()), &mut out);
            out
        };
        let b = {
            let mut out = Vec::new();
            encode_field(&FieldValue::Str("abd".into()), &mut out);
            out
        };
        assert!(a < b);
    }

    #[test]
    fn object_key_layout_matches_grammar() {
        let id = ObjectId::with_timestamp(1_700_000_000);
        let key = object_key(42, "t1", &id);
        assert_eq!(&key[0..8], &42u64.to_be_bytes());
        assert_eq!(&key[8..10], b"t1");
        assert_eq!(key[10], 0x00);
        assert_eq!(&key[11..23], id.as_bytes());
    }

    #[test]
    fn index_key_prefix_is_a_true_prefix_of_the_full_key() {
        let id = ObjectId::new();
        let fields = vec![FieldValue::Str("a@b".into())];
        let prefix = index_key_prefix(1, "t1", 7, &fields);
        let full = index_key(1, "t1", 7, &fields, &id);
        assert!(full.starts_with(&prefix));
    }
}
