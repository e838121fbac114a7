//! Compile-time description of an object collection: its indexes, its
//! optional date-partitioning mode, and its optional TTL field.

use crate::keys::FieldValue;
use core_types::DateRangeType;
use serde_json::Value;

/// One secondary index over a model: an ordered list of field paths plus a
/// uniqueness flag. `fields` are JSON-pointer-style dotted paths
/// (`"profile.email"`) resolved against the object's `serde_json::Value`
/// form at write time.
#[derive(Debug, Clone, Copy)]
pub struct IndexSpec {
    pub id: u32,
    pub name: &'static str,
    pub fields: &'static [&'static str],
    pub unique: bool,
}

impl IndexSpec {
    pub const fn new(id: u32, name: &'static str, fields: &'static [&'static str], unique: bool) -> Self {
        Self {
            id,
            name,
            fields,
            unique,
        }
    }
}

/// How a model's objects are spread across date-partitioned column-family
/// triples. `None` means the model lives in one undated partition.
#[derive(Debug, Clone, Copy)]
pub struct PartitionSpec {
    pub range_type: DateRangeType,
    /// Dotted path to the field whose value decides which partition an
    /// object belongs to; `None` uses the object's `ObjectId` timestamp.
    pub date_field: Option<&'static str>,
}

/// How long an object survives after creation before becoming eligible for
/// TTL reclamation.
#[derive(Debug, Clone, Copy)]
pub struct TtlSpec {
    pub seconds: u32,
}

/// Everything the storage engine needs to know about one collection of
/// objects: its stable numeric identity, its secondary indexes, and its
/// optional partitioning and TTL policy.
pub trait Model: serde::Serialize + serde::de::DeserializeOwned + Send + Sync + 'static {
    /// Stable 64-bit identity, distinct per model, embedded as the leading
    /// 8 bytes of every key this model produces.
    const MODEL_ID: u64;
    const COLLECTION: &'static str;
    const INDEXES: &'static [IndexSpec];
    const PARTITION: Option<PartitionSpec> = None;
    const TTL: Option<TtlSpec> = None;

    /// Resolve one index's field values out of this object, in declared
    /// field order. A missing field encodes as [`FieldValue::Null`].
    fn index_values(&self, index: &IndexSpec) -> Vec<FieldValue> {
        let value = serde_json::to_value(self).expect("model serializes to json for indexing");
        index
            .fields
            .iter()
            .map(|path| field_value_at(&value, path))
            .collect()
    }

    /// The timestamp this object partitions on, used only when
    /// `PARTITION.date_field` is set; unix seconds.
    fn partition_timestamp(&self) -> Option<i64> {
        None
    }
}

fn field_value_at(root: &Value, dotted_path: &str) -> FieldValue {
    let mut current = root;
    for segment in dotted_path.split('.') {
        match current.get(segment) {
            Some(next) => current = next,
            None => return FieldValue::Null,
        }
    }
    json_to_field_value(current)
}

fn json_to_field_value(value: &Value) -> FieldValue {
    match value {
        Value::Null => FieldValue::Null,
        Value::Bool(b) => FieldValue::Bool(*b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                FieldValue::Int(i)
            } else if let Some(u) = n.as_u64() {
                FieldValue::Uint(u)
            } else {
                FieldValue::Float(n.as_f64().unwrap_or_default())
            }
        }
        Value::String(s) => FieldValue::Str(s.clone()),
        Value::Array(_) | Value::Object(_) => FieldValue::Null,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Serialize, Deserialize)]
    struct Account {
        email: String,
        age: i64,
    }

    impl Model for Account {
        const MODEL_ID: u64 = 1;
        const COLLECTION: &'static str = "accounts";
        const INDEXES: &'static [IndexSpec] = &[IndexSpec {
            id: 1,
            name: "by_email",
            fields: &["email"],
            unique: true,
        }];
    }

    #[test]
    fn resolves_dotted_field_paths() {
        let acc = Account {
            email: "a@example.com".into(),
            age: 30,
        };
        let index = IndexSpec::new(1, "by_email", &["email"], true);
        let values = acc.index_values(&index);
        assert_eq!(values, vec![FieldValue::Str("a@example.com".into())]);
    }

    #[test]
    fn missing_field_encodes_as_null() {
        let acc = Account {
            email: "a@example.com".into(),
            age: 30,
        };
        let index = IndexSpec::new(2, "by_missing", &["nope"], false);
        assert_eq!(acc.index_values(&index), vec![FieldValue::Null]);
    }
}
