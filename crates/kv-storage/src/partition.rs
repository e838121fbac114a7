//! Date-partition registry: one column-family triple (objects, indexes,
//! TTL) per [`DateRange`], created on demand and cached for the life of the
//! [`rocksdb::DB`] handle.

use core_types::DateRange;
use parking_lot::Mutex;
use std::collections::HashMap;

/// The three column families backing one partition.
#[derive(Debug, Clone)]
pub struct PartitionCfNames {
    pub objects: String,
    pub indexes: String,
    pub ttl: String,
}

impl PartitionCfNames {
    pub fn for_range(range: &DateRange) -> Self {
        let name = range.serialize_name();
        Self {
            objects: format!("objects_{name}"),
            indexes: format!("indexes_{name}"),
            ttl: format!("ttl_{name}"),
        }
    }

    /// Column families for the single undated partition shared by models
    /// with no [`core_types::DateRangeType`] configured.
    pub fn unpartitioned() -> Self {
        Self {
            objects: "objects_default".to_string(),
            indexes: "indexes_default".to_string(),
            ttl: "ttl_default".to_string(),
        }
    }

    pub fn all(&self) -> [&str; 3] {
        [&self.objects, &self.indexes, &self.ttl]
    }
}

/// Tracks which partitions have had their column families created so the
/// engine only issues `create_cf` once per partition per process lifetime.
#[derive(Default)]
pub struct PartitionRegistry {
    known: Mutex<HashMap<String, PartitionCfNames>>,
}

impl PartitionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// All column-family names known at construction time, for
    /// `DB::open_cf_descriptors`. The default, unpartitioned triple is
    /// always present.
    pub fn bootstrap_cf_names() -> Vec<String> {
        let default = PartitionCfNames::unpartitioned();
        default.all().iter().map(|s| s.to_string()).collect()
    }

    pub fn register(&self, range: &DateRange) -> PartitionCfNames {
        let key = range.serialize_name().to_string();
        let mut known = self.known.lock();
        known
            .entry(key)
            .or_insert_with(|| PartitionCfNames::for_range(range))
            .clone()
    }

    pub fn is_known(&self, range: &DateRange) -> bool {
        self.known.lock().contains_key(&range.serialize_name().to_string())
    }

    pub fn known_partitions(&self) -> Vec<PartitionCfNames> {
        self.known.lock().values().cloned().collect()
    }
}
