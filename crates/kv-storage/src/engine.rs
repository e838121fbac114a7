//! The storage engine proper: object CRUD, secondary-index maintenance,
//! date partitioning, TTL, query execution and transactions, all layered
//! over a single `rocksdb::DB` handle with one column-family triple per
//! partition.

use crate::keys::{index_key, index_key_prefix, object_key, ttl_key};
use crate::model::Model;
use crate::partition::{PartitionCfNames, PartitionRegistry};
use crate::query::Query;
use crate::ttl::{now_unix_secs, object_compaction_filter, TtlMark};
use core_types::{CoreError, CoreResult, DateRange, ObjectId};
use parking_lot::RwLock;
use rocksdb::{BlockBasedOptions, ColumnFamilyDescriptor, IteratorMode, Options, WriteBatch, DB};
use std::path::Path;
use std::sync::Arc;

/// What an `update` call hands back: nothing (cheapest), the row as it was
/// before the mutation, or the row as it is after.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnMode {
    None,
    Before,
    After,
}

pub enum UpdateResult<M> {
    None,
    Before(M),
    After(M),
}

/// Tuning knobs mirrored from the block-cache/bloom-filter/compression
/// defaults the rest of the stack already relies on for RocksDB.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub path: String,
    pub block_cache_bytes: usize,
    pub write_buffer_bytes: usize,
    pub sync_writes: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            path: "./data/kv-storage".to_string(),
            block_cache_bytes: 256 * 1024 * 1024,
            write_buffer_bytes: 64 * 1024 * 1024,
            sync_writes: true,
        }
    }
}

impl EngineConfig {
    pub fn for_testing(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            block_cache_bytes: 8 * 1024 * 1024,
            write_buffer_bytes: 4 * 1024 * 1024,
            sync_writes: false,
        }
    }
}

pub struct StorageEngine {
    db: Arc<RwLock<DB>>,
    registry: PartitionRegistry,
    config: EngineConfig,
}

fn object_cf_options() -> Options {
    let mut opts = Options::default();
    opts.set_compression_type(rocksdb::DBCompressionType::Snappy);
    let mut block_opts = BlockBasedOptions::default();
    block_opts.set_bloom_filter(10.0, false);
    opts.set_block_based_table_factory(&block_opts);
    opts.set_compaction_filter("ttl-expiry", object_compaction_filter);
    opts
}

fn index_cf_options() -> Options {
    let mut opts = Options::default();
    opts.set_compression_type(rocksdb::DBCompressionType::Snappy);
    let mut block_opts = BlockBasedOptions::default();
    block_opts.set_bloom_filter(10.0, false);
    opts.set_block_based_table_factory(&block_opts);
    opts
}

fn ttl_cf_options() -> Options {
    Options::default()
}

fn rocks_err(context: &str, err: rocksdb::Error) -> CoreError {
    CoreError::transient_io(format!("{context}: {err}"))
}

impl StorageEngine {
    pub fn open(config: EngineConfig) -> CoreResult<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);
        opts.set_write_buffer_size(config.write_buffer_bytes);

        let default_cfs = PartitionRegistry::bootstrap_cf_names();
        let cf_descriptors: Vec<ColumnFamilyDescriptor> = default_cfs
            .iter()
            .map(|name| {
                let cf_opts = if name.starts_with("objects_") {
                    object_cf_options()
                } else if name.starts_with("indexes_") {
                    index_cf_options()
                } else {
                    ttl_cf_options()
                };
                ColumnFamilyDescriptor::new(name, cf_opts)
            })
            .collect();

        let db = DB::open_cf_descriptors(&opts, &config.path, cf_descriptors)
            .map_err(|e| rocks_err("opening storage engine", e))?;

        let registry = PartitionRegistry::new();
        let default_range = DateRange {
            range_type: core_types::DateRangeType::Year,
            year: 0,
            range: 0,
        };
        registry.register(&default_range);

        Ok(Self {
            db: Arc::new(RwLock::new(db)),
            registry,
            config,
        })
    }

    pub fn open_default(path: impl AsRef<Path>) -> CoreResult<Self> {
        Self::open(EngineConfig {
            path: path.as_ref().to_string_lossy().to_string(),
            ..Default::default()
        })
    }

    /// Resolve (creating on first use) the column-family triple a model's
    /// object belongs in.
    fn partition_for<M: Model>(&self, obj: &M) -> CoreResult<PartitionCfNames> {
        let names = match M::PARTITION {
            None => PartitionCfNames::unpartitioned(),
            Some(spec) => {
                let secs = obj
                    .partition_timestamp()
                    .unwrap_or_else(|| now_unix_secs() as i64);
                let range = DateRange::from_unix_secs(secs.max(0) as u32, spec.range_type);
                self.registry.register(&range)
            }
        };
        self.ensure_cfs_exist(&names)?;
        Ok(names)
    }

    fn ensure_cfs_exist(&self, names: &PartitionCfNames) -> CoreResult<()> {
        let db = self.db.write();
        if db.cf_handle(&names.objects).is_some() {
            return Ok(());
        }
        db.create_cf(&names.objects, &object_cf_options())
            .map_err(|e| rocks_err("creating objects column family", e))?;
        db.create_cf(&names.indexes, &index_cf_options())
            .map_err(|e| rocks_err("creating indexes column family", e))?;
        db.create_cf(&names.ttl, &ttl_cf_options())
            .map_err(|e| rocks_err("creating ttl column family", e))?;
        Ok(())
    }

    /// Insert a fresh object, enforcing unique-index constraints and
    /// maintaining every declared secondary index in the same write batch.
    pub fn create<M: Model>(&self, topic: &str, obj: &M) -> CoreResult<ObjectId> {
        let id = ObjectId::new();
        let names = self.partition_for(obj)?;
        let db = self.db.write();
        let objects_cf = db
            .cf_handle(&names.objects)
            .ok_or_else(|| CoreError::fatal("objects column family missing"))?;
        let indexes_cf = db
            .cf_handle(&names.indexes)
            .ok_or_else(|| CoreError::fatal("indexes column family missing"))?;

        for index in M::INDEXES {
            if index.unique {
                let values = obj.index_values(index);
                let prefix = index_key_prefix(M::MODEL_ID, topic, index.id, &values);
                if self.prefix_has_entry(&db, &indexes_cf, &prefix)? {
                    return Err(CoreError::unique_violation(format!(
                        "unique index {} already has an entry for this value",
                        index.name
                    )));
                }
            }
        }

        let mut batch = WriteBatch::default();
        let obj_key = object_key(M::MODEL_ID, topic, &id);
        let mut value = bincode::serialize(obj).map_err(|e| CoreError::invalid_input(e.to_string()))?;
        let ttl_mark = match M::TTL {
            Some(spec) => TtlMark::from_created_at(id.timestamp_secs(), spec.seconds),
            None => TtlMark::none(),
        };
        ttl_mark.append_to(&mut value);
        batch.put_cf(objects_cf, &obj_key, &value);

        for index in M::INDEXES {
            let values = obj.index_values(index);
            let ikey = index_key(M::MODEL_ID, topic, index.id, &values, &id);
            batch.put_cf(indexes_cf, &ikey, []);
        }

        if ttl_mark.has_ttl {
            let ttl_cf = db
                .cf_handle(&names.ttl)
                .ok_or_else(|| CoreError::fatal("ttl column family missing"))?;
            batch.put_cf(ttl_cf, ttl_key(ttl_mark.expiry_unix_secs, &id), []);
        }

        let mut write_opts = rocksdb::WriteOptions::default();
        write_opts.set_sync(self.config.sync_writes);
        db.write_opt(batch, &write_opts)
            .map_err(|e| rocks_err("writing new object", e))?;

        Ok(id)
    }

    fn prefix_has_entry(&self, db: &DB, cf: &impl rocksdb::AsColumnFamilyRef, prefix: &[u8]) -> CoreResult<bool> {
        let mut iter = db.iterator_cf(cf, IteratorMode::From(prefix, rocksdb::Direction::Forward));
        match iter.next() {
            Some(Ok((key, _))) => Ok(key.starts_with(prefix)),
            Some(Err(e)) => Err(rocks_err("scanning unique index", e)),
            None => Ok(false),
        }
    }

    pub fn get<M: Model>(&self, topic: &str, id: &ObjectId) -> CoreResult<Option<M>> {
        let names = PartitionCfNames::unpartitioned();
        let db = self.db.read();
        let Some(objects_cf) = db.cf_handle(&names.objects) else {
            return Ok(None);
        };
        let key = object_key(M::MODEL_ID, topic, id);
        match db
            .get_cf(objects_cf, &key)
            .map_err(|e| rocks_err("reading object", e))?
        {
            None => Ok(None),
            Some(raw) => {
                let (payload, mark) = TtlMark::split(&raw);
                if mark.is_expired_now() {
                    return Ok(None);
                }
                let obj: M = bincode::deserialize(payload)
                    .map_err(|e| CoreError::fatal(format!("corrupt object row: {e}")))?;
                Ok(Some(obj))
            }
        }
    }

    /// Mutate an existing object in place, re-indexing it, and return
    /// whatever `mode` asks for.
    pub fn update<M: Model + ReindexClone>(
        &self,
        topic: &str,
        id: &ObjectId,
        mode: ReturnMode,
        mutate: impl FnOnce(&mut M),
    ) -> CoreResult<UpdateResult<M>> {
        let before = self
            .get::<M>(topic, id)?
            .ok_or_else(|| CoreError::not_found("object not found"))?;
        let before_for_reindex = before.clone_for_reindex();
        let mut after = before.clone_for_reindex();
        mutate(&mut after);

        let names = self.partition_for(&after)?;
        let db = self.db.write();
        let objects_cf = db
            .cf_handle(&names.objects)
            .ok_or_else(|| CoreError::fatal("objects column family missing"))?;
        let indexes_cf = db
            .cf_handle(&names.indexes)
            .ok_or_else(|| CoreError::fatal("indexes column family missing"))?;

        let mut batch = WriteBatch::default();
        for index in M::INDEXES {
            let old_key = index_key(M::MODEL_ID, topic, index.id, &before_for_reindex.index_values(index), id);
            batch.delete_cf(indexes_cf, &old_key);
            let new_key = index_key(M::MODEL_ID, topic, index.id, &after.index_values(index), id);
            batch.put_cf(indexes_cf, &new_key, []);
        }

        let obj_key = object_key(M::MODEL_ID, topic, id);
        let mut value =
            bincode::serialize(&after).map_err(|e| CoreError::invalid_input(e.to_string()))?;
        let ttl_mark = match M::TTL {
            Some(spec) => TtlMark::from_created_at(id.timestamp_secs(), spec.seconds),
            None => TtlMark::none(),
        };
        ttl_mark.append_to(&mut value);
        batch.put_cf(objects_cf, &obj_key, &value);

        let mut write_opts = rocksdb::WriteOptions::default();
        write_opts.set_sync(self.config.sync_writes);
        db.write_opt(batch, &write_opts)
            .map_err(|e| rocks_err("writing updated object", e))?;

        Ok(match mode {
            ReturnMode::None => UpdateResult::None,
            ReturnMode::Before => UpdateResult::Before(before),
            ReturnMode::After => UpdateResult::After(after),
        })
    }

    pub fn delete<M: Model>(&self, topic: &str, id: &ObjectId) -> CoreResult<bool> {
        let Some(existing) = self.get::<M>(topic, id)? else {
            return Ok(false);
        };
        let names = PartitionCfNames::unpartitioned();
        let db = self.db.write();
        let objects_cf = db
            .cf_handle(&names.objects)
            .ok_or_else(|| CoreError::fatal("objects column family missing"))?;
        let indexes_cf = db
            .cf_handle(&names.indexes)
            .ok_or_else(|| CoreError::fatal("indexes column family missing"))?;

        let mut batch = WriteBatch::default();
        batch.delete_cf(objects_cf, object_key(M::MODEL_ID, topic, id));
        for index in M::INDEXES {
            let ikey = index_key(M::MODEL_ID, topic, index.id, &existing.index_values(index), id);
            batch.delete_cf(indexes_cf, &ikey);
        }

        let mut write_opts = rocksdb::WriteOptions::default();
        write_opts.set_sync(self.config.sync_writes);
        db.write_opt(batch, &write_opts)
            .map_err(|e| rocks_err("deleting object", e))?;
        Ok(true)
    }

    /// Execute a query against one of a model's declared indexes,
    /// collecting matching objects in index order.
    pub fn find<M: Model>(&self, topic: &str, query: &Query) -> CoreResult<Vec<M>> {
        let names = PartitionCfNames::unpartitioned();
        let db = self.db.read();
        let Some(indexes_cf) = db.cf_handle(&names.indexes) else {
            return Ok(Vec::new());
        };
        let Some(objects_cf) = db.cf_handle(&names.objects) else {
            return Ok(Vec::new());
        };

        let prefix = index_key_prefix(M::MODEL_ID, topic, query.index.id, &query.equality_prefix());
        let mut results = Vec::new();
        let residual = query.residual_conditions();

        let iter = db.iterator_cf(indexes_cf, IteratorMode::From(&prefix, rocksdb::Direction::Forward));
        for item in iter {
            let (ikey, _) = item.map_err(|e| rocks_err("scanning index", e))?;
            if !ikey.starts_with(&prefix) {
                break;
            }
            let id_bytes: [u8; 12] = ikey[ikey.len() - 12..].try_into().unwrap();
            let id = ObjectId::from_bytes(id_bytes);

            if let Some(limit) = query.limit {
                if results.len() >= limit {
                    break;
                }
            }

            let obj_key = object_key(M::MODEL_ID, topic, &id);
            let Some(raw) = db
                .get_cf(objects_cf, &obj_key)
                .map_err(|e| rocks_err("reading indexed object", e))?
            else {
                continue;
            };
            let (payload, mark) = TtlMark::split(&raw);
            if mark.is_expired_now() {
                continue;
            }
            let obj: M = bincode::deserialize(payload)
                .map_err(|e| CoreError::fatal(format!("corrupt object row: {e}")))?;

            if residual.iter().all(|cond| {
                let values = obj.index_values(&query.index);
                values
                    .get(cond.field_index)
                    .map(|v| cond.matches(v))
                    .unwrap_or(false)
            }) {
                results.push(obj);
            }
        }

        if query.order == crate::query::SortOrder::Desc {
            results.reverse();
        }
        Ok(results)
    }
}

/// Models need a cheap way to produce a mutable scratch copy for
/// before/after re-indexing during `update`; this is satisfied by any
/// `Clone` model, which covers every model in this engine.
pub trait ReindexClone: Sized {
    fn clone_for_reindex(&self) -> Self;
}

impl<M: Model + Clone> ReindexClone for M {
    fn clone_for_reindex(&self) -> Self {
        self.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::FieldValue;
    use crate::model::IndexSpec;
    use crate::query::Query;
    use serde::{Deserialize, Serialize};
    use tempfile::TempDir;

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct Account {
        email: String,
        age: i64,
    }

    impl Model for Account {
        const MODEL_ID: u64 = 7;
        const COLLECTION: &'static str = "accounts";
        const INDEXES: &'static [IndexSpec] = &[IndexSpec::new(1, "by_email", &["email"], true)];
    }

    fn engine() -> (TempDir, StorageEngine) {
        let dir = TempDir::new().unwrap();
        let engine = StorageEngine::open(EngineConfig::for_testing(dir.path().to_string_lossy().to_string())).unwrap();
        (dir, engine)
    }

    #[test]
    fn create_then_get_round_trips() {
        let (_dir, engine) = engine();
        let acc = Account {
            email: "a@example.com".into(),
            age: 30,
        };
        let id = engine.create("t1", &acc).unwrap();
        let fetched: Account = engine.get("t1", &id).unwrap().unwrap();
        assert_eq!(fetched.email, acc.email);
    }

    #[test]
    fn unique_index_rejects_duplicate() {
        let (_dir, engine) = engine();
        let acc = Account {
            email: "dup@example.com".into(),
            age: 1,
        };
        engine.create("t1", &acc).unwrap();
        let err = engine.create("t1", &acc).unwrap_err();
        assert_eq!(err.kind, core_types::ErrorKind::UniqueViolation);
    }

    #[test]
    fn update_reindexes_and_returns_after_value() {
        let (_dir, engine) = engine();
        let acc = Account {
            email: "before@example.com".into(),
            age: 20,
        };
        let id = engine.create("t1", &acc).unwrap();
        let result = engine
            .update::<Account>("t1", &id, ReturnMode::After, |a| a.age = 21)
            .unwrap();
        match result {
            UpdateResult::After(updated) => assert_eq!(updated.age, 21),
            _ => panic!("expected After"),
        }
    }

    #[test]
    fn delete_removes_object_and_index_entry() {
        let (_dir, engine) = engine();
        let acc = Account {
            email: "gone@example.com".into(),
            age: 5,
        };
        let id = engine.create("t1", &acc).unwrap();
        assert!(engine.delete::<Account>("t1", &id).unwrap());
        assert!(engine.get::<Account>("t1", &id).unwrap().is_none());
    }

    #[test]
    fn find_returns_matching_rows_by_index() {
        let (_dir, engine) = engine();
        engine
            .create(
                "t1",
                &Account {
                    email: "x@example.com".into(),
                    age: 40,
                },
            )
            .unwrap();
        let query = Query::new(Account::INDEXES[0].clone()).eq(0, FieldValue::Str("x@example.com".into()));
        let found: Vec<Account> = engine.find("t1", &query).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].age, 40);
    }
}
