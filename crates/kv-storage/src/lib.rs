//! # KV Storage
//!
//! A transactional, column-family-backed object store: typed CRUD over
//! [`Model`]s, deterministic binary secondary-index keys, date
//! partitioning, and TTL reclamation, queried through a typed AST.
//!
//! ```text
//! StorageEngine
//!   ├─ objects_<partition>  : modelId‖topic‖objectId      -> value‖TtlMark
//!   ├─ indexes_<partition>  : modelId‖topic‖indexId‖field* -> (empty)
//!   └─ ttl_<partition>      : expirySecs‖objectId          -> (empty)
//! ```
//!
//! Every model brings its own `MODEL_ID` and index set; the engine only
//! ever sees field values it can encode, never a model's native type.

pub mod engine;
pub mod keys;
pub mod model;
pub mod partition;
pub mod query;
pub mod ttl;

pub use engine::{EngineConfig, ReturnMode, StorageEngine, UpdateResult};
pub use keys::FieldValue;
pub use model::{IndexSpec, Model, PartitionSpec, TtlSpec};
pub use query::{Condition, Query, QueryOp, SortOrder};
pub use ttl::TtlMark;
