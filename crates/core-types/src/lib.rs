//! # Core Types
//!
//! Foundational value types shared by the concurrency substrate, the storage
//! engine, and the RPC transport: the object identifier, topic and date-range
//! partition keys, and the error taxonomy every async operation completes
//! with.
//!
//! Nothing in this crate depends on any other layer of the stack; it exists
//! so that `kv-storage`, `rpc-transport`, `task-runtime` and `bridge` can
//! agree on identity and failure shape without depending on each other.

pub mod date_range;
pub mod error;
pub mod object_id;
pub mod topic;

pub use date_range::{DateRange, DateRangeType};
pub use error::{CoreError, CoreResult, ErrorKind};
pub use object_id::ObjectId;
pub use topic::Topic;
