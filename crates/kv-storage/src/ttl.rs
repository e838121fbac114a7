//! TTL trailer on stored object values, and the RocksDB compaction filter
//! that drops expired entries during compaction rather than at read time.

use std::time::{SystemTime, UNIX_EPOCH};

/// Appended to the end of every stored object value:
/// `expiryUnixSeconds(u32 LE) ‖ flag(1B)`. `flag` is 1 when the object
/// carries a TTL at all; when 0 the `expiryUnixSeconds` field is unused and
/// the object never expires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TtlMark {
    pub expiry_unix_secs: u32,
    pub has_ttl: bool,
}

pub const TTL_MARK_LEN: usize = 5;

impl TtlMark {
    pub const fn none() -> Self {
        Self {
            expiry_unix_secs: 0,
            has_ttl: false,
        }
    }

    pub const fn expiring_at(expiry_unix_secs: u32) -> Self {
        Self {
            expiry_unix_secs,
            has_ttl: true,
        }
    }

    pub fn from_created_at(created_unix_secs: u32, ttl_secs: u32) -> Self {
        Self::expiring_at(created_unix_secs.saturating_add(ttl_secs))
    }

    pub fn is_expired_at(&self, now_unix_secs: u32) -> bool {
        self.has_ttl && self.expiry_unix_secs <= now_unix_secs
    }

    pub fn is_expired_now(&self) -> bool {
        self.is_expired_at(now_unix_secs())
    }

    pub fn encode(&self) -> [u8; TTL_MARK_LEN] {
        let mut out = [0u8; TTL_MARK_LEN];
        out[0..4].copy_from_slice(&self.expiry_unix_secs.to_le_bytes());
        out[4] = u8::from(self.has_ttl);
        out
    }

    pub fn append_to(&self, value: &mut Vec<u8>) {
        value.extend_from_slice(&self.encode());
    }

    /// Split a stored value into its payload and trailing [`TtlMark`]. A
    /// value shorter than the trailer is treated as untagged (no TTL).
    pub fn split(value: &[u8]) -> (&[u8], Self) {
        if value.len() < TTL_MARK_LEN {
            return (value, Self::none());
        }
        let split_at = value.len() - TTL_MARK_LEN;
        let (payload, trailer) = value.split_at(split_at);
        let expiry = u32::from_le_bytes(trailer[0..4].try_into().unwrap());
        let has_ttl = trailer[4] != 0;
        (
            payload,
            Self {
                expiry_unix_secs: expiry,
                has_ttl,
            },
        )
    }
}

pub fn now_unix_secs() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as u32)
        .unwrap_or(0)
}

/// RocksDB compaction filter dropping entries whose [`TtlMark`] has expired.
/// Registered per object column family so expired rows are reclaimed by
/// ordinary compaction instead of needing an explicit sweep for space
/// reclamation (the TTL secondary index, built separately, still lets a
/// sweeper find and delete expired rows promptly rather than waiting on
/// compaction).
pub fn object_compaction_filter(_level: u32, _key: &[u8], value: &[u8]) -> rocksdb::CompactionDecision {
    let (_, mark) = TtlMark::split(value);
    if mark.is_expired_now() {
        rocksdb::CompactionDecision::Remove
    } else {
        rocksdb::CompactionDecision::Keep
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mark_round_trips_through_value_bytes() {
        let mut value = b"payload".to_vec();
        let mark = TtlMark::expiring_at(1_700_000_500);
        mark.append_to(&mut value);

        let (payload, recovered) = TtlMark::split(&value);
        assert_eq!(payload, b"payload");
        assert_eq!(recovered, mark);
    }

    #[test]
    fn untagged_short_value_has_no_ttl() {
        let (payload, mark) = TtlMark::split(b"ab");
        assert_eq!(payload, b"ab");
        assert!(!mark.has_ttl);
    }

    #[test]
    fn expiry_boundary_is_inclusive() {
        let mark = TtlMark::expiring_at(1000);
        assert!(mark.is_expired_at(1000));
        assert!(!mark.is_expired_at(999));
    }
}
