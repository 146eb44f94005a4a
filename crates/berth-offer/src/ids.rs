//! Identity generation for reservations, volumes, tasks and executors.
//!
//! Every id the evaluator mints comes through the `IdSource` trait so
//! tests can substitute a deterministic sequence and compare evaluation
//! output byte for byte.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use uuid::Uuid;

/// Source of the opaque ids attached to reservations, persistent volumes,
/// task ids and executor ids.
pub trait IdSource: fmt::Debug + Send + Sync {
    fn next_id(&self) -> String;
}

/// Production source: random v4 UUIDs.
#[derive(Debug, Default)]
pub struct RandomIds;

impl IdSource for RandomIds {
    fn next_id(&self) -> String {
        Uuid::new_v4().to_string()
    }
}

/// Deterministic source for tests: UUID-shaped ids counting up from one.
#[derive(Debug, Default)]
pub struct SequentialIds(AtomicU64);

impl IdSource for SequentialIds {
    fn next_id(&self) -> String {
        let n = self.0.fetch_add(1, Ordering::Relaxed) + 1;
        format!("00000000-0000-0000-0000-{n:012x}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_ids_are_distinct() {
        let ids = RandomIds;
        assert_ne!(ids.next_id(), ids.next_id());
    }

    #[test]
    fn sequential_ids_count_up() {
        let ids = SequentialIds::default();
        assert_eq!(ids.next_id(), "00000000-0000-0000-0000-000000000001");
        assert_eq!(ids.next_id(), "00000000-0000-0000-0000-000000000002");
    }

    #[test]
    fn sequential_ids_parse_as_uuids() {
        let ids = SequentialIds::default();
        assert!(Uuid::parse_str(&ids.next_id()).is_ok());
    }
}
