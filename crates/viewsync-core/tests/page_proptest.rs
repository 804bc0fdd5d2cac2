//! Property-based tests for the page mutators using proptest.

use proptest::prelude::*;
use std::collections::HashSet;
use viewsync_core::page;
use viewsync_core::{total_pages_for, Record};

#[derive(Debug, Clone, PartialEq)]
struct Row {
    id: String,
    rev: u8,
}

impl Record for Row {
    fn id(&self) -> &str {
        &self.id
    }
}

fn row(id: u8, rev: u8) -> Row {
    Row {
        id: id.to_string(),
        rev,
    }
}

proptest! {
    /// Inserts never exceed the limit and never duplicate an id.
    #[test]
    fn insert_keeps_ids_unique_and_bounded(
        limit in 1u32..8,
        ops in prop::collection::vec((0u8..12, any::<u8>()), 0..60),
    ) {
        let mut rows: Vec<Row> = Vec::new();
        for (id, rev) in ops {
            rows = page::insert(&rows, row(id, rev), limit);
            prop_assert!(rows.len() <= limit as usize);
            let ids: HashSet<&str> = rows.iter().map(|r| r.id()).collect();
            prop_assert_eq!(ids.len(), rows.len());
        }
    }

    /// Removing an absent id borrows the input; removing a present one drops exactly it.
    #[test]
    fn remove_drops_only_the_target(ids in prop::collection::hash_set(0u8..50, 0..10), target in 0u8..50) {
        let rows: Vec<Row> = ids.iter().map(|&id| row(id, 0)).collect();
        let (out, removed) = page::remove(&rows, &target.to_string());
        prop_assert_eq!(removed, ids.contains(&target));
        prop_assert_eq!(out.len(), rows.len() - usize::from(removed));
        prop_assert!(page::position(&out[..], &target.to_string()).is_none());
    }

    /// `total_pages_for` is the smallest page count covering `total`.
    #[test]
    fn total_pages_covers_total(total in 0u64..10_000, limit in 1u32..100) {
        let pages = total_pages_for(total, limit);
        prop_assert!(pages * u64::from(limit) >= total);
        if total > 0 {
            prop_assert!((pages - 1) * u64::from(limit) < total);
        } else {
            prop_assert_eq!(pages, 0);
        }
    }
}
