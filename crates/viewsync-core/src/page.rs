//! Bounded page results and the pure mutators that reconcile one row into a page.
//!
//! Pages are "most recently touched" windows: new rows are prepended, and a page
//! that grows beyond its limit silently evicts its last row from the cached
//! window. The evicted row is not deleted; a later full refresh restores exact
//! server ordering.

use crate::{Record, Result, SyncError, ViewParams};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::HashSet;

/// One cached page of a view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageResult<R> {
    pub rows: Vec<R>,
    pub page: u32,
    pub limit: u32,
    pub total: u64,
    pub total_pages: u64,
}

/// `ceil(total / limit)`, or zero for an empty collection.
pub fn total_pages_for(total: u64, limit: u32) -> u64 {
    if total == 0 || limit == 0 {
        0
    } else {
        total.div_ceil(u64::from(limit))
    }
}

impl<R> PageResult<R> {
    pub fn new(rows: Vec<R>, page: u32, limit: u32, total: u64) -> Self {
        Self {
            rows,
            page,
            limit,
            total,
            total_pages: total_pages_for(total, limit),
        }
    }

    pub fn empty(page: u32, limit: u32) -> Self {
        Self::new(Vec::new(), page, limit, 0)
    }

    /// Copy with new rows and total; `total_pages` is recomputed.
    pub fn with_rows(&self, rows: Vec<R>, total: u64) -> Self {
        Self::new(rows, self.page, self.limit, total)
    }

    pub fn is_consistent(&self) -> bool {
        self.total_pages == total_pages_for(self.total, self.limit)
            && self.rows.len() <= self.limit as usize
    }
}

impl<R: Record> PageResult<R> {
    pub fn position(&self, id: &str) -> Option<usize> {
        position(&self.rows, id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.position(id).is_some()
    }

    /// Check a fetched page before it is cached under `params`: page and limit
    /// must agree with the view, rows must fit the limit with unique ids, and
    /// `total_pages` must follow from `total`.
    pub fn validate_for(&self, params: &ViewParams) -> Result<()> {
        if self.page != params.page() || self.limit != params.limit() {
            return Err(SyncError::InvalidParams(format!(
                "page {} (limit {}) does not match view page {} (limit {})",
                self.page,
                self.limit,
                params.page(),
                params.limit()
            )));
        }
        if self.rows.len() > self.limit as usize {
            return Err(SyncError::InvalidParams(format!(
                "{} rows exceed limit {}",
                self.rows.len(),
                self.limit
            )));
        }
        if self.total_pages != total_pages_for(self.total, self.limit) {
            return Err(SyncError::InvalidParams(format!(
                "totalPages {} does not follow from total {} and limit {}",
                self.total_pages, self.total, self.limit
            )));
        }
        let mut seen = HashSet::with_capacity(self.rows.len());
        if let Some(dup) = self.rows.iter().map(Record::id).find(|id| !seen.insert(*id)) {
            return Err(SyncError::InvalidParams(format!("duplicate row id '{}'", dup)));
        }
        Ok(())
    }
}

pub fn position<R: Record>(rows: &[R], id: &str) -> Option<usize> {
    rows.iter().position(|r| r.id() == id)
}

/// Insert `new_row` at the head of the page, or replace it in place when its id
/// is already present. The result never exceeds `limit` rows.
pub fn insert<R: Record>(rows: &[R], new_row: R, limit: u32) -> Vec<R> {
    if let Some(idx) = position(rows, new_row.id()) {
        let mut out = rows.to_vec();
        out[idx] = new_row;
        return out;
    }

    let mut out = Vec::with_capacity(rows.len() + 1);
    out.push(new_row);
    out.extend_from_slice(rows);
    out.truncate(limit as usize);
    out
}

/// Remove the row with `id`. When absent the original slice is handed back
/// borrowed and `removed` is false.
pub fn remove<'a, R: Record>(rows: &'a [R], id: &str) -> (Cow<'a, [R]>, bool) {
    match position(rows, id) {
        Some(idx) => {
            let mut out = rows.to_vec();
            out.remove(idx);
            (Cow::Owned(out), true)
        }
        None => (Cow::Borrowed(rows), false),
    }
}

/// Replace the row with `id` wholesale; borrowed no-op when absent.
pub fn update<'a, R: Record>(rows: &'a [R], id: &str, new_row: R) -> Cow<'a, [R]> {
    match position(rows, id) {
        Some(idx) => {
            let mut out = rows.to_vec();
            out[idx] = new_row;
            Cow::Owned(out)
        }
        None => Cow::Borrowed(rows),
    }
}
