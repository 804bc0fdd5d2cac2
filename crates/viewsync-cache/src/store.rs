use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};
use viewsync_core::{PageResult, ViewParams};

/// Snapshot of one cached view.
#[derive(Debug, Clone)]
pub struct CachedView<R> {
    pub params: ViewParams,
    pub result: Arc<PageResult<R>>,
    /// Set when an event could not be reflected exactly and the page should be refetched.
    pub stale: bool,
}

#[derive(Debug)]
struct Slot<R> {
    result: Arc<PageResult<R>>,
    stale: bool,
}

/// Last-known page result of every open view, grouped by resource.
///
/// Entries are immutable snapshots behind `Arc`; every write replaces the whole
/// entry, so a reader holding an older `Arc` never observes a partial update and
/// `Arc::ptr_eq` tells it whether anything changed.
#[derive(Debug)]
pub struct ViewCacheStore<R> {
    entries: RwLock<HashMap<String, HashMap<ViewParams, Slot<R>>>>,
}

impl<R> Default for ViewCacheStore<R> {
    fn default() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }
}

impl<R> ViewCacheStore<R> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every cached view of `resource`, in no particular order.
    pub fn get_all(&self, resource: &str) -> Vec<CachedView<R>> {
        self.entries
            .read()
            .get(resource)
            .map(|views| {
                views
                    .iter()
                    .map(|(params, slot)| CachedView {
                        params: params.clone(),
                        result: Arc::clone(&slot.result),
                        stale: slot.stale,
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn get(&self, resource: &str, params: &ViewParams) -> Option<Arc<PageResult<R>>> {
        self.entries
            .read()
            .get(resource)?
            .get(params)
            .map(|slot| Arc::clone(&slot.result))
    }

    pub fn entry(&self, resource: &str, params: &ViewParams) -> Option<CachedView<R>> {
        let entries = self.entries.read();
        let slot = entries.get(resource)?.get(params)?;
        Some(CachedView {
            params: params.clone(),
            result: Arc::clone(&slot.result),
            stale: slot.stale,
        })
    }

    /// Unconditionally replace the entry with a fresh result (e.g. a completed
    /// fetch). Clears the stale flag.
    pub fn set(&self, resource: &str, params: ViewParams, result: PageResult<R>) -> Arc<PageResult<R>> {
        let result = Arc::new(result);
        self.entries
            .write()
            .entry(resource.to_string())
            .or_default()
            .insert(
                params,
                Slot {
                    result: Arc::clone(&result),
                    stale: false,
                },
            );
        result
    }

    /// Replace the result of an existing entry, keeping its stale flag. Entries
    /// closed in the meantime are not resurrected.
    pub(crate) fn commit(&self, resource: &str, params: &ViewParams, result: Arc<PageResult<R>>) -> bool {
        let mut entries = self.entries.write();
        match entries.get_mut(resource).and_then(|views| views.get_mut(params)) {
            Some(slot) => {
                slot.result = result;
                true
            }
            None => false,
        }
    }

    /// Flag a view for refetch. Returns true when the flag was newly set.
    pub fn mark_stale(&self, resource: &str, params: &ViewParams) -> bool {
        let mut entries = self.entries.write();
        match entries.get_mut(resource).and_then(|views| views.get_mut(params)) {
            Some(slot) if !slot.stale => {
                slot.stale = true;
                debug!(resource, page = params.page(), "View marked stale");
                true
            }
            _ => false,
        }
    }

    pub fn stale_views(&self, resource: &str) -> Vec<ViewParams> {
        self.entries
            .read()
            .get(resource)
            .map(|views| {
                views
                    .iter()
                    .filter(|(_, slot)| slot.stale)
                    .map(|(params, _)| params.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Drop one view, e.g. when it is closed.
    pub fn invalidate(&self, resource: &str, params: &ViewParams) -> bool {
        let mut entries = self.entries.write();
        let Some(views) = entries.get_mut(resource) else {
            return false;
        };
        let removed = views.remove(params).is_some();
        if views.is_empty() {
            entries.remove(resource);
        }
        removed
    }

    /// Drop every view of a resource ahead of a full refresh.
    pub fn invalidate_resource(&self, resource: &str) -> usize {
        let removed = self
            .entries
            .write()
            .remove(resource)
            .map_or(0, |views| views.len());
        if removed > 0 {
            info!(resource, views = removed, "Invalidated cached views");
        }
        removed
    }

    pub fn view_count(&self, resource: &str) -> usize {
        self.entries.read().get(resource).map_or(0, HashMap::len)
    }

    pub fn resources(&self) -> Vec<String> {
        self.entries.read().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
