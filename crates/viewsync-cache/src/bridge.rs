//! Applies server diff events to every cached view of one resource.
//!
//! For each incoming row the bridge decides, per view, whether the row belongs
//! in that view's slice (filters, search, status), then inserts, replaces or
//! removes it in the cached page and keeps `total`/`total_pages` consistent.
//! Entries that did not change keep their `Arc`, so readers can skip re-render
//! work with a pointer comparison.
//!
//! Pages after the first cannot take a new row without knowing the server's
//! ordering. Such views are left untouched and flagged stale; refetching them is
//! the caller's decision.

use crate::debounce::VersionDebouncer;
use crate::store::{CachedView, ViewCacheStore};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};
use viewsync_core::page;
use viewsync_core::{
    matches_filters, matches_search, should_include_in_status, DiffEvent, EventDecoder,
    EventKind, PageResult, Record, ResourceSchema, Result, UpsertEvent, ViewParams,
};

/// What one event did to the cache.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReconcileReport {
    /// Number of view entries replaced.
    pub changed: usize,
    /// Views newly flagged for refetch.
    pub stale: Vec<ViewParams>,
    /// Whether the version debouncer was signalled.
    pub signalled: bool,
}

impl ReconcileReport {
    pub fn has_changes(&self) -> bool {
        self.changed > 0 || !self.stale.is_empty()
    }
}

pub struct EventBridge<R: Record> {
    schema: Arc<ResourceSchema<R>>,
    decoder: EventDecoder,
    store: Arc<ViewCacheStore<R>>,
    debouncer: Arc<VersionDebouncer>,
    apply_lock: Mutex<()>,
}

impl<R: Record> EventBridge<R> {
    pub fn new(
        schema: ResourceSchema<R>,
        store: Arc<ViewCacheStore<R>>,
        debouncer: Arc<VersionDebouncer>,
    ) -> Self {
        let decoder = EventDecoder::for_namespace(schema.namespace());
        Self {
            schema: Arc::new(schema),
            decoder,
            store,
            debouncer,
            apply_lock: Mutex::new(()),
        }
    }

    pub fn with_decoder(mut self, decoder: EventDecoder) -> Self {
        self.decoder = decoder;
        self
    }

    pub fn resource(&self) -> &str {
        self.schema.namespace()
    }

    pub fn schema(&self) -> &ResourceSchema<R> {
        &self.schema
    }

    pub fn store(&self) -> &Arc<ViewCacheStore<R>> {
        &self.store
    }

    pub fn debouncer(&self) -> &Arc<VersionDebouncer> {
        &self.debouncer
    }

    /// Reconcile one event into every cached view of the resource.
    pub fn apply(&self, event: DiffEvent<R>) -> ReconcileReport {
        let _guard = self.apply_lock.lock();
        let kind = event.kind();
        let mut report = ReconcileReport::default();

        match &event {
            DiffEvent::Upsert(upsert) => self.reconcile_upsert(upsert, &mut report),
            DiffEvent::Remove { id, .. } => self.reconcile_remove(id, &mut report),
            DiffEvent::BatchUpsert(items) => {
                for upsert in items {
                    self.reconcile_upsert(upsert, &mut report);
                }
            }
        }

        if report.has_changes() {
            self.debouncer.signal();
            report.signalled = true;
        }

        debug!(
            resource = self.resource(),
            %kind,
            changed = report.changed,
            stale = report.stale.len(),
            "Event reconciled"
        );
        report
    }

    /// Apply a local optimistic edit. The status comes from the schema
    /// classifier; the previous status from any cached copy of the row.
    pub fn apply_optimistic(&self, row: R) -> ReconcileReport {
        let previous_status = self
            .store
            .get_all(self.resource())
            .iter()
            .find_map(|view| {
                view.result
                    .position(row.id())
                    .map(|idx| self.schema.classify(&view.result.rows[idx]))
            });
        let new_status = self.schema.classify(&row);
        self.apply(DiffEvent::upsert(row, previous_status, new_status))
    }

    fn reconcile_upsert(&self, upsert: &UpsertEvent<R>, report: &mut ReconcileReport) {
        let resource = self.resource();
        let views = self.store.get_all(resource);
        if views.is_empty() {
            return;
        }

        let row = &upsert.row;
        let id = row.id();
        let classified = self.schema.classify(row);
        if classified != upsert.new_status {
            debug!(
                resource,
                id,
                %classified,
                new_status = %upsert.new_status,
                "Event status disagrees with row lifecycle fields; using event status"
            );
        }

        for view in &views {
            let params = &view.params;
            let current = &view.result;

            let included = matches_filters(&self.schema, params.filters(), row)
                && matches_search(&self.schema, params.search(), row)
                && should_include_in_status(params.status(), upsert.new_status);
            let existing = current.position(id);

            let next = match (existing, included) {
                (None, false) => continue,
                (Some(idx), true) => {
                    if current.rows[idx] == *row {
                        continue;
                    }
                    let rows = page::update(&current.rows, id, row.clone()).into_owned();
                    current.with_rows(rows, current.total)
                }
                (None, true) if params.is_first_page() => {
                    let rows = page::insert(&current.rows, row.clone(), params.limit());
                    let mut total = current.total;
                    if self.is_net_new(upsert, params, &views) {
                        total += 1;
                    }
                    // the first page is a prefix of the collection
                    let total = total.max(rows.len() as u64);
                    current.with_rows(rows, total)
                }
                (None, true) => {
                    if self.store.mark_stale(resource, params) {
                        report.stale.push(params.clone());
                    }
                    continue;
                }
                (Some(_), false) => {
                    let (rows, _) = page::remove(&current.rows, id);
                    current.with_rows(rows.into_owned(), current.total.saturating_sub(1))
                }
            };

            self.commit(params, next, report);
        }
    }

    fn reconcile_remove(&self, id: &str, report: &mut ReconcileReport) {
        for view in self.store.get_all(self.resource()) {
            let current = &view.result;
            let (rows, removed) = page::remove(&current.rows, id);
            if !removed {
                continue;
            }
            let next = current.with_rows(rows.into_owned(), current.total.saturating_sub(1));
            self.commit(&view.params, next, report);
        }
    }

    /// A row entering a first page adds to `total` only when its id was not
    /// already counted by this view family: it is new, or it arrives from a
    /// status the view does not show, and no sibling page already holds it.
    fn is_net_new(&self, upsert: &UpsertEvent<R>, params: &ViewParams, views: &[CachedView<R>]) -> bool {
        let previously_counted = upsert
            .previous_status
            .is_some_and(|previous| should_include_in_status(params.status(), previous));
        if previously_counted {
            return false;
        }

        let id = upsert.row.id();
        !views.iter().any(|other| {
            other.params != *params
                && other.params.same_family(params)
                && other.result.contains(id)
        })
    }

    fn commit(&self, params: &ViewParams, next: PageResult<R>, report: &mut ReconcileReport) {
        debug_assert!(next.is_consistent());
        if self.store.commit(self.resource(), params, Arc::new(next)) {
            report.changed += 1;
        }
    }

    /// Store the result of the view layer's initial (or refreshed) fetch. A
    /// page that does not fit `params` is rejected and nothing is cached.
    pub fn seed_view(&self, params: ViewParams, result: PageResult<R>) -> Result<Arc<PageResult<R>>> {
        if let Err(e) = result.validate_for(&params) {
            warn!(resource = self.resource(), page = params.page(), error = %e, "Rejecting seeded page");
            return Err(e);
        }
        let _guard = self.apply_lock.lock();
        Ok(self.store.set(self.resource(), params, result))
    }

    pub fn read_view(&self, params: &ViewParams) -> Option<Arc<PageResult<R>>> {
        self.store.get(self.resource(), params)
    }

    /// Current cache version of this resource.
    pub fn subscribe(&self) -> u64 {
        self.debouncer.version()
    }

    pub fn watch(&self) -> watch::Receiver<u64> {
        self.debouncer.watch()
    }

    pub fn stale_views(&self) -> Vec<ViewParams> {
        self.store.stale_views(self.resource())
    }

    /// The view was closed; forget its page.
    pub fn close_view(&self, params: &ViewParams) -> bool {
        let _guard = self.apply_lock.lock();
        self.store.invalidate(self.resource(), params)
    }

    /// Drop every cached page so the view layer refetches from scratch.
    pub fn request_full_refresh(&self) -> usize {
        let _guard = self.apply_lock.lock();
        let dropped = self.store.invalidate_resource(self.resource());
        if dropped > 0 {
            self.debouncer.signal();
        }
        info!(resource = self.resource(), dropped, "Full refresh requested");
        dropped
    }
}

impl<R: Record + DeserializeOwned> EventBridge<R> {
    /// Decode a wire payload and apply it. A malformed payload is logged and
    /// dropped; it never affects later events.
    pub fn apply_raw(&self, kind: EventKind, payload: &Value) -> ReconcileReport {
        match self.decoder.decode::<R>(kind, payload) {
            Ok(event) => self.apply(event),
            Err(e) => {
                error!(
                    resource = self.resource(),
                    %kind,
                    error = %e,
                    "Dropping malformed event"
                );
                ReconcileReport::default()
            }
        }
    }
}

impl<R: Record> std::fmt::Debug for EventBridge<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBridge")
            .field("resource", &self.resource())
            .field("views", &self.store.view_count(self.resource()))
            .field("debouncer", &self.debouncer)
            .finish()
    }
}
