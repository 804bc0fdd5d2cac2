//! Routes raw server events to the bridge of the resource they belong to.

use crate::bridge::{EventBridge, ReconcileReport};
use crate::debounce::{Scheduler, VersionDebouncer};
use crate::store::ViewCacheStore;
use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info};
use viewsync_core::{
    DiffEvent, EventKind, JsonRow, PageResult, Record, Result, SyncConfig, SyncError, ViewParams,
};

pub struct SyncHub<R: Record> {
    bridges: DashMap<String, Arc<EventBridge<R>>>,
}

impl<R: Record> Default for SyncHub<R> {
    fn default() -> Self {
        Self {
            bridges: DashMap::new(),
        }
    }
}

impl<R: Record> SyncHub<R> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a bridge under its resource namespace, replacing any previous one.
    pub fn register(&self, bridge: EventBridge<R>) -> Arc<EventBridge<R>> {
        let bridge = Arc::new(bridge);
        let resource = bridge.resource().to_string();
        if self.bridges.insert(resource.clone(), Arc::clone(&bridge)).is_some() {
            debug!(resource = %resource, "Replaced existing bridge");
        }
        bridge
    }

    pub fn bridge(&self, resource: &str) -> Result<Arc<EventBridge<R>>> {
        self.bridges
            .get(resource)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| {
                debug!(resource, "No bridge registered for resource");
                SyncError::UnknownResource(resource.to_string())
            })
    }

    pub fn apply(&self, resource: &str, event: DiffEvent<R>) -> Result<ReconcileReport> {
        Ok(self.bridge(resource)?.apply(event))
    }

    pub fn seed_view(
        &self,
        resource: &str,
        params: ViewParams,
        result: PageResult<R>,
    ) -> Result<Arc<PageResult<R>>> {
        self.bridge(resource)?.seed_view(params, result)
    }

    pub fn read_view(&self, resource: &str, params: &ViewParams) -> Result<Option<Arc<PageResult<R>>>> {
        Ok(self.bridge(resource)?.read_view(params))
    }

    pub fn subscribe(&self, resource: &str) -> Result<u64> {
        Ok(self.bridge(resource)?.subscribe())
    }

    pub fn watch(&self, resource: &str) -> Result<watch::Receiver<u64>> {
        Ok(self.bridge(resource)?.watch())
    }

    /// Registered namespaces, sorted.
    pub fn resources(&self) -> Vec<String> {
        let mut names: Vec<String> = self.bridges.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.bridges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bridges.is_empty()
    }
}

impl<R: Record + DeserializeOwned> SyncHub<R> {
    /// Decode and apply a wire event. Malformed payloads are dropped by the
    /// bridge; only an unknown resource is an error.
    pub fn dispatch(&self, resource: &str, kind: EventKind, payload: &Value) -> Result<ReconcileReport> {
        Ok(self.bridge(resource)?.apply_raw(kind, payload))
    }
}

impl SyncHub<JsonRow> {
    /// One store, debouncer and bridge per configured resource.
    pub fn from_config(config: &SyncConfig, scheduler: Arc<dyn Scheduler>) -> Self {
        let hub = Self::new();
        for resource in &config.resources {
            let debouncer = Arc::new(VersionDebouncer::new(
                config.debounce(),
                Arc::clone(&scheduler),
            ));
            let bridge = EventBridge::new(resource.schema(), Arc::new(ViewCacheStore::new()), debouncer)
                .with_decoder(resource.decoder());
            hub.register(bridge);
        }
        info!(
            resources = hub.len(),
            debounce_ms = config.debounce_ms,
            "Sync hub initialized"
        );
        hub
    }
}

impl<R: Record> std::fmt::Debug for SyncHub<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncHub")
            .field("resources", &self.resources())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::debounce::ManualScheduler;
    use serde_json::json;
    use std::time::Duration;
    use viewsync_core::{ResourceConfig, StatusFilter};

    fn hub() -> (ManualScheduler, SyncHub<JsonRow>) {
        let mut users = ResourceConfig::new("users");
        users.search_fields = vec!["name".into()];
        let config = SyncConfig {
            resources: vec![users, ResourceConfig::new("students")],
            ..SyncConfig::default()
        };
        let clock = ManualScheduler::new();
        let hub = SyncHub::from_config(&config, Arc::new(clock.clone()));
        (clock, hub)
    }

    #[test]
    fn test_from_config_registers_each_resource() {
        let (_, hub) = hub();
        assert_eq!(hub.resources(), vec!["students".to_string(), "users".to_string()]);
        assert_eq!(hub.bridge("users").unwrap().debouncer().delay(), Duration::from_millis(150));
    }

    #[test]
    fn test_unknown_resource_is_an_error() {
        let (_, hub) = hub();
        let err = hub
            .dispatch("courses", EventKind::Remove, &json!({"id": 1, "previousStatus": "active"}))
            .unwrap_err();
        assert!(matches!(err, SyncError::UnknownResource(name) if name == "courses"));
        assert!(hub.subscribe("courses").is_err());
    }

    #[test]
    fn test_dispatch_routes_to_resource() {
        let (clock, hub) = hub();
        let params = ViewParams::new(StatusFilter::Active, 1, 10).unwrap();
        hub.seed_view("users", params.clone(), PageResult::empty(1, 10)).unwrap();
        hub.seed_view("students", params.clone(), PageResult::empty(1, 10)).unwrap();

        let report = hub
            .dispatch(
                "users",
                EventKind::Upsert,
                &json!({"user": {"id": 1, "name": "Ann"}, "previousStatus": null, "newStatus": "active"}),
            )
            .unwrap();
        assert_eq!(report.changed, 1);

        assert_eq!(hub.read_view("users", &params).unwrap().unwrap().total, 1);
        assert_eq!(hub.read_view("students", &params).unwrap().unwrap().total, 0);

        clock.advance(Duration::from_millis(150));
        assert_eq!(hub.subscribe("users").unwrap(), 1);
        assert_eq!(hub.subscribe("students").unwrap(), 0);
    }

    #[test]
    fn test_malformed_dispatch_is_not_an_error() {
        let (_, hub) = hub();
        let report = hub
            .dispatch("users", EventKind::Upsert, &json!({"newStatus": "active"}))
            .unwrap();
        assert_eq!(report, ReconcileReport::default());
    }
}
