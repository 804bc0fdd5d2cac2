//! Replays a recorded event log against seeded views.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use viewsync_cache::{ReconcileReport, Scheduler, SyncHub};
use viewsync_core::{EventKind, JsonRow, PageResult, ResourceConfig, SyncConfig, ViewParams};

/// One entry of the views file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeededView {
    pub params: ViewParams,
    pub result: PageResult<JsonRow>,
}

/// One line of the event log.
#[derive(Debug, Deserialize)]
pub struct LoggedEvent {
    pub kind: EventKind,
    pub payload: Value,
}

#[derive(Debug, Serialize)]
pub struct ReplaySummary {
    pub resource: String,
    pub applied: usize,
    pub skipped: usize,
    pub changed: usize,
    pub version: u64,
    pub stale: Vec<ViewParams>,
    pub views: Vec<SeededView>,
}

pub fn read_views(path: &Path) -> Result<Vec<SeededView>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read views file {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse views file {}", path.display()))
}

/// Parse a JSONL log. Blank lines are ignored; unparseable lines are logged
/// and counted as skipped.
pub fn parse_events(raw: &str) -> (Vec<LoggedEvent>, usize) {
    let mut events = Vec::new();
    let mut skipped = 0;
    for (idx, line) in raw.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<LoggedEvent>(line) {
            Ok(event) => events.push(event),
            Err(e) => {
                warn!(line = idx + 1, error = %e, "Skipping unreadable event line");
                skipped += 1;
            }
        }
    }
    (events, skipped)
}

pub struct Replay {
    hub: SyncHub<JsonRow>,
    resource: String,
}

impl Replay {
    /// Resources missing from the configuration are replayed with default
    /// settings (no search fields, no filters).
    pub fn new(config: &SyncConfig, resource: &str, scheduler: Arc<dyn Scheduler>) -> Self {
        let mut config = config.clone();
        if config.resource(resource).is_none() {
            warn!(resource, "Resource not configured; using defaults");
            config.resources.push(ResourceConfig::new(resource));
        }
        Self {
            hub: SyncHub::from_config(&config, scheduler),
            resource: resource.to_string(),
        }
    }

    pub fn hub(&self) -> &SyncHub<JsonRow> {
        &self.hub
    }

    pub fn seed(&self, views: Vec<SeededView>) -> Result<()> {
        for view in views {
            self.hub.seed_view(&self.resource, view.params, view.result)?;
        }
        Ok(())
    }

    pub fn apply(&self, events: &[LoggedEvent]) -> Result<(usize, usize)> {
        let mut applied = 0;
        let mut changed = 0;
        for event in events {
            let report: ReconcileReport = self.hub.dispatch(&self.resource, event.kind, &event.payload)?;
            applied += 1;
            changed += report.changed;
        }
        info!(resource = %self.resource, applied, changed, "Replay applied");
        Ok((applied, changed))
    }

    /// Wait for a pending version bump, bounded by twice the debounce delay.
    pub async fn settle(&self) -> Result<u64> {
        let bridge = self.hub.bridge(&self.resource)?;
        if bridge.debouncer().is_pending() {
            let mut rx = bridge.watch();
            let limit = bridge.debouncer().delay() * 2 + Duration::from_millis(10);
            if tokio::time::timeout(limit, rx.changed()).await.is_err() {
                warn!(resource = %self.resource, "Debouncer did not settle in time");
            }
        }
        Ok(bridge.subscribe())
    }

    pub fn summary(&self, applied: usize, skipped: usize, changed: usize, version: u64) -> Result<ReplaySummary> {
        let bridge = self.hub.bridge(&self.resource)?;
        let mut views: Vec<SeededView> = bridge
            .store()
            .get_all(&self.resource)
            .into_iter()
            .map(|view| SeededView {
                params: view.params,
                result: (*view.result).clone(),
            })
            .collect();
        views.sort_by(|a, b| {
            (a.params.status(), a.params.page()).cmp(&(b.params.status(), b.params.page()))
        });

        Ok(ReplaySummary {
            resource: self.resource.clone(),
            applied,
            skipped,
            changed,
            version,
            stale: bridge.stale_views(),
            views,
        })
    }
}
