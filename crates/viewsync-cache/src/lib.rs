pub mod bridge;
pub mod debounce;
pub mod hub;
pub mod store;

pub use bridge::{EventBridge, ReconcileReport};
pub use debounce::{
    ManualScheduler, Scheduler, TimerCallback, TimerHandle, TokioScheduler, VersionDebouncer,
    DEFAULT_DEBOUNCE,
};
pub use hub::SyncHub;
pub use store::{CachedView, ViewCacheStore};
