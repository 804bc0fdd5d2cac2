pub mod config;
pub mod error;
pub mod events;
pub mod matcher;
pub mod page;
pub mod params;
pub mod record;
pub mod schema;
pub mod status;

pub use config::{
    ConfigError, ConfigManager, FilterKind, FilterRule, LifecycleConfig, LoggingConfig,
    ResourceConfig, SyncConfig,
};
pub use error::*;
pub use events::*;
pub use matcher::*;
pub use page::{total_pages_for, PageResult};
pub use params::*;
pub use record::*;
pub use schema::*;
pub use status::*;
