//! Media Grid Cache Library
//!
//! Per-artifact cache of thumbnails, full images and metadata. Loaded bytes
//! are held behind explicitly released handles, loads are guarded so each
//! artifact has at most one request in flight per resource, and eviction
//! releases the handle it discards.

pub mod config;
pub mod handle;
pub mod resource;

pub use config::{CacheConfig, ConfigError};
pub use handle::{BlobStore, HandleAllocator, ResourceHandle};
pub use resource::{
    ArtifactEntity, CacheError, CacheStats, LoadOutcome, LoadTicket, MetadataTicket, ResourceCache,
};
