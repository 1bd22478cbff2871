//! Media Grid Core Library
//!
//! Ties the viewport, cache and model crates into the windowed-loading engine
//! of a paginated media grid: pagination of server-side queries, date and
//! session sections, host notifications, configuration, and the [`Gallery`]
//! facade that runs the scroll/load/evict loop.

pub mod config;
pub mod error;
pub mod events;
pub mod gallery;
pub mod pagination;
pub mod sections;

pub use config::{ConfigError, GalleryConfig};
pub use error::GalleryError;
pub use events::{EventSink, GalleryEvent, ScrollDirection};
pub use gallery::{Gallery, LoadReport, ViewportUpdate};
pub use pagination::{PageOutcome, PageRequest, PaginationCoordinator, QueryState};
pub use sections::{
    group_and_sort, GroupingMode, MetadataIncomplete, Section, SectionIndex, SectionKey,
};

pub use gallery_cache::{
    ArtifactEntity, BlobStore, CacheConfig, CacheError, CacheStats, HandleAllocator, LoadOutcome,
    LoadTicket, MetadataTicket, ResourceCache, ResourceHandle,
};
pub use gallery_model::{
    ArtifactClient, ArtifactId, ArtifactMetadata, ClientError, LoadStatus, MediaType, Query,
    QueryOptions, QueryPage, RequestState, ResourceKind, SortDirection, SortKey,
};
pub use gallery_viewport::{
    ChildLayout, LoaderConfig, Rect, ScrollMetrics, VisibilityObserver, VisibilityTracker,
    WindowedLoader,
};
