//! Per-artifact resource cache
//!
//! Holds the entity table of every artifact the current query has
//! registered, together with the load state of its thumbnail, full image and
//! metadata. A loaded thumbnail or image is a [`ResourceHandle`]; dropping it
//! from the table releases it.
//!
//! Loads are split in two phases, the same way jobs are submitted and later
//! completed: [`ResourceCache::begin_load`] applies the guard and marks the
//! resource as loading, [`ResourceCache::finish_load`] applies the fetched
//! bytes. The async `load_*` methods run both phases around a client call.
//! The lock is never held across the fetch, so overlapping calls for the same
//! artifact see the loading state and back off.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use gallery_model::{
    ArtifactClient, ArtifactId, ArtifactMetadata, ClientError, LoadStatus, ResourceKind,
};
use tracing::{debug, trace, warn};

use crate::config::CacheConfig;
use crate::handle::{BlobStore, HandleAllocator, ResourceHandle};

/// Load state of a handle-backed resource.
///
/// A handle exists exactly when the resource is loaded.
#[derive(Debug, Default)]
enum Slot {
    #[default]
    NotLoaded,
    Loading,
    Loaded(ResourceHandle),
}

impl Slot {
    fn status(&self) -> LoadStatus {
        match self {
            Slot::NotLoaded => LoadStatus::NotLoaded,
            Slot::Loading => LoadStatus::Loading,
            Slot::Loaded(_) => LoadStatus::Loaded,
        }
    }

    fn url(&self) -> Option<String> {
        match self {
            Slot::Loaded(handle) => Some(handle.url().to_owned()),
            _ => None,
        }
    }
}

#[derive(Debug)]
struct EntityRecord {
    backend_id: String,
    /// Distinguishes this record from a later one registered under the same id
    epoch: u64,
    thumbnail: Slot,
    image: Slot,
    metadata_status: LoadStatus,
    metadata: Option<ArtifactMetadata>,
    selected: bool,
}

impl EntityRecord {
    fn new(backend_id: String, epoch: u64) -> Self {
        Self {
            backend_id,
            epoch,
            thumbnail: Slot::NotLoaded,
            image: Slot::NotLoaded,
            metadata_status: LoadStatus::NotLoaded,
            metadata: None,
            selected: false,
        }
    }

    fn slot_mut(&mut self, kind: ResourceKind) -> Option<&mut Slot> {
        match kind {
            ResourceKind::Thumbnail => Some(&mut self.thumbnail),
            ResourceKind::FullImage => Some(&mut self.image),
            ResourceKind::Metadata => None,
        }
    }

    fn status(&self, kind: ResourceKind) -> LoadStatus {
        match kind {
            ResourceKind::Thumbnail => self.thumbnail.status(),
            ResourceKind::FullImage => self.image.status(),
            ResourceKind::Metadata => self.metadata_status,
        }
    }
}

/// Snapshot of one entity, as seen by the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactEntity {
    pub id: ArtifactId,
    pub backend_id: String,
    pub thumbnail_status: LoadStatus,
    pub image_status: LoadStatus,
    pub metadata_status: LoadStatus,
    pub thumbnail_url: Option<String>,
    pub image_url: Option<String>,
    pub metadata: Option<ArtifactMetadata>,
    pub is_selected: bool,
}

/// Statistics about cache usage
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of registered entities
    pub entity_count: usize,

    /// Number of thumbnails currently loaded
    pub loaded_thumbnails: usize,

    /// Number of full images currently loaded
    pub loaded_images: usize,

    /// Number of fetches that passed the guard
    pub fetches_started: u64,

    /// Number of load requests rejected because the resource was loading or loaded
    pub duplicate_requests: u64,

    /// Number of handles evicted (explicitly or by a cap)
    pub evictions: u64,

    /// Number of fetches that failed
    pub failed_loads: u64,

    /// Number of results dropped because the entity changed while in flight
    pub dropped_results: u64,
}

/// Errors surfaced by cache loads.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CacheError {
    #[error("failed to load {kind} for {backend_id}: {source}")]
    Load {
        backend_id: String,
        kind: ResourceKind,
        #[source]
        source: ClientError,
    },
    #[error("metadata response has {actual} entries for {expected} requested artifacts")]
    MetadataLengthMismatch { expected: usize, actual: usize },
}

/// Result of a guarded load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// The resource was fetched and stored
    Loaded,
    /// The guard rejected the request (unknown id, already loading or loaded)
    Skipped,
    /// The fetch finished but the entity was removed or replaced meanwhile
    Dropped,
}

/// Proof that a thumbnail or image load passed the guard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadTicket {
    pub id: ArtifactId,
    pub backend_id: String,
    pub kind: ResourceKind,
    epoch: u64,
}

/// Proof that a metadata load passed the guard for the listed artifacts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataTicket {
    entries: Vec<(ArtifactId, String, u64)>,
}

impl MetadataTicket {
    pub fn ids(&self) -> impl Iterator<Item = ArtifactId> + '_ {
        self.entries.iter().map(|(id, _, _)| *id)
    }

    pub fn backend_ids(&self) -> Vec<String> {
        self.entries.iter().map(|(_, backend_id, _)| backend_id.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

struct CacheState {
    config: CacheConfig,
    entities: HashMap<ArtifactId, EntityRecord>,
    /// Loaded thumbnails, least recently loaded at the front
    thumbnail_lru: VecDeque<ArtifactId>,
    /// Loaded full images, least recently loaded at the front
    image_lru: VecDeque<ArtifactId>,
    next_epoch: u64,
    stats: CacheStats,
}

impl CacheState {
    fn new(config: CacheConfig) -> Self {
        Self {
            config,
            entities: HashMap::new(),
            thumbnail_lru: VecDeque::new(),
            image_lru: VecDeque::new(),
            next_epoch: 0,
            stats: CacheStats::default(),
        }
    }

    fn lru_mut(&mut self, kind: ResourceKind) -> Option<&mut VecDeque<ArtifactId>> {
        match kind {
            ResourceKind::Thumbnail => Some(&mut self.thumbnail_lru),
            ResourceKind::FullImage => Some(&mut self.image_lru),
            ResourceKind::Metadata => None,
        }
    }

    fn cap(&self, kind: ResourceKind) -> Option<usize> {
        match kind {
            ResourceKind::Thumbnail => self.config.max_loaded_thumbnails,
            ResourceKind::FullImage => self.config.max_loaded_images,
            ResourceKind::Metadata => None,
        }
    }

    /// Release the handle of one resource, or abandon its load if one is in
    /// flight. Returns `false` if it was neither loaded nor loading.
    fn evict(&mut self, id: ArtifactId, kind: ResourceKind) -> bool {
        let Some(slot) = self.entities.get_mut(&id).and_then(|record| record.slot_mut(kind)) else {
            return false;
        };
        let was_loaded = match slot {
            Slot::NotLoaded => return false,
            Slot::Loading => false,
            Slot::Loaded(_) => true,
        };

        // Dropping the previous slot releases its handle; a pending result
        // finds the slot not loading and is dropped by `finish_load`
        drop(std::mem::take(slot));

        if was_loaded {
            if let Some(lru) = self.lru_mut(kind) {
                lru.retain(|&loaded| loaded != id);
            }
        }
        self.stats.evictions += 1;
        true
    }

    /// Evict least recently loaded resources until `kind` is within its cap.
    fn enforce_cap(&mut self, kind: ResourceKind) {
        let Some(cap) = self.cap(kind) else {
            return;
        };

        loop {
            let oldest = match self.lru_mut(kind) {
                Some(lru) if lru.len() > cap => lru.front().copied(),
                _ => None,
            };
            let Some(oldest) = oldest else {
                break;
            };
            debug!(id = %oldest, %kind, cap, "evicting least recently loaded resource");
            if !self.evict(oldest, kind) {
                // Out of sync with the table; forget it
                if let Some(lru) = self.lru_mut(kind) {
                    lru.retain(|&loaded| loaded != oldest);
                }
            }
        }
    }

    fn remove(&mut self, id: ArtifactId) -> bool {
        if self.entities.remove(&id).is_none() {
            return false;
        }
        self.thumbnail_lru.retain(|&loaded| loaded != id);
        self.image_lru.retain(|&loaded| loaded != id);
        true
    }

    fn refresh_counts(&mut self) {
        self.stats.entity_count = self.entities.len();
        self.stats.loaded_thumbnails = self.thumbnail_lru.len();
        self.stats.loaded_images = self.image_lru.len();
    }
}

/// Guarded, handle-backed cache of artifact resources.
///
/// Cloning is cheap and clones share the same table.
///
/// # Example
///
/// ```
/// use gallery_cache::{CacheConfig, ResourceCache};
/// use gallery_model::{LoadStatus, ResourceKind};
///
/// let cache = ResourceCache::new(CacheConfig::default());
/// let ids = cache.register(&["img-1".to_owned()]);
///
/// let ticket = cache.begin_load(ids[0], ResourceKind::Thumbnail).expect("guard passes");
/// // A second request while the first is in flight is rejected
/// assert!(cache.begin_load(ids[0], ResourceKind::Thumbnail).is_none());
///
/// cache.finish_load(ticket, Ok(vec![0xff; 64])).unwrap();
/// assert_eq!(cache.status(ids[0], ResourceKind::Thumbnail), Some(LoadStatus::Loaded));
///
/// assert!(cache.evict(ids[0], ResourceKind::Thumbnail));
/// assert_eq!(cache.status(ids[0], ResourceKind::Thumbnail), Some(LoadStatus::NotLoaded));
/// ```
#[derive(Clone)]
pub struct ResourceCache {
    state: Arc<Mutex<CacheState>>,
    allocator: Arc<dyn HandleAllocator>,
}

impl ResourceCache {
    /// Create a cache backed by an in-process [`BlobStore`].
    pub fn new(config: CacheConfig) -> Self {
        Self::with_allocator(config, Arc::new(BlobStore::new()))
    }

    /// Create a cache that allocates handles through `allocator`.
    pub fn with_allocator(config: CacheConfig, allocator: Arc<dyn HandleAllocator>) -> Self {
        Self { state: Arc::new(Mutex::new(CacheState::new(config))), allocator }
    }

    fn state(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn config(&self) -> CacheConfig {
        self.state().config
    }

    /// Register artifacts by backend id, returning their identities in order.
    ///
    /// Registration is additive: already known artifacts keep their state.
    pub fn register(&self, backend_ids: &[String]) -> Vec<ArtifactId> {
        let mut state = self.state();
        let mut ids = Vec::with_capacity(backend_ids.len());

        for backend_id in backend_ids {
            let id = ArtifactId::from_backend_id(backend_id);
            if !state.entities.contains_key(&id) {
                state.next_epoch += 1;
                let epoch = state.next_epoch;
                state.entities.insert(id, EntityRecord::new(backend_id.clone(), epoch));
            }
            ids.push(id);
        }

        state.refresh_counts();
        ids
    }

    pub fn contains(&self, id: ArtifactId) -> bool {
        self.state().entities.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.state().entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state().entities.is_empty()
    }

    pub fn status(&self, id: ArtifactId, kind: ResourceKind) -> Option<LoadStatus> {
        self.state().entities.get(&id).map(|record| record.status(kind))
    }

    /// Snapshot of one entity.
    pub fn entity(&self, id: ArtifactId) -> Option<ArtifactEntity> {
        let state = self.state();
        let record = state.entities.get(&id)?;

        Some(ArtifactEntity {
            id,
            backend_id: record.backend_id.clone(),
            thumbnail_status: record.thumbnail.status(),
            image_status: record.image.status(),
            metadata_status: record.metadata_status,
            thumbnail_url: record.thumbnail.url(),
            image_url: record.image.url(),
            metadata: record.metadata.clone(),
            is_selected: record.selected,
        })
    }

    /// Loaded metadata for the given ids. Ids without metadata are absent.
    pub fn metadata_map(&self, ids: &[ArtifactId]) -> HashMap<ArtifactId, ArtifactMetadata> {
        let state = self.state();
        ids.iter()
            .filter_map(|id| {
                let metadata = state.entities.get(id)?.metadata.clone()?;
                Some((*id, metadata))
            })
            .collect()
    }

    /// Guard and mark a thumbnail or full-image load as in flight.
    ///
    /// Returns `None` unless the resource is currently not loaded; a resource
    /// that is loading or loaded rejects the request.
    pub fn begin_load(&self, id: ArtifactId, kind: ResourceKind) -> Option<LoadTicket> {
        let mut guard = self.state();
        let state = &mut *guard;

        let Some(record) = state.entities.get_mut(&id) else {
            trace!(%id, %kind, "load requested for unknown artifact");
            return None;
        };
        let backend_id = record.backend_id.clone();
        let epoch = record.epoch;
        let slot = record.slot_mut(kind)?;

        if !matches!(slot, Slot::NotLoaded) {
            state.stats.duplicate_requests += 1;
            return None;
        }

        *slot = Slot::Loading;
        state.stats.fetches_started += 1;
        Some(LoadTicket { id, backend_id, kind, epoch })
    }

    /// Apply the result of a fetch started with [`Self::begin_load`].
    ///
    /// On success a handle is allocated and the resource becomes loaded. On
    /// failure the resource goes back to not loaded and the error is
    /// returned; nothing is retried. If the entity was removed or replaced
    /// while the fetch was in flight the result is dropped.
    pub fn finish_load(
        &self,
        ticket: LoadTicket,
        result: Result<Vec<u8>, ClientError>,
    ) -> Result<LoadOutcome, CacheError> {
        let mut guard = self.state();
        let state = &mut *guard;
        let kind = ticket.kind;

        let slot = state
            .entities
            .get_mut(&ticket.id)
            .filter(|record| record.epoch == ticket.epoch)
            .and_then(|record| record.slot_mut(kind))
            .filter(|slot| matches!(slot, Slot::Loading));

        let Some(slot) = slot else {
            state.stats.dropped_results += 1;
            debug!(id = %ticket.id, %kind, "dropping result for artifact that changed in flight");
            return Ok(LoadOutcome::Dropped);
        };

        match result {
            Ok(bytes) => {
                *slot = Slot::Loaded(ResourceHandle::allocate(&self.allocator, bytes));
                if let Some(lru) = state.lru_mut(kind) {
                    lru.push_back(ticket.id);
                }
                state.enforce_cap(kind);
                state.refresh_counts();
                Ok(LoadOutcome::Loaded)
            }
            Err(source) => {
                *slot = Slot::NotLoaded;
                state.stats.failed_loads += 1;
                warn!(backend_id = %ticket.backend_id, %kind, error = %source, "resource load failed");
                Err(CacheError::Load { backend_id: ticket.backend_id, kind, source })
            }
        }
    }

    pub async fn load_thumbnail<C: ArtifactClient>(
        &self,
        client: &C,
        id: ArtifactId,
    ) -> Result<LoadOutcome, CacheError> {
        let Some(ticket) = self.begin_load(id, ResourceKind::Thumbnail) else {
            return Ok(LoadOutcome::Skipped);
        };
        let result = client.load_thumbnail(&ticket.backend_id).await;
        self.finish_load(ticket, result)
    }

    pub async fn load_full_image<C: ArtifactClient>(
        &self,
        client: &C,
        id: ArtifactId,
    ) -> Result<LoadOutcome, CacheError> {
        let Some(ticket) = self.begin_load(id, ResourceKind::FullImage) else {
            return Ok(LoadOutcome::Skipped);
        };
        let result = client.load_full_image(&ticket.backend_id).await;
        self.finish_load(ticket, result)
    }

    /// Guard a metadata load for a batch of artifacts.
    ///
    /// Only artifacts whose metadata is not loaded are included; `None` when
    /// none qualify.
    pub fn begin_metadata(&self, ids: &[ArtifactId]) -> Option<MetadataTicket> {
        let mut state = self.state();
        let mut entries = Vec::new();
        let mut rejected = 0;

        for id in ids {
            let Some(record) = state.entities.get_mut(id) else {
                continue;
            };
            if record.metadata_status != LoadStatus::NotLoaded {
                rejected += 1;
                continue;
            }
            record.metadata_status = LoadStatus::Loading;
            entries.push((*id, record.backend_id.clone(), record.epoch));
        }

        state.stats.duplicate_requests += rejected;
        if entries.is_empty() {
            return None;
        }
        state.stats.fetches_started += 1;
        Some(MetadataTicket { entries })
    }

    /// Apply a metadata response. Returns how many entities were updated.
    ///
    /// The response must be parallel to the ticket's ids; a length mismatch
    /// fails the whole batch.
    pub fn finish_metadata(
        &self,
        ticket: MetadataTicket,
        result: Result<Vec<ArtifactMetadata>, ClientError>,
    ) -> Result<usize, CacheError> {
        let mut guard = self.state();
        let state = &mut *guard;

        let failure = match result {
            Ok(metadata) if metadata.len() == ticket.entries.len() => {
                let mut applied = 0;
                for ((id, _, epoch), metadata) in ticket.entries.into_iter().zip(metadata) {
                    match state.entities.get_mut(&id) {
                        Some(record)
                            if record.epoch == epoch
                                && record.metadata_status == LoadStatus::Loading =>
                        {
                            record.metadata = Some(metadata);
                            record.metadata_status = LoadStatus::Loaded;
                            applied += 1;
                        }
                        _ => state.stats.dropped_results += 1,
                    }
                }
                return Ok(applied);
            }
            Ok(metadata) => CacheError::MetadataLengthMismatch {
                expected: ticket.entries.len(),
                actual: metadata.len(),
            },
            Err(source) => CacheError::Load {
                backend_id: ticket
                    .entries
                    .first()
                    .map(|(_, backend_id, _)| backend_id.clone())
                    .unwrap_or_default(),
                kind: ResourceKind::Metadata,
                source,
            },
        };

        for (id, _, epoch) in &ticket.entries {
            if let Some(record) = state.entities.get_mut(id) {
                if record.epoch == *epoch && record.metadata_status == LoadStatus::Loading {
                    record.metadata_status = LoadStatus::NotLoaded;
                }
            }
        }
        state.stats.failed_loads += 1;
        warn!(count = ticket.entries.len(), error = %failure, "metadata load failed");
        Err(failure)
    }

    /// Load metadata for every listed artifact that does not have it yet.
    pub async fn load_metadata<C: ArtifactClient>(
        &self,
        client: &C,
        ids: &[ArtifactId],
    ) -> Result<usize, CacheError> {
        let Some(ticket) = self.begin_metadata(ids) else {
            return Ok(0);
        };
        let result = client.get_metadata(&ticket.backend_ids()).await;
        self.finish_metadata(ticket, result)
    }

    /// Release a loaded thumbnail or full image.
    ///
    /// A load still in flight is abandoned instead: the slot returns to not
    /// loaded and the late result is dropped. Returns `false` (and does
    /// nothing) when the resource is neither loaded nor loading.
    pub fn evict(&self, id: ArtifactId, kind: ResourceKind) -> bool {
        let mut state = self.state();
        let evicted = state.evict(id, kind);
        if evicted {
            trace!(%id, %kind, "evicted");
            state.refresh_counts();
        }
        evicted
    }

    /// Evict one kind of resource for several artifacts. Returns how many were
    /// loaded or loading.
    pub fn evict_many(&self, ids: &[ArtifactId], kind: ResourceKind) -> usize {
        let mut state = self.state();
        let evicted = ids.iter().filter(|&&id| state.evict(id, kind)).count();
        if evicted > 0 {
            debug!(evicted, %kind, "evicted batch");
            state.refresh_counts();
        }
        evicted
    }

    /// Delete an entity, releasing any handles it holds.
    pub fn remove(&self, id: ArtifactId) -> bool {
        let mut state = self.state();
        let removed = state.remove(id);
        state.refresh_counts();
        removed
    }

    /// Delete every entity, releasing all handles.
    pub fn clear(&self) {
        let mut state = self.state();
        let count = state.entities.len();
        state.entities.clear();
        state.thumbnail_lru.clear();
        state.image_lru.clear();
        state.refresh_counts();
        debug!(count, "cleared entity table");
    }

    /// Set the selection flag. Returns `false` for unknown ids.
    pub fn set_selected(&self, id: ArtifactId, selected: bool) -> bool {
        match self.state().entities.get_mut(&id) {
            Some(record) => {
                record.selected = selected;
                true
            }
            None => false,
        }
    }

    /// Flip the selection flag, returning the new value.
    pub fn toggle_selected(&self, id: ArtifactId) -> Option<bool> {
        let mut state = self.state();
        let record = state.entities.get_mut(&id)?;
        record.selected = !record.selected;
        Some(record.selected)
    }

    /// Selected artifacts, in unspecified order.
    pub fn selected_ids(&self) -> Vec<ArtifactId> {
        self.state()
            .entities
            .iter()
            .filter(|(_, record)| record.selected)
            .map(|(id, _)| *id)
            .collect()
    }

    pub fn clear_selection(&self) {
        for record in self.state().entities.values_mut() {
            record.selected = false;
        }
    }

    pub fn stats(&self) -> CacheStats {
        self.state().stats
    }
}
