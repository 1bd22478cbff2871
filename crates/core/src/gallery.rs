//! The windowed-loading engine as one object
//!
//! [`Gallery`] wires the pieces into the closed loop the host drives:
//! scroll or resize goes through the tracker (load and evict resources for
//! artifacts crossing the window) and the loader (ask for the next page),
//! page results regroup the sections, the host re-renders and reports the
//! new geometry again.
//!
//! Every network round trip is split in two so the host can keep handling
//! scroll events while it waits: a synchronous step hands out a ticket
//! ([`PageRequest`], [`LoadTicket`], [`MetadataTicket`]), the host awaits the
//! client call without holding the engine, and a second synchronous step
//! ([`Gallery::apply_page`], [`Gallery::finish_load`],
//! [`Gallery::finish_metadata`]) commits the result. Anything that changed
//! in between, such as an eviction or a new query, makes the late result a
//! no-op. The `async` helpers ([`Gallery::fetch_page`],
//! [`Gallery::load_thumbnails`], [`Gallery::load_metadata`]) run both halves
//! in one call and keep the engine borrowed for its duration.

use std::sync::Arc;

use futures::future::join_all;
use gallery_cache::{
    CacheError, CacheStats, HandleAllocator, LoadOutcome, LoadTicket, MetadataTicket,
    ResourceCache,
};
use gallery_model::{
    ArtifactClient, ArtifactId, ArtifactMetadata, ClientError, LoadStatus, Query, QueryOptions,
    QueryPage, ResourceKind, SortKey,
};
use gallery_viewport::{
    ChildLayout, ScrollMetrics, SectionSource, VisibilityTracker, WindowedLoader,
};
use tracing::{debug, trace};

use crate::config::GalleryConfig;
use crate::error::GalleryError;
use crate::events::{EventSink, GalleryEvent, ScrollDirection, SinkObserver};
use crate::pagination::{PageOutcome, PageRequest, PaginationCoordinator, QueryState};
use crate::sections::{SectionIndex, SectionKey};

/// What one geometry update changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ViewportUpdate {
    pub became_visible: Vec<ArtifactId>,
    pub became_invisible: Vec<ArtifactId>,
    /// Artifacts whose thumbnail or full image was released or whose load
    /// was abandoned
    pub evicted: Vec<ArtifactId>,
    /// Continuation page handed to the host, if any
    pub requested_page: Option<u32>,
}

/// Aggregate result of a batch of resource loads.
#[derive(Debug, Default)]
pub struct LoadReport {
    pub loaded: usize,
    pub skipped: usize,
    pub dropped: usize,
    pub failures: Vec<CacheError>,
}

impl LoadReport {
    fn record(&mut self, result: Result<LoadOutcome, CacheError>) {
        match result {
            Ok(LoadOutcome::Loaded) => self.loaded += 1,
            Ok(LoadOutcome::Skipped) => self.skipped += 1,
            Ok(LoadOutcome::Dropped) => self.dropped += 1,
            Err(err) => self.failures.push(err),
        }
    }
}

/// Loader host backed by the pagination coordinator.
struct PageSource<'a, S: ?Sized> {
    pagination: &'a mut PaginationCoordinator,
    metrics: ScrollMetrics,
    sink: &'a mut S,
    requested: Option<u32>,
}

impl<S: EventSink + ?Sized> SectionSource for PageSource<'_, S> {
    fn is_busy(&self) -> bool {
        self.pagination.is_busy()
    }

    fn metrics(&self) -> ScrollMetrics {
        self.metrics
    }

    fn load_next_section(&mut self) -> bool {
        let Some(page_num) = self.pagination.next_page() else {
            return false;
        };
        let Some(request) = self.pagination.continue_query(page_num) else {
            return false;
        };

        self.requested = Some(page_num);
        self.sink.emit(GalleryEvent::MoreDataNeeded {
            direction: ScrollDirection::Forward,
            request,
        });
        true
    }
}

/// Windowed media grid engine over an [`ArtifactClient`].
pub struct Gallery<C> {
    client: C,
    config: GalleryConfig,
    cache: ResourceCache,
    pagination: PaginationCoordinator,
    tracker: VisibilityTracker<ArtifactId>,
    loader: WindowedLoader,
    sections: SectionIndex,
}

impl<C: ArtifactClient> Gallery<C> {
    /// Create an engine with the built-in blob allocator.
    pub fn new(client: C, config: GalleryConfig) -> Result<Self, GalleryError> {
        let cache = ResourceCache::new(config.cache);
        Self::with_cache(client, config, cache)
    }

    /// Create an engine whose handles come from `allocator`.
    pub fn with_allocator(
        client: C,
        config: GalleryConfig,
        allocator: Arc<dyn HandleAllocator>,
    ) -> Result<Self, GalleryError> {
        let cache = ResourceCache::with_allocator(config.cache, allocator);
        Self::with_cache(client, config, cache)
    }

    fn with_cache(
        client: C,
        config: GalleryConfig,
        cache: ResourceCache,
    ) -> Result<Self, GalleryError> {
        config.validate()?;

        Ok(Self {
            client,
            pagination: PaginationCoordinator::new(cache.clone()),
            tracker: VisibilityTracker::new(config.visibility_margin_percent),
            loader: WindowedLoader::new(config.loader_config()),
            sections: SectionIndex::new(config.grouping),
            cache,
            config,
        })
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn config(&self) -> &GalleryConfig {
        &self.config
    }

    pub fn cache(&self) -> &ResourceCache {
        &self.cache
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn query_state(&self) -> &QueryState {
        self.pagination.state()
    }

    pub fn pagination(&self) -> &PaginationCoordinator {
        &self.pagination
    }

    pub fn tracker(&self) -> &VisibilityTracker<ArtifactId> {
        &self.tracker
    }

    pub fn sections(&self) -> &SectionIndex {
        &self.sections
    }

    /// Artifacts of the current query in result order.
    pub fn ordered_ids(&self) -> &[ArtifactId] {
        self.pagination.ordered_ids()
    }

    pub fn enable_visibility_tracking(&mut self) -> bool {
        self.tracker.enable_visibility_tracking()
    }

    pub fn disable_visibility_tracking(&mut self) -> bool {
        self.tracker.disable_visibility_tracking()
    }

    /// Replace the current query. Returns the start page request to fetch.
    pub fn start_query(&mut self, query: Query, orderings: Vec<SortKey>) -> PageRequest {
        let mut options = QueryOptions::new(self.config.results_per_page);
        options.orderings = orderings;

        self.sections.clear();
        self.pagination.start_new_query(query, options)
    }

    /// Request a specific continuation page, subject to the pagination guard.
    pub fn continue_query(&mut self, page_num: u32) -> Option<PageRequest> {
        self.pagination.continue_query(page_num)
    }

    /// Commit the response to a [`PageRequest`] the host fetched itself.
    ///
    /// New artifacts are registered and the sections regrouped. The host is
    /// asked for the metadata grouping still needs through a
    /// [`GalleryEvent::LoadRequested`] of kind [`ResourceKind::Metadata`].
    /// A response that is no longer outstanding returns
    /// [`PageOutcome::Stale`] and changes nothing.
    pub fn apply_page<S: EventSink + ?Sized>(
        &mut self,
        request: PageRequest,
        result: Result<QueryPage, ClientError>,
        sink: &mut S,
    ) -> Result<PageOutcome, GalleryError> {
        let outcome = self.pagination.apply(request, result)?;
        if let PageOutcome::Applied { new_ids, .. } = &outcome {
            self.regroup(new_ids, sink);
        }
        Ok(outcome)
    }

    /// Fetch `request` and commit it.
    ///
    /// New artifacts get their metadata loaded and the sections regrouped.
    /// A stale request is fetched but discarded.
    pub async fn fetch_page(&mut self, request: PageRequest) -> Result<PageOutcome, GalleryError> {
        let result = request.fetch(&self.client).await;

        // Metadata for new artifacts is loaded right below
        let mut deferred: Vec<GalleryEvent> = Vec::new();
        let outcome = self.apply_page(request, result, &mut deferred)?;

        if let PageOutcome::Applied { new_ids, .. } = &outcome {
            if !new_ids.is_empty() {
                self.load_metadata(new_ids).await?;
            }
        }
        Ok(outcome)
    }

    /// Scroll or resize of the grid container.
    pub fn on_viewport_change<L, S>(
        &mut self,
        layout: &L,
        metrics: ScrollMetrics,
        sink: &mut S,
    ) -> ViewportUpdate
    where
        L: ChildLayout<Key = ArtifactId>,
        S: EventSink + ?Sized,
    {
        let mut observer = SinkObserver::new(sink);
        self.tracker.handle_viewport_change(layout, &mut observer);
        let SinkObserver { visible, invisible, .. } = observer;

        self.sync(visible, invisible, metrics, sink)
    }

    /// Children were inserted, removed or reordered after a re-render.
    pub fn on_children_changed<L, S>(
        &mut self,
        layout: &L,
        metrics: ScrollMetrics,
        sink: &mut S,
    ) -> ViewportUpdate
    where
        L: ChildLayout<Key = ArtifactId>,
        S: EventSink + ?Sized,
    {
        let mut observer = SinkObserver::new(sink);
        self.tracker.children_changed(layout, &mut observer);
        let SinkObserver { visible, invisible, .. } = observer;

        self.sync(visible, invisible, metrics, sink)
    }

    fn sync<S: EventSink + ?Sized>(
        &mut self,
        visible: Vec<ArtifactId>,
        invisible: Vec<ArtifactId>,
        metrics: ScrollMetrics,
        sink: &mut S,
    ) -> ViewportUpdate {
        let mut evicted = Vec::new();
        for kind in [ResourceKind::Thumbnail, ResourceKind::FullImage] {
            let ids: Vec<ArtifactId> =
                invisible.iter().copied().filter(|&id| self.cache.evict(id, kind)).collect();
            if !ids.is_empty() {
                evicted.extend_from_slice(&ids);
                sink.emit(GalleryEvent::EvictRequested { kind, ids });
            }
        }
        evicted.sort();
        evicted.dedup();

        let wanted: Vec<ArtifactId> = visible
            .iter()
            .copied()
            .filter(|&id| {
                self.cache.status(id, ResourceKind::Thumbnail) == Some(LoadStatus::NotLoaded)
            })
            .collect();
        if !wanted.is_empty() {
            sink.emit(GalleryEvent::LoadRequested { kind: ResourceKind::Thumbnail, ids: wanted });
        }
        self.request_metadata(visible.iter().copied(), sink);

        let mut source = PageSource {
            pagination: &mut self.pagination,
            metrics,
            sink,
            requested: None,
        };
        let outcome = self.loader.tick(&mut source);
        let requested_page = source.requested;

        if !evicted.is_empty() || requested_page.is_some() {
            debug!(
                evicted = evicted.len(),
                requested_page,
                window = self.tracker.len(),
                "viewport synced"
            );
        } else {
            trace!(?outcome, window = self.tracker.len(), "viewport synced");
        }

        ViewportUpdate {
            became_visible: visible,
            became_invisible: invisible,
            evicted,
            requested_page,
        }
    }

    /// Mark `kind` of each id as loading and hand out the tickets to fetch.
    ///
    /// Ids that are loading, loaded or unknown get no ticket.
    pub fn begin_loads(&self, ids: &[ArtifactId], kind: ResourceKind) -> Vec<LoadTicket> {
        ids.iter().filter_map(|&id| self.cache.begin_load(id, kind)).collect()
    }

    /// Commit a thumbnail or full image fetched for `ticket`.
    ///
    /// A result for an artifact that was evicted or removed in the meantime
    /// is dropped.
    pub fn finish_load(
        &self,
        ticket: LoadTicket,
        result: Result<Vec<u8>, ClientError>,
    ) -> Result<LoadOutcome, GalleryError> {
        Ok(self.cache.finish_load(ticket, result)?)
    }

    /// Load thumbnails for `ids` concurrently.
    ///
    /// Ids that are loading, loaded or unknown are skipped; each failure is
    /// reported and leaves the thumbnail not loaded.
    pub async fn load_thumbnails(&self, ids: &[ArtifactId]) -> LoadReport {
        let tickets = self.begin_loads(ids, ResourceKind::Thumbnail);
        let mut report = LoadReport { skipped: ids.len() - tickets.len(), ..Default::default() };

        let client = &self.client;
        let results = join_all(tickets.into_iter().map(|ticket| async move {
            let result = client.load_thumbnail(&ticket.backend_id).await;
            (ticket, result)
        }))
        .await;

        for (ticket, result) in results {
            report.record(self.cache.finish_load(ticket, result));
        }
        if !report.failures.is_empty() {
            debug!(failed = report.failures.len(), loaded = report.loaded, "thumbnail batch");
        }
        report
    }

    /// Thumbnails of the current visibility window that are not loaded yet.
    pub fn missing_thumbnails(&self) -> Vec<ArtifactId> {
        self.tracker
            .visible_keys()
            .copied()
            .filter(|&id| {
                self.cache.status(id, ResourceKind::Thumbnail) == Some(LoadStatus::NotLoaded)
            })
            .collect()
    }

    pub async fn load_full_image(&self, id: ArtifactId) -> Result<LoadOutcome, GalleryError> {
        Ok(self.cache.load_full_image(&self.client, id).await?)
    }

    /// Mark missing metadata of `ids` as loading and hand out one batch ticket.
    pub fn begin_metadata(&self, ids: &[ArtifactId]) -> Option<MetadataTicket> {
        self.cache.begin_metadata(ids)
    }

    /// Commit a metadata batch fetched for `ticket` and regroup.
    ///
    /// On success, metadata grouping still waits for is requested from the
    /// host. A failed batch returns its entries to not loaded without asking
    /// again; they are requested the next time they scroll into view.
    pub fn finish_metadata<S: EventSink + ?Sized>(
        &mut self,
        ticket: MetadataTicket,
        result: Result<Vec<ArtifactMetadata>, ClientError>,
        sink: &mut S,
    ) -> Result<usize, GalleryError> {
        let applied = self.cache.finish_metadata(ticket, result)?;
        if applied > 0 {
            self.regroup(&[], sink);
        }
        Ok(applied)
    }

    /// Load missing metadata for `ids` and regroup.
    pub async fn load_metadata(&mut self, ids: &[ArtifactId]) -> Result<usize, GalleryError> {
        let Some(ticket) = self.begin_metadata(ids) else {
            return Ok(0);
        };
        let result = self.client.get_metadata(&ticket.backend_ids()).await;

        let applied = self.cache.finish_metadata(ticket, result)?;
        if applied > 0 {
            self.refresh_sections();
        }
        Ok(applied)
    }

    /// Artifacts of the current query whose metadata is not loaded yet.
    pub fn missing_metadata(&self) -> Vec<ArtifactId> {
        self.pagination
            .ordered_ids()
            .iter()
            .copied()
            .filter(|&id| {
                self.cache.status(id, ResourceKind::Metadata) == Some(LoadStatus::NotLoaded)
            })
            .collect()
    }

    /// Ask the host for metadata of those `ids` that do not have it yet.
    fn request_metadata<S, I>(&self, ids: I, sink: &mut S)
    where
        S: EventSink + ?Sized,
        I: IntoIterator<Item = ArtifactId>,
    {
        let ids: Vec<ArtifactId> = ids
            .into_iter()
            .filter(|&id| {
                self.cache.status(id, ResourceKind::Metadata) == Some(LoadStatus::NotLoaded)
            })
            .collect();
        if !ids.is_empty() {
            sink.emit(GalleryEvent::LoadRequested { kind: ResourceKind::Metadata, ids });
        }
    }

    /// Regroup and request the metadata grouping is waiting on, or else the
    /// metadata of `fresh` artifacts.
    fn regroup<S: EventSink + ?Sized>(&mut self, fresh: &[ArtifactId], sink: &mut S) {
        let ordered = self.pagination.ordered_ids();
        let metadata = self.cache.metadata_map(ordered);

        match self.sections.recompute(&metadata, ordered) {
            Ok(()) => self.request_metadata(fresh.iter().copied(), sink),
            Err(incomplete) => self.request_metadata(incomplete.missing, sink),
        }
    }

    /// Regroup the current results. Returns `false` when grouping had to
    /// wait for metadata and the previous sections were kept.
    pub fn refresh_sections(&mut self) -> bool {
        let ordered = self.pagination.ordered_ids();
        let metadata = self.cache.metadata_map(ordered);
        self.sections.recompute(&metadata, ordered).is_ok()
    }

    pub fn toggle_section(&mut self, key: &SectionKey) -> Option<bool> {
        self.sections.toggle_collapsed(key)
    }

    /// Forget a deleted artifact, releasing its handles.
    pub fn remove_artifact(&mut self, id: ArtifactId) -> bool {
        let removed = self.pagination.remove_artifact(id);
        if removed {
            self.refresh_sections();
        }
        removed
    }

    pub fn toggle_selected(&self, id: ArtifactId) -> Option<bool> {
        self.cache.toggle_selected(id)
    }

    pub fn selected_ids(&self) -> Vec<ArtifactId> {
        self.cache.selected_ids()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::executor::block_on;
    use gallery_model::{ArtifactMetadata, ClientError, QueryPage};
    use gallery_viewport::Rect;
    use std::cell::Cell;

    const ROW_HEIGHT: f32 = 100.0;

    /// Backend with `total` artifacts, one per day going back from May 31.
    struct FakeBackend {
        total: usize,
        queries: Cell<usize>,
        fail_thumbnails: Cell<bool>,
    }

    impl FakeBackend {
        fn new(total: usize) -> Self {
            Self { total, queries: Cell::new(0), fail_thumbnails: Cell::new(false) }
        }
    }

    impl ArtifactClient for FakeBackend {
        async fn query_artifacts(
            &self,
            _query: &Query,
            _orderings: &[SortKey],
            results_per_page: u32,
            page_num: u32,
        ) -> Result<QueryPage, ClientError> {
            self.queries.set(self.queries.get() + 1);
            let per_page = results_per_page as usize;
            let start = (page_num as usize - 1) * per_page;
            let end = (start + per_page).min(self.total);
            Ok(QueryPage {
                identifiers: (start..end).map(|i| format!("img-{i:03}")).collect(),
                page_num,
                is_last_page: end >= self.total,
            })
        }

        async fn load_thumbnail(&self, backend_id: &str) -> Result<Vec<u8>, ClientError> {
            if self.fail_thumbnails.get() {
                return Err(ClientError::NotFound(backend_id.to_owned()));
            }
            Ok(backend_id.as_bytes().to_vec())
        }

        async fn load_full_image(&self, backend_id: &str) -> Result<Vec<u8>, ClientError> {
            Ok(backend_id.repeat(8).into_bytes())
        }

        async fn get_metadata(
            &self,
            backend_ids: &[String],
        ) -> Result<Vec<ArtifactMetadata>, ClientError> {
            Ok(backend_ids
                .iter()
                .map(|id| {
                    let index: u32 = id.trim_start_matches("img-").parse().unwrap_or(0);
                    let time = chrono::NaiveDate::from_ymd_opt(2024, 5, 31 - index % 30)
                        .and_then(|date| date.and_hms_opt(12, 0, 0))
                        .expect("valid timestamp");
                    ArtifactMetadata::new(id.clone()).with_capture_time(time)
                })
                .collect())
        }
    }

    /// Single-column list of rows.
    struct Rows {
        ids: Vec<ArtifactId>,
        scroll: f32,
        height: f32,
    }

    impl ChildLayout for Rows {
        type Key = ArtifactId;

        fn viewport(&self) -> Rect {
            Rect::new(0.0, self.scroll, 100.0, self.height)
        }

        fn child_count(&self) -> usize {
            self.ids.len()
        }

        fn child_key(&self, index: usize) -> Option<ArtifactId> {
            self.ids.get(index).copied()
        }

        fn child_rect(&self, index: usize) -> Option<Rect> {
            (index < self.ids.len())
                .then(|| Rect::new(0.0, index as f32 * ROW_HEIGHT, 100.0, ROW_HEIGHT))
        }
    }

    impl Rows {
        fn metrics(&self) -> ScrollMetrics {
            ScrollMetrics::new(self.height, self.ids.len() as f32 * ROW_HEIGHT, self.scroll)
        }
    }

    fn gallery(total: usize) -> Gallery<FakeBackend> {
        let config = GalleryConfig::default()
            .with_results_per_page(10)
            .with_visibility_margin_percent(0.0);
        Gallery::new(FakeBackend::new(total), config).unwrap()
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = GalleryConfig::default().with_results_per_page(0);
        assert!(matches!(
            Gallery::new(FakeBackend::new(1), config),
            Err(GalleryError::Config(_))
        ));
    }

    #[test]
    fn test_first_page_registers_and_groups() {
        let mut gallery = gallery(25);
        let request = gallery.start_query(Query::new("all"), Vec::new());

        let outcome = block_on(gallery.fetch_page(request)).unwrap();
        assert!(matches!(outcome, PageOutcome::Applied { page_num: 1, has_more_pages: true, .. }));
        assert_eq!(gallery.ordered_ids().len(), 10);
        assert_eq!(gallery.sections().len(), 10);
        assert_eq!(gallery.cache().len(), 10);
    }

    #[test]
    fn test_viewport_change_requests_loads_and_next_page() {
        let mut gallery = gallery(25);
        let request = gallery.start_query(Query::new("all"), Vec::new());
        block_on(gallery.fetch_page(request)).unwrap();
        gallery.enable_visibility_tracking();

        // 10 rows of content, viewport shows the last 3
        let rows = Rows { ids: gallery.ordered_ids().to_vec(), scroll: 700.0, height: 300.0 };
        let mut events = Vec::new();
        let update = gallery.on_viewport_change(&rows, rows.metrics(), &mut events);

        assert_eq!(update.became_visible.len(), 3);
        assert_eq!(update.requested_page, Some(2));
        assert!(events.iter().any(|event| matches!(
            event,
            GalleryEvent::LoadRequested { kind: ResourceKind::Thumbnail, ids } if ids.len() == 3
        )));
        assert!(events.iter().any(|event| matches!(
            event,
            GalleryEvent::MoreDataNeeded { direction: ScrollDirection::Forward, request }
                if request.page_num == 2
        )));
    }

    #[test]
    fn test_applied_page_requests_metadata_until_it_arrives() {
        let mut gallery = gallery(25);
        let request = gallery.start_query(Query::new("all"), Vec::new());
        let result = block_on(request.fetch(gallery.client()));

        let mut events = Vec::new();
        let outcome = gallery.apply_page(request, result, &mut events).unwrap();
        let PageOutcome::Applied { new_ids, .. } = outcome else {
            panic!("first page should apply");
        };
        assert_eq!(
            events,
            vec![GalleryEvent::LoadRequested { kind: ResourceKind::Metadata, ids: new_ids.clone() }]
        );
        assert!(gallery.sections().is_empty());
        assert_eq!(gallery.missing_metadata(), new_ids);

        let ticket = gallery.begin_metadata(&new_ids).unwrap();
        assert!(gallery.begin_metadata(&new_ids).is_none());
        let result = block_on(gallery.client().get_metadata(&ticket.backend_ids()));

        events.clear();
        assert_eq!(gallery.finish_metadata(ticket, result, &mut events).unwrap(), 10);
        assert!(events.is_empty());
        assert_eq!(gallery.sections().len(), 10);
        assert!(gallery.missing_metadata().is_empty());
    }

    #[test]
    fn test_visible_artifacts_without_metadata_are_requested() {
        let mut gallery = gallery(10);
        let request = gallery.start_query(Query::new("all"), Vec::new());
        let result = block_on(request.fetch(gallery.client()));
        gallery.apply_page(request, result, &mut Vec::<GalleryEvent>::new()).unwrap();
        gallery.enable_visibility_tracking();

        let rows = Rows { ids: gallery.ordered_ids().to_vec(), scroll: 0.0, height: 300.0 };
        let mut events = Vec::new();
        gallery.on_viewport_change(&rows, rows.metrics(), &mut events);

        assert!(events.contains(&GalleryEvent::LoadRequested {
            kind: ResourceKind::Metadata,
            ids: rows.ids[..3].to_vec(),
        }));
        assert!(events.contains(&GalleryEvent::LoadRequested {
            kind: ResourceKind::Thumbnail,
            ids: rows.ids[..3].to_vec(),
        }));
    }

    #[test]
    fn test_split_thumbnail_load() {
        let gallery = {
            let mut gallery = gallery(4);
            let request = gallery.start_query(Query::new("all"), Vec::new());
            block_on(gallery.fetch_page(request)).unwrap();
            gallery
        };
        let ids = gallery.ordered_ids().to_vec();

        let tickets = gallery.begin_loads(&ids, ResourceKind::Thumbnail);
        assert_eq!(tickets.len(), 4);
        assert!(gallery.begin_loads(&ids, ResourceKind::Thumbnail).is_empty());

        for ticket in tickets {
            let bytes = block_on(gallery.client().load_thumbnail(&ticket.backend_id));
            assert_eq!(gallery.finish_load(ticket, bytes).unwrap(), LoadOutcome::Loaded);
        }
        assert_eq!(gallery.cache_stats().loaded_thumbnails, 4);
    }

    #[test]
    fn test_invisible_artifacts_are_evicted() {
        let mut gallery = gallery(10);
        let request = gallery.start_query(Query::new("all"), Vec::new());
        block_on(gallery.fetch_page(request)).unwrap();
        gallery.enable_visibility_tracking();

        let mut rows = Rows { ids: gallery.ordered_ids().to_vec(), scroll: 0.0, height: 300.0 };
        let mut events = Vec::new();
        gallery.on_viewport_change(&rows, rows.metrics(), &mut events);

        let report = block_on(gallery.load_thumbnails(&gallery.missing_thumbnails()));
        assert_eq!(report.loaded, 3);
        assert_eq!(gallery.cache_stats().loaded_thumbnails, 3);

        rows.scroll = 500.0;
        events.clear();
        let update = gallery.on_viewport_change(&rows, rows.metrics(), &mut events);

        assert_eq!(update.evicted, {
            let mut ids = rows.ids[..3].to_vec();
            ids.sort();
            ids
        });
        assert_eq!(gallery.cache_stats().loaded_thumbnails, 0);
        assert!(events.contains(&GalleryEvent::EvictRequested {
            kind: ResourceKind::Thumbnail,
            ids: rows.ids[..3].to_vec(),
        }));
    }

    #[test]
    fn test_failed_thumbnails_are_reported() {
        let mut gallery = gallery(5);
        let request = gallery.start_query(Query::new("all"), Vec::new());
        block_on(gallery.fetch_page(request)).unwrap();
        gallery.client().fail_thumbnails.set(true);

        let ids = gallery.ordered_ids().to_vec();
        let report = block_on(gallery.load_thumbnails(&ids));

        assert_eq!(report.failures.len(), 5);
        assert_eq!(report.loaded, 0);
        assert_eq!(
            gallery.cache().status(ids[0], ResourceKind::Thumbnail),
            Some(LoadStatus::NotLoaded)
        );
    }

    #[test]
    fn test_remove_artifact_regroups() {
        let mut gallery = gallery(3);
        let request = gallery.start_query(Query::new("all"), Vec::new());
        block_on(gallery.fetch_page(request)).unwrap();
        let first = gallery.ordered_ids()[0];

        assert!(gallery.remove_artifact(first));
        assert_eq!(gallery.sections().len(), 2);
        assert!(gallery.sections().section_of(first).is_none());
        assert!(!gallery.remove_artifact(first));
    }

    #[test]
    fn test_section_toggle_and_selection() {
        let mut gallery = gallery(3);
        let request = gallery.start_query(Query::new("all"), Vec::new());
        block_on(gallery.fetch_page(request)).unwrap();

        let key = gallery.sections().sections()[0].key.clone();
        assert_eq!(gallery.toggle_section(&key), Some(true));
        assert_eq!(gallery.sections().visible_ids().len(), 2);

        let id = gallery.ordered_ids()[1];
        assert_eq!(gallery.toggle_selected(id), Some(true));
        assert_eq!(gallery.selected_ids(), vec![id]);
    }
}
