//! Paginated query state machine
//!
//! Owns the current query, its options and the page bookkeeping, and
//! guarantees that at most one page request is in flight and that pages are
//! requested in increasing order. A guard violation is not an error: the
//! request is simply not issued.
//!
//! Requests are split like scheduler jobs: a guarded call hands out a
//! [`PageRequest`], the host fetches it, and [`PaginationCoordinator::apply`]
//! commits the result. Each request carries the generation of the query it
//! belongs to and a sequence number of its own, so a response that arrives
//! after a new query started, or a second answer to a request that was
//! already applied, is recognized and dropped.

use std::collections::HashSet;

use gallery_cache::ResourceCache;
use gallery_model::{
    ArtifactClient, ArtifactId, ClientError, Query, QueryOptions, QueryPage, RequestState,
    SortKey,
};
use tracing::{debug, warn};

use crate::error::GalleryError;

/// Query, options and request lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct QueryState {
    pub current_query: Option<Query>,
    pub options: QueryOptions,
    pub request_state: RequestState,
    /// Only meaningful after the first successful page
    pub has_more_pages: bool,
}

/// A page fetch that passed the pagination guard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    pub query: Query,
    pub orderings: Vec<SortKey>,
    pub results_per_page: u32,
    pub page_num: u32,
    generation: u64,
    sequence: u64,
}

impl PageRequest {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Perform the network call for this request.
    pub async fn fetch<C: ArtifactClient>(&self, client: &C) -> Result<QueryPage, ClientError> {
        client
            .query_artifacts(&self.query, &self.orderings, self.results_per_page, self.page_num)
            .await
    }
}

/// Result of applying a page response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageOutcome {
    Applied {
        page_num: u32,
        /// Artifacts not seen earlier in this query, in result order
        new_ids: Vec<ArtifactId>,
        has_more_pages: bool,
    },
    /// The response belongs to a query that has since been replaced, or
    /// answers a request that is no longer outstanding
    Stale,
}

/// The one outstanding page request.
#[derive(Debug, Clone, Copy)]
struct InFlight {
    page_num: u32,
    sequence: u64,
}

/// Coordinates paginated fetching for one query at a time.
pub struct PaginationCoordinator {
    cache: ResourceCache,
    state: QueryState,
    generation: u64,
    next_sequence: u64,
    last_completed_page: Option<u32>,
    in_flight: Option<InFlight>,
    ordered_ids: Vec<ArtifactId>,
    seen: HashSet<ArtifactId>,
}

impl PaginationCoordinator {
    /// Create a coordinator that registers results in `cache`.
    pub fn new(cache: ResourceCache) -> Self {
        Self {
            cache,
            state: QueryState::default(),
            generation: 0,
            next_sequence: 0,
            last_completed_page: None,
            in_flight: None,
            ordered_ids: Vec::new(),
            seen: HashSet::new(),
        }
    }

    pub fn state(&self) -> &QueryState {
        &self.state
    }

    pub fn request_state(&self) -> RequestState {
        self.state.request_state
    }

    pub fn has_more_pages(&self) -> bool {
        self.state.has_more_pages
    }

    /// Whether a page request is in flight.
    pub fn is_busy(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Page of the outstanding request, if any.
    pub fn in_flight_page(&self) -> Option<u32> {
        self.in_flight.map(|in_flight| in_flight.page_num)
    }

    pub fn last_completed_page(&self) -> Option<u32> {
        self.last_completed_page
    }

    /// Page that `continue_query` would accept next, if any.
    pub fn next_page(&self) -> Option<u32> {
        if self.state.current_query.is_none() || !self.state.has_more_pages || self.is_busy() {
            return None;
        }
        self.last_completed_page.map(|page| page + 1)
    }

    /// Artifacts of the current query in result order, without duplicates.
    pub fn ordered_ids(&self) -> &[ArtifactId] {
        &self.ordered_ids
    }

    /// Start a new query from `options.page_num`.
    ///
    /// Allowed in any state. Every entity registered for the previous query
    /// is discarded (releasing its handles) and any in-flight page of the
    /// previous query becomes stale.
    pub fn start_new_query(&mut self, query: Query, options: QueryOptions) -> PageRequest {
        self.generation += 1;
        self.cache.clear();
        self.ordered_ids.clear();
        self.seen.clear();

        let page_num = options.page_num;
        debug!(query = query.as_str(), page_num, generation = self.generation, "starting query");

        self.state = QueryState {
            current_query: Some(query),
            options,
            request_state: RequestState::Loading,
            has_more_pages: false,
        };
        self.last_completed_page = None;

        self.request(page_num)
    }

    /// Request a continuation page.
    ///
    /// Returns `None` without side effects unless a query is set, more pages
    /// exist, no page is in flight, and `page_num` is greater than the last
    /// completed page.
    pub fn continue_query(&mut self, page_num: u32) -> Option<PageRequest> {
        self.state.current_query.as_ref()?;

        if !self.state.has_more_pages || self.is_busy() {
            return None;
        }
        match self.last_completed_page {
            Some(last) if page_num > last => {}
            _ => return None,
        }

        debug!(page_num, generation = self.generation, "continuing query");
        self.state.request_state = RequestState::Loading;
        Some(self.request(page_num))
    }

    /// Issue a request for `page_num` and mark it as the one in flight.
    fn request(&mut self, page_num: u32) -> PageRequest {
        self.next_sequence += 1;
        let sequence = self.next_sequence;
        self.in_flight = Some(InFlight { page_num, sequence });

        PageRequest {
            query: self.state.current_query.clone().unwrap_or_else(|| Query::new("")),
            orderings: self.state.options.orderings.clone(),
            results_per_page: self.state.options.results_per_page,
            page_num,
            generation: self.generation,
            sequence,
        }
    }

    /// Commit the response to `request`.
    ///
    /// A successful page registers its identifiers (additively) and updates
    /// the page bookkeeping. A failed page moves to [`RequestState::Failed`]
    /// and returns the error; it is not retried, but the same page may be
    /// requested again later.
    ///
    /// Only the outstanding request is committed. A response for a replaced
    /// query, or a repeated answer to a request that was already applied,
    /// returns [`PageOutcome::Stale`] and changes nothing.
    pub fn apply(
        &mut self,
        request: PageRequest,
        result: Result<QueryPage, ClientError>,
    ) -> Result<PageOutcome, GalleryError> {
        if request.generation != self.generation {
            warn!(
                page_num = request.page_num,
                generation = request.generation,
                current = self.generation,
                "dropping page response for a replaced query"
            );
            return Ok(PageOutcome::Stale);
        }
        if self.in_flight.map(|in_flight| in_flight.sequence) != Some(request.sequence) {
            warn!(
                page_num = request.page_num,
                in_flight = ?self.in_flight_page(),
                "dropping page response for a request that is no longer outstanding"
            );
            return Ok(PageOutcome::Stale);
        }

        self.in_flight = None;

        match result {
            Ok(page) => {
                if page.page_num != request.page_num {
                    debug!(
                        requested = request.page_num,
                        returned = page.page_num,
                        "backend returned a different page number"
                    );
                }

                let ids = self.cache.register(&page.identifiers);
                let mut new_ids = Vec::new();
                for id in ids {
                    if self.seen.insert(id) {
                        self.ordered_ids.push(id);
                        new_ids.push(id);
                    }
                }

                let page_num = request.page_num;
                self.state.has_more_pages = !page.is_last_page;
                self.state.options.page_num = page_num;
                self.state.request_state = RequestState::Succeeded;
                self.last_completed_page = Some(page_num);

                debug!(
                    page_num,
                    new = new_ids.len(),
                    total = self.ordered_ids.len(),
                    has_more_pages = self.state.has_more_pages,
                    "page applied"
                );

                Ok(PageOutcome::Applied {
                    page_num,
                    new_ids,
                    has_more_pages: self.state.has_more_pages,
                })
            }
            Err(source) => {
                self.state.request_state = RequestState::Failed;
                warn!(page_num = request.page_num, error = %source, "page request failed");
                Err(GalleryError::Page { page_num: request.page_num, source })
            }
        }
    }

    /// Fetch and apply `request` in one step.
    pub async fn run<C: ArtifactClient>(
        &mut self,
        client: &C,
        request: PageRequest,
    ) -> Result<PageOutcome, GalleryError> {
        let result = request.fetch(client).await;
        self.apply(request, result)
    }

    /// Drop a deleted artifact from the query results and the cache.
    pub fn remove_artifact(&mut self, id: ArtifactId) -> bool {
        let known = self.seen.remove(&id);
        if known {
            self.ordered_ids.retain(|existing| *existing != id);
        }
        self.cache.remove(id) || known
    }
}
