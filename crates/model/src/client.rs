//! Interface of the network client the engine consumes.
//!
//! The transport itself lives outside this workspace. Every method is
//! asynchronous and fallible, and no partial success is defined: a call either
//! returns the full result or an error.

use crate::query::{Query, QueryPage, SortKey};
use crate::ArtifactMetadata;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClientError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("server returned status {status}: {message}")]
    Server { status: u16, message: String },
    #[error("artifact not found: {0}")]
    NotFound(String),
    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

/// Backend operations used by pagination and the resource cache.
///
/// Futures returned by implementations run on the host's single-threaded
/// executor, so they are not required to be `Send`.
#[allow(async_fn_in_trait)]
pub trait ArtifactClient {
    async fn query_artifacts(
        &self,
        query: &Query,
        orderings: &[SortKey],
        results_per_page: u32,
        page_num: u32,
    ) -> Result<QueryPage, ClientError>;

    async fn load_thumbnail(&self, backend_id: &str) -> Result<Vec<u8>, ClientError>;

    async fn load_full_image(&self, backend_id: &str) -> Result<Vec<u8>, ClientError>;

    /// Returns metadata in the same order as `backend_ids`.
    async fn get_metadata(
        &self,
        backend_ids: &[String],
    ) -> Result<Vec<ArtifactMetadata>, ClientError>;
}
