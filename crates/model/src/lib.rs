//! Shared data model for the media grid.
//!
//! Identity, load status and metadata types used by the viewport, cache and
//! core crates, plus the interface of the network client the engine consumes.

pub mod client;
pub mod query;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

pub use client::{ArtifactClient, ClientError};
pub use query::{Query, QueryOptions, QueryPage, RequestState, SortDirection, SortKey};

/// Namespace for deriving artifact identities from backend ids.
const ARTIFACT_NAMESPACE: Uuid = Uuid::from_u128(0x6d2c_41f0_8a3e_4b8e_9c55_7f0e_2a61_c3d9);

/// Stable identity of an artifact.
///
/// Derived from the backend id with a name-based UUID, so the same backend id
/// maps to the same identity in every session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ArtifactId(pub Uuid);

impl ArtifactId {
    pub fn from_backend_id(backend_id: &str) -> Self {
        Self(Uuid::new_v5(&ARTIFACT_NAMESPACE, backend_id.as_bytes()))
    }
}

impl fmt::Display for ArtifactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

/// Load state of one resource of an artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum LoadStatus {
    #[default]
    NotLoaded,
    Loading,
    Loaded,
}

/// The per-artifact resources the cache tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceKind {
    Thumbnail,
    FullImage,
    Metadata,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Thumbnail => "thumbnail",
            Self::FullImage => "full image",
            Self::Metadata => "metadata",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum MediaType {
    #[default]
    Image,
    Video,
}

/// Metadata returned by the backend for one artifact.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ArtifactMetadata {
    pub name: String,
    pub capture_time: Option<NaiveDateTime>,
    pub session: Option<String>,
    pub media_type: MediaType,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

impl ArtifactMetadata {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), ..Default::default() }
    }

    pub fn with_capture_time(mut self, capture_time: NaiveDateTime) -> Self {
        self.capture_time = Some(capture_time);
        self
    }

    pub fn with_session(mut self, session: impl Into<String>) -> Self {
        self.session = Some(session.into());
        self
    }

    pub fn with_media_type(mut self, media_type: MediaType) -> Self {
        self.media_type = media_type;
        self
    }

    /// Calendar day the artifact was captured on.
    pub fn capture_date(&self) -> Option<NaiveDate> {
        self.capture_time.map(|time| time.date())
    }
}
