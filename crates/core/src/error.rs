use gallery_cache::CacheError;
use gallery_model::ClientError;

use crate::config::ConfigError;

#[derive(Debug, thiserror::Error)]
pub enum GalleryError {
    #[error("failed to fetch page {page_num}: {source}")]
    Page {
        page_num: u32,
        #[source]
        source: ClientError,
    },
    #[error(transparent)]
    Cache(#[from] CacheError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}
