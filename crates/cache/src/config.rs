//! Cache limits configuration.
//!
//! Limits can be set programmatically, from environment variables, or as part
//! of the engine configuration file (the struct is serde-enabled so it nests
//! there).

use serde::{Deserialize, Serialize};

/// Upper bounds on simultaneously loaded resources.
///
/// The visibility tracker evicts off-screen resources as they leave the
/// window, which normally keeps the loaded set near the window size. These
/// caps are a hard ceiling on top of that: when a load would exceed one, the
/// least recently loaded resource of that kind is evicted. `None` disables a
/// cap; in files and environment variables that is written as `0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum number of loaded thumbnail handles
    #[serde(with = "cap")]
    pub max_loaded_thumbnails: Option<usize>,
    /// Maximum number of loaded full-image handles
    #[serde(with = "cap")]
    pub max_loaded_images: Option<usize>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { max_loaded_thumbnails: Some(1000), max_loaded_images: Some(8) }
    }
}

impl CacheConfig {
    /// Configuration without any caps.
    pub fn unbounded() -> Self {
        Self { max_loaded_thumbnails: None, max_loaded_images: None }
    }

    pub fn with_max_loaded_thumbnails(mut self, max: Option<usize>) -> Self {
        self.max_loaded_thumbnails = max;
        self
    }

    pub fn with_max_loaded_images(mut self, max: Option<usize>) -> Self {
        self.max_loaded_images = max;
        self
    }

    /// Loads configuration from environment variables.
    ///
    /// Environment variables (`0` disables the cap):
    /// - `GALLERY_MAX_THUMBNAILS`: thumbnail cap (default: 1000)
    /// - `GALLERY_MAX_IMAGES`: full-image cap (default: 8)
    ///
    /// # Errors
    /// Returns an error if any variable is not a non-negative integer.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env()?;
        Ok(config)
    }

    /// Overrides fields that have an environment variable set.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Some(max) = cap_from_env("GALLERY_MAX_THUMBNAILS")? {
            self.max_loaded_thumbnails = max;
        }
        if let Some(max) = cap_from_env("GALLERY_MAX_IMAGES")? {
            self.max_loaded_images = max;
        }
        Ok(())
    }
}

fn cap_from_env(name: &str) -> Result<Option<Option<usize>>, ConfigError> {
    let Ok(value) = std::env::var(name) else {
        return Ok(None);
    };

    let max = value
        .trim()
        .parse::<usize>()
        .map_err(|_| ConfigError::InvalidValue { key: name.to_owned(), value })?;

    Ok(Some((max > 0).then_some(max)))
}

mod cap {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(max: &Option<usize>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(max.unwrap_or(0) as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<usize>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let max = usize::deserialize(deserializer)?;
        Ok((max > 0).then_some(max))
    }
}

/// Errors that can occur while reading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value {value:?} for configuration key {key}")]
    InvalidValue { key: String, value: String },
}
