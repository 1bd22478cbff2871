//! Engine configuration.
//!
//! Configuration can be created programmatically, loaded from environment
//! variables, or read from a TOML file. Cache limits nest under `[cache]`.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use gallery_cache::CacheConfig;
use gallery_viewport::LoaderConfig;
use serde::{Deserialize, Serialize};

use crate::sections::GroupingMode;

/// Tunables for the whole engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GalleryConfig {
    /// Identifiers requested per page
    pub results_per_page: u32,
    /// Extra area around the viewport that still counts as visible, as a
    /// percentage of the viewport size on each edge
    pub visibility_margin_percent: f32,
    /// Buffer the loader keeps beyond the viewport, percent of its height
    pub overfill_margin_percent: f32,
    /// Buffer above which content is unloaded (bidirectional mode)
    pub maximum_overfill_percent: f32,
    pub bidirectional: bool,
    pub grouping: GroupingMode,
    pub cache: CacheConfig,
}

impl Default for GalleryConfig {
    fn default() -> Self {
        Self {
            results_per_page: 100,
            visibility_margin_percent: 50.0,
            overfill_margin_percent: 50.0,
            maximum_overfill_percent: 200.0,
            bidirectional: false,
            grouping: GroupingMode::Lenient,
            cache: CacheConfig::default(),
        }
    }
}

impl GalleryConfig {
    pub fn with_results_per_page(mut self, results_per_page: u32) -> Self {
        self.results_per_page = results_per_page;
        self
    }

    pub fn with_visibility_margin_percent(mut self, percent: f32) -> Self {
        self.visibility_margin_percent = percent;
        self
    }

    pub fn with_overfill_margin_percent(mut self, percent: f32) -> Self {
        self.overfill_margin_percent = percent;
        self
    }

    pub fn with_maximum_overfill_percent(mut self, percent: f32) -> Self {
        self.maximum_overfill_percent = percent;
        self
    }

    pub fn with_bidirectional(mut self, bidirectional: bool) -> Self {
        self.bidirectional = bidirectional;
        self
    }

    pub fn with_grouping(mut self, grouping: GroupingMode) -> Self {
        self.grouping = grouping;
        self
    }

    pub fn with_cache(mut self, cache: CacheConfig) -> Self {
        self.cache = cache;
        self
    }

    /// Loader thresholds derived from this configuration.
    pub fn loader_config(&self) -> LoaderConfig {
        LoaderConfig::default()
            .with_overfill_margin_percent(self.overfill_margin_percent)
            .with_maximum_overfill_percent(self.maximum_overfill_percent)
            .with_bidirectional(self.bidirectional)
    }

    /// Checks values that parse but make no sense.
    ///
    /// # Errors
    /// Returns [`ConfigError::InvalidValue`] for the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.results_per_page == 0 {
            return Err(invalid("results_per_page", self.results_per_page));
        }

        let percents = [
            ("visibility_margin_percent", self.visibility_margin_percent),
            ("overfill_margin_percent", self.overfill_margin_percent),
            ("maximum_overfill_percent", self.maximum_overfill_percent),
        ];
        for (key, value) in percents {
            if !value.is_finite() || value < 0.0 {
                return Err(invalid(key, value));
            }
        }

        if self.bidirectional && self.maximum_overfill_percent < self.overfill_margin_percent {
            return Err(invalid("maximum_overfill_percent", self.maximum_overfill_percent));
        }
        Ok(())
    }

    /// Returns the default configuration file location.
    ///
    /// - macOS: ~/Library/Application Support/media-grid/gallery.toml
    /// - Linux: ~/.config/media-grid/gallery.toml
    /// - Windows: %APPDATA%\media-grid\gallery.toml
    pub fn default_config_path() -> PathBuf {
        if let Some(config_dir) = dirs::config_dir() {
            config_dir.join("media-grid").join("gallery.toml")
        } else {
            PathBuf::from("media-grid.toml")
        }
    }

    /// Loads configuration from environment variables.
    ///
    /// Environment variables:
    /// - `GALLERY_RESULTS_PER_PAGE`: page size (default: 100)
    /// - `GALLERY_VISIBILITY_MARGIN`: visibility margin percent (default: 50)
    /// - `GALLERY_OVERFILL_MARGIN`: loader buffer percent (default: 50)
    /// - `GALLERY_MAX_OVERFILL`: unload threshold percent (default: 200)
    /// - `GALLERY_BIDIRECTIONAL`: `true`/`false`, `1`/`0` (default: false)
    /// - `GALLERY_GROUPING`: `lenient` or `strict` (default: lenient)
    /// - `GALLERY_MAX_THUMBNAILS`, `GALLERY_MAX_IMAGES`: cache caps
    ///
    /// # Errors
    /// Returns an error if any variable contains an invalid value.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Overrides fields that have an environment variable set.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = parse_env::<u32>("GALLERY_RESULTS_PER_PAGE")? {
            self.results_per_page = value;
        }
        if let Some(value) = parse_env::<f32>("GALLERY_VISIBILITY_MARGIN")? {
            self.visibility_margin_percent = value;
        }
        if let Some(value) = parse_env::<f32>("GALLERY_OVERFILL_MARGIN")? {
            self.overfill_margin_percent = value;
        }
        if let Some(value) = parse_env::<f32>("GALLERY_MAX_OVERFILL")? {
            self.maximum_overfill_percent = value;
        }
        if let Ok(value) = std::env::var("GALLERY_BIDIRECTIONAL") {
            self.bidirectional = match value.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" => true,
                "0" | "false" | "no" => false,
                _ => return Err(invalid("GALLERY_BIDIRECTIONAL", value)),
            };
        }
        if let Ok(value) = std::env::var("GALLERY_GROUPING") {
            self.grouping = match value.trim().to_ascii_lowercase().as_str() {
                "lenient" => GroupingMode::Lenient,
                "strict" => GroupingMode::Strict,
                _ => return Err(invalid("GALLERY_GROUPING", value)),
            };
        }

        self.cache.apply_env()?;
        Ok(())
    }

    /// Loads configuration from a TOML file.
    ///
    /// Missing keys keep their defaults:
    /// ```toml
    /// results_per_page = 200
    /// grouping = "strict"
    ///
    /// [cache]
    /// max_loaded_thumbnails = 500
    /// ```
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, parsed, or validated.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path.as_ref())?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Saves configuration to a TOML file, creating parent directories.
    ///
    /// # Errors
    /// Returns an error if the file cannot be written.
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, self.to_toml()?)?;
        Ok(())
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }
}

fn parse_env<T: std::str::FromStr>(name: &str) -> Result<Option<T>, ConfigError> {
    let Ok(value) = std::env::var(name) else {
        return Ok(None);
    };
    value.trim().parse::<T>().map(Some).map_err(|_| invalid(name, value))
}

fn invalid(key: &str, value: impl ToString) -> ConfigError {
    ConfigError::InvalidValue { key: key.to_owned(), value: value.to_string() }
}

/// Errors that can occur during configuration operations.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value {value:?} for configuration key {key}")]
    InvalidValue { key: String, value: String },
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error(transparent)]
    Cache(#[from] gallery_cache::ConfigError),
}
