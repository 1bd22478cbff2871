//! Infinite-scroll section loading
//!
//! Decides from scroll metrics alone whether more content should be requested
//! so that a buffer of rendered-but-offscreen content stays ahead of (and,
//! in bidirectional mode, behind) the viewport.

use tracing::trace;

/// Scroll position of the grid container.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ScrollMetrics {
    pub viewport_height: f32,
    pub content_height: f32,
    pub scroll_offset: f32,
}

impl ScrollMetrics {
    pub fn new(viewport_height: f32, content_height: f32, scroll_offset: f32) -> Self {
        Self { viewport_height, content_height, scroll_offset }
    }

    /// Content below the bottom edge of the viewport.
    pub fn buffer_ahead(&self) -> f32 {
        (self.content_height - self.scroll_offset - self.viewport_height).max(0.0)
    }

    /// Content above the top edge of the viewport.
    pub fn buffer_behind(&self) -> f32 {
        self.scroll_offset.max(0.0)
    }
}

/// Thresholds for the loader.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoaderConfig {
    /// Buffer to keep loaded on each side, as a percentage of viewport height
    pub overfill_margin_percent: f32,

    /// Buffer above which sections are unloaded (bidirectional mode only)
    pub maximum_overfill_percent: f32,

    /// Whether content is also loaded and unloaded above the viewport
    pub bidirectional: bool,

    /// Upper bound on load/unload calls in one tick
    pub max_steps_per_tick: usize,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            overfill_margin_percent: 50.0,
            maximum_overfill_percent: 200.0,
            bidirectional: false,
            max_steps_per_tick: 64,
        }
    }
}

impl LoaderConfig {
    pub fn with_overfill_margin_percent(mut self, percent: f32) -> Self {
        self.overfill_margin_percent = percent.max(0.0);
        self
    }

    pub fn with_maximum_overfill_percent(mut self, percent: f32) -> Self {
        self.maximum_overfill_percent = percent.max(0.0);
        self
    }

    pub fn with_bidirectional(mut self, bidirectional: bool) -> Self {
        self.bidirectional = bidirectional;
        self
    }
}

/// Host side of the loader.
///
/// `load_*` and `unload_*` return `false` when there is nothing to do in that
/// direction, which ends the corresponding loop. Running out of pages is
/// reported that way, never as an error.
pub trait SectionSource {
    /// Whether a page fetch is currently in flight.
    fn is_busy(&self) -> bool;

    /// Metrics after whatever the last call changed.
    fn metrics(&self) -> ScrollMetrics;

    fn load_next_section(&mut self) -> bool;

    fn load_previous_section(&mut self) -> bool {
        false
    }

    fn unload_next_section(&mut self) -> bool {
        false
    }

    fn unload_previous_section(&mut self) -> bool {
        false
    }
}

/// What one tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LoaderOutcome {
    pub loaded_next: usize,
    pub loaded_previous: usize,
    pub unloaded_next: usize,
    pub unloaded_previous: usize,
}

impl LoaderOutcome {
    pub fn is_idle(&self) -> bool {
        *self == Self::default()
    }
}

/// Infinite-scroll controller.
#[derive(Debug, Clone, Default)]
pub struct WindowedLoader {
    config: LoaderConfig,
}

impl WindowedLoader {
    pub fn new(config: LoaderConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    /// Buffer the loader tries to keep on each side, in pixels.
    pub fn target_buffer(&self, metrics: &ScrollMetrics) -> f32 {
        metrics.viewport_height * self.config.overfill_margin_percent / 100.0
    }

    /// Buffer above which content is unloaded, in pixels.
    pub fn maximum_buffer(&self, metrics: &ScrollMetrics) -> f32 {
        metrics.viewport_height * self.config.maximum_overfill_percent / 100.0
    }

    pub fn needs_next(&self, metrics: &ScrollMetrics) -> bool {
        metrics.buffer_ahead() < self.target_buffer(metrics)
    }

    pub fn needs_previous(&self, metrics: &ScrollMetrics) -> bool {
        self.config.bidirectional && metrics.buffer_behind() < self.target_buffer(metrics)
    }

    /// Run one render/scroll tick against `source`.
    pub fn tick<S: SectionSource + ?Sized>(&self, source: &mut S) -> LoaderOutcome {
        let mut outcome = LoaderOutcome::default();
        let mut steps = 0;
        let limit = self.config.max_steps_per_tick;

        while steps < limit && !source.is_busy() && self.needs_next(&source.metrics()) {
            if !source.load_next_section() {
                break;
            }
            outcome.loaded_next += 1;
            steps += 1;
        }

        while steps < limit && !source.is_busy() && self.needs_previous(&source.metrics()) {
            if !source.load_previous_section() {
                break;
            }
            outcome.loaded_previous += 1;
            steps += 1;
        }

        if self.config.bidirectional {
            while steps < limit {
                let metrics = source.metrics();
                if metrics.buffer_behind() <= self.maximum_buffer(&metrics)
                    || !source.unload_previous_section()
                {
                    break;
                }
                outcome.unloaded_previous += 1;
                steps += 1;
            }

            while steps < limit {
                let metrics = source.metrics();
                if metrics.buffer_ahead() <= self.maximum_buffer(&metrics)
                    || !source.unload_next_section()
                {
                    break;
                }
                outcome.unloaded_next += 1;
                steps += 1;
            }
        }

        if !outcome.is_idle() {
            trace!(?outcome, "infinite scroll tick");
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Source that appends a fixed-height section per load.
    struct FakeSource {
        metrics: ScrollMetrics,
        section_height: f32,
        remaining_next: usize,
        remaining_previous: usize,
        busy_after_load: bool,
        busy: bool,
        unloadable_previous: usize,
    }

    impl FakeSource {
        fn new(metrics: ScrollMetrics) -> Self {
            Self {
                metrics,
                section_height: 200.0,
                remaining_next: usize::MAX,
                remaining_previous: 0,
                busy_after_load: false,
                busy: false,
                unloadable_previous: 0,
            }
        }
    }

    impl SectionSource for FakeSource {
        fn is_busy(&self) -> bool {
            self.busy
        }

        fn metrics(&self) -> ScrollMetrics {
            self.metrics
        }

        fn load_next_section(&mut self) -> bool {
            if self.remaining_next == 0 {
                return false;
            }
            self.remaining_next -= 1;
            self.metrics.content_height += self.section_height;
            self.busy = self.busy_after_load;
            true
        }

        fn load_previous_section(&mut self) -> bool {
            if self.remaining_previous == 0 {
                return false;
            }
            self.remaining_previous -= 1;
            self.metrics.content_height += self.section_height;
            self.metrics.scroll_offset += self.section_height;
            true
        }

        fn unload_previous_section(&mut self) -> bool {
            if self.unloadable_previous == 0 {
                return false;
            }
            self.unloadable_previous -= 1;
            self.metrics.content_height -= self.section_height;
            self.metrics.scroll_offset -= self.section_height;
            true
        }
    }

    #[test]
    fn test_buffers() {
        let metrics = ScrollMetrics::new(1000.0, 1500.0, 500.0);
        assert_eq!(metrics.buffer_ahead(), 0.0);
        assert_eq!(metrics.buffer_behind(), 500.0);

        let overscrolled = ScrollMetrics::new(1000.0, 1500.0, 900.0);
        assert_eq!(overscrolled.buffer_ahead(), 0.0);
    }

    #[test]
    fn test_bottom_reached_requests_next_section() {
        let loader = WindowedLoader::default();
        let metrics = ScrollMetrics::new(1000.0, 1500.0, 500.0);

        assert_eq!(loader.target_buffer(&metrics), 500.0);
        assert!(loader.needs_next(&metrics));
    }

    #[test]
    fn test_full_buffer_requests_nothing() {
        let loader = WindowedLoader::default();
        let mut source = FakeSource::new(ScrollMetrics::new(1000.0, 1500.0, 0.0));

        let outcome = loader.tick(&mut source);
        assert!(outcome.is_idle());
        assert_eq!(source.metrics.content_height, 1500.0);
    }

    #[test]
    fn test_loads_until_target_reached() {
        let loader = WindowedLoader::default();
        let mut source = FakeSource::new(ScrollMetrics::new(1000.0, 1500.0, 500.0));

        let outcome = loader.tick(&mut source);

        // 0px ahead, 500px target, 200px per section
        assert_eq!(outcome.loaded_next, 3);
        assert_eq!(source.metrics.buffer_ahead(), 600.0);
    }

    #[test]
    fn test_busy_source_stops_loop() {
        let loader = WindowedLoader::default();
        let mut source = FakeSource::new(ScrollMetrics::new(1000.0, 1500.0, 500.0));
        source.busy_after_load = true;

        let outcome = loader.tick(&mut source);
        assert_eq!(outcome.loaded_next, 1);

        // Still busy on the next tick: nothing happens
        let outcome = loader.tick(&mut source);
        assert!(outcome.is_idle());
    }

    #[test]
    fn test_exhausted_source_terminates() {
        let loader = WindowedLoader::default();
        let mut source = FakeSource::new(ScrollMetrics::new(1000.0, 1000.0, 0.0));
        source.remaining_next = 1;

        let outcome = loader.tick(&mut source);
        assert_eq!(outcome.loaded_next, 1);
        assert!(loader.needs_next(&source.metrics));
    }

    #[test]
    fn test_step_limit_bounds_non_progressing_source() {
        let loader = WindowedLoader::default();
        let mut source = FakeSource::new(ScrollMetrics::new(1000.0, 1000.0, 0.0));
        source.section_height = 0.0;

        let outcome = loader.tick(&mut source);
        assert_eq!(outcome.loaded_next, LoaderConfig::default().max_steps_per_tick);
    }

    #[test]
    fn test_previous_sections_only_when_bidirectional() {
        let metrics = ScrollMetrics::new(1000.0, 3000.0, 0.0);

        let forward_only = WindowedLoader::default();
        let mut source = FakeSource::new(metrics);
        source.remaining_previous = 5;
        assert_eq!(forward_only.tick(&mut source).loaded_previous, 0);

        let bidirectional = WindowedLoader::new(LoaderConfig::default().with_bidirectional(true));
        let mut source = FakeSource::new(metrics);
        source.remaining_previous = 5;
        let outcome = bidirectional.tick(&mut source);
        assert_eq!(outcome.loaded_previous, 3);
        assert_eq!(source.metrics.buffer_behind(), 600.0);
    }

    #[test]
    fn test_unloads_beyond_maximum_overfill() {
        let loader = WindowedLoader::new(LoaderConfig::default().with_bidirectional(true));
        let mut source = FakeSource::new(ScrollMetrics::new(1000.0, 6000.0, 2600.0));
        source.unloadable_previous = 10;

        let outcome = loader.tick(&mut source);

        // 2600px behind, 2000px cap, 200px per section
        assert_eq!(outcome.unloaded_previous, 3);
        assert_eq!(source.metrics.buffer_behind(), 2000.0);
    }
}
