//! Media Grid Viewport Library
//!
//! Geometry-driven pieces of the grid engine: the visibility oracle, the
//! contiguous visibility window tracker and the infinite-scroll loader.
//!
//! Nothing here touches a real renderer. Element geometry is read through the
//! [`ChildLayout`] capability, so hosts can back it with live layout queries
//! and tests can feed synthetic rectangles.
//!
//! # Example
//!
//! ```
//! use gallery_viewport::{ChildLayout, Rect, VisibilityBatches, VisibilityTracker};
//!
//! struct Column {
//!     viewport: Rect,
//!     rows: Vec<Rect>,
//! }
//!
//! impl ChildLayout for Column {
//!     type Key = usize;
//!
//!     fn viewport(&self) -> Rect {
//!         self.viewport
//!     }
//!
//!     fn child_count(&self) -> usize {
//!         self.rows.len()
//!     }
//!
//!     fn child_key(&self, index: usize) -> Option<usize> {
//!         (index < self.rows.len()).then_some(index)
//!     }
//!
//!     fn child_rect(&self, index: usize) -> Option<Rect> {
//!         self.rows.get(index).copied()
//!     }
//! }
//!
//! let column = Column {
//!     viewport: Rect::new(0.0, 0.0, 100.0, 100.0),
//!     rows: (0..10).map(|i| Rect::new(0.0, i as f32 * 50.0, 100.0, 50.0)).collect(),
//! };
//!
//! let mut tracker = VisibilityTracker::new(0.0);
//! let mut batches = VisibilityBatches::default();
//! tracker.enable_visibility_tracking();
//! tracker.handle_viewport_change(&column, &mut batches);
//!
//! assert_eq!(tracker.visible_keys().copied().collect::<Vec<_>>(), vec![0, 1]);
//! ```

mod geometry;
mod infinite;
mod tracker;

pub use geometry::{is_visible, Rect};
pub use infinite::{LoaderConfig, LoaderOutcome, ScrollMetrics, SectionSource, WindowedLoader};
pub use tracker::{ChildLayout, VisibilityBatches, VisibilityObserver, VisibilityTracker};
