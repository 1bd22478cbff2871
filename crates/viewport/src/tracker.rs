//! Contiguous visibility window tracking
//!
//! The tracker keeps the run of children currently visible in the viewport
//! as a double-ended queue. Scroll and resize events grow or shrink the run
//! from its ends instead of re-measuring every child, and each change is
//! reported as one batch so the host can issue one request per batch.

use std::collections::{HashSet, VecDeque};
use std::hash::Hash;
use std::ops::RangeInclusive;

use tracing::trace;

use crate::geometry::{is_visible, Rect};

/// Geometry capability of a scroll container.
///
/// The container owns the ordered list of children; children are addressed
/// by display index and identified by a stable key. Nothing points back from
/// a child to the container.
pub trait ChildLayout {
    type Key: Clone + Eq + Hash;

    /// Current viewport rectangle in the same coordinates as child rects.
    fn viewport(&self) -> Rect;

    /// Number of children in display order.
    fn child_count(&self) -> usize;

    /// Stable key of the child at `index`.
    fn child_key(&self, index: usize) -> Option<Self::Key>;

    /// Bounding box of the child at `index`, or `None` when it is detached.
    fn child_rect(&self, index: usize) -> Option<Rect>;

    /// Display index of the child with `key`.
    fn index_of(&self, key: &Self::Key) -> Option<usize> {
        (0..self.child_count()).find(|&index| self.child_key(index).as_ref() == Some(key))
    }
}

/// Receiver of visibility batches.
pub trait VisibilityObserver<K> {
    fn on_visible(&mut self, keys: Vec<K>);
    fn on_invisible(&mut self, keys: Vec<K>);
}

/// Observer that records every batch in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VisibilityBatches<K> {
    pub visible: Vec<Vec<K>>,
    pub invisible: Vec<Vec<K>>,
}

impl<K> Default for VisibilityBatches<K> {
    fn default() -> Self {
        Self { visible: Vec::new(), invisible: Vec::new() }
    }
}

impl<K> VisibilityBatches<K> {
    pub fn is_empty(&self) -> bool {
        self.visible.is_empty() && self.invisible.is_empty()
    }

    pub fn clear(&mut self) {
        self.visible.clear();
        self.invisible.clear();
    }
}

impl<K> VisibilityObserver<K> for VisibilityBatches<K> {
    fn on_visible(&mut self, keys: Vec<K>) {
        self.visible.push(keys);
    }

    fn on_invisible(&mut self, keys: Vec<K>) {
        self.invisible.push(keys);
    }
}

#[derive(Debug, Clone)]
struct WindowEntry<K> {
    index: usize,
    key: K,
}

/// Tracks the contiguous run of visible children.
///
/// Invariant: the window entries have consecutive display indices, and every
/// one of them was visible when last checked.
#[derive(Debug, Clone)]
pub struct VisibilityTracker<K> {
    window: VecDeque<WindowEntry<K>>,
    margin_percent: f32,
    tracking_enabled: bool,
}

impl<K: Clone + Eq + Hash> VisibilityTracker<K> {
    /// Create a tracker that expands the viewport by `margin_percent`.
    pub fn new(margin_percent: f32) -> Self {
        Self { window: VecDeque::new(), margin_percent, tracking_enabled: false }
    }

    pub fn margin_percent(&self) -> f32 {
        self.margin_percent
    }

    pub fn is_tracking_enabled(&self) -> bool {
        self.tracking_enabled
    }

    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    /// Keys of the visible children in display order.
    pub fn visible_keys(&self) -> impl Iterator<Item = &K> {
        self.window.iter().map(|entry| &entry.key)
    }

    /// Display indices covered by the window.
    pub fn visible_range(&self) -> Option<RangeInclusive<usize>> {
        let front = self.window.front()?;
        let back = self.window.back()?;
        Some(front.index..=back.index)
    }

    pub fn contains(&self, key: &K) -> bool {
        self.window.iter().any(|entry| &entry.key == key)
    }

    /// Turn tracking on.
    ///
    /// Returns `true` only on the transition, which is when the host should
    /// register its scroll listener and resize observer. Calling it again
    /// while enabled returns `false` so listeners are never registered twice.
    pub fn enable_visibility_tracking(&mut self) -> bool {
        if self.tracking_enabled {
            return false;
        }
        self.tracking_enabled = true;
        true
    }

    /// Turn tracking off. Returns `true` only on the transition.
    pub fn disable_visibility_tracking(&mut self) -> bool {
        if !self.tracking_enabled {
            return false;
        }
        self.tracking_enabled = false;
        true
    }

    /// Scroll/resize listener body.
    ///
    /// Contraction runs before expansion so a child leaving one edge and
    /// another entering the opposite edge are both handled in one pass. If
    /// contraction empties the window (a jump past every tracked child), the
    /// window is rebuilt right away.
    pub fn handle_viewport_change<L, O>(&mut self, layout: &L, observer: &mut O)
    where
        L: ChildLayout<Key = K>,
        O: VisibilityObserver<K>,
    {
        if !self.tracking_enabled {
            return;
        }

        if self.window.is_empty() {
            self.reset_visibility_tracking(layout, observer);
            return;
        }

        self.remove_all_invisible(layout, observer);

        if self.window.is_empty() {
            self.reset_visibility_tracking(layout, observer);
        } else {
            self.add_all_newly_visible(layout, observer);
        }
    }

    /// Rebuild the window from scratch.
    ///
    /// Scans children in display order for the first visible one, reports it,
    /// then expands around it. Previous membership is forgotten without an
    /// invisible batch; use [`Self::children_changed`] after structural
    /// changes to get one.
    pub fn reset_visibility_tracking<L, O>(&mut self, layout: &L, observer: &mut O)
    where
        L: ChildLayout<Key = K>,
        O: VisibilityObserver<K>,
    {
        self.window.clear();

        if let Some(first) = self.seed(layout) {
            observer.on_visible(vec![first]);
            self.add_all_newly_visible(layout, observer);
        } else {
            trace!(children = layout.child_count(), "no visible child found");
        }
    }

    /// Grow the window at both ends while the neighbouring child is visible.
    pub fn add_all_newly_visible<L, O>(&mut self, layout: &L, observer: &mut O)
    where
        L: ChildLayout<Key = K>,
        O: VisibilityObserver<K>,
    {
        let added = self.expand(layout);
        if !added.is_empty() {
            trace!(count = added.len(), "children became visible");
            observer.on_visible(added);
        }
    }

    /// Shrink the window at both ends while the boundary child is invisible.
    pub fn remove_all_invisible<L, O>(&mut self, layout: &L, observer: &mut O)
    where
        L: ChildLayout<Key = K>,
        O: VisibilityObserver<K>,
    {
        let removed = self.contract(layout);
        if !removed.is_empty() {
            trace!(count = removed.len(), "children became invisible");
            observer.on_invisible(removed);
        }
    }

    /// Re-synchronize after children were inserted, removed or reordered.
    ///
    /// When the tracked keys still form a consecutive run their indices are
    /// updated in place and a normal contract/expand pass follows. Otherwise
    /// the window is rebuilt and only the membership difference is reported.
    pub fn children_changed<L, O>(&mut self, layout: &L, observer: &mut O)
    where
        L: ChildLayout<Key = K>,
        O: VisibilityObserver<K>,
    {
        if self.window.is_empty() {
            if self.tracking_enabled {
                self.reset_visibility_tracking(layout, observer);
            }
            return;
        }

        if self.reindex(layout) {
            if self.tracking_enabled {
                self.remove_all_invisible(layout, observer);
                if self.window.is_empty() {
                    self.reset_visibility_tracking(layout, observer);
                } else {
                    self.add_all_newly_visible(layout, observer);
                }
            }
            return;
        }

        let previous: Vec<K> = self.window.drain(..).map(|entry| entry.key).collect();

        if self.tracking_enabled && self.seed(layout).is_some() {
            self.expand(layout);
        }

        let current: HashSet<&K> = self.visible_keys().collect();
        let gone: Vec<K> =
            previous.iter().filter(|key| !current.contains(key)).cloned().collect();

        let before: HashSet<&K> = previous.iter().collect();
        let arrived: Vec<K> =
            self.visible_keys().filter(|key| !before.contains(key)).cloned().collect();

        trace!(gone = gone.len(), arrived = arrived.len(), "window rebuilt after structural change");

        if !gone.is_empty() {
            observer.on_invisible(gone);
        }
        if !arrived.is_empty() {
            observer.on_visible(arrived);
        }
    }

    fn is_child_visible<L: ChildLayout<Key = K>>(&self, layout: &L, index: usize) -> bool {
        is_visible(layout.child_rect(index), layout.viewport(), self.margin_percent)
    }

    /// Find the first visible child and make it the only window member.
    fn seed<L: ChildLayout<Key = K>>(&mut self, layout: &L) -> Option<K> {
        let index = (0..layout.child_count()).find(|&index| self.is_child_visible(layout, index))?;
        let key = layout.child_key(index)?;

        self.window.push_back(WindowEntry { index, key: key.clone() });
        Some(key)
    }

    fn expand<L: ChildLayout<Key = K>>(&mut self, layout: &L) -> Vec<K> {
        let mut added = Vec::new();
        let count = layout.child_count();

        while let Some(back) = self.window.back() {
            let next = back.index + 1;
            if next >= count || !self.is_child_visible(layout, next) {
                break;
            }
            let Some(key) = layout.child_key(next) else {
                break;
            };
            self.window.push_back(WindowEntry { index: next, key: key.clone() });
            added.push(key);
        }

        while let Some(front) = self.window.front() {
            let Some(previous) = front.index.checked_sub(1) else {
                break;
            };
            if !self.is_child_visible(layout, previous) {
                break;
            }
            let Some(key) = layout.child_key(previous) else {
                break;
            };
            self.window.push_front(WindowEntry { index: previous, key: key.clone() });
            added.push(key);
        }

        added
    }

    fn contract<L: ChildLayout<Key = K>>(&mut self, layout: &L) -> Vec<K> {
        let mut removed = Vec::new();

        while let Some(front) = self.window.front() {
            if self.is_child_visible(layout, front.index) {
                break;
            }
            if let Some(entry) = self.window.pop_front() {
                removed.push(entry.key);
            }
        }

        while let Some(back) = self.window.back() {
            if self.is_child_visible(layout, back.index) {
                break;
            }
            if let Some(entry) = self.window.pop_back() {
                removed.push(entry.key);
            }
        }

        removed
    }

    /// Resolve every window key to its current index.
    ///
    /// Returns `false` when a key vanished or the run is no longer
    /// consecutive, leaving the window untouched.
    fn reindex<L: ChildLayout<Key = K>>(&mut self, layout: &L) -> bool {
        let mut indices = Vec::with_capacity(self.window.len());
        for entry in &self.window {
            match layout.index_of(&entry.key) {
                Some(index) => indices.push(index),
                None => return false,
            }
        }

        if indices.windows(2).any(|pair| pair[1] != pair[0] + 1) {
            return false;
        }

        for (entry, index) in self.window.iter_mut().zip(indices) {
            entry.index = index;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    /// Vertical list of rows inside a scrolling viewport.
    struct Column {
        viewport: Rect,
        keys: Vec<u32>,
        rows: Vec<Option<Rect>>,
    }

    impl Column {
        fn uniform(count: usize, row_height: f32, viewport_height: f32) -> Self {
            Self {
                viewport: Rect::new(0.0, 0.0, 100.0, viewport_height),
                keys: (0..count as u32).collect(),
                rows: (0..count)
                    .map(|i| Some(Rect::new(0.0, i as f32 * row_height, 100.0, row_height)))
                    .collect(),
            }
        }

        fn scroll_to(&mut self, offset: f32) {
            self.viewport.y = offset;
        }
    }

    impl ChildLayout for Column {
        type Key = u32;

        fn viewport(&self) -> Rect {
            self.viewport
        }

        fn child_count(&self) -> usize {
            self.rows.len()
        }

        fn child_key(&self, index: usize) -> Option<u32> {
            self.keys.get(index).copied()
        }

        fn child_rect(&self, index: usize) -> Option<Rect> {
            self.rows.get(index).copied().flatten()
        }
    }

    fn window(tracker: &VisibilityTracker<u32>) -> Vec<u32> {
        tracker.visible_keys().copied().collect()
    }

    #[test]
    fn test_reset_seeds_then_expands() {
        let mut column = Column::uniform(20, 100.0, 300.0);
        column.scroll_to(450.0);

        let mut tracker = VisibilityTracker::new(0.0);
        let mut batches = VisibilityBatches::default();
        tracker.reset_visibility_tracking(&column, &mut batches);

        // Rows 4..=7 overlap 450..750
        assert_eq!(window(&tracker), vec![4, 5, 6, 7]);
        assert_eq!(batches.visible, vec![vec![4], vec![5, 6, 7]]);
        assert!(batches.invisible.is_empty());
        assert_eq!(tracker.visible_range(), Some(4..=7));
    }

    #[test]
    fn test_reset_with_nothing_visible_leaves_window_empty() {
        let mut column = Column::uniform(5, 100.0, 300.0);
        column.scroll_to(5000.0);

        let mut tracker = VisibilityTracker::new(0.0);
        let mut batches = VisibilityBatches::default();
        tracker.reset_visibility_tracking(&column, &mut batches);

        assert!(tracker.is_empty());
        assert!(batches.is_empty());
    }

    #[test]
    fn test_scroll_contracts_before_expanding() {
        let mut column = Column::uniform(20, 100.0, 300.0);
        let mut tracker = VisibilityTracker::new(0.0);
        let mut batches = VisibilityBatches::default();
        tracker.enable_visibility_tracking();
        tracker.handle_viewport_change(&column, &mut batches);
        assert_eq!(window(&tracker), vec![0, 1, 2]);

        batches.clear();
        column.scroll_to(150.0);
        tracker.handle_viewport_change(&column, &mut batches);

        assert_eq!(window(&tracker), vec![1, 2, 3, 4]);
        assert_eq!(batches.invisible, vec![vec![0]]);
        assert_eq!(batches.visible, vec![vec![3, 4]]);
    }

    #[test]
    fn test_scroll_up_expands_front() {
        let mut column = Column::uniform(20, 100.0, 300.0);
        column.scroll_to(1000.0);
        let mut tracker = VisibilityTracker::new(0.0);
        let mut batches = VisibilityBatches::default();
        tracker.enable_visibility_tracking();
        tracker.handle_viewport_change(&column, &mut batches);
        assert_eq!(window(&tracker), vec![10, 11, 12]);

        batches.clear();
        column.scroll_to(800.0);
        tracker.handle_viewport_change(&column, &mut batches);

        assert_eq!(window(&tracker), vec![8, 9, 10]);
        assert_eq!(batches.invisible, vec![vec![12, 11]]);
        assert_eq!(batches.visible, vec![vec![9, 8]]);
    }

    #[test]
    fn test_jump_past_window_rebuilds_in_same_pass() {
        let mut column = Column::uniform(50, 100.0, 300.0);
        let mut tracker = VisibilityTracker::new(0.0);
        let mut batches = VisibilityBatches::default();
        tracker.enable_visibility_tracking();
        tracker.handle_viewport_change(&column, &mut batches);

        batches.clear();
        column.scroll_to(3000.0);
        tracker.handle_viewport_change(&column, &mut batches);

        assert_eq!(window(&tracker), vec![30, 31, 32]);
        assert_eq!(batches.invisible, vec![vec![0, 1, 2]]);
        assert_eq!(batches.visible, vec![vec![30], vec![31, 32]]);
    }

    #[test]
    fn test_margin_widens_window() {
        let column = Column::uniform(20, 100.0, 200.0);
        let mut tracker = VisibilityTracker::new(50.0);
        let mut batches = VisibilityBatches::default();
        tracker.reset_visibility_tracking(&column, &mut batches);

        // Viewport 0..200 expanded by 100px on each side
        assert_eq!(window(&tracker), vec![0, 1, 2]);
    }

    #[test]
    fn test_detached_child_stops_expansion() {
        let mut column = Column::uniform(10, 100.0, 500.0);
        column.rows[3] = None;

        let mut tracker = VisibilityTracker::new(0.0);
        let mut batches = VisibilityBatches::default();
        tracker.reset_visibility_tracking(&column, &mut batches);

        assert_eq!(window(&tracker), vec![0, 1, 2]);
    }

    #[test]
    fn test_disabled_tracker_ignores_events() {
        let column = Column::uniform(10, 100.0, 300.0);
        let mut tracker = VisibilityTracker::new(0.0);
        let mut batches = VisibilityBatches::default();

        tracker.handle_viewport_change(&column, &mut batches);
        assert!(tracker.is_empty());
        assert!(batches.is_empty());
    }

    #[test]
    fn test_enable_and_disable_are_idempotent() {
        let mut tracker: VisibilityTracker<u32> = VisibilityTracker::new(0.0);

        assert!(tracker.enable_visibility_tracking());
        assert!(!tracker.enable_visibility_tracking());
        assert!(tracker.is_tracking_enabled());

        assert!(tracker.disable_visibility_tracking());
        assert!(!tracker.disable_visibility_tracking());
        assert!(!tracker.is_tracking_enabled());
    }

    #[test]
    fn test_children_changed_with_insert_above_reindexes() {
        let mut column = Column::uniform(10, 100.0, 300.0);
        column.scroll_to(400.0);
        let mut tracker = VisibilityTracker::new(0.0);
        let mut batches = VisibilityBatches::default();
        tracker.enable_visibility_tracking();
        tracker.handle_viewport_change(&column, &mut batches);
        assert_eq!(window(&tracker), vec![4, 5, 6]);

        // Prepend a row; everything shifts down by one slot
        column.keys.insert(0, 100);
        column.rows.push(Some(Rect::new(0.0, 1000.0, 100.0, 100.0)));

        batches.clear();
        tracker.children_changed(&column, &mut batches);

        assert_eq!(window(&tracker), vec![3, 4, 5]);
        assert_eq!(batches.invisible, vec![vec![6]]);
        assert_eq!(batches.visible, vec![vec![3]]);
    }

    #[test]
    fn test_children_changed_with_removed_member_reports_difference() {
        let mut column = Column::uniform(10, 100.0, 300.0);
        let mut tracker = VisibilityTracker::new(0.0);
        let mut batches = VisibilityBatches::default();
        tracker.enable_visibility_tracking();
        tracker.handle_viewport_change(&column, &mut batches);
        assert_eq!(window(&tracker), vec![0, 1, 2]);

        // Remove key 1; the rows keep their slots
        column.keys.remove(1);
        column.rows.pop();

        batches.clear();
        tracker.children_changed(&column, &mut batches);

        assert_eq!(window(&tracker), vec![0, 2, 3]);
        assert_eq!(batches.invisible, vec![vec![1]]);
        assert_eq!(batches.visible, vec![vec![3]]);
    }

    fn oracle_window(column: &Column, margin: f32, tracked: &[u32]) -> bool {
        // Every tracked child is visible, the run is consecutive, and its
        // neighbours are not visible.
        let indices: Vec<usize> =
            tracked.iter().filter_map(|key| column.index_of(key)).collect();
        if indices.len() != tracked.len() {
            return false;
        }
        if indices.windows(2).any(|pair| pair[1] != pair[0] + 1) {
            return false;
        }
        let visible = |index: usize| is_visible(column.child_rect(index), column.viewport, margin);
        if !indices.iter().all(|&index| visible(index)) {
            return false;
        }
        match (indices.first(), indices.last()) {
            (Some(&first), Some(&last)) => {
                let before_ok = first == 0 || !visible(first - 1);
                let after_ok = last + 1 >= column.child_count() || !visible(last + 1);
                before_ok && after_ok
            }
            _ => (0..column.child_count()).all(|index| !visible(index)),
        }
    }

    proptest! {
        #[test]
        fn prop_window_stays_contiguous(
            heights in proptest::collection::vec(10.0f32..200.0, 1..60),
            offsets in proptest::collection::vec(0.0f32..6000.0, 1..20),
            margin in 0.0f32..100.0,
        ) {
            let mut y = 0.0;
            let rows: Vec<Option<Rect>> = heights
                .iter()
                .map(|h| {
                    let rect = Rect::new(0.0, y, 100.0, *h);
                    y += h;
                    Some(rect)
                })
                .collect();
            let mut column = Column {
                viewport: Rect::new(0.0, 0.0, 100.0, 400.0),
                keys: (0..rows.len() as u32).collect(),
                rows,
            };

            let mut tracker = VisibilityTracker::new(margin);
            let mut batches = VisibilityBatches::default();
            tracker.enable_visibility_tracking();

            for offset in offsets {
                column.scroll_to(offset);
                tracker.handle_viewport_change(&column, &mut batches);
                let tracked = window(&tracker);
                prop_assert!(oracle_window(&column, margin, &tracked));
            }
        }
    }
}
