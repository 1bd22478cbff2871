//! Notifications emitted to the host

use std::sync::mpsc::Sender;

use gallery_model::{ArtifactId, ResourceKind};
use gallery_viewport::VisibilityObserver;

use crate::pagination::PageRequest;

/// Which end of the content a section request grows.
///
/// [`Gallery`](crate::Gallery) pages only forward, so it only emits
/// `Forward`. `Backward` is reserved for hosts that drive their own
/// bidirectional [`SectionSource`](gallery_viewport::SectionSource) and
/// report through the same event type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScrollDirection {
    Forward,
    Backward,
}

/// Something the host should react to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GalleryEvent {
    /// Artifacts entered the visibility window
    ChildrenVisible(Vec<ArtifactId>),
    /// Artifacts left the visibility window
    ChildrenInvisible(Vec<ArtifactId>),
    /// The loader asked for another page; the host should fetch `request`
    MoreDataNeeded { direction: ScrollDirection, request: PageRequest },
    /// Resources the host should load: thumbnails and metadata of newly
    /// visible artifacts, metadata of new or ungrouped artifacts
    LoadRequested { kind: ResourceKind, ids: Vec<ArtifactId> },
    /// Resources that were released, or whose in-flight load was abandoned
    EvictRequested { kind: ResourceKind, ids: Vec<ArtifactId> },
}

/// Destination for [`GalleryEvent`]s.
pub trait EventSink {
    fn emit(&mut self, event: GalleryEvent);
}

impl EventSink for Vec<GalleryEvent> {
    fn emit(&mut self, event: GalleryEvent) {
        self.push(event);
    }
}

impl EventSink for Sender<GalleryEvent> {
    fn emit(&mut self, event: GalleryEvent) {
        // A dropped receiver means nobody is listening any more
        let _ = self.send(event);
    }
}

/// Adapts an [`EventSink`] to the tracker's observer interface.
pub(crate) struct SinkObserver<'a, S: ?Sized> {
    pub sink: &'a mut S,
    pub visible: Vec<ArtifactId>,
    pub invisible: Vec<ArtifactId>,
}

impl<'a, S: EventSink + ?Sized> SinkObserver<'a, S> {
    pub fn new(sink: &'a mut S) -> Self {
        Self { sink, visible: Vec::new(), invisible: Vec::new() }
    }
}

impl<S: EventSink + ?Sized> VisibilityObserver<ArtifactId> for SinkObserver<'_, S> {
    fn on_visible(&mut self, keys: Vec<ArtifactId>) {
        self.visible.extend_from_slice(&keys);
        self.sink.emit(GalleryEvent::ChildrenVisible(keys));
    }

    fn on_invisible(&mut self, keys: Vec<ArtifactId>) {
        self.invisible.extend_from_slice(&keys);
        self.sink.emit(GalleryEvent::ChildrenInvisible(keys));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn test_channel_sink() {
        let (mut tx, rx) = mpsc::channel();
        let id = ArtifactId::from_backend_id("a");
        tx.emit(GalleryEvent::ChildrenVisible(vec![id]));

        assert_eq!(rx.try_recv().unwrap(), GalleryEvent::ChildrenVisible(vec![id]));
    }

    #[test]
    fn test_channel_sink_ignores_closed_receiver() {
        let (mut tx, rx) = mpsc::channel();
        drop(rx);
        tx.emit(GalleryEvent::ChildrenInvisible(Vec::new()));
    }

    #[test]
    fn test_observer_forwards_batches() {
        let mut events = Vec::new();
        let a = ArtifactId::from_backend_id("a");
        let b = ArtifactId::from_backend_id("b");

        let mut observer = SinkObserver::new(&mut events);
        observer.on_visible(vec![a]);
        observer.on_visible(vec![b]);
        observer.on_invisible(vec![a]);
        assert_eq!(observer.visible, vec![a, b]);
        assert_eq!(observer.invisible, vec![a]);

        assert_eq!(events.len(), 3);
        assert_eq!(events[2], GalleryEvent::ChildrenInvisible(vec![a]));
    }
}
