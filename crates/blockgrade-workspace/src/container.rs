//! Host elements a workspace can be bound to.
//!
//! A [`Container`] stands in for the DOM element the visual widget is
//! injected into. The manager only needs to know whether it has a rendering
//! surface, how big it currently is, and when that size changes.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::{broadcast, watch};

use crate::Size;

/// Capacity of the viewport resize channel. Listeners that fall further
/// behind than this just resync once more.
const VIEWPORT_CHANNEL_CAPACITY: usize = 16;

/// A host element that can carry one workspace.
pub trait Container: Send + Sync + fmt::Debug {
    /// Stable identifier, unique among live containers.
    fn id(&self) -> &str;

    /// Returns `true` if the element has a rendering surface.
    fn is_attached(&self) -> bool;

    /// Current laid-out size.
    fn measure(&self) -> Size;

    /// Subscribes to size changes. The receiver starts with the current size
    /// marked as seen, so only later changes wake it.
    fn size_changes(&self) -> watch::Receiver<Size>;
}

/// An in-memory container used by the CLI and by tests.
///
/// ```
/// use blockgrade_workspace::{Container, HeadlessContainer, Size};
///
/// let container = HeadlessContainer::new("editor", Size::new(800, 600));
/// container.set_size(Size::new(1024, 768));
/// assert_eq!(container.measure(), Size::new(1024, 768));
/// ```
pub struct HeadlessContainer {
    id: String,
    attached: AtomicBool,
    size: watch::Sender<Size>,
}

impl HeadlessContainer {
    /// Creates an attached container with the given size.
    #[must_use]
    pub fn new(id: impl Into<String>, size: Size) -> Self {
        let (size, _) = watch::channel(size);
        Self {
            id: id.into(),
            attached: AtomicBool::new(true),
            size,
        }
    }

    /// Creates a container without a rendering surface.
    #[must_use]
    pub fn detached(id: impl Into<String>) -> Self {
        let container = Self::new(id, Size::default());
        container.detach();
        container
    }

    /// Changes the laid-out size and notifies observers.
    pub fn set_size(&self, size: Size) {
        self.size.send_replace(size);
    }

    /// Removes the rendering surface.
    pub fn detach(&self) {
        self.attached.store(false, Ordering::SeqCst);
    }

    /// Restores the rendering surface.
    pub fn attach(&self) {
        self.attached.store(true, Ordering::SeqCst);
    }
}

impl fmt::Debug for HeadlessContainer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HeadlessContainer")
            .field("id", &self.id)
            .field("attached", &self.is_attached())
            .field("size", &self.measure())
            .finish()
    }
}

impl Container for HeadlessContainer {
    fn id(&self) -> &str {
        &self.id
    }

    fn is_attached(&self) -> bool {
        self.attached.load(Ordering::SeqCst)
    }

    fn measure(&self) -> Size {
        *self.size.borrow()
    }

    fn size_changes(&self) -> watch::Receiver<Size> {
        self.size.subscribe()
    }
}

/// The window-level viewport. Every managed workspace listens to it for its
/// whole lifetime.
#[derive(Debug, Clone)]
pub struct Viewport {
    resizes: broadcast::Sender<Size>,
}

impl Default for Viewport {
    fn default() -> Self {
        Self::new()
    }
}

impl Viewport {
    /// Creates a viewport with no listeners.
    #[must_use]
    pub fn new() -> Self {
        let (resizes, _) = broadcast::channel(VIEWPORT_CHANNEL_CAPACITY);
        Self { resizes }
    }

    /// Announces a window resize. Returns how many listeners were notified.
    pub fn resize(&self, size: Size) -> usize {
        self.resizes.send(size).unwrap_or(0)
    }

    /// Registers a new listener.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Size> {
        self.resizes.subscribe()
    }

    /// Number of live listeners.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.resizes.receiver_count()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn detached_container_reports_no_surface() {
        let container = HeadlessContainer::detached("editor");
        assert!(!container.is_attached());

        container.attach();
        assert!(container.is_attached());
    }

    #[test]
    fn size_changes_only_wakes_on_new_values() {
        let container = HeadlessContainer::new("editor", Size::new(800, 600));
        let mut changes = container.size_changes();

        assert!(!changes.has_changed().unwrap());

        container.set_size(Size::new(640, 480));
        tokio_test::block_on(changes.changed()).unwrap();
        assert_eq!(*changes.borrow_and_update(), Size::new(640, 480));
    }

    #[test]
    fn viewport_counts_listeners() {
        let viewport = Viewport::new();
        assert_eq!(viewport.resize(Size::new(1, 1)), 0);

        let _first = viewport.subscribe();
        let _second = viewport.subscribe();
        assert_eq!(viewport.listener_count(), 2);
        assert_eq!(viewport.resize(Size::new(1280, 720)), 2);
    }
}
