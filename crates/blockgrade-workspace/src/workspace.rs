//! The headless workspace widget.
//!
//! [`Workspace`] holds the live block graph and the widget's notion of its
//! rendered size. Only the lifecycle manager creates one; everything else
//! reads it through [`BlockSource`].

use parking_lot::{Mutex, RwLock};
use tracing::debug;

use crate::block::{BlockState, WorkspaceState};
use crate::options::ViewOptions;
use crate::toolbox::ToolboxSpec;
use crate::{LifecycleState, Result, Size, WorkspaceError};

/// Read-only access to a block graph.
pub trait BlockSource {
    /// Returns a copy of the block graph as it is right now.
    fn snapshot(&self) -> WorkspaceState;
}

impl BlockSource for WorkspaceState {
    fn snapshot(&self) -> WorkspaceState {
        self.clone()
    }
}

#[derive(Debug, Default)]
struct RenderState {
    size: Size,
    resizes: usize,
    disposed: bool,
}

/// A live visual program bound to one container.
#[derive(Debug)]
pub struct Workspace {
    container_id: String,
    toolbox: ToolboxSpec,
    options: ViewOptions,
    blocks: RwLock<WorkspaceState>,
    render: Mutex<RenderState>,
}

impl Workspace {
    pub(crate) fn new(container_id: String, toolbox: ToolboxSpec, options: ViewOptions) -> Self {
        Self {
            container_id,
            toolbox,
            options,
            blocks: RwLock::new(WorkspaceState::default()),
            render: Mutex::new(RenderState::default()),
        }
    }

    /// Identifier of the container this workspace is bound to.
    #[must_use]
    pub fn container_id(&self) -> &str {
        &self.container_id
    }

    /// The toolbox the workspace was created with.
    #[must_use]
    pub const fn toolbox(&self) -> &ToolboxSpec {
        &self.toolbox
    }

    /// The view options the workspace was created with.
    #[must_use]
    pub const fn options(&self) -> &ViewOptions {
        &self.options
    }

    /// `Ready` until disposed, then `Disposed`.
    #[must_use]
    pub fn lifecycle(&self) -> LifecycleState {
        if self.render.lock().disposed {
            LifecycleState::Disposed
        } else {
            LifecycleState::Ready
        }
    }

    /// Returns `true` once the workspace has been disposed.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.render.lock().disposed
    }

    /// Re-synchronizes the rendered dimensions with `size`.
    ///
    /// Returns `false` without recording anything if the workspace is
    /// disposed or `size` has no area.
    pub fn resize_to(&self, size: Size) -> bool {
        let mut render = self.render.lock();
        if render.disposed || size.is_empty() {
            return false;
        }
        render.size = size;
        render.resizes += 1;
        debug!(container = %self.container_id, %size, count = render.resizes, "Workspace resized");
        true
    }

    /// Last size applied by [`Workspace::resize_to`].
    #[must_use]
    pub fn rendered_size(&self) -> Size {
        self.render.lock().size
    }

    /// Number of resize calls applied so far.
    #[must_use]
    pub fn resize_count(&self) -> usize {
        self.render.lock().resizes
    }

    /// Removes every block and variable. The workspace stays usable.
    pub fn clear(&self) -> Result<()> {
        self.ensure_live()?;
        *self.blocks.write() = WorkspaceState::default();
        debug!(container = %self.container_id, "Workspace cleared");
        Ok(())
    }

    /// Replaces the block graph.
    pub fn load(&self, state: WorkspaceState) -> Result<()> {
        self.ensure_live()?;
        *self.blocks.write() = state;
        Ok(())
    }

    /// Parses a serialized block program and loads it.
    pub fn load_json(&self, json: &str) -> Result<()> {
        let state = WorkspaceState::from_json(json)?;
        self.load(state)
    }

    /// Adds a top-level block stack.
    pub fn append_block(&self, block: BlockState) -> Result<()> {
        self.ensure_live()?;
        self.blocks.write().push(block);
        Ok(())
    }

    /// Declares a variable and returns its id.
    pub fn create_variable(&self, name: &str) -> Result<String> {
        self.ensure_live()?;
        Ok(self.blocks.write().declare_variable(name))
    }

    /// Number of blocks currently in the graph.
    #[must_use]
    pub fn block_count(&self) -> usize {
        self.blocks.read().block_count()
    }

    pub(crate) fn mark_disposed(&self) {
        let mut render = self.render.lock();
        render.disposed = true;
        self.blocks.write().blocks.blocks.clear();
    }

    fn ensure_live(&self) -> Result<()> {
        if self.is_disposed() {
            Err(WorkspaceError::Disposed)
        } else {
            Ok(())
        }
    }
}

impl BlockSource for Workspace {
    fn snapshot(&self) -> WorkspaceState {
        self.blocks.read().clone()
    }
}
