//! Workspace lifecycle management.
//!
//! [`WorkspaceManager::create`] binds a [`Workspace`] to a [`Container`] and
//! starts three background tasks that keep the rendered size in step with
//! the container:
//!
//! - a settling schedule of resyncs at growing delays after creation
//! - an observer on the container's size changes
//! - a listener on window-level [`Viewport`] resizes
//!
//! All three are owned by the returned [`ManagedWorkspace`] and are aborted
//! together when it is disposed or dropped.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, instrument, trace};

use crate::block::WorkspaceState;
use crate::container::{Container, Viewport};
use crate::options::ViewOptions;
use crate::toolbox::ToolboxSpec;
use crate::workspace::{BlockSource, Workspace};
use crate::{LifecycleState, Result, Size, WorkspaceError};

/// Default settling delays in milliseconds.
pub const DEFAULT_RESYNC_DELAYS_MS: [u64; 9] = [0, 50, 100, 200, 300, 500, 800, 1000, 1500];

/// Delays after creation at which the workspace re-measures its container.
///
/// Delays are kept in ascending order regardless of how they were given.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<u64>", into = "Vec<u64>")]
pub struct ResyncSchedule {
    delays: Vec<Duration>,
}

impl Default for ResyncSchedule {
    fn default() -> Self {
        Self::from_millis(&DEFAULT_RESYNC_DELAYS_MS)
    }
}

impl ResyncSchedule {
    /// Creates a schedule from arbitrary delays.
    #[must_use]
    pub fn new(delays: impl IntoIterator<Item = Duration>) -> Self {
        let mut delays: Vec<_> = delays.into_iter().collect();
        delays.sort_unstable();
        Self { delays }
    }

    /// Creates a schedule from delays in milliseconds.
    #[must_use]
    pub fn from_millis(delays: &[u64]) -> Self {
        Self::new(delays.iter().copied().map(Duration::from_millis))
    }

    /// A schedule with no settling resyncs.
    #[must_use]
    pub const fn none() -> Self {
        Self { delays: Vec::new() }
    }

    /// Delays in ascending order.
    #[must_use]
    pub fn delays(&self) -> &[Duration] {
        &self.delays
    }

    /// Number of scheduled resyncs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.delays.len()
    }

    /// Returns `true` if no resyncs are scheduled.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.delays.is_empty()
    }

    /// Time after creation at which the last resync fires.
    #[must_use]
    pub fn settling_window(&self) -> Duration {
        self.delays.last().copied().unwrap_or_default()
    }
}

impl From<Vec<u64>> for ResyncSchedule {
    fn from(delays: Vec<u64>) -> Self {
        Self::from_millis(&delays)
    }
}

impl From<ResyncSchedule> for Vec<u64> {
    fn from(schedule: ResyncSchedule) -> Self {
        schedule
            .delays
            .iter()
            .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
            .collect()
    }
}

/// Creates workspaces and enforces one workspace per container.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use blockgrade_workspace::{HeadlessContainer, Size, ToolboxSpec, ViewOptions, WorkspaceManager};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> blockgrade_workspace::Result<()> {
/// let manager = WorkspaceManager::new();
/// let container = Arc::new(HeadlessContainer::new("editor", Size::new(800, 600)));
///
/// let managed = manager.create(container, ToolboxSpec::standard(), ViewOptions::default())?;
/// managed.dispose();
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct WorkspaceManager {
    bound: Arc<Mutex<HashMap<String, LifecycleState>>>,
    schedule: ResyncSchedule,
    viewport: Viewport,
}

impl WorkspaceManager {
    /// Creates a manager with the default schedule and its own viewport.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses a custom settling schedule.
    #[must_use]
    pub fn with_schedule(mut self, schedule: ResyncSchedule) -> Self {
        self.schedule = schedule;
        self
    }

    /// Listens to an existing viewport instead of a private one.
    #[must_use]
    pub fn with_viewport(mut self, viewport: Viewport) -> Self {
        self.viewport = viewport;
        self
    }

    /// The viewport new workspaces listen to.
    #[must_use]
    pub const fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    /// The settling schedule applied to new workspaces.
    #[must_use]
    pub const fn schedule(&self) -> &ResyncSchedule {
        &self.schedule
    }

    /// Returns `true` if a live workspace is bound to `container_id`.
    #[must_use]
    pub fn is_bound(&self, container_id: &str) -> bool {
        self.state(container_id) == LifecycleState::Ready
    }

    /// Lifecycle of the most recent workspace created for `container_id`.
    ///
    /// `Uninitialized` until a workspace is created there, `Ready` while it
    /// is live and `Disposed` once it has been torn down.
    #[must_use]
    pub fn state(&self, container_id: &str) -> LifecycleState {
        self.bound
            .lock()
            .get(container_id)
            .copied()
            .unwrap_or_default()
    }

    /// Binds a new workspace to `container` and starts its resync tasks.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// - [`WorkspaceError::Initialization`] if the container has no rendering
    ///   surface or there is no runtime to schedule resyncs on.
    /// - [`WorkspaceError::ContainerInUse`] if another workspace from this
    ///   manager is still bound to the container.
    #[instrument(skip_all, fields(container = %container.id()))]
    pub fn create(
        &self,
        container: Arc<dyn Container>,
        toolbox: &ToolboxSpec,
        options: ViewOptions,
    ) -> Result<ManagedWorkspace> {
        let container_id = container.id().to_string();

        if !container.is_attached() {
            return Err(WorkspaceError::initialization(
                container_id,
                "container has no attached rendering surface",
            ));
        }

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return Err(WorkspaceError::initialization(
                container_id,
                "no async runtime available to schedule resize tasks",
            ));
        };

        {
            let mut bound = self.bound.lock();
            if bound.get(&container_id) == Some(&LifecycleState::Ready) {
                return Err(WorkspaceError::ContainerInUse(container_id));
            }
            bound.insert(container_id.clone(), LifecycleState::Ready);
        }

        let workspace = Arc::new(Workspace::new(
            container_id.clone(),
            toolbox.clone(),
            options,
        ));

        // Subscribe before spawning so changes made right after `create`
        // returns are not missed.
        let size_changes = container.size_changes();
        let viewport_resizes = self.viewport.subscribe();
        let created = Instant::now();

        let tasks = vec![
            runtime.spawn(settle(
                Arc::clone(&workspace),
                Arc::clone(&container),
                self.schedule.clone(),
                created,
            )),
            runtime.spawn(observe_container(Arc::clone(&workspace), size_changes)),
            runtime.spawn(listen_viewport(
                Arc::clone(&workspace),
                Arc::clone(&container),
                viewport_resizes,
            )),
        ];

        info!(
            resyncs = self.schedule.len(),
            size = %container.measure(),
            "Workspace created"
        );

        Ok(ManagedWorkspace {
            workspace,
            tasks,
            bound: Arc::clone(&self.bound),
            container_id,
        })
    }
}

async fn settle(
    workspace: Arc<Workspace>,
    container: Arc<dyn Container>,
    schedule: ResyncSchedule,
    created: Instant,
) {
    for (attempt, delay) in schedule.delays().iter().enumerate() {
        tokio::time::sleep_until(created + *delay).await;
        let applied = workspace.resize_to(container.measure());
        trace!(attempt, ?delay, applied, "Settling resync");
    }
    debug!("Settling window finished");
}

async fn observe_container(workspace: Arc<Workspace>, mut changes: watch::Receiver<Size>) {
    while changes.changed().await.is_ok() {
        let size = *changes.borrow_and_update();
        workspace.resize_to(size);
    }
}

async fn listen_viewport(
    workspace: Arc<Workspace>,
    container: Arc<dyn Container>,
    mut resizes: broadcast::Receiver<Size>,
) {
    loop {
        match resizes.recv().await {
            Ok(_) | Err(RecvError::Lagged(_)) => {
                workspace.resize_to(container.measure());
            }
            Err(RecvError::Closed) => break,
        }
    }
}

/// A workspace together with the tasks that keep it sized.
///
/// Dropping it has the same effect as [`ManagedWorkspace::dispose`].
#[derive(Debug)]
pub struct ManagedWorkspace {
    workspace: Arc<Workspace>,
    tasks: Vec<JoinHandle<()>>,
    bound: Arc<Mutex<HashMap<String, LifecycleState>>>,
    container_id: String,
}

impl ManagedWorkspace {
    /// The underlying workspace.
    #[must_use]
    pub const fn workspace(&self) -> &Arc<Workspace> {
        &self.workspace
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> LifecycleState {
        self.workspace.lifecycle()
    }

    /// Returns `true` while settling resyncs are still scheduled.
    #[must_use]
    pub fn resync_pending(&self) -> bool {
        self.tasks.first().is_some_and(|task| !task.is_finished())
    }

    /// Removes all blocks, leaving the workspace attached.
    pub fn clear(&self) -> Result<()> {
        self.workspace.clear()
    }

    /// Tears down every scheduled task and observer, then disposes the workspace.
    #[instrument(skip_all, fields(container = %self.container_id))]
    pub fn dispose(mut self) {
        self.teardown();
        info!("Workspace disposed");
    }

    fn teardown(&mut self) {
        if self.tasks.is_empty() && self.workspace.is_disposed() {
            return;
        }
        for task in self.tasks.drain(..) {
            task.abort();
        }
        self.workspace.mark_disposed();
        self.bound
            .lock()
            .insert(self.container_id.clone(), LifecycleState::Disposed);
    }
}

impl BlockSource for ManagedWorkspace {
    fn snapshot(&self) -> WorkspaceState {
        self.workspace.snapshot()
    }
}

impl Drop for ManagedWorkspace {
    fn drop(&mut self) {
        self.teardown();
    }
}
