//! Integration tests for the workspace lifecycle driven by configuration.
//!
//! These tests mount, resize, edit and remount headless workspaces the way
//! an embedding surface would, using the paused tokio clock for the
//! settling schedule.

use std::sync::Arc;
use std::time::Duration;

use blockgrade_grading::Config;
use blockgrade_workspace::{
    BlockCompiler, BlockState, Container, HeadlessContainer, LifecycleState, Size, ToolboxSpec,
    ViewOptions, Viewport, WorkspaceError, WorkspaceManager,
};

fn host(id: &str) -> Arc<HeadlessContainer> {
    Arc::new(HeadlessContainer::new(id, Size::new(800, 600)))
}

fn print_text(text: &str) -> BlockState {
    BlockState::new("text_print")
        .with_input("TEXT", BlockState::new("text").with_field("TEXT", text))
}

fn config_with_delays(name: &str, delays: &str) -> Config {
    let dir = std::env::temp_dir().join(format!("blockgrade_it_{name}_{}", std::process::id()));
    std::fs::create_dir_all(&dir).expect("create dir");
    let path = dir.join("blockgrade.json");
    std::fs::write(&path, format!(r#"{{"resyncDelaysMs": {delays}}}"#)).expect("write config");
    let config = Config::load_from_file(&path).expect("load config");
    std::fs::remove_dir_all(&dir).ok();
    config
}

#[tokio::test(start_paused = true)]
async fn configured_schedule_drives_settling_resyncs() {
    let config = config_with_delays("schedule", "[200, 0]");
    let manager = WorkspaceManager::new().with_schedule(config.resync_schedule());
    let container = host("editor");
    let managed = manager
        .create(
            Arc::clone(&container) as Arc<dyn Container>,
            ToolboxSpec::standard(),
            ViewOptions::default(),
        )
        .expect("workspace");

    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(managed.workspace().resize_count(), 1);
    assert!(managed.resync_pending());

    tokio::time::sleep(Duration::from_millis(250)).await;
    assert_eq!(managed.workspace().resize_count(), 2);
    assert!(!managed.resync_pending());

    managed.dispose();
}

#[tokio::test(start_paused = true)]
async fn late_layout_settles_to_final_size() {
    let viewport = Viewport::new();
    let manager = WorkspaceManager::new().with_viewport(viewport.clone());
    let container = host("editor");
    let managed = manager
        .create(
            Arc::clone(&container) as Arc<dyn Container>,
            ToolboxSpec::standard(),
            ViewOptions::default(),
        )
        .expect("workspace");

    // Layout arrives after creation: first a zero-area pass, then the real size.
    tokio::time::sleep(Duration::from_millis(60)).await;
    container.set_size(Size::new(0, 0));
    tokio::time::sleep(Duration::from_millis(60)).await;
    container.set_size(Size::new(1280, 720));
    tokio::time::sleep(Duration::from_secs(2)).await;

    assert_eq!(managed.workspace().rendered_size(), Size::new(1280, 720));

    viewport.resize(Size::new(1920, 1080));
    tokio::time::sleep(Duration::from_millis(1)).await;
    assert_eq!(managed.workspace().rendered_size(), Size::new(1280, 720));

    managed.dispose();
}

#[tokio::test]
async fn remount_gives_an_independent_workspace() {
    let manager = WorkspaceManager::new();
    let container = host("editor");
    let compiler = BlockCompiler::javascript();

    let first = manager
        .create(
            Arc::clone(&container) as Arc<dyn Container>,
            ToolboxSpec::standard(),
            ViewOptions::default(),
        )
        .expect("first workspace");
    first
        .workspace()
        .append_block(print_text("first"))
        .expect("append");
    assert_eq!(
        compiler.compile(&first).expect("compile"),
        "window.alert('first');\n"
    );

    let stale = Arc::clone(first.workspace());
    first.dispose();
    assert_eq!(stale.lifecycle(), LifecycleState::Disposed);
    assert!(matches!(
        stale.append_block(print_text("late")),
        Err(WorkspaceError::Disposed)
    ));

    let second = manager
        .create(
            Arc::clone(&container) as Arc<dyn Container>,
            ToolboxSpec::standard(),
            ViewOptions::default(),
        )
        .expect("second workspace");
    assert_eq!(second.state(), LifecycleState::Ready);
    assert_eq!(second.workspace().block_count(), 0);
    assert_eq!(compiler.compile(&second).expect("compile"), "");

    second.dispose();
}

#[tokio::test]
async fn compiling_reads_blocks_at_call_time() {
    let manager = WorkspaceManager::new();
    let managed = manager
        .create(host("editor"), ToolboxSpec::standard(), ViewOptions::default())
        .expect("workspace");
    let compiler = BlockCompiler::javascript();

    managed
        .workspace()
        .append_block(print_text("one"))
        .expect("append");
    let before = compiler.compile(&managed).expect("compile");

    managed
        .workspace()
        .append_block(print_text("two"))
        .expect("append");
    let after = compiler.compile(&managed).expect("compile");

    assert_eq!(before, "window.alert('one');\n");
    assert!(after.contains("window.alert('one');"));
    assert!(after.contains("window.alert('two');"));

    managed.clear().expect("clear");
    assert_eq!(compiler.compile(&managed).expect("compile"), "");

    managed.dispose();
}
