//! Integration tests for the lifecycle hooks

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use liveplug_kernel::plugin::{CollectingNotifier, ContextId};
use liveplug_plugins::{ExtensionKind, LivePlugin, LivePluginConfig, LivePluginManager};
use liveplug_runtime::{HostContext, LivePluginRuntime, PluginsStatus};
use rhai::Dynamic;
use tempfile::TempDir;

// ============================================================================
// Helper Functions
// ============================================================================

fn runtime(dir: &TempDir) -> Arc<LivePluginRuntime> {
    let config = LivePluginConfig::with_dirs(
        dir.path().join("live-plugins"),
        dir.path().join("compiled"),
    );
    let manager = LivePluginManager::builder(config)
        .with_notifier(Arc::new(CollectingNotifier::new()))
        .build();
    LivePluginRuntime::new(manager)
}

fn write_plugin(root: &Path, id: &str, script: &str) -> PathBuf {
    let dir = root.join(id);
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("plugin.rhai"), script).unwrap();
    dir
}

fn project_with_plugin(dir: &TempDir, name: &str) -> PathBuf {
    let project = dir.path().join(name);
    write_plugin(
        &project.join(".spp/plugins"),
        "local",
        r#"register_command("Local", || "local");"#,
    );
    project
}

// ============================================================================
// Opening and closing
// ============================================================================

#[tokio::test]
async fn test_trusted_project_loads_bundled_and_local_plugins() {
    let dir = TempDir::new().unwrap();
    let runtime = runtime(&dir);
    let project = project_with_plugin(&dir, "trusted");
    let context = ContextId::project(&project);
    assert_eq!(runtime.status().current(), PluginsStatus::Pending);

    let handle = runtime
        .on_opened(HostContext::project(&project, true))
        .await
        .unwrap()
        .expect("first open loads");
    let summary = handle.await.unwrap();

    assert!(summary.is_success(), "{:?}", summary);
    assert_eq!(summary.bundled.len(), 2);
    assert_eq!(summary.project.as_ref().unwrap().len(), 1);
    assert_eq!(runtime.status().current(), PluginsStatus::PluginsLoaded);

    let extensions = runtime.manager().extensions();
    let info = extensions
        .invoke(ExtensionKind::Command, &context, "Self Info", vec![])
        .unwrap()
        .to_string();
    assert!(info.contains("Runtime: liveplug"), "{info}");
    assert!(info.contains(&project.display().to_string()), "{info}");
    assert!(extensions.contains(ExtensionKind::Command, &context, "Local"));

    // Opening again is a no-op.
    assert!(runtime
        .on_opened(HostContext::project(&project, true))
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_untrusted_project_skips_local_plugins() {
    let dir = TempDir::new().unwrap();
    let runtime = runtime(&dir);
    let project = project_with_plugin(&dir, "untrusted");

    let summary = runtime
        .on_opened(HostContext::project(&project, false))
        .await
        .unwrap()
        .unwrap()
        .await
        .unwrap();

    assert!(summary.project.is_none());
    assert_eq!(summary.loaded(), 2);
    assert!(!runtime.manager().extensions().contains(
        ExtensionKind::Command,
        &ContextId::project(&project),
        "Local"
    ));
}

#[tokio::test]
async fn test_two_projects_share_bundled_plugins() {
    let dir = TempDir::new().unwrap();
    let runtime = runtime(&dir);
    let first = project_with_plugin(&dir, "first");
    let second = project_with_plugin(&dir, "second");

    let a = runtime.on_opened(HostContext::project(&first, true)).await.unwrap().unwrap();
    let b = runtime.on_opened(HostContext::project(&second, true)).await.unwrap().unwrap();
    let (a, b) = (a.await.unwrap(), b.await.unwrap());
    assert!(a.is_success() && b.is_success(), "{:?} {:?}", a, b);

    assert_eq!(runtime.open_contexts().len(), 2);
    let first_state = runtime.state(&ContextId::project(&first)).unwrap();
    let second_state = runtime.state(&ContextId::project(&second)).unwrap();
    assert_eq!(first_state.bundled_root, second_state.bundled_root);

    let counts = runtime.manager().extensions().publish(
        &ContextId::project(&first),
        "file-saved",
        Dynamic::from("a.rs"),
    );
    assert_eq!(counts.len(), 1);
    assert_eq!(counts[0].as_ref().unwrap().as_int().unwrap(), 1);
}

#[tokio::test]
async fn test_closing_unloads_everything_of_the_context() {
    let dir = TempDir::new().unwrap();
    let runtime = runtime(&dir);
    let project = project_with_plugin(&dir, "closing");
    let context = ContextId::project(&project);

    runtime
        .on_opened(HostContext::project(&project, true))
        .await
        .unwrap()
        .unwrap()
        .await
        .unwrap();
    assert_eq!(runtime.manager().loaded_instances().len(), 3);

    let unloaded = runtime.on_closing(&context).await;
    assert_eq!(unloaded.len(), 3);
    // Bundled plugins go first.
    assert_eq!(unloaded.last().unwrap().plugin_id, "local");
    assert!(runtime.manager().loaded_instances().is_empty());
    assert!(runtime.manager().extensions().is_empty());
    assert!(runtime.state(&context).is_none());

    assert!(runtime.on_closing(&context).await.is_empty());
}

#[tokio::test]
async fn test_closing_unloads_plugins_moved_while_open() {
    let dir = TempDir::new().unwrap();
    let runtime = runtime(&dir);
    let project = project_with_plugin(&dir, "moved");
    let context = ContextId::project(&project);

    runtime
        .on_opened(HostContext::project(&project, true))
        .await
        .unwrap()
        .unwrap()
        .await
        .unwrap();
    let plugins = project.join(".spp/plugins");
    std::fs::rename(plugins.join("local"), plugins.join("renamed")).unwrap();

    let unloaded = runtime.on_closing(&context).await;
    assert_eq!(unloaded.len(), 3);
    assert!(unloaded.iter().any(|key| key.plugin_id == "local"));
    assert!(runtime.manager().loaded_instances().is_empty());
    let extensions = runtime.manager().extensions();
    assert!(!extensions.contains(ExtensionKind::Command, &context, "Local"));
    assert!(extensions.is_empty());
}

// ============================================================================
// Process context and deletion
// ============================================================================

#[tokio::test]
async fn test_deleted_plugin_is_unloaded_and_cache_removed() {
    let dir = TempDir::new().unwrap();
    let runtime = runtime(&dir);
    let global = dir.path().join("live-plugins");
    let plugin_dir = write_plugin(&global, "doomed", r#"register_action("Doom", || 1);"#);

    let report = runtime.on_process_started().await.unwrap();
    assert!(report.is_success(), "{:?}", report.outcomes);
    let plugin = LivePlugin::new(&plugin_dir);
    assert!(runtime.manager().is_loaded(&plugin, &ContextId::Process));
    assert!(runtime.manager().cache().manifest("doomed").is_some());

    std::fs::remove_dir_all(&plugin_dir).unwrap();
    let unloaded = runtime
        .on_file_deleted(&plugin_dir)
        .expect("plugin root")
        .await
        .unwrap();

    assert_eq!(unloaded, vec![plugin.instance_key(&ContextId::Process)]);
    assert!(!runtime.manager().is_loaded(&plugin, &ContextId::Process));
    assert!(runtime.manager().cache().manifest("doomed").is_none());
}

#[tokio::test]
async fn test_deleting_other_files_is_ignored() {
    let dir = TempDir::new().unwrap();
    let runtime = runtime(&dir);
    let global = dir.path().join("live-plugins");
    let plugin_dir = write_plugin(&global, "kept", "let x = 1;");

    assert!(runtime.on_file_deleted(&plugin_dir.join("plugin.rhai")).is_none());
    assert!(runtime.on_file_deleted(&dir.path().join("elsewhere")).is_none());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_watcher_reports_deletions() {
    let dir = TempDir::new().unwrap();
    let base = dir.path().canonicalize().unwrap();
    let config = LivePluginConfig::with_dirs(base.join("live-plugins"), base.join("compiled"));
    let runtime = LivePluginRuntime::new(LivePluginManager::builder(config).build());
    let plugin_dir = write_plugin(
        &base.join("live-plugins"),
        "watched",
        r#"register_indicator("W", || 1);"#,
    );

    runtime.on_process_started().await.unwrap();
    let plugin = LivePlugin::new(&plugin_dir);
    assert!(runtime.manager().is_loaded(&plugin, &ContextId::Process));

    let mut watcher = runtime
        .watch_deletions(&[], Default::default())
        .unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;
    std::fs::remove_dir_all(&plugin_dir).unwrap();

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while runtime.manager().is_loaded(&plugin, &ContextId::Process) {
        assert!(tokio::time::Instant::now() < deadline, "deletion not handled");
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    watcher.stop().await;
}
