//! Tests for directive parsing and dependency resolution

use super::*;
use crate::host::InMemoryHostRegistry;
use std::fs;
use tempfile::TempDir;

const CLASSPATH: &str = "// add-to-classpath ";
const DEPENDS: &str = "// depends-on-plugin ";

fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn ids(descriptors: &[HostPluginDescriptor]) -> Vec<&str> {
    descriptors.iter().map(|d| d.id.as_str()).collect()
}

// ============================================================================
// Directives
// ============================================================================

#[test]
fn test_extract_directives_trims_lines_and_payloads() {
    let lines = [
        "   // add-to-classpath   /opt/lib  ",
        "let x = 1; // add-to-classpath /nope",
        "// depends-on-plugin vcs",
        "// add-to-classpath /opt/other",
    ];
    assert_eq!(
        extract_directives(&lines, CLASSPATH),
        vec!["/opt/lib", "/opt/other"]
    );
    assert_eq!(extract_directives(&lines, DEPENDS), vec!["vcs"]);
}

#[test]
fn test_inline_prefers_longer_names() {
    let env = env(&[("HOME", "/home/u"), ("HOMEBREW", "/opt/brew")]);
    assert_eq!(
        inline_environment_variables("$HOMEBREW/lib:$HOME/lib", &env),
        "/opt/brew/lib:/home/u/lib"
    );
}

#[test]
fn test_inline_keeps_unknown_variables() {
    let env = env(&[("HOME", "/home/u")]);
    assert_eq!(
        inline_environment_variables("$LIBS/*.rhai", &env),
        "$LIBS/*.rhai"
    );
}

#[test]
fn test_inline_with_empty_env_is_identity() {
    let empty = HashMap::new();
    for payload in ["", "$HOME/x", "plain/path", "$$weird"] {
        assert_eq!(inline_environment_variables(payload, &empty), payload);
    }
}

// ============================================================================
// Classpath
// ============================================================================

#[test]
fn test_find_matching_files_literal_and_glob() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("b.rhai"), "").unwrap();
    fs::write(dir.path().join("a.rhai"), "").unwrap();
    fs::write(dir.path().join("notes.txt"), "").unwrap();

    let literal = dir.path().join("notes.txt");
    assert_eq!(
        find_matching_files(literal.to_str().unwrap()),
        vec![literal.clone()]
    );

    let pattern = dir.path().join("*.rhai");
    assert_eq!(
        find_matching_files(pattern.to_str().unwrap()),
        vec![dir.path().join("a.rhai"), dir.path().join("b.rhai")]
    );

    let nothing = dir.path().join("*.jar");
    assert!(find_matching_files(nothing.to_str().unwrap()).is_empty());
}

#[test]
fn test_glob_under_directory_with_metacharacters() {
    let dir = TempDir::new().unwrap();
    let libs = dir.path().join("libs [v2]");
    fs::create_dir_all(&libs).unwrap();
    fs::write(libs.join("util.rhai"), "").unwrap();

    let pattern = libs.join("*.rhai");
    assert_eq!(
        find_matching_files(pattern.to_str().unwrap()),
        vec![libs.join("util.rhai")]
    );
}

#[test]
fn test_zero_match_fails_only_its_own_entry() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("util.rhai"), "").unwrap();

    let lines = vec![
        format!("{CLASSPATH}{}", dir.path().join("*.jar").display()),
        format!("{CLASSPATH}$LIB_DIR/util.rhai"),
    ];
    let env = env(&[("LIB_DIR", dir.path().to_str().unwrap())]);

    let results = find_classpath_additions(&lines, CLASSPATH, &env);
    assert_eq!(results.len(), 2);
    assert_eq!(
        results[0],
        Err(dir.path().join("*.jar").display().to_string())
    );
    assert_eq!(results[1], Ok(vec![dir.path().join("util.rhai")]));
}

#[test]
fn test_unresolved_variable_fails_per_entry() {
    let lines = ["// add-to-classpath $LIVEPLUG_NOT_SET/lib/*.rhai"];
    let results = find_classpath_additions(&lines, CLASSPATH, &HashMap::new());
    assert_eq!(
        results,
        vec![Err("$LIVEPLUG_NOT_SET/lib/*.rhai".to_string())]
    );
}

// ============================================================================
// Dependencies
// ============================================================================

#[test]
fn test_host_plugin_is_always_a_dependency() {
    let registry = InMemoryHostRegistry::new();
    registry.register(HostPluginDescriptor::new("host"));
    registry.register(HostPluginDescriptor::new("vcs"));

    let lines = ["// depends-on-plugin vcs", "// depends-on-plugin gone"];
    let results = find_plugin_dependencies(&lines, DEPENDS, &registry, "host");

    assert_eq!(results.len(), 3);
    assert_eq!(results[0].as_ref().unwrap().id, "vcs");
    assert_eq!(
        results[1].as_ref().unwrap_err(),
        "Failed to find dependent plugin 'gone'."
    );
    assert_eq!(results[2].as_ref().unwrap().id, "host");
}

#[test]
fn test_declared_host_plugin_is_listed_once() {
    let registry = InMemoryHostRegistry::new();
    registry.register(HostPluginDescriptor::new("host"));
    registry.register(HostPluginDescriptor::new("vcs"));

    let lines = [
        "// depends-on-plugin host",
        "// depends-on-plugin vcs",
        "// depends-on-plugin vcs",
    ];
    let results = find_plugin_dependencies(&lines, DEPENDS, &registry, "host");

    let found: Vec<_> = results.iter().map(|r| r.as_ref().unwrap().id.as_str()).collect();
    assert_eq!(found, vec!["host", "vcs"]);
}

#[test]
fn test_transitive_closure_terminates_on_cycles() {
    let registry = InMemoryHostRegistry::new();
    registry.register(HostPluginDescriptor::new("a").with_dependency("b"));
    registry.register(
        HostPluginDescriptor::new("b")
            .with_dependency("a")
            .with_dependency("core"),
    );

    let closure =
        with_transitive_dependencies(vec![registry.find("a").unwrap()], &registry, "core");
    assert_eq!(ids(&closure), vec!["a", "b"]);
}

#[test]
fn test_transitive_closure_skips_optional_and_core() {
    let registry = InMemoryHostRegistry::new();
    registry.register(HostPluginDescriptor::new("core"));
    registry.register(
        HostPluginDescriptor::new("a")
            .with_dependency("core")
            .with_dependency("c")
            .with_optional_dependency("opt"),
    );
    registry.register(HostPluginDescriptor::new("c").with_dependency("d"));
    registry.register(HostPluginDescriptor::new("d"));
    registry.register(HostPluginDescriptor::new("opt"));

    let closure = with_transitive_dependencies(
        vec![registry.find("a").unwrap(), registry.find("core").unwrap()],
        &registry,
        "core",
    );
    assert_eq!(ids(&closure), vec!["a", "c", "d"]);
}

#[test]
fn test_transitive_closure_dedups_diamond() {
    let registry = InMemoryHostRegistry::new();
    registry.register(HostPluginDescriptor::new("left").with_dependency("base"));
    registry.register(HostPluginDescriptor::new("right").with_dependency("base"));
    registry.register(HostPluginDescriptor::new("base"));

    let closure = with_transitive_dependencies(
        vec![registry.find("left").unwrap(), registry.find("right").unwrap()],
        &registry,
        "core",
    );
    assert_eq!(ids(&closure), vec!["left", "right", "base"]);
}

// ============================================================================
// Aggregation
// ============================================================================

#[test]
fn test_resolve_classpath_collects_every_problem() {
    let config = LivePluginConfig::default();
    let registry = InMemoryHostRegistry::from_config(&config);

    let lines = [
        "// depends-on-plugin missing.plugin",
        "// add-to-classpath /liveplug/definitely/missing/*.rhai",
    ];
    let err = resolve_classpath(&lines, &HashMap::new(), &registry, &config).unwrap_err();

    assert!(err.is_loading_error());
    let message = err.to_string();
    assert!(message.contains("Failed to find dependent plugin 'missing.plugin'."));
    assert!(message.contains(
        "Couldn't find dependencies:\n/liveplug/definitely/missing/*.rhai"
    ));
}

#[test]
fn test_resolve_classpath_success() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("lib.rhai"), "").unwrap();

    let config = LivePluginConfig::default();
    let registry = InMemoryHostRegistry::from_config(&config);
    let lines = vec![format!("{CLASSPATH}{}", dir.path().join("*.rhai").display())];

    let resolved = resolve_classpath(&lines, &HashMap::new(), &registry, &config).unwrap();
    assert_eq!(resolved.additional, vec![dir.path().join("lib.rhai")]);
    assert_eq!(resolved.dependency_ids, vec!["liveplug.host"]);
    assert_eq!(ids(&resolved.transitive), vec!["liveplug.host"]);
}

#[test]
fn test_resolve_classpath_drops_repeated_entries() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("a.rhai"), "").unwrap();
    fs::write(dir.path().join("b.rhai"), "").unwrap();

    let config = LivePluginConfig::default();
    let registry = InMemoryHostRegistry::from_config(&config);
    let lines = vec![
        format!("{CLASSPATH}{}", dir.path().join("a.rhai").display()),
        format!("{CLASSPATH}{}", dir.path().join("*.rhai").display()),
        format!("{DEPENDS}{}", config.host_plugin_id),
    ];

    let resolved = resolve_classpath(&lines, &HashMap::new(), &registry, &config).unwrap();
    assert_eq!(
        resolved.additional,
        vec![dir.path().join("a.rhai"), dir.path().join("b.rhai")]
    );
    assert_eq!(resolved.dependency_ids, vec!["liveplug.host"]);
    assert_eq!(ids(&resolved.transitive), vec!["liveplug.host"]);
}
