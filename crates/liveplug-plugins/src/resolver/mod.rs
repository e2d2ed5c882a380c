//! Dependency and classpath resolution
//!
//! Plugin scripts declare extra module sources and host plugin dependencies in
//! line comments:
//!
//! ```text
//! // add-to-classpath $HOME/rhai-libs/*.rhai
//! // depends-on-plugin my.vcs
//! ```
//!
//! Everything here is a pure function of the script lines, the environment
//! map, the filesystem and the host plugin registry.

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};

use glob::Pattern;
use liveplug_kernel::plugin::{PluginError, PluginResult};
use tracing::debug;

use crate::config::LivePluginConfig;
use crate::host::{HostPluginDescriptor, HostPluginRegistry};

#[cfg(test)]
mod tests;

/// Outcome of resolving one plugin's directives
#[derive(Debug, Clone, Default)]
pub struct ResolvedClasspath {
    /// Files and directories added with the classpath directive, in
    /// declaration order without repeats
    pub additional: Vec<PathBuf>,
    /// Declared host plugin ids followed by the runtime host plugin id
    pub dependency_ids: Vec<String>,
    /// Transitive closure of the declared host plugins
    pub transitive: Vec<HostPluginDescriptor>,
}

/// Snapshot of the process environment.
pub fn system_environment() -> HashMap<String, String> {
    std::env::vars().collect()
}

/// Payloads of every line that starts with `keyword` after trimming.
pub fn extract_directives<S: AsRef<str>>(lines: &[S], keyword: &str) -> Vec<String> {
    let keyword = keyword.trim_start();
    lines
        .iter()
        .map(|line| line.as_ref().trim())
        .filter_map(|line| line.strip_prefix(keyword))
        .map(|payload| payload.trim().to_string())
        .collect()
}

/// Replaces `$NAME` with the value of `NAME` from `env`.
///
/// Longer names are substituted first so `$HOMEBREW` is not clobbered by
/// `$HOME`. Unknown variables are left as they are.
pub fn inline_environment_variables(payload: &str, env: &HashMap<String, String>) -> String {
    let mut names: Vec<&String> = env.keys().collect();
    names.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));

    let mut result = payload.to_string();
    for name in names {
        let token = format!("${name}");
        if result.contains(&token) {
            result = result.replace(&token, &env[name]);
        }
    }
    result
}

/// Files matching `path_or_pattern`.
///
/// An existing path matches itself. Otherwise the last path segment is a glob
/// pattern applied to the entries of the parent directory; matches are sorted.
pub fn find_matching_files(path_or_pattern: &str) -> Vec<PathBuf> {
    let path = Path::new(path_or_pattern);
    if path.exists() {
        return vec![path.to_path_buf()];
    }

    let (parent, file_pattern) = match (path.parent(), path.file_name()) {
        (Some(parent), Some(name)) if !parent.as_os_str().is_empty() => (parent, name),
        _ => return Vec::new(),
    };
    let Some(pattern) = Pattern::new(&file_pattern.to_string_lossy()).ok() else {
        debug!("Invalid classpath pattern: {}", path_or_pattern);
        return Vec::new();
    };
    let Ok(entries) = std::fs::read_dir(parent) else {
        return Vec::new();
    };

    let mut matches: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .filter(|entry| pattern.matches(&entry.file_name().to_string_lossy()))
        .map(|entry| entry.path())
        .collect();
    matches.sort();
    matches
}

/// Classpath entries declared with `keyword`.
///
/// Each directive yields `Ok(files)` or `Err(payload)` when nothing matched;
/// a failed directive never stops the others from being resolved.
pub fn find_classpath_additions<S: AsRef<str>>(
    lines: &[S],
    keyword: &str,
    env: &HashMap<String, String>,
) -> Vec<Result<Vec<PathBuf>, String>> {
    extract_directives(lines, keyword)
        .into_iter()
        .map(|payload| {
            let resolved = inline_environment_variables(&payload, env);
            let files = find_matching_files(&resolved);
            if files.is_empty() { Err(resolved) } else { Ok(files) }
        })
        .collect()
}

/// Host plugins declared with `keyword`, plus `host_plugin_id`, each id once.
pub fn find_plugin_dependencies<S: AsRef<str>>(
    lines: &[S],
    keyword: &str,
    registry: &dyn HostPluginRegistry,
    host_plugin_id: &str,
) -> Vec<Result<HostPluginDescriptor, String>> {
    let mut seen = HashSet::new();
    let ids: Vec<String> = extract_directives(lines, keyword)
        .into_iter()
        .chain(std::iter::once(host_plugin_id.to_string()))
        .filter(|id| seen.insert(id.clone()))
        .collect();

    ids.into_iter()
        .map(|id| {
            registry
                .find(&id)
                .ok_or_else(|| format!("Failed to find dependent plugin '{id}'."))
        })
        .collect()
}

/// Breadth-first closure over non-optional dependency edges.
///
/// Every id appears at most once and `core_id` never appears, which also
/// guarantees termination on cyclic graphs.
pub fn with_transitive_dependencies(
    descriptors: Vec<HostPluginDescriptor>,
    registry: &dyn HostPluginRegistry,
    core_id: &str,
) -> Vec<HostPluginDescriptor> {
    let mut visited: HashSet<String> = HashSet::new();
    let mut queue: VecDeque<HostPluginDescriptor> = descriptors.into();
    let mut closure = Vec::new();

    while let Some(descriptor) = queue.pop_front() {
        if descriptor.id == core_id || !visited.insert(descriptor.id.clone()) {
            continue;
        }
        for dependency in &descriptor.dependencies {
            if dependency.optional || dependency.id == core_id || visited.contains(&dependency.id) {
                continue;
            }
            if let Some(found) = registry.find(&dependency.id) {
                queue.push_back(found);
            }
        }
        closure.push(descriptor);
    }
    closure
}

/// Resolves both directive kinds of one script.
///
/// All failures are collected into a single [`PluginError::LoadingError`]:
/// missing host plugins first, then classpath entries that matched nothing.
pub fn resolve_classpath<S: AsRef<str>>(
    lines: &[S],
    env: &HashMap<String, String>,
    registry: &dyn HostPluginRegistry,
    config: &LivePluginConfig,
) -> PluginResult<ResolvedClasspath> {
    let mut problems = Vec::new();

    let mut direct = Vec::new();
    for dependency in find_plugin_dependencies(
        lines,
        &config.dependency_keyword,
        registry,
        &config.host_plugin_id,
    ) {
        match dependency {
            Ok(descriptor) => direct.push(descriptor),
            Err(message) => problems.push(message),
        }
    }

    let mut additional = Vec::new();
    let mut seen = HashSet::new();
    let mut missing = Vec::new();
    for entry in find_classpath_additions(lines, &config.classpath_keyword, env) {
        match entry {
            Ok(files) => {
                additional.extend(files.into_iter().filter(|file| seen.insert(file.clone())))
            }
            Err(path) => missing.push(path),
        }
    }
    if !missing.is_empty() {
        problems.push(format!("Couldn't find dependencies:\n{}", missing.join("\n")));
    }

    if !problems.is_empty() {
        return Err(PluginError::loading(problems.join("\n")));
    }

    let dependency_ids = direct.iter().map(|d| d.id.clone()).collect();
    let transitive = with_transitive_dependencies(direct, registry, &config.core_plugin_id);
    Ok(ResolvedClasspath {
        additional,
        dependency_ids,
        transitive,
    })
}
