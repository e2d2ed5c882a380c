//! Per-plugin module loading
//!
//! A [`PluginClassLoader`] is the module resolver of one plugin's engine. An
//! `import "name"` is looked up in the plugin's own classpath first (its root
//! directory plus classpath additions), then in each parent: the loaders of the
//! host plugins it depends on, and finally the runtime loader.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use liveplug_kernel::plugin::{PluginError, PluginResult};
use parking_lot::RwLock;
use rhai::module_resolvers::StaticModuleResolver;
use rhai::{Engine, EvalAltResult, Module, ModuleResolver, Position, Scope, Shared};

type SharedModule = Shared<Module>;
use tracing::debug;

use crate::host::{HostPluginDescriptor, SharedModuleResolver};


/// Name of the module exported by the runtime loader.
pub const RUNTIME_MODULE: &str = "liveplug";

const SCRIPT_EXTENSION: &str = "rhai";

/// Module resolver scoped to one live plugin
pub struct PluginClassLoader {
    label: String,
    classpath: Vec<PathBuf>,
    parents: Vec<SharedModuleResolver>,
    modules: RwLock<HashMap<PathBuf, SharedModule>>,
}

impl PluginClassLoader {
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn classpath(&self) -> &[PathBuf] {
        &self.classpath
    }

    pub fn parent_count(&self) -> usize {
        self.parents.len()
    }

    /// Script file in the own classpath answering to `path`.
    fn find_in_classpath(&self, path: &str) -> Option<PathBuf> {
        let wanted = Path::new(path);
        for entry in &self.classpath {
            if entry.is_dir() {
                let mut candidate = entry.join(wanted);
                if candidate.extension().is_none() {
                    candidate.set_extension(SCRIPT_EXTENSION);
                }
                if candidate.is_file() {
                    return Some(candidate);
                }
            } else if entry.file_name().is_some_and(|n| n == path)
                || entry.file_stem().is_some_and(|n| n == path)
            {
                return Some(entry.clone());
            }
        }
        None
    }

    fn load_module(
        &self,
        engine: &Engine,
        file: &Path,
        path: &str,
        pos: Position,
    ) -> Result<SharedModule, Box<EvalAltResult>> {
        if let Some(module) = self.modules.read().get(file) {
            return Ok(module.clone());
        }

        debug!("[{}] loading module '{}' from {}", self.label, path, file.display());
        let in_module = |err: Box<EvalAltResult>| -> Box<EvalAltResult> {
            EvalAltResult::ErrorInModule(path.to_string(), err, pos).into()
        };

        let mut ast = engine.compile_file(file.to_path_buf()).map_err(in_module)?;
        ast.set_source(file.to_string_lossy().as_ref());
        let module: SharedModule = Module::eval_ast_as_new(Scope::new(), &ast, engine)
            .map_err(in_module)?
            .into();

        self.modules
            .write()
            .insert(file.to_path_buf(), module.clone());
        Ok(module)
    }
}

impl ModuleResolver for PluginClassLoader {
    fn resolve(
        &self,
        engine: &Engine,
        source: Option<&str>,
        path: &str,
        pos: Position,
    ) -> Result<SharedModule, Box<EvalAltResult>> {
        if let Some(file) = self.find_in_classpath(path) {
            return self.load_module(engine, &file, path, pos);
        }

        for parent in &self.parents {
            match parent.resolve(engine, source, path, pos) {
                Ok(module) => return Ok(module),
                Err(err) if matches!(*err, EvalAltResult::ErrorModuleNotFound(..)) => continue,
                Err(err) => return Err(err),
            }
        }

        Err(EvalAltResult::ErrorModuleNotFound(path.to_string(), pos).into())
    }
}

impl fmt::Debug for PluginClassLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginClassLoader")
            .field("label", &self.label)
            .field("classpath", &self.classpath)
            .field("parents", &self.parents.len())
            .finish()
    }
}

/// Builds the loader for one plugin.
///
/// `classpath` entries must exist; the first missing one fails with a
/// [`PluginError::LoadingError`] naming its absolute path. Parents are the
/// loaders of `dependencies` (descriptors without one are skipped) followed by
/// `runtime_loader`.
pub fn create_class_loader(
    classpath: &[PathBuf],
    dependencies: &[HostPluginDescriptor],
    label: &str,
    runtime_loader: &SharedModuleResolver,
) -> PluginResult<PluginClassLoader> {
    if let Some(missing) = classpath.iter().find(|path| !path.exists()) {
        let absolute = std::path::absolute(missing).unwrap_or_else(|_| missing.clone());
        return Err(PluginError::loading(format!(
            "Didn't find plugin dependency '{}'.",
            absolute.display()
        )));
    }

    let mut parents: Vec<SharedModuleResolver> = dependencies
        .iter()
        .filter_map(|descriptor| descriptor.loader.clone())
        .collect();
    parents.push(runtime_loader.clone());

    Ok(PluginClassLoader {
        label: label.to_string(),
        classpath: classpath.to_vec(),
        parents,
        modules: RwLock::new(HashMap::new()),
    })
}

/// Loader exposing the runtime's own `liveplug` module.
pub fn runtime_module_resolver() -> SharedModuleResolver {
    let mut module = Module::new();
    module.set_var("VERSION", env!("CARGO_PKG_VERSION").to_string());
    module.set_var("NAME", "liveplug".to_string());

    let mut resolver = StaticModuleResolver::new();
    resolver.insert(RUNTIME_MODULE, module);
    Arc::new(resolver)
}
