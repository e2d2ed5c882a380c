//! Host-visible extension table
//!
//! Everything a running plugin contributes to the host (actions, commands,
//! status indicators, event listeners) lives here, keyed by kind, owning
//! context and id, and tagged with the owning instance. Contributions made in
//! the process context are visible from every project. All mutations happen
//! inside the registry's write lock; handlers are invoked outside of it.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use liveplug_kernel::plugin::{ContextId, InstanceKey};
use parking_lot::RwLock;
use rhai::{AST, Dynamic, Engine, FnPtr};
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

/// Kind of contribution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum ExtensionKind {
    Action,
    Command,
    Indicator,
    Listener,
}

impl ExtensionKind {
    /// Several registrations may share an id only for listeners (the id is
    /// the topic).
    pub fn allows_many(&self) -> bool {
        matches!(self, ExtensionKind::Listener)
    }
}

impl fmt::Display for ExtensionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExtensionKind::Action => "Action",
            ExtensionKind::Command => "Command",
            ExtensionKind::Indicator => "Indicator",
            ExtensionKind::Listener => "Listener",
        };
        f.write_str(name)
    }
}

/// Compiled script a handler belongs to
pub struct ScriptUnit {
    pub plugin_id: String,
    pub engine: Engine,
    pub ast: AST,
}

impl fmt::Debug for ScriptUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptUnit")
            .field("plugin_id", &self.plugin_id)
            .field("source", &self.ast.source())
            .finish()
    }
}

/// Script callback together with the unit able to run it
#[derive(Clone)]
pub struct ScriptHandler {
    unit: Arc<ScriptUnit>,
    callback: FnPtr,
}

impl ScriptHandler {
    pub fn new(unit: Arc<ScriptUnit>, callback: FnPtr) -> Self {
        Self { unit, callback }
    }

    pub fn call(&self, args: Vec<Dynamic>) -> Result<Dynamic, Box<rhai::EvalAltResult>> {
        self.callback
            .call::<Dynamic>(&self.unit.engine, &self.unit.ast, args)
    }
}

/// One registered contribution
#[derive(Clone)]
pub struct Extension {
    pub kind: ExtensionKind,
    pub id: String,
    pub owner: InstanceKey,
    /// Menu group for actions
    pub group: Option<String>,
    handler: ScriptHandler,
    serial: u64,
}

impl Extension {
    pub fn new(
        kind: ExtensionKind,
        id: impl Into<String>,
        owner: InstanceKey,
        group: Option<String>,
        handler: ScriptHandler,
    ) -> Self {
        Self {
            kind,
            id: id.into(),
            owner,
            group,
            handler,
            serial: 0,
        }
    }

    fn key(&self) -> Key {
        (self.kind, self.owner.context.clone(), self.id.clone())
    }

    pub fn info(&self) -> ExtensionInfo {
        ExtensionInfo {
            kind: self.kind,
            id: self.id.clone(),
            owner: self.owner.clone(),
            group: self.group.clone(),
        }
    }
}

/// Plain description of a registered contribution
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtensionInfo {
    pub kind: ExtensionKind,
    pub id: String,
    pub owner: InstanceKey,
    pub group: Option<String>,
}

/// Receipt of one registration, used to undo exactly that registration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    pub kind: ExtensionKind,
    pub context: ContextId,
    pub id: String,
    serial: u64,
}

/// Errors raised when the host calls into a contribution
#[derive(Debug, Error)]
pub enum InvokeError {
    #[error("{kind} '{id}' is not registered")]
    NotFound { kind: ExtensionKind, id: String },

    #[error("{kind} '{id}' of plugin '{plugin_id}' failed: {message}")]
    Failed {
        kind: ExtensionKind,
        id: String,
        plugin_id: String,
        message: String,
    },
}

type Key = (ExtensionKind, ContextId, String);
type Entries = BTreeMap<Key, Vec<Extension>>;

/// Registry of every live contribution
#[derive(Default)]
pub struct ExtensionRegistry {
    entries: RwLock<Entries>,
    next_serial: AtomicU64,
}

impl ExtensionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `f` inside the registry's write scope.
    fn write_scope<R>(&self, f: impl FnOnce(&mut Entries) -> R) -> R {
        let mut entries = self.entries.write();
        f(&mut entries)
    }

    /// Adds `extension`.
    ///
    /// Fails with `"<Kind> '<id>' is already registered"` if the id is taken
    /// in the owner's context and the kind does not allow several
    /// registrations.
    pub fn register(&self, mut extension: Extension) -> Result<Registration, String> {
        extension.serial = self.next_serial.fetch_add(1, Ordering::Relaxed) + 1;
        let registration = Registration {
            kind: extension.kind,
            context: extension.owner.context.clone(),
            id: extension.id.clone(),
            serial: extension.serial,
        };

        self.write_scope(|entries| {
            let slot = entries.entry(extension.key()).or_default();
            if !slot.is_empty() && !extension.kind.allows_many() {
                return Err(format!(
                    "{} '{}' is already registered",
                    extension.kind, extension.id
                ));
            }
            debug!("Registered {} '{}' for {}", extension.kind, extension.id, extension.owner);
            slot.push(extension);
            Ok(registration)
        })
    }

    /// Removes the registration behind `registration`, if still present.
    pub fn unregister(&self, registration: &Registration) -> bool {
        self.write_scope(|entries| {
            let key = (
                registration.kind,
                registration.context.clone(),
                registration.id.clone(),
            );
            let Some(slot) = entries.get_mut(&key) else {
                return false;
            };
            let before = slot.len();
            slot.retain(|e| e.serial != registration.serial);
            let removed = slot.len() != before;
            if slot.is_empty() {
                entries.remove(&key);
            }
            if removed {
                debug!("Unregistered {} '{}'", registration.kind, registration.id);
            }
            removed
        })
    }

    /// Removes everything owned by `owner`, returning the number removed.
    pub fn unregister_owner(&self, owner: &InstanceKey) -> usize {
        self.write_scope(|entries| {
            let mut removed = 0;
            entries.retain(|_, slot| {
                let before = slot.len();
                slot.retain(|e| &e.owner != owner);
                removed += before - slot.len();
                !slot.is_empty()
            });
            removed
        })
    }

    /// Whether `(kind, id)` is visible from `context`.
    pub fn contains(&self, kind: ExtensionKind, context: &ContextId, id: &str) -> bool {
        self.find(kind, context, id).is_some()
    }

    /// Owner of the registration of `(kind, id)` visible from `context`.
    pub fn owner_of(
        &self,
        kind: ExtensionKind,
        context: &ContextId,
        id: &str,
    ) -> Option<InstanceKey> {
        self.find(kind, context, id).map(|e| e.owner)
    }

    /// First registration in `context`, falling back to the process context.
    fn find(&self, kind: ExtensionKind, context: &ContextId, id: &str) -> Option<Extension> {
        let entries = self.entries.read();
        let first = |context: &ContextId| {
            entries
                .get(&(kind, context.clone(), id.to_string()))
                .and_then(|slot| slot.first().cloned())
        };
        first(context).or_else(|| match context {
            ContextId::Process => None,
            ContextId::Project(_) => first(&ContextId::Process),
        })
    }

    /// Every registration of `kind`, ordered by id.
    pub fn list(&self, kind: ExtensionKind) -> Vec<ExtensionInfo> {
        self.entries
            .read()
            .iter()
            .filter(|((k, _, _), _)| *k == kind)
            .flat_map(|(_, slot)| slot.iter().map(Extension::info))
            .collect()
    }

    /// Every registration made by `owner`.
    pub fn owned_by(&self, owner: &InstanceKey) -> Vec<ExtensionInfo> {
        self.entries
            .read()
            .values()
            .flatten()
            .filter(|e| &e.owner == owner)
            .map(Extension::info)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Calls the handler of `(kind, id)` visible from `context`.
    pub fn invoke(
        &self,
        kind: ExtensionKind,
        context: &ContextId,
        id: &str,
        args: Vec<Dynamic>,
    ) -> Result<Dynamic, InvokeError> {
        let extension = self
            .find(kind, context, id)
            .ok_or_else(|| InvokeError::NotFound {
                kind,
                id: id.to_string(),
            })?;
        call(&extension, args)
    }

    /// Delivers `payload` to every listener of `topic` in `context`, then to
    /// the process-wide listeners. Each group keeps registration order.
    pub fn publish(
        &self,
        context: &ContextId,
        topic: &str,
        payload: Dynamic,
    ) -> Vec<Result<Dynamic, InvokeError>> {
        let listeners: Vec<Extension> = {
            let entries = self.entries.read();
            let mut contexts = vec![context.clone()];
            if *context != ContextId::Process {
                contexts.push(ContextId::Process);
            }
            contexts
                .into_iter()
                .filter_map(|c| entries.get(&(ExtensionKind::Listener, c, topic.to_string())))
                .flatten()
                .cloned()
                .collect()
        };
        listeners
            .iter()
            .map(|listener| call(listener, vec![payload.clone()]))
            .collect()
    }
}

fn call(extension: &Extension, args: Vec<Dynamic>) -> Result<Dynamic, InvokeError> {
    extension
        .handler
        .call(args)
        .map_err(|err| InvokeError::Failed {
            kind: extension.kind,
            id: extension.id.clone(),
            plugin_id: extension.owner.plugin_id.clone(),
            message: err.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(source: &str) -> Arc<ScriptUnit> {
        let engine = Engine::new();
        let ast = engine.compile(source).unwrap();
        Arc::new(ScriptUnit {
            plugin_id: "p".into(),
            engine,
            ast,
        })
    }

    fn extension(
        kind: ExtensionKind,
        id: &str,
        owner: &str,
        unit: &Arc<ScriptUnit>,
        f: &str,
    ) -> Extension {
        extension_in(ContextId::Process, kind, id, owner, unit, f)
    }

    fn extension_in(
        context: ContextId,
        kind: ExtensionKind,
        id: &str,
        owner: &str,
        unit: &Arc<ScriptUnit>,
        f: &str,
    ) -> Extension {
        Extension::new(
            kind,
            id,
            InstanceKey::new(owner, context),
            None,
            ScriptHandler::new(unit.clone(), FnPtr::new(f).unwrap()),
        )
    }

    #[test]
    fn test_duplicate_ids_are_rejected() {
        let unit = unit("fn hello() { 1 }");
        let registry = ExtensionRegistry::new();

        registry
            .register(extension(ExtensionKind::Action, "Hello", "a", &unit, "hello"))
            .unwrap();
        let err = registry
            .register(extension(ExtensionKind::Action, "Hello", "b", &unit, "hello"))
            .unwrap_err();
        assert_eq!(err, "Action 'Hello' is already registered");
        assert_eq!(
            registry
                .owner_of(ExtensionKind::Action, &ContextId::Process, "Hello")
                .unwrap()
                .plugin_id,
            "a"
        );
    }

    #[test]
    fn test_invoke_and_unregister() {
        let unit = unit("fn answer() { 42 }");
        let registry = ExtensionRegistry::new();
        let registration = registry
            .register(extension(ExtensionKind::Command, "answer", "a", &unit, "answer"))
            .unwrap();

        let result = registry
            .invoke(ExtensionKind::Command, &ContextId::Process, "answer", vec![])
            .unwrap();
        assert_eq!(result.as_int().unwrap(), 42);

        assert!(registry.unregister(&registration));
        assert!(!registry.unregister(&registration));
        assert!(registry.is_empty());
        assert!(matches!(
            registry.invoke(ExtensionKind::Command, &ContextId::Process, "answer", vec![]),
            Err(InvokeError::NotFound { .. })
        ));
    }

    #[test]
    fn test_listeners_share_a_topic() {
        let unit = unit("fn seen(x) { x + 1 } fn boom(x) { throw \"no\" }");
        let registry = ExtensionRegistry::new();
        registry
            .register(extension(ExtensionKind::Listener, "saved", "a", &unit, "seen"))
            .unwrap();
        registry
            .register(extension(ExtensionKind::Listener, "saved", "b", &unit, "boom"))
            .unwrap();

        let results = registry.publish(&ContextId::Process, "saved", Dynamic::from(1_i64));
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].as_ref().unwrap().as_int().unwrap(), 2);
        assert!(matches!(results[1], Err(InvokeError::Failed { .. })));
        assert!(registry.publish(&ContextId::Process, "other", Dynamic::UNIT).is_empty());
    }

    #[test]
    fn test_unregister_owner_only_touches_owner() {
        let unit = unit("fn f() { 0 }");
        let registry = ExtensionRegistry::new();
        registry
            .register(extension(ExtensionKind::Action, "A", "a", &unit, "f"))
            .unwrap();
        registry
            .register(extension(ExtensionKind::Indicator, "B", "a", &unit, "f"))
            .unwrap();
        registry
            .register(extension(ExtensionKind::Action, "C", "c", &unit, "f"))
            .unwrap();

        let owner = InstanceKey::new("a", ContextId::Process);
        assert_eq!(registry.owned_by(&owner).len(), 2);
        assert_eq!(registry.unregister_owner(&owner), 2);
        assert_eq!(registry.len(), 1);
        assert!(registry.contains(ExtensionKind::Action, &ContextId::Process, "C"));
        assert_eq!(registry.list(ExtensionKind::Action).len(), 1);
    }

    #[test]
    fn test_projects_have_separate_scopes() {
        let unit = unit("fn a() { \"a\" } fn b() { \"b\" } fn global() { \"g\" }");
        let registry = ExtensionRegistry::new();
        let project_a = ContextId::project("/work/a");
        let project_b = ContextId::project("/work/b");

        registry
            .register(extension_in(
                project_a.clone(),
                ExtensionKind::Command,
                "Info",
                "p",
                &unit,
                "a",
            ))
            .unwrap();
        registry
            .register(extension_in(
                project_b.clone(),
                ExtensionKind::Command,
                "Info",
                "p",
                &unit,
                "b",
            ))
            .unwrap();
        registry
            .register(extension(ExtensionKind::Command, "Global", "g", &unit, "global"))
            .unwrap();

        let run = |context: &ContextId, id: &str| {
            registry
                .invoke(ExtensionKind::Command, context, id, vec![])
                .unwrap()
                .into_string()
                .unwrap()
        };
        assert_eq!(run(&project_a, "Info"), "a");
        assert_eq!(run(&project_b, "Info"), "b");
        assert_eq!(run(&project_a, "Global"), "g");
        assert!(!registry.contains(ExtensionKind::Command, &ContextId::Process, "Info"));
    }

    #[test]
    fn test_publish_reaches_process_listeners() {
        let unit = unit("fn local(x) { \"local\" } fn global(x) { \"global\" }");
        let registry = ExtensionRegistry::new();
        let project = ContextId::project("/work/a");
        registry
            .register(extension(ExtensionKind::Listener, "saved", "g", &unit, "global"))
            .unwrap();
        registry
            .register(extension_in(
                project.clone(),
                ExtensionKind::Listener,
                "saved",
                "l",
                &unit,
                "local",
            ))
            .unwrap();

        let results: Vec<String> = registry
            .publish(&project, "saved", Dynamic::UNIT)
            .into_iter()
            .map(|r| r.unwrap().into_string().unwrap())
            .collect();
        assert_eq!(results, vec!["local", "global"]);
        assert_eq!(registry.publish(&ContextId::Process, "saved", Dynamic::UNIT).len(), 1);
    }
}
