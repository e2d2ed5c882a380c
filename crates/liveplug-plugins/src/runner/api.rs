//! Functions a plugin script can call
//!
//! ```rhai
//! register_action("Hello", |event| show("Hello from " + PLUGIN_ID));
//! register_listener("file.saved", |path| log("saved " + path));
//! on_unload(|| log("bye"));
//! ```
//!
//! Each registration attaches its own undo to the instance [`Disposable`], so
//! disposing the instance removes everything the script contributed.

use std::fmt;
use std::sync::{Arc, Weak};

use liveplug_kernel::plugin::{Disposable, InstanceKey, Notification, Notifier};
use parking_lot::Mutex;
use rhai::{Dynamic, Engine, EvalAltResult, FnPtr};
use tracing::warn;

use crate::extension::{Extension, ExtensionKind, ExtensionRegistry, ScriptHandler, ScriptUnit};

/// Instance state visible to script callbacks while a plugin is bound
#[derive(Clone)]
pub struct RunScope {
    pub owner: InstanceKey,
    pub disposable: Disposable,
    pub registry: Weak<ExtensionRegistry>,
    pub unit: Weak<ScriptUnit>,
}

/// Shared slot the engine closures read the current [`RunScope`] from
#[derive(Clone, Default)]
pub struct BindingSlot(Arc<Mutex<Option<RunScope>>>);

impl BindingSlot {
    pub fn bind(&self, scope: RunScope) {
        *self.0.lock() = Some(scope);
    }

    pub fn unbind(&self) {
        self.0.lock().take();
    }

    pub fn current(&self) -> Option<RunScope> {
        self.0.lock().clone()
    }

    pub fn is_bound(&self) -> bool {
        self.0.lock().is_some()
    }
}

impl fmt::Debug for BindingSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BindingSlot")
            .field("bound", &self.is_bound())
            .finish()
    }
}

type ScriptResult<T> = Result<T, Box<EvalAltResult>>;

fn bound(slot: &BindingSlot) -> ScriptResult<RunScope> {
    slot.current()
        .ok_or_else(|| "plugin API called outside of a running plugin".into())
}

fn register(
    slot: &BindingSlot,
    kind: ExtensionKind,
    id: &str,
    group: Option<String>,
    callback: FnPtr,
) -> ScriptResult<()> {
    let scope = bound(slot)?;
    let registry = scope
        .registry
        .upgrade()
        .ok_or("extension registry is gone")?;
    let unit = scope.unit.upgrade().ok_or("plugin script was unloaded")?;

    let handler = ScriptHandler::new(unit, callback);
    let registration = registry.register(Extension::new(
        kind,
        id,
        scope.owner.clone(),
        group,
        handler,
    ))?;

    let weak = scope.registry.clone();
    scope.disposable.when_disposed(move || {
        if let Some(registry) = weak.upgrade() {
            registry.unregister(&registration);
        }
    });
    Ok(())
}

fn on_unload(slot: &BindingSlot, callback: FnPtr) -> ScriptResult<()> {
    let scope = bound(slot)?;
    let unit = scope.unit.clone();
    let owner = scope.owner.clone();
    scope.disposable.when_disposed(move || {
        let Some(unit) = unit.upgrade() else {
            return;
        };
        if let Err(err) = callback.call::<Dynamic>(&unit.engine, &unit.ast, ()) {
            warn!("on_unload callback of {} failed: {}", owner, err);
        }
    });
    Ok(())
}

fn notify(
    slot: &BindingSlot,
    notifier: &Arc<dyn Notifier>,
    message: &Dynamic,
    title: &str,
    console: bool,
) {
    let owner = slot.current().map(|scope| scope.owner.plugin_id);
    let notification = Notification::info(owner.as_deref(), title, &message.to_string());
    notifier.notify(if console {
        notification.console()
    } else {
        notification
    });
}

/// Registers the plugin API on `engine`, reading the bound instance from
/// `slot` at call time.
pub fn install_plugin_api(engine: &mut Engine, slot: &BindingSlot, notifier: Arc<dyn Notifier>) {
    let s = slot.clone();
    engine.register_fn("register_action", move |id: &str, callback: FnPtr| {
        register(&s, ExtensionKind::Action, id, None, callback)
    });
    let s = slot.clone();
    engine.register_fn(
        "register_action",
        move |id: &str, group: &str, callback: FnPtr| {
            register(&s, ExtensionKind::Action, id, Some(group.to_string()), callback)
        },
    );
    let s = slot.clone();
    engine.register_fn("register_command", move |name: &str, callback: FnPtr| {
        register(&s, ExtensionKind::Command, name, None, callback)
    });
    let s = slot.clone();
    engine.register_fn("register_indicator", move |name: &str, callback: FnPtr| {
        register(&s, ExtensionKind::Indicator, name, None, callback)
    });
    let s = slot.clone();
    engine.register_fn("register_listener", move |topic: &str, callback: FnPtr| {
        register(&s, ExtensionKind::Listener, topic, None, callback)
    });
    let s = slot.clone();
    engine.register_fn("on_unload", move |callback: FnPtr| on_unload(&s, callback));

    let (s, n) = (slot.clone(), notifier.clone());
    engine.register_fn("show", move |message: Dynamic| {
        notify(&s, &n, &message, "", false)
    });
    let (s, n) = (slot.clone(), notifier.clone());
    engine.register_fn("show", move |message: Dynamic, title: &str| {
        notify(&s, &n, &message, title, false)
    });
    let (s, n) = (slot.clone(), notifier);
    engine.register_fn("show_in_console", move |message: Dynamic| {
        notify(&s, &n, &message, "", true)
    });
}
