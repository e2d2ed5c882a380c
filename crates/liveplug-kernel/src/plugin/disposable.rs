//! Scoped disposal handle
//!
//! Every loaded plugin instance owns exactly one [`Disposable`]. Anything the
//! plugin registers (actions, commands, listeners, unload hooks) attaches a
//! release callback to it; a single [`Disposable::dispose`] call reverses all
//! of them in reverse registration order.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tracing::{debug, warn};

type ReleaseFn = Box<dyn FnOnce() + Send + 'static>;

struct Inner {
    name: String,
    disposed: AtomicBool,
    releases: Mutex<Vec<ReleaseFn>>,
}

/// Clonable handle to a per-instance resource registry.
///
/// Clones share the same registry. Disposal is one-shot: the first call runs
/// the callbacks, later calls are no-ops.
#[derive(Clone)]
pub struct Disposable {
    inner: Arc<Inner>,
}

impl Disposable {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(Inner {
                name: name.into(),
                disposed: AtomicBool::new(false),
                releases: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Attaches a release callback.
    ///
    /// Registering on an already disposed handle releases the resource
    /// immediately and returns `false`.
    pub fn when_disposed<F>(&self, release: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        {
            let mut releases = self.inner.releases.lock();
            if !self.inner.disposed.load(Ordering::Acquire) {
                releases.push(Box::new(release));
                return true;
            }
        }
        warn!(
            "Registration on disposed scope '{}', releasing immediately",
            self.inner.name
        );
        release();
        false
    }

    /// Runs every release callback, newest first.
    ///
    /// Returns `true` if this call performed the disposal.
    pub fn dispose(&self) -> bool {
        let releases = {
            let mut releases = self.inner.releases.lock();
            if self.inner.disposed.swap(true, Ordering::AcqRel) {
                return false;
            }
            std::mem::take(&mut *releases)
        };

        debug!(
            "Disposing '{}' ({} registrations)",
            self.inner.name,
            releases.len()
        );
        for release in releases.into_iter().rev() {
            release();
        }
        true
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::Acquire)
    }

    /// Number of callbacks still waiting for disposal.
    pub fn pending(&self) -> usize {
        self.inner.releases.lock().len()
    }

    /// True if both handles share the same registry.
    pub fn same_scope(&self, other: &Disposable) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for Disposable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Disposable")
            .field("name", &self.inner.name)
            .field("disposed", &self.is_disposed())
            .field("pending", &self.pending())
            .finish()
    }
}
