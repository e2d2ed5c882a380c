//! Process-wide "plugins ready" flag

use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PluginsStatus {
    Pending,
    PluginsLoaded,
}

/// Holds the status and lets observers wait for it.
#[derive(Debug)]
pub struct StatusService {
    tx: watch::Sender<PluginsStatus>,
}

impl Default for StatusService {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusService {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(PluginsStatus::Pending);
        Self { tx }
    }

    pub fn current(&self) -> PluginsStatus {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<PluginsStatus> {
        self.tx.subscribe()
    }

    /// Flips the status to `PluginsLoaded`. Only the first call has an
    /// effect and returns `true`.
    pub fn mark_loaded(&self) -> bool {
        self.tx.send_if_modified(|status| {
            if *status == PluginsStatus::PluginsLoaded {
                return false;
            }
            *status = PluginsStatus::PluginsLoaded;
            true
        })
    }

    /// Resolves once the status is `PluginsLoaded`.
    pub async fn wait_loaded(&self) {
        let mut rx = self.subscribe();
        // The sender lives as long as `self`, so this never fails.
        let _ = rx.wait_for(|s| *s == PluginsStatus::PluginsLoaded).await;
    }
}
