//! Keeps the device's drink database in step with the local registry.
//!
//! A sync is always the full list, so resending is harmless and there is
//! nothing to replay: edits made while the link is down simply ride along
//! with the sync sent on the next `Open`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::link::DeviceLink;
use crate::protocol::OutboundMessage;
use crate::registry::DrinkRegistry;

/// Pushes the registry to the device on every open and every edit.
///
/// A single background task handles both triggers, so pushes never overlap.
pub struct SyncCoordinator {
    task: JoinHandle<()>,
    pushes: Arc<AtomicU64>,
}

impl SyncCoordinator {
    /// Start watching `link` and `registry`.
    ///
    /// Subscriptions are taken before this returns, so a link that opens
    /// immediately afterwards is not missed. If the link is already open,
    /// an initial sync is pushed right away.
    pub fn start(link: Arc<DeviceLink>, registry: Arc<DrinkRegistry>) -> Self {
        let mut state_rx = link.subscribe_state();
        let mut changes_rx = registry.subscribe();
        let pushes = Arc::new(AtomicU64::new(0));

        let counter = pushes.clone();
        let task = tokio::spawn(async move {
            if link.is_open() {
                Self::push_counted(&link, &registry, &counter, "already open");
            }

            loop {
                tokio::select! {
                    event = state_rx.recv() => match event {
                        Ok(event) if event.state.is_open() => {
                            Self::push_counted(&link, &registry, &counter, "link opened");
                        }
                        Ok(_) => {}
                        Err(RecvError::Lagged(skipped)) => {
                            warn!("Sync coordinator missed {} state events", skipped);
                            if link.is_open() {
                                Self::push_counted(&link, &registry, &counter, "resync after lag");
                            }
                        }
                        Err(RecvError::Closed) => break,
                    },
                    change = changes_rx.recv() => match change {
                        Ok(_) | Err(RecvError::Lagged(_)) => {
                            if link.is_open() {
                                Self::push_counted(&link, &registry, &counter, "registry changed");
                            } else {
                                debug!("Registry changed while link is {}; sync deferred to next open", link.state());
                            }
                        }
                        Err(RecvError::Closed) => break,
                    },
                }
            }

            debug!("Sync coordinator stopped");
        });

        Self { task, pushes }
    }

    /// Send the current registry to the device once.
    ///
    /// # Errors
    ///
    /// [`Error::NotConnected`](crate::Error::NotConnected) if the link is
    /// not open.
    pub fn push(link: &DeviceLink, registry: &DrinkRegistry) -> Result<()> {
        let drinks = registry.all();
        link.send(&OutboundMessage::sync_from(&drinks))?;
        info!("Synced {} drinks to device", drinks.len());
        Ok(())
    }

    /// Number of syncs handed to the link so far.
    pub fn sync_count(&self) -> u64 {
        self.pushes.load(Ordering::SeqCst)
    }

    /// Stop the coordinator.
    pub fn stop(&self) {
        self.task.abort();
    }

    fn push_counted(link: &DeviceLink, registry: &DrinkRegistry, counter: &AtomicU64, reason: &str) {
        debug!("Pushing sync: {}", reason);
        if Self::push(link, registry).is_ok() {
            counter.fetch_add(1, Ordering::SeqCst);
        }
    }
}

impl Drop for SyncCoordinator {
    fn drop(&mut self) {
        self.task.abort();
    }
}

impl std::fmt::Debug for SyncCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncCoordinator")
            .field("sync_count", &self.sync_count())
            .finish()
    }
}
