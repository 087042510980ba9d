//! One lifecycle controller per dashboard slot.
//!
//! Dashboards track several jobs side by side (e.g. a training widget
//! and a prediction widget). [`JobSlots`] hands out one
//! [`LifecycleController`] per slot name. Slots share the API client and
//! the poll configuration, nothing else.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::api::JobApi;
use crate::controller::LifecycleController;
use crate::poller::PollConfig;

/// Slot used by model-training widgets.
pub const SLOT_TRAINING: &str = "training";

/// Slot used by prediction-generation widgets.
pub const SLOT_PREDICTION: &str = "prediction";

/// Registry of per-slot controllers.
///
/// Thread-safe via interior `RwLock`; designed to be wrapped in `Arc`
/// and shared across the application.
pub struct JobSlots {
    api: Arc<dyn JobApi>,
    config: PollConfig,
    slots: RwLock<HashMap<String, Arc<LifecycleController>>>,
}

impl JobSlots {
    pub fn new(api: Arc<dyn JobApi>, config: PollConfig) -> Self {
        Self {
            api,
            config,
            slots: RwLock::new(HashMap::new()),
        }
    }

    /// Controller for `slot`, created on first use.
    pub async fn controller(&self, slot: &str) -> Arc<LifecycleController> {
        if let Some(existing) = self.slots.read().await.get(slot) {
            return Arc::clone(existing);
        }

        let mut slots = self.slots.write().await;
        let controller = slots.entry(slot.to_string()).or_insert_with(|| {
            tracing::debug!(slot, "Creating job slot");
            Arc::new(LifecycleController::new(
                Arc::clone(&self.api),
                self.config.clone(),
            ))
        });
        Arc::clone(controller)
    }

    /// Controller for `slot` if it has been created.
    pub async fn get(&self, slot: &str) -> Option<Arc<LifecycleController>> {
        self.slots.read().await.get(slot).cloned()
    }

    /// Names of all created slots, sorted.
    pub async fn slot_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.slots.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    /// Stop tracking and remove one slot. Remote jobs keep running.
    pub async fn release(&self, slot: &str) -> bool {
        match self.slots.write().await.remove(slot) {
            Some(controller) => {
                controller.stop();
                true
            }
            None => false,
        }
    }

    /// Stop tracking in every slot.
    pub async fn shutdown(&self) {
        tracing::info!("Shutting down job slots");
        let mut slots = self.slots.write().await;
        for (slot, controller) in slots.drain() {
            tracing::debug!(slot = %slot, "Stopping slot");
            controller.stop();
        }
    }
}
