//! Named application events that pollers can reload on.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::broadcast;
use tracing::debug;

const CHANNEL_CAPACITY: usize = 16;

/// Fan-out of payload-less named events ("bucketUriChanged", "reloadTasks").
#[derive(Clone, Default)]
pub struct EventBus {
    channels: Arc<Mutex<HashMap<String, broadcast::Sender<()>>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn sender(&self, event: &str) -> broadcast::Sender<()> {
        let mut channels = self
            .channels
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        channels
            .entry(event.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .clone()
    }

    /// Returns the number of listeners reached.
    pub fn emit(&self, event: &str) -> usize {
        let reached = self.sender(event).send(()).unwrap_or(0);
        debug!(event = "core.events.emit", name = event, listeners = reached);
        reached
    }

    pub fn listen(&self, event: &str) -> broadcast::Receiver<()> {
        self.sender(event).subscribe()
    }
}
