use std::sync::{Arc, Mutex};

use crate::logging::{LogAction, LogEvent, LogSink};
use crate::utils::lock;

/// Log sink that keeps every event in memory.
#[derive(Clone, Default)]
pub struct CollectingLogSink {
    events: Arc<Mutex<Vec<LogEvent>>>,
}

impl CollectingLogSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<LogEvent> {
        lock(&self.events).clone()
    }

    /// Events of one action kind for one task type.
    pub fn events_for(&self, task_type: &str, action: LogAction) -> Vec<LogEvent> {
        lock(&self.events)
            .iter()
            .filter(|e| e.task_type == task_type && e.action == action)
            .cloned()
            .collect()
    }
}

impl LogSink for CollectingLogSink {
    fn log(&self, event: &LogEvent) {
        lock(&self.events).push(event.clone());
    }
}
