//! Shared record of calls made to emulated devices.

use parking_lot::Mutex;
use std::sync::Arc;

/// Append-only call record shared between a device and a test.
///
/// Devices are boxed into the controller, so tests keep a clone of the log
/// to see what the controller asked for and in which order.
#[derive(Debug, Clone, Default)]
pub struct CallLog {
    entries: Arc<Mutex<Vec<String>>>,
}

impl CallLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, entry: impl Into<String>) {
        self.entries.lock().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.entries.lock().clone()
    }

    /// Return and clear the entries.
    pub fn take(&self) -> Vec<String> {
        std::mem::take(&mut *self.entries.lock())
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.entries
            .lock()
            .iter()
            .filter(|e| e.starts_with(prefix))
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_entries() {
        let log = CallLog::new();
        let seen = log.clone();
        log.record("cam: prepare");
        log.record("cam: trigger");
        assert_eq!(seen.count("cam:"), 2);
        assert_eq!(seen.take(), vec!["cam: prepare", "cam: trigger"]);
        assert!(log.entries().is_empty());
    }
}
