use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Mutex;

pub const DEFAULT_LOG_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogEntry {
    pub timestamp_ms: u64,
    pub level: String,
    pub module: Option<String>,
    pub message: String,
}

/// Bounded in-memory log ring, collected for upload when an update fails
/// or a task is reported stuck.
pub struct LogBuffer {
    capacity: usize,
    entries: Mutex<VecDeque<LogEntry>>,
}

impl LogBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    /// Append a line. Called from inside the logger, so it must never block
    /// or panic: on contention or a poisoned lock the line is dropped.
    pub fn append(&self, level: &str, module: Option<&str>, message: &str, timestamp_ms: u64) {
        let Ok(mut entries) = self.entries.try_lock() else {
            return;
        };
        if entries.len() == self.capacity {
            entries.pop_front();
        }
        entries.push_back(LogEntry {
            timestamp_ms,
            level: level.to_string(),
            module: module.map(str::to_string),
            message: message.to_string(),
        });
    }

    /// The last `count` lines, oldest first
    pub fn recent(&self, count: usize) -> Vec<LogEntry> {
        match self.entries.lock() {
            Ok(entries) => {
                let skip = entries.len().saturating_sub(count);
                entries.iter().skip(skip).cloned().collect()
            }
            Err(_) => Vec::new(),
        }
    }

    /// Freeze the current contents for upload and start a fresh ring
    pub fn collect(&self) -> Vec<LogEntry> {
        match self.entries.lock() {
            Ok(mut entries) => entries.drain(..).collect(),
            Err(_) => Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for LogBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_LOG_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_oldest_entries_evicted() {
        let buffer = LogBuffer::new(3);
        for i in 0..5 {
            buffer.append("INFO", Some("ota"), &format!("line {}", i), i);
        }
        let recent = buffer.recent(10);
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0].message, "line 2");
        assert_eq!(recent[2].message, "line 4");
    }

    #[test]
    fn test_recent_returns_tail_in_order() {
        let buffer = LogBuffer::new(8);
        for i in 0..4 {
            buffer.append("WARN", None, &format!("m{}", i), i);
        }
        let tail: Vec<_> = buffer.recent(2).into_iter().map(|e| e.message).collect();
        assert_eq!(tail, vec!["m2", "m3"]);
    }

    #[test]
    fn test_collect_drains() {
        let buffer = LogBuffer::new(4);
        buffer.append("ERROR", Some("watchdog"), "stuck", 10);
        let batch = buffer.collect();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].module.as_deref(), Some("watchdog"));
        assert!(buffer.is_empty());
    }
}
