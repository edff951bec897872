/// Telemetry sink contract and the on-device diagnostics store
use anyhow::Result;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Arc;

use crate::log_buffer::{LogBuffer, LogEntry};
use crate::session::SessionRecord;

/// Keep this many finished sessions / trace events / log batches
const MAX_HISTORY: usize = 16;
const COUNTER_COUNT: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Counter {
    SyncSuccess,
    SyncFailure,
    OtaTaskSchedules,
}

impl Counter {
    const ALL: [Counter; COUNTER_COUNT] = [
        Counter::SyncSuccess,
        Counter::SyncFailure,
        Counter::OtaTaskSchedules,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Counter::SyncSuccess => "sync_successful",
            Counter::SyncFailure => "sync_failure",
            Counter::OtaTaskSchedules => "ota_task_num_schedules",
        }
    }
}

/// Structured event with a reason tag and a formatted message
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TraceEvent {
    pub reason: &'static str,
    pub message: String,
}

impl TraceEvent {
    pub fn ota_install_failure(code: i32) -> Self {
        Self {
            reason: "ota_install_failure",
            message: format!("error code={}", code),
        }
    }

    pub fn task_watchdog(name: &str, elapsed_ms: u32) -> Self {
        Self {
            reason: "task_watchdog",
            message: format!("task={} elapsed={}ms", name, elapsed_ms),
        }
    }
}

/// Best-effort telemetry. Callers log and ignore errors.
pub trait TelemetrySink: Send {
    fn increment(&mut self, counter: Counter) -> Result<()>;
    fn record_session(&mut self, record: &SessionRecord) -> Result<()>;
    fn trace_event(&mut self, event: TraceEvent) -> Result<()>;
    /// Freeze buffered diagnostic logs so they get uploaded
    fn trigger_log_collection(&mut self) -> Result<()>;
}

/// Lets the orchestrator and the watchdog handler share one sink
impl<T: TelemetrySink + ?Sized> TelemetrySink for Arc<std::sync::Mutex<T>> {
    fn increment(&mut self, counter: Counter) -> Result<()> {
        lock(self)?.increment(counter)
    }
    fn record_session(&mut self, record: &SessionRecord) -> Result<()> {
        lock(self)?.record_session(record)
    }
    fn trace_event(&mut self, event: TraceEvent) -> Result<()> {
        lock(self)?.trace_event(event)
    }
    fn trigger_log_collection(&mut self) -> Result<()> {
        lock(self)?.trigger_log_collection()
    }
}

fn lock<T: ?Sized>(m: &std::sync::Mutex<T>) -> Result<std::sync::MutexGuard<'_, T>> {
    m.lock()
        .map_err(|e| anyhow::anyhow!("Failed to lock telemetry: {}", e))
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct TelemetrySnapshot {
    pub counters: Vec<(&'static str, u32)>,
    pub sessions: Vec<SessionRecord>,
    pub trace_events: Vec<TraceEvent>,
    pub pending_log_batches: usize,
}

/// Keeps counters, finished sessions, trace events and collected log batches
/// until the uploader drains them.
pub struct DiagnosticsTelemetry {
    counters: [u32; COUNTER_COUNT],
    sessions: VecDeque<SessionRecord>,
    trace_events: VecDeque<TraceEvent>,
    log_batches: VecDeque<Vec<LogEntry>>,
    logs: Option<Arc<LogBuffer>>,
}

impl DiagnosticsTelemetry {
    pub fn new(logs: Option<Arc<LogBuffer>>) -> Self {
        Self {
            counters: [0; COUNTER_COUNT],
            sessions: VecDeque::new(),
            trace_events: VecDeque::new(),
            log_batches: VecDeque::new(),
            logs,
        }
    }

    pub fn counter(&self, counter: Counter) -> u32 {
        self.counters[counter as usize]
    }

    pub fn sessions(&self) -> impl Iterator<Item = &SessionRecord> {
        self.sessions.iter()
    }

    pub fn trace_events(&self) -> impl Iterator<Item = &TraceEvent> {
        self.trace_events.iter()
    }

    /// Hand collected log batches to the uploader
    pub fn take_log_batches(&mut self) -> Vec<Vec<LogEntry>> {
        self.log_batches.drain(..).collect()
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        TelemetrySnapshot {
            counters: Counter::ALL
                .iter()
                .map(|c| (c.name(), self.counter(*c)))
                .collect(),
            sessions: self.sessions.iter().copied().collect(),
            trace_events: self.trace_events.iter().cloned().collect(),
            pending_log_batches: self.log_batches.len(),
        }
    }

    pub fn export_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.snapshot())?)
    }
}

fn push_bounded<T>(queue: &mut VecDeque<T>, item: T) {
    if queue.len() == MAX_HISTORY {
        queue.pop_front();
    }
    queue.push_back(item);
}

impl TelemetrySink for DiagnosticsTelemetry {
    fn increment(&mut self, counter: Counter) -> Result<()> {
        let slot = &mut self.counters[counter as usize];
        *slot = slot.saturating_add(1);
        Ok(())
    }

    fn record_session(&mut self, record: &SessionRecord) -> Result<()> {
        push_bounded(&mut self.sessions, *record);
        Ok(())
    }

    fn trace_event(&mut self, event: TraceEvent) -> Result<()> {
        log::warn!("Trace event {}: {}", event.reason, event.message);
        push_bounded(&mut self.trace_events, event);
        Ok(())
    }

    fn trigger_log_collection(&mut self) -> Result<()> {
        let Some(logs) = &self.logs else {
            anyhow::bail!("no log buffer attached");
        };
        let batch = logs.collect();
        log::info!("Collected {} log lines for upload", batch.len());
        push_bounded(&mut self.log_batches, batch);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(code: i32) -> SessionRecord {
        SessionRecord {
            started_at_ms: 0,
            ended_at_ms: 10,
            duration_ms: 10,
            result_code: code,
        }
    }

    #[test]
    fn test_counters() {
        let mut telemetry = DiagnosticsTelemetry::new(None);
        telemetry.increment(Counter::SyncSuccess).unwrap();
        telemetry.increment(Counter::SyncSuccess).unwrap();
        telemetry.increment(Counter::SyncFailure).unwrap();
        assert_eq!(telemetry.counter(Counter::SyncSuccess), 2);
        assert_eq!(telemetry.counter(Counter::SyncFailure), 1);
        assert_eq!(telemetry.counter(Counter::OtaTaskSchedules), 0);
    }

    #[test]
    fn test_history_is_bounded() {
        let mut telemetry = DiagnosticsTelemetry::new(None);
        for code in 0..(MAX_HISTORY as i32 + 4) {
            telemetry.record_session(&record(-code)).unwrap();
        }
        assert_eq!(telemetry.sessions().count(), MAX_HISTORY);
        assert_eq!(telemetry.sessions().next().unwrap().result_code, -4);
    }

    #[test]
    fn test_log_collection_drains_buffer() {
        let logs = Arc::new(LogBuffer::new(8));
        logs.append("ERROR", Some("ota"), "download failed", 42);
        let mut telemetry = DiagnosticsTelemetry::new(Some(logs.clone()));
        telemetry.trigger_log_collection().unwrap();
        assert!(logs.is_empty());

        let batches = telemetry.take_log_batches();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0][0].message, "download failed");
    }

    #[test]
    fn test_log_collection_without_buffer_fails() {
        let mut telemetry = DiagnosticsTelemetry::new(None);
        assert!(telemetry.trigger_log_collection().is_err());
    }

    #[test]
    fn test_trace_event_message_format() {
        let event = TraceEvent::ota_install_failure(-7);
        assert_eq!(event.reason, "ota_install_failure");
        assert_eq!(event.message, "error code=-7");
    }

    #[test]
    fn test_export_json() {
        let mut telemetry = DiagnosticsTelemetry::new(None);
        telemetry.record_session(&record(0)).unwrap();
        let json = telemetry.export_json().unwrap();
        assert!(json.contains("\"result_code\":0"));
        assert!(json.contains("sync_successful"));
    }
}
