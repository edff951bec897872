/// OTA metrics session tracker
///
/// Brackets one update attempt with a start/end pair. At most one session is
/// open at a time. Misuse (double start, end without start) is logged and
/// ignored so the orchestrator loop keeps running.
use serde::Serialize;
use std::fmt;

use crate::clock::elapsed_ms;

/// Result code recorded for a successful attempt
pub const RESULT_SUCCESS: i32 = 0;

/// Result code for an attempt that found an update but did not download it
/// before the tick ended
pub const RESULT_DEFERRED: i32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionError {
    AlreadyOpen,
    NotOpen,
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::AlreadyOpen => write!(f, "OTA metrics session already open"),
            SessionError::NotOpen => write!(f, "no OTA metrics session open"),
        }
    }
}

impl std::error::Error for SessionError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricsSession {
    pub started_at: u32,
    pub ended_at: Option<u32>,
    pub result_code: i32,
}

/// A closed session, ready for the telemetry sink
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SessionRecord {
    pub started_at_ms: u32,
    pub ended_at_ms: u32,
    pub duration_ms: u32,
    pub result_code: i32,
}

impl SessionRecord {
    pub fn succeeded(&self) -> bool {
        self.result_code == RESULT_SUCCESS
    }
}

#[derive(Debug, Default)]
pub struct SessionTracker {
    open: Option<MetricsSession>,
}

impl SessionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_open(&self) -> bool {
        self.open.is_some()
    }

    pub fn current(&self) -> Option<&MetricsSession> {
        self.open.as_ref()
    }

    pub fn start(&mut self, now_ms: u32) -> Result<(), SessionError> {
        if self.open.is_some() {
            log::error!("OTA session start ignored: {}", SessionError::AlreadyOpen);
            return Err(SessionError::AlreadyOpen);
        }
        self.open = Some(MetricsSession {
            started_at: now_ms,
            ended_at: None,
            result_code: RESULT_SUCCESS,
        });
        log::debug!("OTA session started at {}ms", now_ms);
        Ok(())
    }

    pub fn end(&mut self, result_code: i32, now_ms: u32) -> Result<SessionRecord, SessionError> {
        let Some(mut session) = self.open.take() else {
            log::error!("OTA session end({}) ignored: {}", result_code, SessionError::NotOpen);
            return Err(SessionError::NotOpen);
        };
        session.ended_at = Some(now_ms);
        session.result_code = result_code;

        let record = SessionRecord {
            started_at_ms: session.started_at,
            ended_at_ms: now_ms,
            duration_ms: elapsed_ms(session.started_at, now_ms),
            result_code,
        };
        log::info!(
            "OTA session ended: result={} duration={}ms",
            record.result_code,
            record.duration_ms
        );
        Ok(record)
    }
}
