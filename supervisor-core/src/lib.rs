//! Supervisor Core - Hardware-independent logic for the ESP32 OTA supervisor
//!
//! This crate contains the update orchestrator, the metrics session tracker and
//! the task liveness watchdog. Everything that touches hardware (LED pins, Wi-Fi,
//! NVS, the OTA partition, restart) is consumed through the traits defined here,
//! so the decision logic can be tested on the host platform without an ESP32.

pub mod clock;
pub mod config;
pub mod connectivity;
pub mod example_task;
pub mod indicator;
pub mod log_buffer;
pub mod orchestrator;
pub mod reboot;
pub mod session;
pub mod settings;
pub mod telemetry;
pub mod update;
pub mod watchdog;

pub use clock::{Clock, MonotonicClock};
pub use config::{SupervisorConfig, WatchdogAction};
pub use connectivity::{AutoJoin, ConnectivityGate, NetworkJoiner};
pub use indicator::{LedColor, StatusIndicator};
pub use orchestrator::{OrchestratorDeps, TickResult, UpdateOrchestrator};
pub use reboot::{RebootMarker, RebootMarkerStore, RebootReason, RestartControl};
pub use session::{SessionError, SessionRecord, SessionTracker};
pub use telemetry::{Counter, DiagnosticsTelemetry, TelemetrySink, TraceEvent};
pub use update::{CheckPhase, DownloadResult, PendingUpdate, UpdateCheck, UpdateOutcome};
pub use watchdog::{StuckTask, StuckTaskHandler, TaskWatchdog, WatchdogChecker, WatchdogError};
