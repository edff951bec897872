use proptest::prelude::*;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use supervisor_core::*;

#[derive(Debug, Clone)]
enum SessionOp {
    Start,
    End(i32),
}

fn session_op() -> impl Strategy<Value = SessionOp> {
    prop_oneof![Just(SessionOp::Start), (-50i32..2).prop_map(SessionOp::End)]
}

#[derive(Debug, Clone)]
enum WatchdogOp {
    Start(usize),
    Stop(usize),
    Advance(u32),
    Check,
}

fn watchdog_op() -> impl Strategy<Value = WatchdogOp> {
    prop_oneof![
        (0usize..3).prop_map(WatchdogOp::Start),
        (0usize..3).prop_map(WatchdogOp::Stop),
        (0u32..400).prop_map(WatchdogOp::Advance),
        Just(WatchdogOp::Check),
    ]
}

struct TestClock(AtomicU32);

impl Clock for TestClock {
    fn now_ms(&self) -> u32 {
        self.0.load(Ordering::SeqCst)
    }
}

const NAMES: [&str; 3] = ["ota", "console", "example_task"];

#[derive(Debug, Clone)]
struct Tick {
    connected: bool,
    phase: u8,
    download: u8,
    code: i32,
}

fn tick() -> impl Strategy<Value = Tick> {
    (any::<bool>(), 0u8..3, 0u8..3, -100i32..0).prop_map(|(connected, phase, download, code)| Tick {
        connected,
        phase,
        download,
        code,
    })
}

struct Scripted {
    ticks: Arc<Mutex<VecDeque<Tick>>>,
    current: Option<Tick>,
}

impl UpdateCheck for Scripted {
    fn begin_update_check(&mut self) -> CheckPhase {
        let t = self.ticks.lock().unwrap().pop_front().unwrap();
        let phase = match t.phase {
            0 => CheckPhase::NoUpdate,
            1 => CheckPhase::Failed(t.code),
            _ => CheckPhase::UpdateFound(PendingUpdate {
                version: "9.9.9".into(),
                url: "http://ota.local/fw".into(),
                size: None,
            }),
        };
        self.current = Some(t);
        phase
    }

    fn complete_update_check(&mut self, _pending: PendingUpdate) -> DownloadResult {
        let t = self.current.take().unwrap();
        match t.download {
            0 => DownloadResult::Downloaded,
            1 => DownloadResult::Deferred,
            _ => DownloadResult::Failed(t.code),
        }
    }
}

struct Sessions(Arc<Mutex<Vec<i32>>>);

impl TelemetrySink for Sessions {
    fn increment(&mut self, _counter: Counter) -> anyhow::Result<()> {
        Ok(())
    }
    fn record_session(&mut self, record: &SessionRecord) -> anyhow::Result<()> {
        self.0.lock().unwrap().push(record.result_code);
        Ok(())
    }
    fn trace_event(&mut self, _event: TraceEvent) -> anyhow::Result<()> {
        Ok(())
    }
    fn trigger_log_collection(&mut self) -> anyhow::Result<()> {
        Ok(())
    }
}

struct NoLed;
impl StatusIndicator for NoLed {
    fn set(&mut self, _color: LedColor) {}
}

struct NoRestart;
impl RestartControl for NoRestart {
    fn mark_reset_imminent(&mut self, _reason: RebootReason) -> anyhow::Result<()> {
        Ok(())
    }
    fn restart(&mut self, _reason: RebootReason) {}
}

proptest! {
    #[test]
    fn at_most_one_session_open(ops in prop::collection::vec(session_op(), 0..64)) {
        let mut tracker = SessionTracker::new();
        let mut open = false;
        for (now, op) in ops.into_iter().enumerate() {
            match op {
                SessionOp::Start => {
                    let result = tracker.start(now as u32);
                    prop_assert_eq!(result.is_ok(), !open);
                    open = true;
                }
                SessionOp::End(code) => {
                    let result = tracker.end(code, now as u32);
                    prop_assert_eq!(result.is_ok(), open);
                    if let Ok(record) = result {
                        prop_assert_eq!(record.result_code, code);
                    }
                    open = false;
                }
            }
            prop_assert_eq!(tracker.is_open(), open);
        }
    }

    #[test]
    fn watchdog_flags_only_expired_armed_entries(
        ops in prop::collection::vec(watchdog_op(), 0..80)
    ) {
        const TIMEOUT: u32 = 500;
        let clock = Arc::new(TestClock(AtomicU32::new(0)));
        let mut wd: TaskWatchdog<4> = TaskWatchdog::new(TIMEOUT, clock.clone());
        for name in NAMES {
            wd.register(name).unwrap();
        }
        prop_assert!(wd.register(NAMES[0]).is_err());

        let mut armed = [false; 3];
        let mut last_reset = [0u32; 3];
        let mut now = 0u32;

        for op in ops {
            match op {
                WatchdogOp::Start(i) => {
                    wd.start(NAMES[i]);
                    armed[i] = true;
                    last_reset[i] = now;
                }
                WatchdogOp::Stop(i) => {
                    wd.stop(NAMES[i]);
                    armed[i] = false;
                }
                WatchdogOp::Advance(ms) => {
                    now += ms;
                    clock.0.store(now, Ordering::SeqCst);
                }
                WatchdogOp::Check => {
                    let flagged: Vec<&str> = wd.check_all().iter().map(|s| s.name).collect();
                    let expected: Vec<&str> = (0..3)
                        .filter(|&i| armed[i] && now - last_reset[i] > TIMEOUT)
                        .map(|i| NAMES[i])
                        .collect();
                    prop_assert_eq!(flagged, expected);
                }
            }
        }
    }

    #[test]
    fn no_session_survives_a_tick(ticks in prop::collection::vec(tick(), 1..24)) {
        let script = Arc::new(Mutex::new(VecDeque::new()));
        let connected = Arc::new(AtomicBool::new(false));
        let records = Arc::new(Mutex::new(Vec::new()));

        let gate_state = connected.clone();
        let deps = OrchestratorDeps {
            gate: Box::new(move || gate_state.load(Ordering::SeqCst)),
            updater: Box::new(Scripted { ticks: script.clone(), current: None }),
            indicator: Box::new(NoLed),
            telemetry: Box::new(Sessions(records.clone())),
            restart: Box::new(NoRestart),
            clock: Arc::new(MonotonicClock::new()),
            autojoin: None,
        };
        let mut orchestrator = UpdateOrchestrator::new(deps, &SupervisorConfig::default());

        let mut expected_sessions = 0;
        for t in ticks {
            connected.store(t.connected, Ordering::SeqCst);
            let found = t.connected && t.phase == 2;
            let failed_code = (found && t.download == 2).then_some(t.code);
            script.lock().unwrap().push_back(t);

            let result = orchestrator.tick();
            prop_assert!(!orchestrator.session().is_open());

            if found {
                expected_sessions += 1;
                let last = *records.lock().unwrap().last().unwrap();
                if let Some(code) = failed_code {
                    prop_assert_eq!(last, code);
                    prop_assert_eq!(orchestrator.indicator(), LedColor::Red);
                }
                if result == TickResult::Restarting {
                    prop_assert_eq!(last, 0);
                }
            } else if !was_online(&result) {
                prop_assert_eq!(orchestrator.indicator(), LedColor::Red);
            }
            script.lock().unwrap().clear();
        }
        prop_assert_eq!(records.lock().unwrap().len(), expected_sessions);
    }
}

fn was_online(result: &TickResult) -> bool {
    *result != TickResult::Offline
}
