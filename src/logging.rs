use log::{Level, LevelFilter, Metadata, Record};
use std::sync::{Arc, OnceLock};
use std::time::Instant;

use supervisor_core::log_buffer::LogBuffer;

static LOG_BUFFER: OnceLock<Arc<LogBuffer>> = OnceLock::new();
static BOOT_TIME: OnceLock<Instant> = OnceLock::new();

mod colors {
    pub const RESET: &str = "\x1b[0m";
    pub const BRIGHT_RED: &str = "\x1b[91m";
    pub const BRIGHT_YELLOW: &str = "\x1b[93m";
    pub const BRIGHT_GREEN: &str = "\x1b[92m";
    pub const BRIGHT_BLUE: &str = "\x1b[94m";
    pub const GRAY: &str = "\x1b[90m";
}

/// Prints colored, timestamped lines and keeps a copy in the diagnostic log buffer
struct SupervisorLogger;

impl log::Log for SupervisorLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        // Time since boot
        let elapsed = BOOT_TIME.get_or_init(Instant::now).elapsed();
        let seconds = elapsed.as_secs();
        let millis = elapsed.subsec_millis();
        let ts_compact = if seconds < 60 {
            format!("{:>3}.{:03}s", seconds, millis)
        } else if seconds < 3600 {
            format!("{:>2}m{:02}s", seconds / 60, seconds % 60)
        } else {
            format!("{:>2}h{:02}m", seconds / 3600, (seconds % 3600) / 60)
        };
        let ts_ms = seconds.saturating_mul(1000) + millis as u64;

        let (color, level_str, level_char) = match record.level() {
            Level::Error => (colors::BRIGHT_RED, "ERROR", 'E'),
            Level::Warn => (colors::BRIGHT_YELLOW, "WARN", 'W'),
            Level::Info => (colors::BRIGHT_GREEN, "INFO", 'I'),
            Level::Debug => (colors::BRIGHT_BLUE, "DEBUG", 'D'),
            Level::Trace => (colors::GRAY, "TRACE", 'T'),
        };
        let module = record
            .module_path()
            .unwrap_or("unknown")
            .rsplit("::")
            .next()
            .unwrap_or("unknown");
        let module_display = truncate_chars(module, 12);

        let message = format!("{}", record.args());

        // Serial console
        println!(
            "{}{} [{}] {:>12} | {}{}",
            color, ts_compact, level_char, module_display, message, colors::RESET
        );

        // Diagnostic ring (drops the line on contention)
        if let Some(buffer) = LOG_BUFFER.get() {
            buffer.append(level_str, Some(module), &message, ts_ms);
        }
    }

    fn flush(&self) {}
}

// Cut at a char boundary; module names are not guaranteed ASCII
fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

static LOGGER: SupervisorLogger = SupervisorLogger;

/// Install the logger. Lines are also captured into `buffer` so they can be
/// collected for upload after a failed update or a stuck task.
pub fn init_logger(buffer: Arc<LogBuffer>, level: LevelFilter) -> Result<(), log::SetLoggerError> {
    let _ = BOOT_TIME.set(Instant::now());
    let _ = LOG_BUFFER.set(buffer);
    log::set_logger(&LOGGER)?;
    log::set_max_level(level);

    let (green, reset) = (colors::BRIGHT_GREEN, colors::RESET);
    println!("{}┌─────────────────────────────────────────┐{}", green, reset);
    println!("{}│      ESP32 OTA Supervisor Logger        │{}", green, reset);
    println!("{}└─────────────────────────────────────────┘{}", green, reset);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_short_name_unchanged() {
        assert_eq!(truncate_chars("ota", 12), "ota");
        assert_eq!(truncate_chars("orchestrator", 12), "orchestrator");
    }

    #[test]
    fn test_truncate_long_name() {
        assert_eq!(truncate_chars("example_task_runner", 12), "example_task");
    }

    #[test]
    fn test_truncate_multibyte_at_boundary() {
        // 'é' occupies bytes 11..13
        assert_eq!(truncate_chars("watchdog_prét", 12), "watchdog_pré");
        assert_eq!(truncate_chars("überwachung_xy", 12), "überwachung_");
    }
}
