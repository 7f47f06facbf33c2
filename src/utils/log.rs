// src/utils/log.rs

//! Console output helpers with server-style formatting.
//!
//! Used for human-readable run summaries; diagnostics go through the `log` facade.

use std::sync::OnceLock;

use chrono::Local;

/// Log level enum
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
        }
    }

    fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "debug" | "trace" => LogLevel::Debug,
            "info" => LogLevel::Info,
            "warn" => LogLevel::Warn,
            "error" => LogLevel::Error,
            _ => LogLevel::Info,
        }
    }
}

/// Current log level
static LOG_LEVEL: OnceLock<LogLevel> = OnceLock::new();

/// Initialize console output with a level name
pub fn init(level: &str) {
    let _ = LOG_LEVEL.set(LogLevel::from_str(level));
}

fn should_log(level: LogLevel) -> bool {
    let current = LOG_LEVEL.get().copied().unwrap_or(LogLevel::Info);
    level >= current
}

fn format_log(level: LogLevel, message: &str) -> String {
    let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S");
    format!("[{}] [{}] {}", timestamp, level.as_str(), message)
}

/// Print an info line
pub fn info(message: &str) {
    if should_log(LogLevel::Info) {
        println!("{}", format_log(LogLevel::Info, message));
    }
}

/// Print a warning line
pub fn warn(message: &str) {
    if should_log(LogLevel::Warn) {
        eprintln!("{}", format_log(LogLevel::Warn, message));
    }
}

/// Print a success line (always shown)
pub fn success(message: &str) {
    println!("{}", format_log(LogLevel::Info, &format!("✓ {}", message)));
}

/// Print a header
pub fn header(title: &str) {
    if should_log(LogLevel::Info) {
        let border = "═".repeat(60);
        println!("{}", format_log(LogLevel::Info, &border));
        println!("{}", format_log(LogLevel::Info, &format!("  {}", title)));
        println!("{}", format_log(LogLevel::Info, &border));
    }
}

/// Print an indented sub-item
pub fn sub_item(message: &str) {
    if should_log(LogLevel::Info) {
        let msg = format!("    {}", message);
        println!("{}", format_log(LogLevel::Info, &msg));
    }
}

/// Print a summary section
pub fn summary(title: &str, items: &[(&str, String)]) {
    if should_log(LogLevel::Info) {
        println!();
        let title_msg = format!("[SUMMARY] {}", title);
        println!("{}", format_log(LogLevel::Info, &title_msg));
        for (key, value) in items {
            let item_msg = format!("    {}: {}", key, value);
            println!("{}", format_log(LogLevel::Info, &item_msg));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_ordering() {
        assert!(LogLevel::Debug < LogLevel::Info);
        assert!(LogLevel::Info < LogLevel::Warn);
        assert!(LogLevel::Warn < LogLevel::Error);
    }

    #[test]
    fn test_log_level_from_str() {
        assert_eq!(LogLevel::from_str("debug"), LogLevel::Debug);
        assert_eq!(LogLevel::from_str("INFO"), LogLevel::Info);
        assert_eq!(LogLevel::from_str("unknown"), LogLevel::Info);
    }

    #[test]
    fn test_format_log_contains_level() {
        let line = format_log(LogLevel::Warn, "careful");
        assert!(line.contains("[WARN] careful"));
    }
}
