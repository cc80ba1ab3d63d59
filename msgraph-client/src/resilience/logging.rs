//! Per-client leveled logging with structured fields
//!
//! The client never installs a global logger: it emits through the `log`
//! facade so the embedding application chooses the backend (env_logger in
//! the binaries and tests). `ApiLogger` adds a per-client level gate on top,
//! so two clients in one process can log at different verbosities.

use std::fmt;

/// Client-side log verbosity, ordered `None < Warn < Info < Debug`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum LogLevel {
    /// Emit nothing, regardless of the global logger configuration.
    #[default]
    None,
    Warn,
    Info,
    Debug,
}

/// Structured key/value pairs attached to a log record.
pub type LogFields<'a> = &'a [(&'a str, String)];

/// Leveled logger gating emission per client.
///
/// Cheap to clone; immutable after construction.
#[derive(Debug, Clone)]
pub struct ApiLogger {
    level: LogLevel,
}

impl ApiLogger {
    pub fn new(level: LogLevel) -> Self {
        Self { level }
    }

    /// Logger that swallows everything.
    pub fn disabled() -> Self {
        Self::new(LogLevel::None)
    }

    pub fn level(&self) -> LogLevel {
        self.level
    }

    pub fn warn(&self, message: &str, fields: LogFields<'_>) {
        if self.level >= LogLevel::Warn {
            log::warn!("{}", format_record(message, fields));
        }
    }

    pub fn info(&self, message: &str, fields: LogFields<'_>) {
        if self.level >= LogLevel::Info {
            log::info!("{}", format_record(message, fields));
        }
    }

    pub fn debug(&self, message: &str, fields: LogFields<'_>) {
        if self.level >= LogLevel::Debug {
            log::debug!("{}", format_record(message, fields));
        }
    }
}

fn format_record(message: &str, fields: LogFields<'_>) -> String {
    let mut out = String::from(message);
    for (key, value) in fields {
        let _ = fmt::Write::write_fmt(&mut out, format_args!(" {}={}", key, value));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn levels_are_ordered() {
        assert!(LogLevel::None < LogLevel::Warn);
        assert!(LogLevel::Warn < LogLevel::Info);
        assert!(LogLevel::Info < LogLevel::Debug);
    }

    #[test]
    fn default_level_is_none() {
        assert_eq!(LogLevel::default(), LogLevel::None);
    }

    #[test]
    fn format_record_appends_fields() {
        let rendered = format_record(
            "request completed",
            &[
                ("status", "200".to_string()),
                ("elapsed_ms", "41".to_string()),
            ],
        );
        assert_eq!(rendered, "request completed status=200 elapsed_ms=41");
    }

    #[test]
    fn format_record_without_fields_is_message_only() {
        assert_eq!(format_record("token refreshed", &[]), "token refreshed");
    }
}
