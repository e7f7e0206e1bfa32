//! Ambient, dependency-free pieces shared by every layer of the gateway:
//! the leveled structured-logging abstraction. Nothing in here performs
//! control flow; it is a side channel the dispatch engine writes to and an
//! embedding application can redirect.

use std::fmt::Display;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

/// A structured logging sink. The engine never branches on anything a
/// `Logger` does; calls are fire-and-forget from the caller's perspective.
pub trait Logger: Send + Sync {
    fn log(&self, level: LogLevel, message: &str, fields: &[(&str, &dyn Display)]);

    fn debug(&self, message: &str, fields: &[(&str, &dyn Display)]) {
        self.log(LogLevel::Debug, message, fields);
    }

    fn info(&self, message: &str, fields: &[(&str, &dyn Display)]) {
        self.log(LogLevel::Info, message, fields);
    }

    fn warn(&self, message: &str, fields: &[(&str, &dyn Display)]) {
        self.log(LogLevel::Warn, message, fields);
    }

    fn error(&self, message: &str, fields: &[(&str, &dyn Display)]) {
        self.log(LogLevel::Error, message, fields);
    }
}

/// Default `Logger`, a thin adapter over `tracing`. Fields are rendered as
/// `tracing`'s structured key/value syntax rather than formatted into the
/// message string, so a `tracing-subscriber` JSON layer still gets them as
/// separate attributes.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn log(&self, level: LogLevel, message: &str, fields: &[(&str, &dyn Display)]) {
        let rendered: Vec<String> = fields
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect();
        let joined = rendered.join(" ");
        match level {
            LogLevel::Debug => tracing::debug!(fields = %joined, "{message}"),
            LogLevel::Info => tracing::info!(fields = %joined, "{message}"),
            LogLevel::Warn => tracing::warn!(fields = %joined, "{message}"),
            LogLevel::Error => tracing::error!(fields = %joined, "{message}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Recording(std::sync::Mutex<Vec<(LogLevel, String)>>);

    impl Logger for Recording {
        fn log(&self, level: LogLevel, message: &str, _fields: &[(&str, &dyn Display)]) {
            self.0.lock().unwrap().push((level, message.to_string()));
        }
    }

    #[test]
    fn default_level_helpers_forward_to_log() {
        let logger = Recording(std::sync::Mutex::new(Vec::new()));
        logger.info("hello", &[]);
        logger.warn("careful", &[]);
        let recorded = logger.0.lock().unwrap();
        assert_eq!(recorded[0], (LogLevel::Info, "hello".to_string()));
        assert_eq!(recorded[1], (LogLevel::Warn, "careful".to_string()));
    }
}
