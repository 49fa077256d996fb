//! Structured logging with mandatory redaction
//!
//! [`SecureLogger`] is the only logging entry point of the integration layer
//! that accepts caller-supplied context. Every entry is redacted with a
//! [`Redactor`] before it is emitted as a `tracing` event, regardless of what
//! the call site passed in.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::privacy::Redactor;

/// Severity of a [`SecureLogger`] entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        };
        f.write_str(label)
    }
}

/// Redacting front end for `tracing`
#[derive(Debug, Clone)]
pub struct SecureLogger {
    component: Arc<str>,
    redactor: Arc<Redactor>,
}

impl SecureLogger {
    /// Create a logger tagging entries with `component`
    pub fn new(component: impl Into<String>) -> Self {
        Self { component: Arc::from(component.into()), redactor: Arc::new(Redactor::new()) }
    }

    /// Replace the redaction rules
    #[must_use]
    pub fn with_redactor(mut self, redactor: Redactor) -> Self {
        self.redactor = Arc::new(redactor);
        self
    }

    /// Redaction rules applied by this logger
    pub fn redactor(&self) -> &Redactor {
        &self.redactor
    }

    /// Emit an entry after redacting both the message and the context
    pub fn log(&self, level: LogLevel, message: &str, context: &Value) {
        let message = self.redactor.redact_str(message);
        let context = self.redactor.redact(context).to_string();
        let component = &*self.component;

        match level {
            LogLevel::Trace => tracing::trace!(component, context = %context, "{message}"),
            LogLevel::Debug => tracing::debug!(component, context = %context, "{message}"),
            LogLevel::Info => tracing::info!(component, context = %context, "{message}"),
            LogLevel::Warn => tracing::warn!(component, context = %context, "{message}"),
            LogLevel::Error => tracing::error!(component, context = %context, "{message}"),
        }
    }

    /// Redacted debug event
    pub fn debug(&self, message: &str, context: &Value) {
        self.log(LogLevel::Debug, message, context);
    }

    /// Redacted info event
    pub fn info(&self, message: &str, context: &Value) {
        self.log(LogLevel::Info, message, context);
    }

    /// Redacted warning
    pub fn warn(&self, message: &str, context: &Value) {
        self.log(LogLevel::Warn, message, context);
    }

    /// Redacted error
    pub fn error(&self, message: &str, context: &Value) {
        self.log(LogLevel::Error, message, context);
    }
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::sync::Mutex;

    use serde_json::json;

    use super::*;

    #[derive(Clone, Default)]
    struct Capture(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Capture {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn captured<F: FnOnce()>(f: F) -> String {
        let capture = Capture::default();
        let writer = capture.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::TRACE)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        tracing::subscriber::with_default(subscriber, f);
        let bytes = capture.0.lock().unwrap().clone();
        String::from_utf8(bytes).unwrap()
    }

    /// Validates that secrets never reach the subscriber output.
    ///
    /// Assertions:
    /// - The bearer value is absent at every level.
    /// - The redaction marker and the component tag are present.
    #[test]
    fn test_log_output_is_redacted() {
        let logger = SecureLogger::new("dispatcher");
        let output = captured(|| {
            for level in [LogLevel::Debug, LogLevel::Info, LogLevel::Warn, LogLevel::Error] {
                logger.log(level, "calling upstream", &json!({ "authorization": "Bearer abc123" }));
            }
        });

        assert!(!output.contains("abc123"));
        assert!(output.contains("[REDACTED]"));
        assert!(output.contains("dispatcher"));
    }

    #[test]
    fn test_message_text_is_scrubbed() {
        let logger = SecureLogger::new("auth");
        let output = captured(|| logger.warn("retrying with Bearer abc123", &Value::Null));
        assert!(!output.contains("abc123"));
    }
}
