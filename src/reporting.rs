//! Error reporting sink.
//!
//! Components hand failures to an [`ErrorReporter`] and move on; reporting
//! never fails and never blocks the caller.

use crate::error::DaqError;
use parking_lot::Mutex;
use tracing::error;

/// Fire-and-forget exception logging.
pub trait ErrorReporter: Send + Sync {
    /// Record `error` raised in `component`, with extra context in `message`.
    fn log_exception(&self, component: &str, error: &DaqError, message: &str);
}

/// Reporter that emits `tracing` error events.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl ErrorReporter for TracingReporter {
    fn log_exception(&self, component: &str, error: &DaqError, message: &str) {
        error!(
            component,
            hardware = error.is_hardware(),
            error = %error,
            "{message}"
        );
    }
}

/// A report captured by [`MemoryReporter`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    /// Reporting component
    pub component: String,
    /// Rendered error
    pub error: String,
    /// Context message
    pub message: String,
}

/// Reporter that keeps reports in memory.
#[derive(Debug, Default)]
pub struct MemoryReporter {
    reports: Mutex<Vec<Report>>,
}

impl MemoryReporter {
    /// Empty reporter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reports received so far.
    pub fn reports(&self) -> Vec<Report> {
        self.reports.lock().clone()
    }
}

impl ErrorReporter for MemoryReporter {
    fn log_exception(&self, component: &str, error: &DaqError, message: &str) {
        self.reports.lock().push(Report {
            component: component.to_string(),
            error: error.to_string(),
            message: message.to_string(),
        });
    }
}
