//! Data-quality reporting.
//!
//! The reconciler never fails on bad upstream rows; it hands them to a
//! [`DataQualitySink`] and keeps folding. The default sink logs them.

use std::sync::Mutex;

use till_core::DataQualityIssue;
use tracing::warn;

/// Receives data-quality issues found while loading or updating a register.
pub trait DataQualitySink: Send + Sync {
    fn report(&self, register_id: &str, issue: &DataQualityIssue);
}

/// Logs every issue at WARN level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl DataQualitySink for TracingSink {
    fn report(&self, register_id: &str, issue: &DataQualityIssue) {
        warn!(
            register_id,
            movement_id = issue.movement_id(),
            code = issue.code(),
            "Data-quality issue: {}",
            issue
        );
    }
}

/// Drops every issue.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpSink;

impl DataQualitySink for NoOpSink {
    fn report(&self, _register_id: &str, _issue: &DataQualityIssue) {}
}

/// Keeps every issue in memory, for tests and diagnostics screens.
#[derive(Debug, Default)]
pub struct CollectingSink {
    issues: Mutex<Vec<(String, DataQualityIssue)>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything reported so far, oldest first.
    pub fn issues(&self) -> Vec<(String, DataQualityIssue)> {
        match self.issues.lock() {
            Ok(issues) => issues.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn len(&self) -> usize {
        self.issues().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl DataQualitySink for CollectingSink {
    fn report(&self, register_id: &str, issue: &DataQualityIssue) {
        let mut issues = match self.issues.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        issues.push((register_id.to_string(), issue.clone()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn issue() -> DataQualityIssue {
        DataQualityIssue::UnknownMovementType {
            movement_id: "m-1".to_string(),
            raw: "TRANSFER".to_string(),
        }
    }

    #[test]
    fn test_collecting_sink_keeps_order() {
        let sink = CollectingSink::new();
        assert!(sink.is_empty());

        sink.report("reg-1", &issue());
        sink.report("reg-2", &issue());

        let issues = sink.issues();
        assert_eq!(issues.len(), 2);
        assert_eq!(issues[0].0, "reg-1");
        assert_eq!(issues[1].0, "reg-2");
        assert_eq!(issues[0].1.movement_id(), "m-1");
    }

    #[test]
    fn test_tracing_and_noop_sinks_accept_issues() {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
        TracingSink.report("reg-1", &issue());
        NoOpSink.report("reg-1", &issue());
    }
}
