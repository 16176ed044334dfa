//! Runner event stream.
//!
//! The runner's wire format is decoded upstream; observers receive the
//! structured [`TestRunnerEvent`]s.  One JSON object per line is accepted by
//! [`TestRunnerEvent::from_json_line`]:
//!
//! ```json
//! {"event": "testStarted", "id": "Tests\\FooTest::test_add", "name": "test_add with data set #0", "flowId": 1}
//! ```
mod dataset;

pub use dataset::DatasetChildObserver;

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Payload shared by every runner event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestResult {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flow_id: Option<u64>,
    /// Milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl TestResult {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn duration(&self) -> Option<Duration> {
        self.duration.map(Duration::from_millis)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum TestRunnerEvent {
    TestStarted(TestResult),
    TestFinished(TestResult),
    TestFailed(TestResult),
    TestIgnored(TestResult),
}

impl TestRunnerEvent {
    pub fn from_json_line(line: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(line)
    }

    pub fn result(&self) -> &TestResult {
        match self {
            Self::TestStarted(result)
            | Self::TestFinished(result)
            | Self::TestFailed(result)
            | Self::TestIgnored(result) => result,
        }
    }
}

/// Receives runner events.  Every method defaults to ignoring the event.
pub trait TestRunnerObserver {
    fn test_started(&mut self, _result: &TestResult) {}
    fn test_finished(&mut self, _result: &TestResult) {}
    fn test_failed(&mut self, _result: &TestResult) {}
    fn test_ignored(&mut self, _result: &TestResult) {}

    fn dispatch(&mut self, event: &TestRunnerEvent) {
        match event {
            TestRunnerEvent::TestStarted(result) => self.test_started(result),
            TestRunnerEvent::TestFinished(result) => self.test_finished(result),
            TestRunnerEvent::TestFailed(result) => self.test_failed(result),
            TestRunnerEvent::TestIgnored(result) => self.test_ignored(result),
        }
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decodes_tagged_events() {
        let event = TestRunnerEvent::from_json_line(
            r#"{"event":"testFinished","id":"Tests\\FooTest::test_a","name":"test_a","flowId":7,"duration":15}"#,
        )
        .unwrap();
        let TestRunnerEvent::TestFinished(result) = &event else {
            panic!("expected testFinished, got {:?}", event);
        };
        assert_eq!(result.id, "Tests\\FooTest::test_a");
        assert_eq!(result.flow_id, Some(7));
        assert_eq!(result.duration(), Some(Duration::from_millis(15)));
    }

    #[test]
    fn test_unknown_event_is_an_error() {
        assert!(TestRunnerEvent::from_json_line(r#"{"event":"testSuiteStarted","id":"x","name":"x"}"#).is_err());
    }

    #[derive(Default)]
    struct Counter {
        started: usize,
        failed: usize,
    }

    impl TestRunnerObserver for Counter {
        fn test_started(&mut self, _result: &TestResult) {
            self.started += 1;
        }

        fn test_failed(&mut self, _result: &TestResult) {
            self.failed += 1;
        }
    }

    #[test]
    fn test_dispatch_routes_by_kind() {
        let mut counter = Counter::default();
        let result = TestResult::new("A::t", "t");
        counter.dispatch(&TestRunnerEvent::TestStarted(result.clone()));
        counter.dispatch(&TestRunnerEvent::TestFailed(result.clone()));
        counter.dispatch(&TestRunnerEvent::TestIgnored(result));
        assert_eq!((counter.started, counter.failed), (1, 1));
    }
}
