//! Ordered teardown queue.
//!
//! Setup registers one action per mutation it has made. Teardown runs them
//! last-registered-first, exactly once, and keeps going when an action fails
//! or panics so that nothing registered is left behind.

use std::future::Future;
use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use futures::future::BoxFuture;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{ClusterError, Error, panic_message};

type CleanupFn<'a> = Box<dyn FnOnce() -> BoxFuture<'a, Result<(), ClusterError>> + Send + 'a>;

struct CleanupAction<'a> {
    name: String,
    run: CleanupFn<'a>,
}

/// Append-only stack of teardown actions.
///
/// Actions may borrow from anything that outlives the queue (`'a`), which is
/// how the orchestrator hands its collaborators and the installation context
/// to them without cloning.
#[derive(Default)]
pub struct CleanupQueue<'a> {
    actions: Vec<CleanupAction<'a>>,
}

impl<'a> CleanupQueue<'a> {
    /// Create an empty queue
    pub fn new() -> Self {
        Self {
            actions: Vec::new(),
        }
    }

    /// Append a teardown action.
    pub fn register<F, Fut>(&mut self, name: impl Into<String>, action: F)
    where
        F: FnOnce() -> Fut + Send + 'a,
        Fut: Future<Output = Result<(), ClusterError>> + Send + 'a,
    {
        let name = name.into();
        debug!(action = %name, position = self.actions.len(), "Registered cleanup action");
        self.actions.push(CleanupAction {
            name,
            run: Box::new(move || action().boxed()),
        });
    }

    /// Number of registered actions
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    /// Whether nothing has been registered
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Registered action names in registration order
    pub fn names(&self) -> Vec<&str> {
        self.actions.iter().map(|a| a.name.as_str()).collect()
    }

    /// Run every action in reverse registration order.
    ///
    /// Consumes the queue, so each action runs at most once. Failures and
    /// panics are recorded and the remaining actions still run.
    pub async fn run_all(mut self) -> CleanupReport {
        let mut report = CleanupReport::default();
        info!(actions = self.actions.len(), "Running cleanup actions");

        while let Some(action) = self.actions.pop() {
            let CleanupAction { name, run } = action;
            debug!(action = %name, "Running cleanup action");

            let result = AssertUnwindSafe(async move { run().await })
                .catch_unwind()
                .await;

            match result {
                Ok(Ok(())) => {
                    debug!(action = %name, "Cleanup action succeeded");
                }
                Ok(Err(source)) => {
                    warn!(action = %name, error = %source, "Cleanup action failed");
                    report.errors.push(Error::Cleanup {
                        action: name.clone(),
                        source,
                    });
                }
                Err(payload) => {
                    let message = panic_message(&*payload);
                    warn!(action = %name, panic = %message, "Cleanup action panicked");
                    report.errors.push(Error::CleanupPanicked {
                        action: name.clone(),
                        message,
                    });
                }
            }
            report.executed.push(name);
        }

        report
    }
}

/// What teardown did.
#[derive(Debug, Default, Serialize)]
pub struct CleanupReport {
    /// Action names in execution order
    pub executed: Vec<String>,
    /// Every failure, in execution order
    #[serde(serialize_with = "serialize_errors")]
    pub errors: Vec<Error>,
}

impl CleanupReport {
    /// Whether every action succeeded
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }

    /// First failure observed during teardown
    pub fn first_error(&self) -> Option<&Error> {
        self.errors.first()
    }
}

fn serialize_errors<S>(errors: &[Error], serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.collect_seq(errors.iter().map(|e| e.to_string()))
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic
)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn recording(
        queue: &mut CleanupQueue<'_>,
        log: &Arc<Mutex<Vec<&'static str>>>,
        name: &'static str,
    ) {
        let log = Arc::clone(log);
        queue.register(name, move || async move {
            log.lock().unwrap().push(name);
            Ok(())
        });
    }

    #[tokio::test]
    async fn test_runs_in_reverse_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut queue = CleanupQueue::new();
        recording(&mut queue, &log, "a");
        recording(&mut queue, &log, "b");
        recording(&mut queue, &log, "c");
        assert_eq!(queue.names(), vec!["a", "b", "c"]);

        let report = queue.run_all().await;

        assert_eq!(*log.lock().unwrap(), vec!["c", "b", "a"]);
        assert_eq!(report.executed, vec!["c", "b", "a"]);
        assert!(report.is_clean());
    }

    #[tokio::test]
    async fn test_continues_past_failures() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut queue = CleanupQueue::new();
        recording(&mut queue, &log, "a");
        queue.register("b", || async {
            Err(ClusterError::command_failed("kubectl delete", "forbidden"))
        });
        queue.register("c", || async {
            Err(ClusterError::command_failed("helm uninstall", "release not found"))
        });

        let report = queue.run_all().await;

        assert_eq!(*log.lock().unwrap(), vec!["a"]);
        assert_eq!(report.errors.len(), 2);
        match report.first_error() {
            Some(Error::Cleanup { action, .. }) => assert_eq!(action, "c"),
            other => panic!("unexpected first error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_continues_past_panics() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut queue = CleanupQueue::new();
        recording(&mut queue, &log, "a");
        queue.register("explodes", || async { panic!("teardown bug") });

        let report = queue.run_all().await;

        assert_eq!(*log.lock().unwrap(), vec!["a"]);
        assert_eq!(report.executed, vec!["explodes", "a"]);
        match report.first_error() {
            Some(Error::CleanupPanicked { action, message }) => {
                assert_eq!(action, "explodes");
                assert_eq!(message, "teardown bug");
            }
            other => panic!("unexpected first error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_empty_queue() {
        let queue = CleanupQueue::new();
        assert!(queue.is_empty());
        let report = queue.run_all().await;
        assert!(report.executed.is_empty());
        assert!(report.first_error().is_none());
    }

    #[tokio::test]
    async fn test_actions_may_borrow() {
        let counter = Mutex::new(0);
        {
            let counter = &counter;
            let mut queue = CleanupQueue::new();
            queue.register("bump", move || async move {
                *counter.lock().unwrap() += 1;
                Ok(())
            });
            assert_eq!(queue.len(), 1);
            queue.run_all().await;
        }
        assert_eq!(*counter.lock().unwrap(), 1);
    }

    #[test]
    fn test_report_serializes_errors_as_strings() {
        let report = CleanupReport {
            executed: vec!["uninstall-component".to_string()],
            errors: vec![Error::CleanupPanicked {
                action: "uninstall-component".to_string(),
                message: "boom".to_string(),
            }],
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(
            json["errors"][0],
            "cleanup action 'uninstall-component' panicked: boom"
        );
    }
}
