//! Waiting for server-side tasks to finish.
//!
//! The poller watches `info.state` and `info.error` through one property
//! filter and decides on the pair as a whole: an `error` state only becomes
//! an outcome once the fault describing it has been seen.

use crate::error::{Error, Result};
use std::time::Duration;
use tracing::{debug, info};
use vsphere_api::{
    LocalizedMethodFault, ManagedObjectReference, ManagementClient, PropertySnapshot,
    TaskInfoState, WaitOptions, wait_for_values,
};

/// Task properties the poller subscribes to.
pub const TASK_PROPERTIES: [&str; 2] = ["info.state", "info.error"];

/// Overall wait for one task unless configured otherwise.
pub const DEFAULT_TASK_TIMEOUT: Duration = Duration::from_secs(300);

/// Server-side wait per `WaitForUpdatesEx` call.
pub const DEFAULT_MAX_WAIT: Duration = Duration::from_secs(60);

/// Final result of a task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Succeeded,
    Failed(LocalizedMethodFault),
}

/// Combined view of the two watched task properties.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskObservation {
    pub state: Option<TaskInfoState>,
    pub fault: Option<LocalizedMethodFault>,
}

impl TaskObservation {
    pub fn from_snapshot(snapshot: &PropertySnapshot) -> Self {
        Self {
            state: snapshot
                .get(TASK_PROPERTIES[0])
                .and_then(TaskInfoState::from_value),
            fault: snapshot
                .get(TASK_PROPERTIES[1])
                .and_then(LocalizedMethodFault::from_value),
        }
    }

    /// The outcome this observation settles on, if any.
    ///
    /// Success is decided by the state alone. Error needs the fault payload
    /// as well; until it arrives the task is treated as still running.
    pub fn outcome(&self) -> Option<TaskOutcome> {
        match (self.state, &self.fault) {
            (Some(TaskInfoState::Success), _) => Some(TaskOutcome::Succeeded),
            (Some(TaskInfoState::Error), Some(fault)) => Some(TaskOutcome::Failed(fault.clone())),
            _ => None,
        }
    }
}

/// Blocks the calling flow until a task reaches a terminal state.
pub struct TaskPoller<'a, C: ?Sized> {
    client: &'a C,
    options: WaitOptions,
}

impl<'a, C: ManagementClient + ?Sized> TaskPoller<'a, C> {
    pub fn new(client: &'a C) -> Self {
        Self {
            client,
            options: WaitOptions {
                max_wait: Some(DEFAULT_MAX_WAIT),
                timeout: Some(DEFAULT_TASK_TIMEOUT),
            },
        }
    }

    /// Give up waiting after `timeout`. `None` waits indefinitely.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.options.timeout = timeout;
        self
    }

    pub fn with_max_wait(mut self, max_wait: Option<Duration>) -> Self {
        self.options.max_wait = max_wait;
        self
    }

    /// Wait for `task` to finish and report how it ended.
    pub async fn await_completion(&self, task: &ManagedObjectReference) -> Result<TaskOutcome> {
        let mut last = TaskObservation::default();

        let snapshot = wait_for_values(self.client, task, &TASK_PROPERTIES, self.options, |snapshot| {
            let observation = TaskObservation::from_snapshot(snapshot);
            if observation.state != last.state
                && let Some(state) = observation.state
            {
                debug!("Task {task} is {}", state.as_str());
            }
            if observation.state == Some(TaskInfoState::Error) && observation.fault.is_none() {
                debug!("Task {task} reported error, waiting for its fault");
            }
            let done = observation.outcome().is_some();
            last = observation;
            done
        })
        .await?;

        TaskObservation::from_snapshot(&snapshot)
            .outcome()
            .ok_or_else(|| Error::task(format!("Task {task} stopped without a terminal state")))
    }

    /// Like [`Self::await_completion`], but a failed task is an error.
    pub async fn wait_for_success(&self, task: &ManagedObjectReference) -> Result<()> {
        match self.await_completion(task).await? {
            TaskOutcome::Succeeded => {
                info!("Task {task} completed successfully");
                Ok(())
            }
            TaskOutcome::Failed(fault) => Err(Error::RemoteFault {
                task: task.to_string(),
                fault,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::{FakeInventory, fault, state};

    fn entity() -> ManagedObjectReference {
        ManagedObjectReference::new("VirtualMachine", "vm-17")
    }

    async fn start_task(inventory: &FakeInventory) -> ManagedObjectReference {
        inventory.destroy(&entity()).await.unwrap()
    }

    #[tokio::test]
    async fn test_running_then_success() {
        let inventory = FakeInventory::new()
            .with_task(vec![vec![state("queued")], vec![state("running")], vec![state("success")]]);
        let task = start_task(&inventory).await;

        let outcome = TaskPoller::new(&inventory).await_completion(&task).await.unwrap();

        assert_eq!(outcome, TaskOutcome::Succeeded);
        assert_eq!(inventory.filters_created(), 1);
        assert_eq!(inventory.filters_destroyed(), 1);
    }

    #[tokio::test]
    async fn test_error_with_fault_in_same_update() {
        let inventory = FakeInventory::new().with_task(vec![
            vec![state("running")],
            vec![state("error"), fault("ResourceInUse", "The resource 'vm-17' is in use.")],
        ]);
        let task = start_task(&inventory).await;
        let poller = TaskPoller::new(&inventory);

        let outcome = poller.await_completion(&task).await.unwrap();
        match outcome {
            TaskOutcome::Failed(fault) => {
                assert_eq!(fault.fault_type, "ResourceInUse");
                assert_eq!(fault.localized_message, "The resource 'vm-17' is in use.");
            }
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_error_waits_for_fault_payload() {
        // State flips before the fault is published
        let inventory = FakeInventory::new().with_task(vec![
            vec![state("running")],
            vec![state("error")],
            vec![fault("InvalidState", "The operation is not allowed in the current state.")],
        ]);
        let task = start_task(&inventory).await;

        let outcome = TaskPoller::new(&inventory).await_completion(&task).await.unwrap();
        assert!(matches!(
            outcome,
            TaskOutcome::Failed(ref f) if f.localized_message == "The operation is not allowed in the current state."
        ));
    }

    #[tokio::test]
    async fn test_failed_task_surfaces_as_error() {
        let inventory = FakeInventory::new().with_task(vec![vec![
            state("error"),
            fault("NotAuthorized", "Permission to perform this operation was denied."),
        ]]);
        let task = start_task(&inventory).await;

        let err = TaskPoller::new(&inventory).wait_for_success(&task).await.unwrap_err();
        match err {
            Error::RemoteFault { task, fault } => {
                assert_eq!(task, "Task:task-1");
                assert_eq!(fault.fault_type, "NotAuthorized");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_success_ignores_stale_fault() {
        let inventory = FakeInventory::new().with_task(vec![
            vec![state("running"), fault("TaskInProgress", "stale")],
            vec![state("success")],
        ]);
        let task = start_task(&inventory).await;

        TaskPoller::new(&inventory).wait_for_success(&task).await.unwrap();
    }

    #[tokio::test]
    async fn test_collector_version_failure_propagates() {
        let inventory = FakeInventory::new().with_broken_collector();
        let task = start_task(&inventory).await;

        let err = TaskPoller::new(&inventory).await_completion(&task).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Api(vsphere_api::Error::InvalidCollectorVersion(_))
        ));
        assert_eq!(inventory.filters_destroyed(), 1);
    }

    #[tokio::test]
    async fn test_timeout_when_task_never_finishes() {
        let inventory = FakeInventory::new().with_task(vec![vec![state("running")]]);
        let task = start_task(&inventory).await;

        let err = TaskPoller::new(&inventory)
            .with_timeout(Some(Duration::from_millis(50)))
            .await_completion(&task)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Api(vsphere_api::Error::Timeout(_))));
        assert_eq!(inventory.filters_destroyed(), 1);
    }

    #[test]
    fn test_observation_outcomes() {
        let fault = LocalizedMethodFault {
            fault_type: "ResourceInUse".to_string(),
            localized_message: "busy".to_string(),
        };
        let cases = [
            (None, None, None),
            (Some(TaskInfoState::Queued), None, None),
            (Some(TaskInfoState::Running), Some(fault.clone()), None),
            (Some(TaskInfoState::Success), None, Some(TaskOutcome::Succeeded)),
            (Some(TaskInfoState::Error), None, None),
            (
                Some(TaskInfoState::Error),
                Some(fault.clone()),
                Some(TaskOutcome::Failed(fault.clone())),
            ),
        ];
        for (state, fault, expected) in cases {
            let observation = TaskObservation { state, fault };
            assert_eq!(observation.outcome(), expected, "{observation:?}");
        }
    }
}
