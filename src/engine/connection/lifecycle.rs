//! Container status inspection, stop, and removal.
//!
//! Teardown is idempotent: a container that is already stopped, already
//! removed, or mid-removal is treated as success so cleanup paths can be
//! retried safely after partial failures.

use std::future::Future;
use std::pin::Pin;

use bollard::Docker;
use bollard::errors::Error as BollardError;
use bollard::models::{ContainerInspectResponse, ContainerStateStatusEnum};
use bollard::query_parameters::{
    InspectContainerOptions, RemoveContainerOptionsBuilder, StopContainerOptions,
};
use tracing::debug;

use super::EngineConnector;
use crate::error::{ContainerError, KodoError};
use crate::workload::WorkloadStatus;

/// HTTP status the engine reports when a container is already stopped.
const STATUS_NOT_MODIFIED: u16 = 304;

/// HTTP status the engine reports for a missing container.
const STATUS_NOT_FOUND: u16 = 404;

/// HTTP status the engine reports when removal is already in progress.
const STATUS_CONFLICT: u16 = 409;

/// Boxed future type returned by [`ContainerLifecycle::inspect_container`].
pub type InspectContainerFuture<'a> =
    Pin<Box<dyn Future<Output = Result<ContainerInspectResponse, BollardError>> + Send + 'a>>;

/// Boxed future type returned by stop and remove operations.
pub type LifecycleActionFuture<'a> =
    Pin<Box<dyn Future<Output = Result<(), BollardError>> + Send + 'a>>;

/// Behaviour required to inspect and tear down containers.
///
/// This abstraction keeps lifecycle logic testable without a live daemon.
pub trait ContainerLifecycle {
    /// Inspect a container for its current state.
    fn inspect_container(&self, container_id: &str) -> InspectContainerFuture<'_>;

    /// Stop a running container, using the engine's default grace period.
    fn stop_container(&self, container_id: &str) -> LifecycleActionFuture<'_>;

    /// Force-remove a container.
    fn remove_container(&self, container_id: &str) -> LifecycleActionFuture<'_>;
}

impl ContainerLifecycle for Docker {
    fn inspect_container(&self, container_id: &str) -> InspectContainerFuture<'_> {
        let container_id_owned = String::from(container_id);
        Box::pin(async move {
            Self::inspect_container(self, &container_id_owned, None::<InspectContainerOptions>)
                .await
        })
    }

    fn stop_container(&self, container_id: &str) -> LifecycleActionFuture<'_> {
        let container_id_owned = String::from(container_id);
        Box::pin(async move {
            Self::stop_container(self, &container_id_owned, None::<StopContainerOptions>).await
        })
    }

    fn remove_container(&self, container_id: &str) -> LifecycleActionFuture<'_> {
        let container_id_owned = String::from(container_id);
        Box::pin(async move {
            let options = RemoveContainerOptionsBuilder::new().force(true).build();
            Self::remove_container(self, &container_id_owned, Some(options)).await
        })
    }
}

impl EngineConnector {
    /// Query the normalised status of a container.
    ///
    /// # Errors
    ///
    /// Returns `ContainerError::NotRunning` for a missing container (the
    /// workload is gone, which for status purposes is indistinguishable from
    /// torn down), and `ContainerError::ConnectionFailed` for transport
    /// failures.
    pub async fn container_status<C: ContainerLifecycle>(
        client: &C,
        container_id: &str,
    ) -> Result<WorkloadStatus, KodoError> {
        let inspect = match client.inspect_container(container_id).await {
            Ok(inspect) => inspect,
            Err(error) if has_status(&error, STATUS_NOT_FOUND) => {
                return Err(KodoError::from(ContainerError::NotRunning {
                    container_id: String::from(container_id),
                }));
            }
            Err(error) => {
                return Err(KodoError::from(ContainerError::ConnectionFailed {
                    message: error.to_string(),
                }));
            }
        };

        Ok(normalise_state(inspect))
    }

    /// Fail unless the container is currently running.
    ///
    /// # Errors
    ///
    /// Returns `ContainerError::NotRunning` when the container has exited or
    /// does not exist.
    pub async fn ensure_running<C: ContainerLifecycle>(
        client: &C,
        container_id: &str,
    ) -> Result<(), KodoError> {
        match Self::container_status(client, container_id).await? {
            WorkloadStatus::Running => Ok(()),
            _ => Err(KodoError::from(ContainerError::NotRunning {
                container_id: String::from(container_id),
            })),
        }
    }

    /// Stop a container and, unless the engine removes it automatically,
    /// remove it.
    ///
    /// Idempotent: missing containers, already-stopped containers, and
    /// in-progress removals all count as success.
    ///
    /// # Errors
    ///
    /// Returns `ContainerError::StopFailed` for failures other than the
    /// tolerated already-gone conditions.
    pub async fn stop_and_remove<C: ContainerLifecycle>(
        client: &C,
        container_id: &str,
        auto_remove: bool,
    ) -> Result<(), KodoError> {
        match client.stop_container(container_id).await {
            Ok(()) => {}
            Err(error) if is_already_gone(&error) => {
                debug!(container_id, "container already stopped or gone");
            }
            Err(error) => {
                return Err(stop_failed(container_id, &error));
            }
        }

        if auto_remove {
            // The engine removes the container itself once stopped.
            return Ok(());
        }

        match client.remove_container(container_id).await {
            Ok(()) => Ok(()),
            Err(error) if is_already_gone(&error) => {
                debug!(container_id, "container already removed");
                Ok(())
            }
            Err(error) => Err(stop_failed(container_id, &error)),
        }
    }
}

fn normalise_state(inspect: ContainerInspectResponse) -> WorkloadStatus {
    inspect
        .state
        .and_then(|state| state.status)
        .map_or(WorkloadStatus::Unknown, |status| match status {
            ContainerStateStatusEnum::CREATED | ContainerStateStatusEnum::RESTARTING => {
                WorkloadStatus::Pending
            }
            ContainerStateStatusEnum::RUNNING | ContainerStateStatusEnum::PAUSED => {
                WorkloadStatus::Running
            }
            ContainerStateStatusEnum::EXITED | ContainerStateStatusEnum::REMOVING => {
                WorkloadStatus::Stopped
            }
            ContainerStateStatusEnum::DEAD => WorkloadStatus::Failed,
            _ => WorkloadStatus::Unknown,
        })
}

fn has_status(error: &BollardError, status: u16) -> bool {
    matches!(
        error,
        BollardError::DockerResponseServerError { status_code, .. } if *status_code == status
    )
}

fn is_already_gone(error: &BollardError) -> bool {
    has_status(error, STATUS_NOT_FOUND)
        || has_status(error, STATUS_NOT_MODIFIED)
        || has_status(error, STATUS_CONFLICT)
}

fn stop_failed(container_id: &str, error: &BollardError) -> KodoError {
    KodoError::from(ContainerError::StopFailed {
        container_id: String::from(container_id),
        message: error.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use bollard::models::ContainerState;
    use mockall::mock;
    use rstest::rstest;

    use super::*;

    mock! {
        Lifecycle {}

        impl ContainerLifecycle for Lifecycle {
            fn inspect_container<'a>(&'a self, container_id: &str) -> InspectContainerFuture<'a>;
            fn stop_container<'a>(&'a self, container_id: &str) -> LifecycleActionFuture<'a>;
            fn remove_container<'a>(&'a self, container_id: &str) -> LifecycleActionFuture<'a>;
        }
    }

    fn inspect_with_status(status: ContainerStateStatusEnum) -> ContainerInspectResponse {
        ContainerInspectResponse {
            state: Some(ContainerState {
                status: Some(status),
                ..ContainerState::default()
            }),
            ..ContainerInspectResponse::default()
        }
    }

    fn not_found() -> BollardError {
        BollardError::DockerResponseServerError {
            status_code: 404,
            message: String::from("no such container"),
        }
    }

    #[rstest]
    #[case(ContainerStateStatusEnum::RUNNING, WorkloadStatus::Running)]
    #[case(ContainerStateStatusEnum::CREATED, WorkloadStatus::Pending)]
    #[case(ContainerStateStatusEnum::EXITED, WorkloadStatus::Stopped)]
    #[case(ContainerStateStatusEnum::DEAD, WorkloadStatus::Failed)]
    fn normalise_state_maps_engine_statuses(
        #[case] engine_status: ContainerStateStatusEnum,
        #[case] expected: WorkloadStatus,
    ) {
        assert_eq!(normalise_state(inspect_with_status(engine_status)), expected);
    }

    #[tokio::test]
    async fn ensure_running_rejects_exited_container() {
        let mut client = MockLifecycle::new();
        client.expect_inspect_container().returning(|_| {
            Box::pin(async { Ok(inspect_with_status(ContainerStateStatusEnum::EXITED)) })
        });

        let result = EngineConnector::ensure_running(&client, "abc123").await;
        assert!(matches!(
            result,
            Err(KodoError::Container(ContainerError::NotRunning { .. }))
        ));
    }

    #[tokio::test]
    #[expect(clippy::expect_used, reason = "test asserts idempotent teardown")]
    async fn stop_and_remove_tolerates_missing_container() {
        let mut client = MockLifecycle::new();
        client
            .expect_stop_container()
            .returning(|_| Box::pin(async { Err(not_found()) }));
        client
            .expect_remove_container()
            .returning(|_| Box::pin(async { Err(not_found()) }));

        EngineConnector::stop_and_remove(&client, "abc123", false)
            .await
            .expect("teardown of a missing container should succeed");
    }

    #[tokio::test]
    #[expect(clippy::expect_used, reason = "test asserts auto-remove skips removal")]
    async fn stop_and_remove_skips_removal_when_auto_remove() {
        let mut client = MockLifecycle::new();
        client
            .expect_stop_container()
            .times(1)
            .returning(|_| Box::pin(async { Ok(()) }));
        client.expect_remove_container().times(0);

        EngineConnector::stop_and_remove(&client, "abc123", true)
            .await
            .expect("teardown should succeed");
    }

    #[tokio::test]
    async fn stop_and_remove_surfaces_transport_failures() {
        let mut client = MockLifecycle::new();
        client.expect_stop_container().returning(|_| {
            Box::pin(async {
                Err(BollardError::DockerResponseServerError {
                    status_code: 500,
                    message: String::from("daemon on fire"),
                })
            })
        });

        let result = EngineConnector::stop_and_remove(&client, "abc123", false).await;
        assert!(matches!(
            result,
            Err(KodoError::Container(ContainerError::StopFailed { .. }))
        ));
    }
}
