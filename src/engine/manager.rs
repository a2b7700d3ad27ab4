//! Docker container lifecycle manager.
//!
//! `DockerManager` owns one verified engine connection plus the immutable
//! configuration resolved at construction, and drives the container state
//! machine: created and started together, exec while running, stopped and
//! removed on teardown. A container that is created but fails to start is
//! removed before the error is surfaced, so partial failures never leak a
//! workload.

use std::time::Duration;

use bollard::Docker;
use camino::Utf8Path;
use tracing::{debug, info, warn};

use crate::config::{DockerConfig, TimeoutsConfig};
use crate::engine::connection::{CreateContainerRequest, EngineConnector, ExecRequest};
use crate::engine::SocketResolver;
use crate::error::{KodoError, ValidationError};
use crate::workload::{
    EnvironmentMap, ExecutionResult, NodeSelector, WorkloadHandle, WorkloadStatus,
};

/// Manager for containers on a local Docker (or Podman) engine.
pub struct DockerManager {
    docker: Docker,
    auto_remove: bool,
    exec_timeout: Duration,
}

impl DockerManager {
    /// Connect to the engine, verify it responds, and build a manager.
    ///
    /// The socket is resolved from `config_socket`, the resolver's
    /// environment variables, and the platform default, in that order.
    ///
    /// # Errors
    ///
    /// Returns a classified connection error when the engine is unreachable
    /// and health-check errors when it does not respond to a ping.
    pub async fn connect<E: mockable::Env>(
        config_socket: Option<&str>,
        resolver: &SocketResolver<'_, E>,
        docker_config: &DockerConfig,
        timeouts: &TimeoutsConfig,
    ) -> Result<Self, KodoError> {
        let socket = EngineConnector::resolve_socket(config_socket, resolver);
        debug!(socket, "connecting to container engine");
        let docker = EngineConnector::connect_and_verify(&socket).await?;

        Ok(Self {
            docker,
            auto_remove: docker_config.auto_remove,
            exec_timeout: Duration::from_secs(timeouts.exec_secs),
        })
    }

    /// Build a manager from an existing verified engine client.
    #[must_use]
    pub fn from_client(docker: Docker, docker_config: &DockerConfig, timeouts: &TimeoutsConfig) -> Self {
        Self {
            docker,
            auto_remove: docker_config.auto_remove,
            exec_timeout: Duration::from_secs(timeouts.exec_secs),
        }
    }

    /// Create and start a container, returning its workload handle.
    ///
    /// The default workload `PATH` is injected beneath caller-supplied
    /// environment. Node selectors are a scheduling concept this backend has
    /// no counterpart for, so a non-empty selector is rejected outright
    /// rather than silently dropped.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` for malformed input,
    /// `ContainerError::CreateFailed` when the engine rejects the request,
    /// and `ContainerError::StartFailed` when the container does not start
    /// (after removing the half-created container).
    pub async fn start_container(
        &self,
        image: &str,
        name: Option<String>,
        environment: Option<&EnvironmentMap>,
        node_selector: Option<&NodeSelector>,
    ) -> Result<WorkloadHandle, KodoError> {
        if node_selector.is_some_and(|selector| !selector.is_empty()) {
            return Err(KodoError::from(ValidationError::SelectorUnsupported {
                backend: crate::workload::BackendKind::Docker,
            }));
        }

        let env = EnvironmentMap::with_defaults(environment)?;
        let request = CreateContainerRequest::new(image)?
            .with_name(name)
            .with_env(env)
            .with_auto_remove(self.auto_remove);

        let container_id = match EngineConnector::create_and_start_container(&self.docker, &request)
            .await
        {
            Ok(container_id) => container_id,
            Err(error) => {
                self.remove_partial_container(&error).await;
                return Err(error);
            }
        };

        info!(container_id, image, "container started");
        Ok(WorkloadHandle::docker(container_id))
    }

    /// Execute a shell command in a running container and capture its output.
    ///
    /// Per-call environment is injected inline into the assembled command;
    /// it never mutates container state.
    ///
    /// # Errors
    ///
    /// Returns `ContainerError::NotRunning` when the container has exited and
    /// `ContainerError::ExecFailed` for session failures or timeout.
    pub async fn execute_command(
        &self,
        container_id: &str,
        command: &str,
        environment: Option<&EnvironmentMap>,
    ) -> Result<ExecutionResult, KodoError> {
        EngineConnector::ensure_running(&self.docker, container_id).await?;

        let request = ExecRequest::new(container_id, command, self.exec_timeout)?
            .with_env(environment.cloned());
        debug!(container_id, command, "executing command in container");
        EngineConnector::exec_captured(&self.docker, &request).await
    }

    /// Copy a host file into a running container.
    ///
    /// # Errors
    ///
    /// Returns `ContainerError::NotRunning` when the container has exited and
    /// `ContainerError::UploadFailed` when the transfer fails.
    pub async fn copy_to(
        &self,
        container_id: &str,
        local_path: &Utf8Path,
        dest_path: &str,
    ) -> Result<(), KodoError> {
        EngineConnector::ensure_running(&self.docker, container_id).await?;
        EngineConnector::upload_file(&self.docker, container_id, local_path, dest_path).await
    }

    /// Query the normalised status of a container.
    ///
    /// # Errors
    ///
    /// Returns `ContainerError::NotRunning` for a missing container and
    /// `ContainerError::ConnectionFailed` for transport failures.
    pub async fn status(&self, container_id: &str) -> Result<WorkloadStatus, KodoError> {
        EngineConnector::container_status(&self.docker, container_id).await
    }

    /// Stop and remove a container.
    ///
    /// Idempotent: a container that is already stopped or gone counts as
    /// success.
    ///
    /// # Errors
    ///
    /// Returns `ContainerError::StopFailed` for failures other than the
    /// tolerated already-gone conditions.
    pub async fn stop_container(&self, container_id: &str) -> Result<(), KodoError> {
        info!(container_id, "stopping container");
        EngineConnector::stop_and_remove(&self.docker, container_id, self.auto_remove).await
    }

    /// Best-effort removal of a container whose start failed.
    async fn remove_partial_container(&self, error: &KodoError) {
        let KodoError::Container(crate::error::ContainerError::StartFailed {
            ref container_id,
            ..
        }) = *error
        else {
            return;
        };

        if let Err(cleanup_error) =
            EngineConnector::stop_and_remove(&self.docker, container_id, self.auto_remove).await
        {
            warn!(
                container_id,
                error = %cleanup_error,
                "failed to remove container after start failure"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::workload::DEFAULT_WORKLOAD_PATH;

    #[rstest]
    #[expect(clippy::expect_used, reason = "test asserts merge behaviour")]
    fn default_path_is_injected_beneath_overrides() {
        let env = EnvironmentMap::with_defaults(None).expect("merge should succeed");
        assert_eq!(env.get("PATH"), Some(DEFAULT_WORKLOAD_PATH));

        let overrides =
            EnvironmentMap::from_pairs([("PATH", "/custom"), ("X", "1")]).expect("pairs valid");
        let merged = EnvironmentMap::with_defaults(Some(&overrides)).expect("merge should succeed");
        assert_eq!(merged.get("PATH"), Some("/custom"));
        assert_eq!(merged.get("X"), Some("1"));
    }
}
