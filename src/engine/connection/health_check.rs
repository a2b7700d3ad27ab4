//! Health check and connect-and-verify functionality.
//!
//! A successful connection only proves the socket is reachable; the ping
//! round-trip confirms the engine behind it is operational. The combined
//! connect-and-verify helpers are what the Docker manager uses at
//! construction.

use bollard::Docker;

use super::{EngineConnector, SocketResolver};
use crate::error::KodoError;

impl EngineConnector {
    /// Verify the container engine is responsive.
    ///
    /// Sends a ping request to the engine and waits for a response. This
    /// confirms the engine is operational, not just that the socket is
    /// reachable.
    ///
    /// # Errors
    ///
    /// Returns `ContainerError::HealthCheckFailed` if the engine does not
    /// respond correctly.
    ///
    /// Returns `ContainerError::HealthCheckTimeout` if the check times out.
    pub async fn health_check(docker: &Docker) -> Result<(), KodoError> {
        Self::ping_with_timeout(docker).await
    }

    /// Connect to the container engine and verify it responds.
    ///
    /// Combines `connect()` with `health_check()` in a single operation.
    /// Useful when the caller wants to ensure the engine is fully operational
    /// before proceeding.
    ///
    /// # Errors
    ///
    /// Returns a classified connection error if the connection fails, and
    /// `ContainerError::HealthCheckFailed` / `HealthCheckTimeout` if the
    /// engine does not respond.
    pub async fn connect_and_verify(socket: &str) -> Result<Docker, KodoError> {
        let docker = Self::connect(socket)?;
        Self::ping_with_timeout(&docker).await?;
        Ok(docker)
    }

    /// Connect using fallback resolution and verify the engine responds.
    ///
    /// Combines `connect_with_fallback()` with `health_check()`.
    ///
    /// Resolution order:
    /// 1. `config_socket` (from CLI, config file, or `KODO_ENGINE_SOCKET`)
    /// 2. `DOCKER_HOST`, `CONTAINER_HOST`, `PODMAN_HOST` (via resolver)
    /// 3. Platform default socket
    ///
    /// # Errors
    ///
    /// Returns a classified connection error if the connection fails, and
    /// `ContainerError::HealthCheckFailed` / `HealthCheckTimeout` if the
    /// engine does not respond.
    pub async fn connect_with_fallback_and_verify<E: mockable::Env>(
        config_socket: Option<&str>,
        resolver: &SocketResolver<'_, E>,
    ) -> Result<Docker, KodoError> {
        let docker = Self::connect_with_fallback(config_socket, resolver)?;
        Self::ping_with_timeout(&docker).await?;
        Ok(docker)
    }
}
