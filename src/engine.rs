//! Docker engine backend.
//!
//! This module provides the interface for connecting to a Docker (or Podman)
//! container engine and driving the container lifecycle: create and start,
//! execute commands with captured output, upload archives, and stop/remove.
//! The socket endpoint is resolved through a priority-based fallback chain:
//!
//! 1. CLI argument (`--engine-socket`)
//! 2. Config file (`engine_socket` in TOML)
//! 3. `KODO_ENGINE_SOCKET` environment variable
//! 4. `DOCKER_HOST` environment variable
//! 5. `CONTAINER_HOST` environment variable
//! 6. `PODMAN_HOST` environment variable
//! 7. Platform default (`/var/run/docker.sock` on Unix)

mod connection;
mod manager;

pub use connection::{
    ContainerCreator, ContainerExecClient, ContainerLifecycle, ContainerUploader,
    CreateContainerFuture, CreateContainerRequest, CreateExecFuture, EngineConnector, ExecRequest,
    InspectContainerFuture, InspectExecFuture, LifecycleActionFuture, SocketResolver,
    StartContainerFuture, StartExecFuture, UploadToContainerFuture,
};
pub use manager::DockerManager;
