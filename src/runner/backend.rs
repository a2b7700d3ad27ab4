//! Capability trait unifying the two workload backends.
//!
//! The runner facade never branches on backend kind; it drives whichever
//! [`WorkloadBackend`] it was constructed with. The two conforming adapters
//! translate the shared contract onto the Docker and Kubernetes managers and
//! normalise nothing themselves - the managers already speak in shared
//! types.

use std::future::Future;
use std::pin::Pin;

use camino::Utf8Path;

use crate::cluster::KubernetesManager;
use crate::engine::DockerManager;
use crate::error::KodoError;
use crate::workload::{
    BackendKind, EnvironmentMap, ExecutionResult, NodeSelector, WorkloadHandle, WorkloadStatus,
};

/// Boxed future type returned by [`WorkloadBackend::start`].
pub type StartFuture<'a> =
    Pin<Box<dyn Future<Output = Result<WorkloadHandle, KodoError>> + Send + 'a>>;

/// Boxed future type returned by [`WorkloadBackend::exec`].
pub type ExecFuture<'a> =
    Pin<Box<dyn Future<Output = Result<ExecutionResult, KodoError>> + Send + 'a>>;

/// Boxed future type returned by fallible unit operations.
pub type TeardownFuture<'a> = Pin<Box<dyn Future<Output = Result<(), KodoError>> + Send + 'a>>;

/// Boxed future type returned by [`WorkloadBackend::status`].
pub type StatusFuture<'a> =
    Pin<Box<dyn Future<Output = Result<WorkloadStatus, KodoError>> + Send + 'a>>;

/// Boxed future type returned by [`WorkloadBackend::close`].
pub type CloseFuture<'a> = Pin<Box<dyn Future<Output = ()> + Send + 'a>>;

/// Parameters for launching a workload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartRequest {
    /// Image to launch.
    pub image: String,
    /// Workload name (container name or pod name).
    pub name: String,
    /// Creation-time environment variables.
    pub environment: Option<EnvironmentMap>,
    /// Scheduling constraint, honoured only by the Kubernetes backend.
    pub node_selector: Option<NodeSelector>,
}

/// Lifecycle capability implemented by each backend.
pub trait WorkloadBackend: Send {
    /// Return the backend this implementation drives.
    fn kind(&self) -> BackendKind;

    /// Launch a workload and return its handle once it accepts commands.
    fn start(&mut self, request: StartRequest) -> StartFuture<'_>;

    /// Execute a shell command in a workload, capturing its output.
    fn exec<'a>(
        &'a mut self,
        handle: &'a WorkloadHandle,
        command: &'a str,
        environment: Option<&'a EnvironmentMap>,
    ) -> ExecFuture<'a>;

    /// Copy a host file into a workload.
    fn upload<'a>(
        &'a mut self,
        handle: &'a WorkloadHandle,
        local_path: &'a Utf8Path,
        dest_path: &'a str,
    ) -> TeardownFuture<'a>;

    /// Query the workload's normalised status.
    fn status<'a>(&'a self, handle: &'a WorkloadHandle) -> StatusFuture<'a>;

    /// Tear the workload down.
    fn teardown<'a>(&'a mut self, handle: &'a WorkloadHandle) -> TeardownFuture<'a>;

    /// Release backend-owned resources (transport, proxy session).
    fn close(&mut self) -> CloseFuture<'_>;
}

/// Docker adapter for the workload capability.
pub struct DockerBackend {
    manager: DockerManager,
}

impl DockerBackend {
    /// Wrap a connected Docker manager.
    #[must_use]
    pub const fn new(manager: DockerManager) -> Self {
        Self { manager }
    }
}

impl WorkloadBackend for DockerBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Docker
    }

    fn start(&mut self, request: StartRequest) -> StartFuture<'_> {
        Box::pin(async move {
            self.manager
                .start_container(
                    &request.image,
                    Some(request.name),
                    request.environment.as_ref(),
                    request.node_selector.as_ref(),
                )
                .await
        })
    }

    fn exec<'a>(
        &'a mut self,
        handle: &'a WorkloadHandle,
        command: &'a str,
        environment: Option<&'a EnvironmentMap>,
    ) -> ExecFuture<'a> {
        Box::pin(async move {
            self.manager
                .execute_command(handle.id(), command, environment)
                .await
        })
    }

    fn upload<'a>(
        &'a mut self,
        handle: &'a WorkloadHandle,
        local_path: &'a Utf8Path,
        dest_path: &'a str,
    ) -> TeardownFuture<'a> {
        Box::pin(async move { self.manager.copy_to(handle.id(), local_path, dest_path).await })
    }

    fn status<'a>(&'a self, handle: &'a WorkloadHandle) -> StatusFuture<'a> {
        Box::pin(async move { self.manager.status(handle.id()).await })
    }

    fn teardown<'a>(&'a mut self, handle: &'a WorkloadHandle) -> TeardownFuture<'a> {
        Box::pin(async move { self.manager.stop_container(handle.id()).await })
    }

    fn close(&mut self) -> CloseFuture<'_> {
        Box::pin(async {})
    }
}

/// Kubernetes adapter for the workload capability.
pub struct KubernetesBackend {
    manager: KubernetesManager,
}

impl KubernetesBackend {
    /// Wrap a connected Kubernetes manager.
    #[must_use]
    pub const fn new(manager: KubernetesManager) -> Self {
        Self { manager }
    }
}

impl WorkloadBackend for KubernetesBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Kubernetes
    }

    fn start(&mut self, request: StartRequest) -> StartFuture<'_> {
        Box::pin(async move {
            self.manager
                .start_pod(
                    &request.image,
                    &request.name,
                    request.environment.as_ref(),
                    request.node_selector.as_ref(),
                )
                .await
        })
    }

    fn exec<'a>(
        &'a mut self,
        handle: &'a WorkloadHandle,
        command: &'a str,
        environment: Option<&'a EnvironmentMap>,
    ) -> ExecFuture<'a> {
        Box::pin(async move {
            self.manager
                .execute_command(handle.id(), command, environment)
                .await
        })
    }

    fn upload<'a>(
        &'a mut self,
        handle: &'a WorkloadHandle,
        local_path: &'a Utf8Path,
        dest_path: &'a str,
    ) -> TeardownFuture<'a> {
        Box::pin(async move { self.manager.copy_to(handle.id(), local_path, dest_path).await })
    }

    fn status<'a>(&'a self, handle: &'a WorkloadHandle) -> StatusFuture<'a> {
        Box::pin(async move { self.manager.status(handle.id()).await })
    }

    fn teardown<'a>(&'a mut self, handle: &'a WorkloadHandle) -> TeardownFuture<'a> {
        Box::pin(async move { self.manager.delete_pod(handle.id()).await })
    }

    fn close(&mut self) -> CloseFuture<'_> {
        Box::pin(async move { self.manager.close().await })
    }
}
