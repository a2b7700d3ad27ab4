//! Backend-agnostic workload runner facade.
//!
//! `ContainerRunner` is the single entry point callers use: it selects a
//! backend at construction (immutably, for its whole lifetime), validates
//! inputs and handles before any backend I/O, drives one workload at a time,
//! and owns aggregate cleanup. Handle misuse - a handle from the other
//! backend, or one whose workload was already torn down - fails fast with a
//! semantic error and never reaches the network.

mod backend;


pub use backend::{
    CloseFuture, DockerBackend, ExecFuture, KubernetesBackend, StartFuture, StartRequest,
    StatusFuture, TeardownFuture, WorkloadBackend,
};

use camino::Utf8Path;
use mockable::DefaultEnv;
use tracing::{info, warn};

use crate::cluster::KubernetesManager;
use crate::command::unique_workload_name;
use crate::config::AppConfig;
use crate::engine::{DockerManager, SocketResolver};
use crate::error::{KodoError, RunnerError};
use crate::workload::{
    BackendKind, EnvironmentMap, ExecutionResult, NodeSelector, WorkloadHandle, WorkloadStatus,
};

/// Unified lifecycle for one workload on one backend.
pub struct ContainerRunner {
    backend: Box<dyn WorkloadBackend>,
    active: Option<WorkloadHandle>,
    torn_down: Vec<String>,
    closed: bool,
}

impl ContainerRunner {
    /// Build a runner over the local Docker engine.
    ///
    /// # Errors
    ///
    /// Returns a classified connection error when the engine is unreachable
    /// or fails its health check.
    pub async fn docker(config: &AppConfig) -> Result<Self, KodoError> {
        let env = DefaultEnv::new();
        let resolver = SocketResolver::new(&env);
        let manager = DockerManager::connect(
            config.engine_socket.as_deref(),
            &resolver,
            &config.docker,
            &config.timeouts,
        )
        .await?;
        Ok(Self::with_backend(Box::new(DockerBackend::new(manager))))
    }

    /// Build a runner over a Kubernetes cluster.
    ///
    /// # Errors
    ///
    /// Returns proxy startup errors and cluster connection errors.
    pub async fn kubernetes(config: &AppConfig) -> Result<Self, KodoError> {
        let manager =
            KubernetesManager::connect(&config.kubernetes, &config.proxy, &config.timeouts).await?;
        Ok(Self::with_backend(Box::new(KubernetesBackend::new(manager))))
    }

    /// Build a runner over an explicit backend implementation.
    #[must_use]
    pub fn with_backend(backend: Box<dyn WorkloadBackend>) -> Self {
        Self {
            backend,
            active: None,
            torn_down: Vec::new(),
            closed: false,
        }
    }

    /// Return the backend this runner was constructed for.
    #[must_use]
    pub fn backend_kind(&self) -> BackendKind {
        self.backend.kind()
    }

    /// Return the handle of the active workload, if any.
    #[must_use]
    pub const fn active_handle(&self) -> Option<&WorkloadHandle> {
        self.active.as_ref()
    }

    /// Launch a workload and return its handle.
    ///
    /// A name is generated from the image when none is supplied. The runner
    /// manages one workload at a time; launching while another is active
    /// fails without contacting the backend.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` for malformed input,
    /// `RunnerError::AlreadyRunning` when a workload is active, and backend
    /// creation or readiness errors.
    pub async fn start_container(
        &mut self,
        image: &str,
        name: Option<String>,
        environment: Option<EnvironmentMap>,
        node_selector: Option<NodeSelector>,
    ) -> Result<WorkloadHandle, KodoError> {
        if let Some(active) = self.active.as_ref() {
            return Err(KodoError::from(RunnerError::AlreadyRunning {
                id: String::from(active.id()),
            }));
        }

        let workload_name = name
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| unique_workload_name(image));

        let request = StartRequest {
            image: String::from(image),
            name: workload_name,
            environment,
            node_selector,
        };

        let handle = self.backend.start(request).await?;
        self.active = Some(handle.clone());
        Ok(handle)
    }

    /// Execute a shell command in the workload behind `handle`.
    ///
    /// Blocks until output is fully captured. The handle is validated before
    /// any backend I/O.
    ///
    /// # Errors
    ///
    /// Returns `RunnerError` variants for mismatched, torn-down, or unknown
    /// handles, and backend exec errors otherwise.
    pub async fn execute_command(
        &mut self,
        handle: &WorkloadHandle,
        command: &str,
        environment: Option<&EnvironmentMap>,
    ) -> Result<ExecutionResult, KodoError> {
        self.validate_handle(handle)?;
        self.backend.exec(handle, command, environment).await
    }

    /// Copy a host file into the workload behind `handle`.
    ///
    /// # Errors
    ///
    /// Returns `RunnerError` variants for invalid handles and backend upload
    /// errors otherwise.
    pub async fn copy_to(
        &mut self,
        handle: &WorkloadHandle,
        local_path: &Utf8Path,
        dest_path: &str,
    ) -> Result<(), KodoError> {
        self.validate_handle(handle)?;
        self.backend.upload(handle, local_path, dest_path).await
    }

    /// Query the normalised status of the workload behind `handle`.
    ///
    /// # Errors
    ///
    /// Returns `RunnerError` variants for invalid handles and backend status
    /// errors otherwise.
    pub async fn status(&self, handle: &WorkloadHandle) -> Result<WorkloadStatus, KodoError> {
        self.validate_handle(handle)?;
        self.backend.status(handle).await
    }

    /// Tear down the workload behind `handle`.
    ///
    /// # Errors
    ///
    /// Returns `RunnerError` variants for invalid handles and backend
    /// teardown errors otherwise.
    pub async fn stop_container(&mut self, handle: &WorkloadHandle) -> Result<(), KodoError> {
        self.validate_handle(handle)?;
        self.backend.teardown(handle).await?;
        self.torn_down.push(String::from(handle.id()));
        self.active = None;
        Ok(())
    }

    /// Tear down the active workload and release backend resources.
    ///
    /// Idempotent and infallible: teardown failures are logged, never
    /// raised, so this is safe to call from failure-handling paths after a
    /// partially-completed start. Calling it twice, or with nothing started,
    /// is a no-op.
    pub async fn cleanup(&mut self) {
        if let Some(handle) = self.active.take() {
            info!(id = handle.id(), "cleaning up workload");
            if let Err(error) = self.backend.teardown(&handle).await {
                warn!(
                    id = handle.id(),
                    error = %error,
                    "best-effort workload teardown failed"
                );
            }
            self.torn_down.push(String::from(handle.id()));
        }

        if !self.closed {
            self.backend.close().await;
            self.closed = true;
        }
    }

    /// Check a handle belongs to this runner's backend and live workload.
    fn validate_handle(&self, handle: &WorkloadHandle) -> Result<(), KodoError> {
        let runner_backend = self.backend.kind();
        if handle.backend() != runner_backend {
            return Err(KodoError::from(RunnerError::BackendMismatch {
                handle_backend: handle.backend(),
                runner_backend,
            }));
        }

        if self.torn_down.iter().any(|id| id == handle.id()) {
            return Err(KodoError::from(RunnerError::WorkloadTornDown {
                id: String::from(handle.id()),
            }));
        }

        let owns = self
            .active
            .as_ref()
            .is_some_and(|active| active.id() == handle.id());
        if !owns {
            return Err(KodoError::from(RunnerError::UnknownWorkload {
                id: String::from(handle.id()),
            }));
        }

        Ok(())
    }
}
