//! Semantic error types for the kodo library.
//!
//! This module defines the error hierarchy for kodo, following the principle of
//! using semantic error enums (via `thiserror`) for conditions the caller might
//! inspect, retry, or map to an exit code, while reserving opaque errors
//! (`eyre::Report`) for the application boundary.
//!
//! The taxonomy separates failures by where they occur: input validation
//! (before any backend is contacted), the Docker engine transport, the
//! Kubernetes cluster transport, the local API proxy, and the backend-agnostic
//! runner facade.

use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

use crate::workload::BackendKind;

/// Errors raised by input validation before any backend call is made.
///
/// A validation failure guarantees no remote side effect occurred.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// The image reference was empty or whitespace-only.
    #[error("image reference must not be empty")]
    MissingImage,

    /// An environment variable name was empty.
    #[error("environment variable names must not be empty")]
    EmptyEnvironmentKey,

    /// An environment variable name contained a forbidden character.
    #[error("environment variable name '{name}' must not contain '='")]
    InvalidEnvironmentKey {
        /// The offending variable name.
        name: String,
    },

    /// The same environment variable name was supplied more than once.
    #[error("duplicate environment variable '{name}'")]
    DuplicateEnvironmentKey {
        /// The duplicated variable name.
        name: String,
    },

    /// A node-selector key would override a cluster-managed scheduling label.
    #[error("node selector key '{key}' is reserved for cluster-managed labels")]
    ReservedSelectorLabel {
        /// The rejected label key.
        key: String,
    },

    /// A node selector was supplied to a backend that cannot honour it.
    #[error("node selectors are not supported by the {backend} backend")]
    SelectorUnsupported {
        /// The backend that rejected the selector.
        backend: BackendKind,
    },
}

/// Errors that can occur during configuration loading and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file was not found at the expected path.
    #[error("configuration file not found: {path}")]
    FileNotFound {
        /// The path where the configuration file was expected.
        path: PathBuf,
    },

    /// The configuration file could not be parsed.
    #[error("failed to parse configuration file: {message}")]
    ParseError {
        /// A description of the parse error.
        message: String,
    },

    /// A required configuration value is missing.
    #[error("missing required configuration: {field}")]
    MissingRequired {
        /// The name of the missing field.
        field: String,
    },

    /// A configuration value failed validation.
    #[error("invalid configuration value for '{field}': {reason}")]
    InvalidValue {
        /// The name of the invalid field.
        field: String,
        /// The reason the value is invalid.
        reason: String,
    },

    /// The `OrthoConfig` library returned an error during configuration loading.
    ///
    /// This wraps errors from the layered configuration system, including:
    /// - Configuration file parsing errors
    /// - Environment variable parsing errors
    /// - CLI argument parsing errors
    /// - Missing required fields after layer merging
    #[error("configuration loading failed: {0}")]
    OrthoConfig(Arc<ortho_config::OrthoError>),
}

/// Errors that can occur during Docker engine operations.
#[derive(Debug, Error)]
pub enum ContainerError {
    /// Failed to connect to the container engine socket.
    #[error("failed to connect to container engine: {message}")]
    ConnectionFailed {
        /// A description of the connection failure.
        message: String,
    },

    /// The container engine socket was not found.
    #[error("container engine socket not found: {path}")]
    SocketNotFound {
        /// The path where the socket was expected.
        path: PathBuf,
    },

    /// Permission denied when accessing the container engine socket.
    #[error("permission denied accessing container socket: {path}")]
    PermissionDenied {
        /// The path to the socket.
        path: PathBuf,
    },

    /// Failed to create a container.
    #[error("failed to create container: {message}")]
    CreateFailed {
        /// A description of the creation failure.
        message: String,
    },

    /// Failed to start a created container.
    #[error("failed to start container '{container_id}': {message}")]
    StartFailed {
        /// The ID of the container that failed to start.
        container_id: String,
        /// A description of the start failure.
        message: String,
    },

    /// The container exists but is no longer running.
    #[error("container '{container_id}' is not running")]
    NotRunning {
        /// The ID of the exited container.
        container_id: String,
    },

    /// Failed to execute a command in a container.
    #[error("failed to execute command in container '{container_id}': {message}")]
    ExecFailed {
        /// The ID of the container.
        container_id: String,
        /// A description of the execution failure.
        message: String,
    },

    /// Failed to stop or remove a container.
    #[error("failed to stop container '{container_id}': {message}")]
    StopFailed {
        /// The ID of the container.
        container_id: String,
        /// A description of the stop failure.
        message: String,
    },

    /// Failed to upload files to a container.
    #[error("failed to upload files to container '{container_id}': {message}")]
    UploadFailed {
        /// The ID of the target container.
        container_id: String,
        /// A description of the upload failure.
        message: String,
    },

    /// Health check failed - engine did not respond correctly.
    #[error("container engine health check failed: {message}")]
    HealthCheckFailed {
        /// A description of the health check failure.
        message: String,
    },

    /// Health check timed out.
    #[error("container engine health check timed out after {seconds} seconds")]
    HealthCheckTimeout {
        /// The timeout duration in seconds.
        seconds: u64,
    },
}

/// Errors that can occur during Kubernetes cluster operations.
#[derive(Debug, Error)]
pub enum ClusterError {
    /// The kubeconfig file could not be loaded or parsed.
    #[error("failed to load kubeconfig from '{path}': {message}")]
    KubeconfigLoadFailed {
        /// The path to the kubeconfig file.
        path: String,
        /// A description of the load failure.
        message: String,
    },

    /// The cluster API server could not be reached.
    #[error("failed to reach cluster API server: {message}")]
    ConnectionFailed {
        /// A description of the connectivity failure.
        message: String,
    },

    /// The API server rejected the pod creation request.
    #[error("cluster rejected creation of pod '{pod_name}': {message}")]
    CreateRejected {
        /// The name of the pod that could not be created.
        pod_name: String,
        /// A description of the rejection.
        message: String,
    },

    /// The pod did not reach the `Running` phase within the configured timeout.
    #[error(
        "pod '{pod_name}' did not become ready within {timeout_secs} seconds (last phase: {last_phase})"
    )]
    PodNotReady {
        /// The name of the pod that never became ready.
        pod_name: String,
        /// The configured readiness timeout in seconds.
        timeout_secs: u64,
        /// The last observed pod phase.
        last_phase: String,
    },

    /// The pod entered a terminal phase before becoming ready.
    #[error("pod '{pod_name}' entered terminal phase '{phase}'")]
    PodFailed {
        /// The name of the failed pod.
        pod_name: String,
        /// The terminal phase reported by the cluster.
        phase: String,
    },

    /// The named pod does not exist in the configured namespace.
    #[error("pod '{pod_name}' not found")]
    NotFound {
        /// The name of the missing pod.
        pod_name: String,
    },

    /// Failed to execute a command in a pod.
    #[error("failed to execute command in pod '{pod_name}': {message}")]
    ExecFailed {
        /// The name of the pod.
        pod_name: String,
        /// A description of the execution failure.
        message: String,
    },

    /// The exec session completed without reporting an exit code.
    #[error("exec in pod '{pod_name}' completed without an exit code")]
    MissingExitCode {
        /// The name of the pod.
        pod_name: String,
    },

    /// Failed to delete a pod.
    #[error("failed to delete pod '{pod_name}': {message}")]
    DeleteFailed {
        /// The name of the pod.
        pod_name: String,
        /// A description of the delete failure.
        message: String,
    },

    /// Failed to upload files to a pod.
    #[error("failed to upload files to pod '{pod_name}': {message}")]
    UploadFailed {
        /// The name of the target pod.
        pod_name: String,
        /// A description of the upload failure.
        message: String,
    },
}

/// Errors that can occur while managing the local API proxy process.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// The proxy process could not be spawned.
    #[error("failed to spawn proxy process '{command}': {message}")]
    SpawnFailed {
        /// The command that failed to spawn.
        command: String,
        /// A description of the spawn failure.
        message: String,
    },

    /// The proxy process exited before its health endpoint responded.
    #[error("proxy process exited during startup: {message}")]
    ExitedDuringStartup {
        /// A description of the premature exit.
        message: String,
    },

    /// The proxy health endpoint never responded within the bounded attempts.
    #[error("proxy health check failed after {attempts} attempts on port {port}")]
    StartTimeout {
        /// The number of health probe attempts made.
        attempts: u32,
        /// The local port being probed.
        port: u16,
    },

    /// The proxy process is no longer alive.
    #[error("proxy on port {port} is unavailable: {message}")]
    Unavailable {
        /// The local port the dead session was bound to.
        port: u16,
        /// A description of how the session was lost.
        message: String,
    },

    /// The proxy process could not be terminated cleanly.
    #[error("failed to stop proxy process: {message}")]
    StopFailed {
        /// A description of the stop failure.
        message: String,
    },
}

/// Errors raised by the backend-agnostic runner facade.
#[derive(Debug, Error)]
pub enum RunnerError {
    /// A handle from one backend was used with a runner for another.
    #[error("handle for backend '{handle_backend}' cannot be used with a '{runner_backend}' runner")]
    BackendMismatch {
        /// The backend the handle belongs to.
        handle_backend: BackendKind,
        /// The backend the runner was constructed for.
        runner_backend: BackendKind,
    },

    /// The handle refers to a workload that has been torn down.
    #[error("workload '{id}' not found: it was already torn down")]
    WorkloadTornDown {
        /// The native identifier of the torn-down workload.
        id: String,
    },

    /// The handle does not refer to the workload owned by this runner.
    #[error("workload '{id}' is not managed by this runner")]
    UnknownWorkload {
        /// The native identifier of the unknown workload.
        id: String,
    },

    /// A workload is already active on this runner.
    #[error("workload '{id}' is still active: one workload per runner")]
    AlreadyRunning {
        /// The native identifier of the active workload.
        id: String,
    },
}

/// Top-level error type for the kodo library.
///
/// This enum aggregates all domain-specific errors into a single type that can
/// be used throughout the library. At the application boundary (main.rs),
/// these errors are typically converted to `eyre::Report` for human-readable
/// error reporting.
#[derive(Debug, Error)]
pub enum KodoError {
    /// An input failed validation before reaching a backend.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// An error occurred during configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// An error occurred during Docker engine operations.
    #[error(transparent)]
    Container(#[from] ContainerError),

    /// An error occurred during Kubernetes cluster operations.
    #[error(transparent)]
    Cluster(#[from] ClusterError),

    /// An error occurred while managing the local API proxy.
    #[error(transparent)]
    Proxy(#[from] ProxyError),

    /// An error occurred in the runner facade.
    #[error(transparent)]
    Runner(#[from] RunnerError),
}

/// A specialised `Result` type for kodo operations.
pub type Result<T> = std::result::Result<T, KodoError>;
