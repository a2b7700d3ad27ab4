//! Kubernetes pod lifecycle manager.
//!
//! `KubernetesManager` owns one namespaced cluster client, the immutable
//! configuration resolved at construction, and (when enabled) the proxy
//! session that carries its API traffic. The pod state machine is driven
//! through [`ClusterConnector`]: submit with bounded retry on retryable API
//! failures, poll for the `Running` phase with exponential backoff, exec
//! while running, delete on teardown. A pod that never becomes ready is
//! deleted best-effort before the error surfaces, so a readiness timeout
//! never leaks a pending pod.

use std::time::Duration;

use camino::Utf8Path;
use tokio::time::{Instant, sleep};
use tracing::{debug, info, warn};

use super::api::{ClusterConnector, PodApi};
use super::pod_spec::CreatePodRequest;
use crate::cluster::ClusterClient;
use crate::command::{
    build_single_file_archive, exit_code_from_exec_status, scrub_output, shell_command,
    split_destination,
};
use crate::config::{KubernetesConfig, ProxyConfig, TimeoutsConfig};
use crate::error::{ClusterError, KodoError};
use crate::proxy::ProxyManager;
use crate::workload::{EnvironmentMap, ExecutionResult, NodeSelector, WorkloadHandle, WorkloadStatus};

/// API status codes worth one more attempt: contention and transient server
/// failures.
const RETRYABLE_STATUS: &[u16] = &[429, 500, 503];

/// Initial backoff between pod-create attempts.
const CREATE_BACKOFF_SECS: u64 = 5;

/// Backoff cap between pod-create attempts.
const CREATE_BACKOFF_CAP_SECS: u64 = 60;

/// Initial interval between readiness polls.
const READY_POLL_SECS: u64 = 1;

/// Interval cap between readiness polls.
const READY_POLL_CAP_SECS: u64 = 10;

/// Pod phases that will never progress to `Running`.
const TERMINAL_PHASES: &[&str] = &["Failed", "Succeeded", "Unknown"];

impl ClusterConnector {
    /// Submit a pod, retrying bounded times on retryable API failures.
    ///
    /// # Errors
    ///
    /// Returns `ClusterError::CreateRejected` when the cluster refuses the
    /// pod and `ClusterError::ConnectionFailed` when the API server is
    /// unreachable.
    pub async fn create_pod_with_retry<A: PodApi>(
        api: &A,
        request: &CreatePodRequest,
        attempts: u32,
    ) -> Result<(), KodoError> {
        let pod = request.build_pod();
        let mut backoff = Duration::from_secs(CREATE_BACKOFF_SECS);
        let last_attempt = attempts.max(1);

        for attempt in 1..=last_attempt {
            match api.create_pod(&pod).await {
                Ok(_) => return Ok(()),
                Err(error) if attempt < last_attempt && is_retryable(&error) => {
                    warn!(
                        pod_name = request.name(),
                        attempt,
                        error = %error,
                        "pod creation failed, retrying"
                    );
                    sleep(backoff).await;
                    backoff = (backoff * 2).min(Duration::from_secs(CREATE_BACKOFF_CAP_SECS));
                }
                Err(error) => return Err(classify_create_error(&error, request.name())),
            }
        }

        Err(KodoError::from(ClusterError::CreateRejected {
            pod_name: String::from(request.name()),
            message: format!("exceeded retry limit ({last_attempt})"),
        }))
    }

    /// Poll a pod until it reaches `Running`, with exponential backoff.
    ///
    /// # Errors
    ///
    /// Returns `ClusterError::PodFailed` when the pod enters a terminal
    /// phase, `ClusterError::PodNotReady` when the timeout elapses, and
    /// `ClusterError::NotFound` when the pod disappears mid-wait.
    pub async fn wait_for_running<A: PodApi>(
        api: &A,
        pod_name: &str,
        timeout: Duration,
    ) -> Result<(), KodoError> {
        let deadline = Instant::now() + timeout;
        let mut interval = Duration::from_secs(READY_POLL_SECS);
        let mut last_phase = String::from("Pending");

        loop {
            let phase = Self::pod_phase(api, pod_name).await?;
            if phase == "Running" {
                return Ok(());
            }
            if TERMINAL_PHASES.contains(&phase.as_str()) {
                return Err(KodoError::from(ClusterError::PodFailed {
                    pod_name: String::from(pod_name),
                    phase,
                }));
            }
            last_phase = phase;

            if Instant::now() + interval > deadline {
                return Err(KodoError::from(ClusterError::PodNotReady {
                    pod_name: String::from(pod_name),
                    timeout_secs: timeout.as_secs(),
                    last_phase,
                }));
            }
            sleep(interval).await;
            interval = (interval * 2).min(Duration::from_secs(READY_POLL_CAP_SECS));
        }
    }

    /// Read a pod's phase string.
    ///
    /// # Errors
    ///
    /// Returns `ClusterError::NotFound` for a missing pod and
    /// `ClusterError::ConnectionFailed` for transport failures.
    pub async fn pod_phase<A: PodApi>(api: &A, pod_name: &str) -> Result<String, KodoError> {
        let pod = api
            .get_pod(pod_name)
            .await
            .map_err(|error| classify_read_error(&error, pod_name))?;
        Ok(pod
            .status
            .and_then(|status| status.phase)
            .unwrap_or_else(|| String::from("Unknown")))
    }

    /// Query the normalised status of a pod.
    ///
    /// # Errors
    ///
    /// Returns the same errors as [`Self::pod_phase`].
    pub async fn pod_status<A: PodApi>(
        api: &A,
        pod_name: &str,
    ) -> Result<WorkloadStatus, KodoError> {
        let phase = Self::pod_phase(api, pod_name).await?;
        Ok(match phase.as_str() {
            "Pending" => WorkloadStatus::Pending,
            "Running" => WorkloadStatus::Running,
            "Succeeded" => WorkloadStatus::Stopped,
            "Failed" => WorkloadStatus::Failed,
            _ => WorkloadStatus::Unknown,
        })
    }

    /// Execute a shell command in a running pod, capturing its output.
    ///
    /// # Errors
    ///
    /// Returns `ClusterError::ExecFailed` for transport failures or timeout
    /// and `ClusterError::MissingExitCode` when the exec channel reports no
    /// usable termination status.
    pub async fn exec_captured<A: PodApi>(
        api: &A,
        pod_name: &str,
        command: &str,
        env: Option<&EnvironmentMap>,
        timeout: Duration,
    ) -> Result<ExecutionResult, KodoError> {
        let argv = shell_command(command, env);
        let outcome = tokio::time::timeout(timeout, api.exec_pod(pod_name, argv))
            .await
            .map_err(|_| {
                KodoError::from(ClusterError::ExecFailed {
                    pod_name: String::from(pod_name),
                    message: format!("command timed out after {} seconds", timeout.as_secs()),
                })
            })?
            .map_err(|error| classify_exec_error(&error, pod_name))?;

        let exit_code = exit_code_from_exec_status(outcome.status.as_ref()).ok_or_else(|| {
            KodoError::from(ClusterError::MissingExitCode {
                pod_name: String::from(pod_name),
            })
        })?;

        Ok(ExecutionResult::new(scrub_output(&outcome.output), exit_code))
    }

    /// Delete a pod, optionally blocking until the cluster reports it gone.
    ///
    /// Idempotent: a pod that is already gone counts as success.
    ///
    /// # Errors
    ///
    /// Returns `ClusterError::DeleteFailed` for failures other than the
    /// tolerated not-found condition.
    pub async fn delete_pod<A: PodApi>(
        api: &A,
        pod_name: &str,
        wait_for_deletion: bool,
        wait_timeout: Duration,
    ) -> Result<(), KodoError> {
        match api.delete_pod(pod_name).await {
            Ok(()) => {}
            Err(error) if api_status(&error) == Some(404) => {
                debug!(pod_name, "pod already deleted");
                return Ok(());
            }
            Err(error) => {
                return Err(KodoError::from(ClusterError::DeleteFailed {
                    pod_name: String::from(pod_name),
                    message: error.to_string(),
                }));
            }
        }

        if !wait_for_deletion {
            return Ok(());
        }

        let deadline = Instant::now() + wait_timeout;
        let interval = Duration::from_secs(READY_POLL_SECS);
        loop {
            match api.get_pod(pod_name).await {
                Err(error) if api_status(&error) == Some(404) => return Ok(()),
                Err(error) => {
                    return Err(KodoError::from(ClusterError::DeleteFailed {
                        pod_name: String::from(pod_name),
                        message: error.to_string(),
                    }));
                }
                Ok(_) if Instant::now() + interval > deadline => {
                    return Err(KodoError::from(ClusterError::DeleteFailed {
                        pod_name: String::from(pod_name),
                        message: format!(
                            "pod still terminating after {} seconds",
                            wait_timeout.as_secs()
                        ),
                    }));
                }
                Ok(_) => sleep(interval).await,
            }
        }
    }

    /// Submit a pod and wait for it to reach `Running`.
    ///
    /// A pod that times out waiting for readiness or lands in a terminal
    /// phase is deleted best-effort before the error is returned, so a
    /// readiness failure never leaks a pending pod.
    ///
    /// # Errors
    ///
    /// Returns creation errors from [`Self::create_pod_with_retry`] and
    /// readiness errors from [`Self::wait_for_running`].
    pub async fn start_pod_until_running<A: PodApi>(
        api: &A,
        request: &CreatePodRequest,
        create_attempts: u32,
        ready_timeout: Duration,
    ) -> Result<(), KodoError> {
        Self::create_pod_with_retry(api, request, create_attempts).await?;

        if let Err(ready_error) = Self::wait_for_running(api, request.name(), ready_timeout).await
        {
            if let Err(delete_error) =
                Self::delete_pod(api, request.name(), false, Duration::ZERO).await
            {
                warn!(
                    pod_name = request.name(),
                    error = %delete_error,
                    "failed to delete pod after readiness failure"
                );
            }
            return Err(ready_error);
        }

        Ok(())
    }

    /// Copy a host file into a running pod via a streamed tar extraction.
    ///
    /// # Errors
    ///
    /// Returns `ClusterError::UploadFailed` when the host file cannot be read
    /// or the stream fails.
    pub async fn upload_file<A: PodApi>(
        api: &A,
        pod_name: &str,
        local_path: &Utf8Path,
        dest_path: &str,
    ) -> Result<(), KodoError> {
        let (dest_dir, entry_name) = split_destination(dest_path);
        let archive = build_single_file_archive(local_path, &entry_name).map_err(|error| {
            KodoError::from(ClusterError::UploadFailed {
                pod_name: String::from(pod_name),
                message: format!("failed to read {local_path}: {error}"),
            })
        })?;

        api.upload_archive(pod_name, &dest_dir, archive)
            .await
            .map_err(|error| {
                KodoError::from(ClusterError::UploadFailed {
                    pod_name: String::from(pod_name),
                    message: error.to_string(),
                })
            })
    }
}

fn api_status(error: &kube::Error) -> Option<u16> {
    match error {
        kube::Error::Api(response) => Some(response.code),
        _ => None,
    }
}

fn is_retryable(error: &kube::Error) -> bool {
    api_status(error).is_some_and(|code| RETRYABLE_STATUS.contains(&code))
}

fn classify_create_error(error: &kube::Error, pod_name: &str) -> KodoError {
    api_status(error).map_or_else(
        || {
            KodoError::from(ClusterError::ConnectionFailed {
                message: error.to_string(),
            })
        },
        |_| {
            KodoError::from(ClusterError::CreateRejected {
                pod_name: String::from(pod_name),
                message: error.to_string(),
            })
        },
    )
}

fn classify_read_error(error: &kube::Error, pod_name: &str) -> KodoError {
    if api_status(error) == Some(404) {
        return KodoError::from(ClusterError::NotFound {
            pod_name: String::from(pod_name),
        });
    }
    KodoError::from(ClusterError::ConnectionFailed {
        message: error.to_string(),
    })
}

fn classify_exec_error(error: &kube::Error, pod_name: &str) -> KodoError {
    if api_status(error) == Some(404) {
        return KodoError::from(ClusterError::NotFound {
            pod_name: String::from(pod_name),
        });
    }
    KodoError::from(ClusterError::ExecFailed {
        pod_name: String::from(pod_name),
        message: error.to_string(),
    })
}

/// Manager for pods on a Kubernetes cluster.
pub struct KubernetesManager {
    api: ClusterClient,
    proxy: Option<ProxyManager<crate::proxy::SystemTunnelSpawner, crate::proxy::HttpHealthProbe>>,
    settings: KubernetesConfig,
    timeouts: TimeoutsConfig,
}

impl KubernetesManager {
    /// Connect to the cluster and build a manager.
    ///
    /// When the proxy is enabled, the tunnel is started first and the client
    /// is routed through its local port; a connection failure stops the
    /// half-started tunnel before the error surfaces.
    ///
    /// # Errors
    ///
    /// Returns proxy startup errors, `ClusterError::KubeconfigLoadFailed`,
    /// and `ClusterError::ConnectionFailed`.
    pub async fn connect(
        settings: &KubernetesConfig,
        proxy_config: &ProxyConfig,
        timeouts: &TimeoutsConfig,
    ) -> Result<Self, KodoError> {
        let mut proxy = None;
        let mut proxied_url = None;
        if proxy_config.enabled {
            let mut proxy_manager = ProxyManager::new(proxy_config.clone());
            let session = proxy_manager.start().await?;
            proxied_url = Some(session.local_url());
            proxy = Some(proxy_manager);
        }

        let api = match ClusterClient::connect(settings, proxied_url.as_deref()).await {
            Ok(api) => api,
            Err(error) => {
                if let Some(mut proxy_manager) = proxy {
                    proxy_manager.stop().await;
                }
                return Err(error);
            }
        };

        Ok(Self {
            api,
            proxy,
            settings: settings.clone(),
            timeouts: timeouts.clone(),
        })
    }

    /// Create a pod and wait for it to reach `Running`.
    ///
    /// The default workload `PATH` is injected beneath caller-supplied
    /// environment. A pod that times out waiting for readiness or lands in a
    /// terminal phase is deleted best-effort before the error is returned.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` for malformed input,
    /// `ClusterError::CreateRejected` / `ConnectionFailed` when submission
    /// fails, and `ClusterError::PodNotReady` / `PodFailed` when the pod
    /// never becomes usable.
    pub async fn start_pod(
        &mut self,
        image: &str,
        name: &str,
        environment: Option<&EnvironmentMap>,
        node_selector: Option<&NodeSelector>,
    ) -> Result<WorkloadHandle, KodoError> {
        self.ensure_proxy()?;

        let env = EnvironmentMap::with_defaults(environment)?;
        let mut request = CreatePodRequest::new(name, image)?
            .with_env(env)
            .with_resource_requests(
                self.settings.cpu_request.clone(),
                self.settings.memory_request.clone(),
            );
        if let Some(selector) = node_selector {
            request = request.with_node_selector(selector.clone());
        }

        ClusterConnector::start_pod_until_running(
            &self.api,
            &request,
            self.timeouts.create_attempts,
            Duration::from_secs(self.timeouts.pod_ready_secs),
        )
        .await?;

        info!(pod_name = name, image, namespace = %self.settings.namespace, "pod running");
        Ok(WorkloadHandle::kubernetes(name, self.settings.namespace.clone()))
    }

    /// Execute a shell command in a running pod and capture its output.
    ///
    /// When API traffic is proxied, the proxy's liveness is checked first so
    /// a dead tunnel surfaces as a proxy error rather than an opaque
    /// transport failure.
    ///
    /// # Errors
    ///
    /// Returns `ProxyError::Unavailable` when the tunnel died,
    /// `ClusterError::PodFailed` when the pod is not running, and exec
    /// errors from the session itself.
    pub async fn execute_command(
        &mut self,
        pod_name: &str,
        command: &str,
        environment: Option<&EnvironmentMap>,
    ) -> Result<ExecutionResult, KodoError> {
        self.ensure_proxy()?;

        let phase = ClusterConnector::pod_phase(&self.api, pod_name).await?;
        if phase != "Running" {
            return Err(KodoError::from(ClusterError::PodFailed {
                pod_name: String::from(pod_name),
                phase,
            }));
        }

        debug!(pod_name, command, "executing command in pod");
        ClusterConnector::exec_captured(
            &self.api,
            pod_name,
            command,
            environment,
            Duration::from_secs(self.timeouts.exec_secs),
        )
        .await
    }

    /// Copy a host file into a running pod.
    ///
    /// # Errors
    ///
    /// Returns `ProxyError::Unavailable` when the tunnel died and
    /// `ClusterError::UploadFailed` when the transfer fails.
    pub async fn copy_to(
        &mut self,
        pod_name: &str,
        local_path: &Utf8Path,
        dest_path: &str,
    ) -> Result<(), KodoError> {
        self.ensure_proxy()?;
        ClusterConnector::upload_file(&self.api, pod_name, local_path, dest_path).await
    }

    /// Query the normalised status of a pod.
    ///
    /// # Errors
    ///
    /// Returns `ClusterError::NotFound` for a missing pod and
    /// `ClusterError::ConnectionFailed` for transport failures.
    pub async fn status(&self, pod_name: &str) -> Result<WorkloadStatus, KodoError> {
        ClusterConnector::pod_status(&self.api, pod_name).await
    }

    /// Delete a pod.
    ///
    /// Does not wait for full termination unless configured to. Idempotent:
    /// an already-deleted pod counts as success.
    ///
    /// # Errors
    ///
    /// Returns `ClusterError::DeleteFailed` for failures other than the
    /// tolerated not-found condition.
    pub async fn delete_pod(&self, pod_name: &str) -> Result<(), KodoError> {
        info!(pod_name, namespace = %self.settings.namespace, "deleting pod");
        ClusterConnector::delete_pod(
            &self.api,
            pod_name,
            self.settings.wait_for_deletion,
            Duration::from_secs(self.timeouts.pod_ready_secs),
        )
        .await
    }

    /// Release the proxy session, if one is owned.
    pub async fn close(&mut self) {
        if let Some(proxy) = self.proxy.as_mut() {
            proxy.stop().await;
        }
    }

    fn ensure_proxy(&mut self) -> Result<(), KodoError> {
        self.proxy
            .as_mut()
            .map_or(Ok(()), |proxy| proxy.ensure_healthy())
    }
}
