//! Cluster API client and the trait seam over pod operations.
//!
//! `ClusterClient` wraps a namespaced `kube` pod API. The `PodApi` trait
//! mirrors the handful of operations the manager needs so lifecycle logic can
//! be unit-tested without a cluster; the streaming details of the exec
//! subresource stay inside the client and only the captured outcome crosses
//! the seam.

use std::future::Future;
use std::pin::Pin;

use k8s_openapi::api::core::v1::Pod;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Status;
use kube::api::{Api, AttachParams, AttachedProcess, DeleteParams, PostParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::config::KubernetesConfig;
use crate::error::{ClusterError, KodoError};

/// Boxed future type returned by pod read and create operations.
pub type PodFuture<'a> = Pin<Box<dyn Future<Output = Result<Pod, kube::Error>> + Send + 'a>>;

/// Boxed future type returned by [`PodApi::delete_pod`].
pub type DeletePodFuture<'a> = Pin<Box<dyn Future<Output = Result<(), kube::Error>> + Send + 'a>>;

/// Boxed future type returned by [`PodApi::exec_pod`].
pub type ExecPodFuture<'a> =
    Pin<Box<dyn Future<Output = Result<PodExecOutcome, kube::Error>> + Send + 'a>>;

/// Boxed future type returned by [`PodApi::upload_archive`].
pub type UploadPodFuture<'a> = Pin<Box<dyn Future<Output = Result<(), kube::Error>> + Send + 'a>>;

/// Captured result of an exec subresource session.
///
/// `status` is the raw termination status reported on the exec channel; exit
/// code extraction happens at the normalisation boundary.
#[derive(Debug, Clone, PartialEq)]
pub struct PodExecOutcome {
    /// Combined captured stdout and stderr.
    pub output: String,
    /// Termination status reported by the exec channel, when present.
    pub status: Option<Status>,
}

/// Behaviour required to drive pods in one namespace.
///
/// This abstraction keeps pod lifecycle logic testable without a cluster.
pub trait PodApi {
    /// Submit a pod for creation.
    fn create_pod(&self, pod: &Pod) -> PodFuture<'_>;

    /// Read a pod by name.
    fn get_pod(&self, name: &str) -> PodFuture<'_>;

    /// Delete a pod by name with immediate grace.
    fn delete_pod(&self, name: &str) -> DeletePodFuture<'_>;

    /// Run a command in a pod and capture its output and status.
    fn exec_pod(&self, name: &str, command: Vec<String>) -> ExecPodFuture<'_>;

    /// Extract a tar archive into a directory inside a pod.
    fn upload_archive(&self, name: &str, dest_dir: &str, archive: Vec<u8>) -> UploadPodFuture<'_>;
}

/// Namespaced pod client over a live cluster connection.
pub struct ClusterClient {
    pods: Api<Pod>,
}

impl ClusterClient {
    /// Connect to the cluster and bind the pod API to a namespace.
    ///
    /// Resolution order for the transport:
    /// 1. `proxied_url` - route through a local proxy port
    /// 2. `settings.kubeconfig` - an explicit kubeconfig file
    /// 3. Inferred configuration (in-cluster environment, then the default
    ///    kubeconfig location)
    ///
    /// # Errors
    ///
    /// Returns `ClusterError::KubeconfigLoadFailed` when an explicit
    /// kubeconfig cannot be loaded and `ClusterError::ConnectionFailed` when
    /// no usable configuration can be resolved or the client cannot be built.
    pub async fn connect(
        settings: &KubernetesConfig,
        proxied_url: Option<&str>,
    ) -> Result<Self, KodoError> {
        let config = Self::resolve_config(settings, proxied_url).await?;
        let client = Client::try_from(config).map_err(|error| {
            KodoError::from(ClusterError::ConnectionFailed {
                message: error.to_string(),
            })
        })?;

        let pods = Api::namespaced(client, &settings.namespace);
        Ok(Self { pods })
    }

    async fn resolve_config(
        settings: &KubernetesConfig,
        proxied_url: Option<&str>,
    ) -> Result<Config, KodoError> {
        if let Some(url) = proxied_url {
            debug!(url, "routing cluster API through local proxy");
            let cluster_url = url.parse::<http::Uri>().map_err(|error| {
                KodoError::from(ClusterError::ConnectionFailed {
                    message: format!("invalid proxy url '{url}': {error}"),
                })
            })?;
            return Ok(Config::new(cluster_url));
        }

        if let Some(path) = settings.kubeconfig.as_ref() {
            let kubeconfig = Kubeconfig::read_from(path.as_std_path()).map_err(|error| {
                KodoError::from(ClusterError::KubeconfigLoadFailed {
                    path: path.to_string(),
                    message: error.to_string(),
                })
            })?;
            return Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                .await
                .map_err(|error| {
                    KodoError::from(ClusterError::KubeconfigLoadFailed {
                        path: path.to_string(),
                        message: error.to_string(),
                    })
                });
        }

        Config::infer().await.map_err(|error| {
            KodoError::from(ClusterError::ConnectionFailed {
                message: format!("unable to infer cluster configuration: {error}"),
            })
        })
    }
}

impl PodApi for ClusterClient {
    fn create_pod(&self, pod: &Pod) -> PodFuture<'_> {
        let pod_owned = pod.clone();
        Box::pin(async move { self.pods.create(&PostParams::default(), &pod_owned).await })
    }

    fn get_pod(&self, name: &str) -> PodFuture<'_> {
        let name_owned = String::from(name);
        Box::pin(async move { self.pods.get(&name_owned).await })
    }

    fn delete_pod(&self, name: &str) -> DeletePodFuture<'_> {
        let name_owned = String::from(name);
        Box::pin(async move {
            self.pods
                .delete(&name_owned, &DeleteParams::default().grace_period(0))
                .await
                .map(|_| ())
        })
    }

    fn exec_pod(&self, name: &str, command: Vec<String>) -> ExecPodFuture<'_> {
        let name_owned = String::from(name);
        Box::pin(async move {
            let attach_params = AttachParams::default()
                .stdin(false)
                .stdout(true)
                .stderr(true);
            let attached = self.pods.exec(&name_owned, command, &attach_params).await?;
            capture_exec_session(attached).await
        })
    }

    fn upload_archive(&self, name: &str, dest_dir: &str, archive: Vec<u8>) -> UploadPodFuture<'_> {
        let name_owned = String::from(name);
        let extract_command = vec![
            String::from("tar"),
            String::from("xmf"),
            String::from("-"),
            String::from("-C"),
            String::from(dest_dir),
        ];
        Box::pin(async move {
            let attach_params = AttachParams::default()
                .stdin(true)
                .stdout(false)
                .stderr(true);
            let mut attached = self
                .pods
                .exec(&name_owned, extract_command, &attach_params)
                .await?;

            let mut stdin = attached
                .stdin()
                .ok_or_else(|| service_error("exec session did not open stdin"))?;
            stdin
                .write_all(&archive)
                .await
                .map_err(|error| service_error(format!("failed to stream archive: {error}")))?;
            stdin
                .shutdown()
                .await
                .map_err(|error| service_error(format!("failed to close archive stream: {error}")))?;
            drop(stdin);

            attached
                .join()
                .await
                .map_err(|error| service_error(format!("exec session failed: {error}")))
        })
    }
}

/// Drain an exec session's streams and collect its termination status.
async fn capture_exec_session(
    mut attached: AttachedProcess,
) -> Result<PodExecOutcome, kube::Error> {
    let stdout = attached.stdout();
    let stderr = attached.stderr();
    let status_future = attached.take_status();

    // Both streams are drained concurrently so neither can stall the other
    // by filling its channel.
    let (stdout_result, stderr_result) = tokio::join!(drain_stream(stdout), drain_stream(stderr));
    let stdout_bytes = stdout_result
        .map_err(|error| service_error(format!("failed reading stdout: {error}")))?;
    let stderr_bytes = stderr_result
        .map_err(|error| service_error(format!("failed reading stderr: {error}")))?;

    let mut status = None;
    if let Some(future) = status_future {
        status = future.await;
    }

    attached
        .join()
        .await
        .map_err(|error| service_error(format!("exec session failed: {error}")))?;

    let mut output = String::from_utf8_lossy(&stdout_bytes).into_owned();
    output.push_str(&String::from_utf8_lossy(&stderr_bytes));
    Ok(PodExecOutcome { output, status })
}

/// Read a stream to its end; a stream the session never opened drains to
/// empty.
async fn drain_stream<R>(reader: Option<R>) -> std::io::Result<Vec<u8>>
where
    R: tokio::io::AsyncRead + Unpin,
{
    use tokio::io::AsyncReadExt;

    let mut buffer = Vec::new();
    if let Some(mut stream) = reader {
        stream.read_to_end(&mut buffer).await?;
    }
    Ok(buffer)
}

fn service_error(message: impl Into<String>) -> kube::Error {
    kube::Error::Service(message.into().into())
}

/// Associated functions implementing the pod lifecycle over any [`PodApi`].
///
/// Mirrors the engine-side connector: the manager struct owns configuration
/// and a concrete client, while the logic lives here against the trait seam.
pub struct ClusterConnector;
