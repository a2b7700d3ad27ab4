//! Configuration data types for kodo.

use camino::Utf8PathBuf;
use ortho_config::{OrthoConfig, OrthoResult, PostMergeContext, PostMergeHook};
use serde::{Deserialize, Serialize};

/// Kubernetes backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct KubernetesConfig {
    /// Namespace pods are created in.
    pub namespace: String,

    /// Path to the kubeconfig file; the in-cluster environment is used when
    /// absent.
    pub kubeconfig: Option<Utf8PathBuf>,

    /// Block pod deletion until the cluster reports the pod gone.
    pub wait_for_deletion: bool,

    /// Default CPU request applied to created pods.
    pub cpu_request: String,

    /// Default memory request applied to created pods.
    pub memory_request: String,
}

impl Default for KubernetesConfig {
    fn default() -> Self {
        Self {
            namespace: String::from("default"),
            kubeconfig: None,
            wait_for_deletion: false,
            cpu_request: String::from("1"),
            memory_request: String::from("1Gi"),
        }
    }
}

/// Docker backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DockerConfig {
    /// Remove the container when it is stopped.
    pub auto_remove: bool,
}

impl Default for DockerConfig {
    fn default() -> Self {
        Self { auto_remove: true }
    }
}

/// Local API proxy configuration.
///
/// When enabled, the Kubernetes manager routes API traffic through a locally
/// spawned tunnel process instead of contacting the cluster endpoint
/// directly.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// Route cluster API calls through a locally spawned proxy process.
    pub enabled: bool,

    /// Executable spawned to provide the tunnel.
    pub command: String,

    /// Local port the tunnel listens on.
    pub port: u16,

    /// Path probed on the local port to confirm the tunnel is healthy.
    pub health_path: String,

    /// Interval between health probe attempts, in milliseconds.
    pub health_interval_ms: u64,

    /// Maximum number of health probe attempts before giving up.
    pub health_attempts: u32,

    /// Grace period allowed for the process to exit on stop, in seconds.
    pub stop_grace_secs: u64,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            command: String::from("kubectl"),
            port: 8001,
            health_path: String::from("/version"),
            health_interval_ms: 500,
            health_attempts: 20,
            stop_grace_secs: 5,
        }
    }
}

/// Timeouts applied to blocking backend operations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutsConfig {
    /// Timeout for a single command execution, in seconds.
    pub exec_secs: u64,

    /// Timeout for a created pod to reach the `Running` phase, in seconds.
    pub pod_ready_secs: u64,

    /// Bounded attempts for pod creation when the cluster reports a
    /// retryable failure.
    pub create_attempts: u32,
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        Self {
            exec_secs: 300,
            pod_ready_secs: 1200,
            create_attempts: 5,
        }
    }
}

/// Root application configuration.
///
/// This structure is loaded from configuration files, environment variables,
/// and command-line arguments with layered precedence. The precedence order
/// (lowest to highest) is: defaults, configuration file, environment
/// variables, command-line arguments.
///
/// Configuration files are discovered in this order:
/// 1. Path specified via `KODO_CONFIG_PATH` environment variable
/// 2. `.kodo.toml` in the current working directory
/// 3. `.kodo.toml` in the home directory
/// 4. `~/.config/kodo/config.toml` (XDG default)
#[derive(Debug, Clone, Default, Deserialize, Serialize, OrthoConfig)]
#[ortho_config(
    prefix = "KODO",
    post_merge_hook,
    discovery(
        app_name = "kodo",
        env_var = "KODO_CONFIG_PATH",
        config_file_name = "config.toml",
        dotfile_name = ".kodo.toml",
        config_cli_long = "config",
        config_cli_visible = true,
    )
)]
pub struct AppConfig {
    /// The container engine socket path or URL.
    pub engine_socket: Option<String>,

    /// The workload image to launch when none is supplied on the CLI.
    pub image: Option<String>,

    /// Kubernetes backend configuration.
    #[serde(default)]
    #[ortho_config(skip_cli)]
    pub kubernetes: KubernetesConfig,

    /// Docker backend configuration.
    #[serde(default)]
    #[ortho_config(skip_cli)]
    pub docker: DockerConfig,

    /// Local API proxy configuration.
    #[serde(default)]
    #[ortho_config(skip_cli)]
    pub proxy: ProxyConfig,

    /// Operation timeouts.
    #[serde(default)]
    #[ortho_config(skip_cli)]
    pub timeouts: TimeoutsConfig,
}

impl PostMergeHook for AppConfig {
    fn post_merge(&mut self, _ctx: &PostMergeContext) -> OrthoResult<()> {
        // Backend-specific validation happens at manager construction because
        // only one backend's settings are relevant per invocation (e.g. the
        // docker subcommand never reads kubeconfig).
        Ok(())
    }
}
