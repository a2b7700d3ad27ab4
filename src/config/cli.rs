//! Command-line argument definitions for kodo.

use camino::Utf8PathBuf;
use clap::{Parser, Subcommand};

/// Command-line interface for kodo.
#[derive(Debug, Parser)]
#[command(name = "kodo")]
#[command(
    author,
    version,
    about = "Run a command in a Docker container or Kubernetes pod"
)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file.
    #[arg(long, global = true)]
    pub config: Option<Utf8PathBuf>,

    /// Container engine socket path or URL.
    #[arg(long, global = true)]
    pub engine_socket: Option<String>,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Launch a container on the local Docker engine.
    Docker(DockerArgs),

    /// Launch a pod on a Kubernetes cluster.
    Kubernetes(KubernetesArgs),
}

/// Arguments for the `docker` subcommand.
#[derive(Debug, Parser)]
pub struct DockerArgs {
    /// Image to launch.
    #[arg(long, required = true)]
    pub image: String,

    /// Container name; generated from the image when omitted.
    #[arg(long)]
    pub name: Option<String>,

    /// Command to execute inside the container.
    #[arg(long, default_value = "echo \"Hello from Docker!\"")]
    pub cmd: String,

    /// Environment variables as a JSON object, e.g. '{"KEY1":"value1"}'.
    #[arg(long)]
    pub env: Option<String>,
}

/// Arguments for the `kubernetes` subcommand.
#[derive(Debug, Parser)]
pub struct KubernetesArgs {
    /// Image to launch.
    #[arg(long, required = true)]
    pub image: String,

    /// Pod name; generated from the image when omitted.
    #[arg(long)]
    pub name: Option<String>,

    /// Namespace to create the pod in.
    #[arg(long)]
    pub namespace: Option<String>,

    /// Path to the kubeconfig file.
    #[arg(long)]
    pub kubeconfig: Option<Utf8PathBuf>,

    /// Command to execute inside the pod.
    #[arg(long, default_value = "echo \"Hello from Kubernetes!\"")]
    pub cmd: String,

    /// Environment variables as a JSON object, e.g. '{"KEY1":"value1"}'.
    #[arg(long)]
    pub env: Option<String>,

    /// Node selector as a JSON object, e.g. '{"kubernetes.io/os":"linux"}'.
    #[arg(long)]
    pub node_selector: Option<String>,
}
