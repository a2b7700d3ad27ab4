//! Configuration system for kodo.
//!
//! This module provides the configuration structures and CLI definitions for
//! the kodo application. Configuration loading and precedence merging is
//! handled by the `ortho_config` crate. Intended precedence: CLI flags
//! override environment variables, which override configuration files, which
//! override defaults.
//!
//! The configuration file is expected at `~/.config/kodo/config.toml` by
//! default.
//!
//! # Example Configuration
//!
//! ```toml
//! engine_socket = "unix:///var/run/docker.sock"
//! image = "ubuntu:24.04"
//!
//! [kubernetes]
//! namespace = "default"
//! kubeconfig = "/home/user/.kube/config"
//!
//! [docker]
//! auto_remove = true
//!
//! [proxy]
//! enabled = false
//! command = "kubectl"
//! port = 8001
//!
//! [timeouts]
//! exec_secs = 300
//! pod_ready_secs = 1200
//! ```

mod cli;
mod loader;
mod types;


pub use cli::{Cli, Commands, DockerArgs, KubernetesArgs};
pub use loader::{env_var_names, load_config};
pub use types::{AppConfig, DockerConfig, KubernetesConfig, ProxyConfig, TimeoutsConfig};
