//! Kubernetes cluster backend.
//!
//! This module provides the interface for driving the pod lifecycle on a
//! Kubernetes cluster: submit a pod spec, wait for the `Running` phase with
//! bounded backoff, execute commands through the exec subresource with
//! captured output, and delete. Cluster access goes either directly to the
//! API server (kubeconfig or in-cluster environment) or through a locally
//! spawned proxy managed by [`crate::proxy::ProxyManager`].

mod api;
mod manager;
mod pod_spec;

pub use api::{
    ClusterClient, ClusterConnector, DeletePodFuture, ExecPodFuture, PodApi, PodExecOutcome,
    PodFuture, UploadPodFuture,
};
pub use manager::KubernetesManager;
pub use pod_spec::CreatePodRequest;
