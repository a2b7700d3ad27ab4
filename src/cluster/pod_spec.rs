//! Pod specification construction.
//!
//! Translates a validated launch request into a `Pod` object: a single
//! container kept alive for exec sessions, caller environment over the
//! default workload `PATH`, default resource requests, and an optional node
//! selector. Reserved selector keys are rejected before the request ever
//! reaches this builder.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{Container, EnvVar, Pod, PodSpec, ResourceRequirements};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use kube::api::ObjectMeta;

use crate::error::{KodoError, ValidationError};
use crate::workload::{EnvironmentMap, NodeSelector};

/// Keep-alive command run as the pod's container process.
const KEEP_ALIVE_ARGS: &str = "sleep infinity";

/// Pods are one-shot workloads; a crashed container is a failure, not
/// something to restart.
const RESTART_POLICY: &str = "Never";

/// Pod-creation request parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatePodRequest {
    name: String,
    image: String,
    env: EnvironmentMap,
    node_selector: NodeSelector,
    cpu_request: String,
    memory_request: String,
}

impl CreatePodRequest {
    /// Create a request for an image under a pod name.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::MissingImage` when `image` is empty or
    /// whitespace-only.
    pub fn new(name: impl Into<String>, image: impl Into<String>) -> Result<Self, KodoError> {
        let image_value = image.into();
        let trimmed = image_value.trim();
        if trimmed.is_empty() {
            return Err(KodoError::from(ValidationError::MissingImage));
        }

        Ok(Self {
            name: name.into(),
            image: String::from(trimmed),
            env: EnvironmentMap::new(),
            node_selector: NodeSelector::new(),
            cpu_request: String::from("1"),
            memory_request: String::from("1Gi"),
        })
    }

    /// Attach creation-time environment variables.
    #[must_use]
    pub fn with_env(mut self, env: EnvironmentMap) -> Self {
        self.env = env;
        self
    }

    /// Attach a node selector.
    #[must_use]
    pub fn with_node_selector(mut self, node_selector: NodeSelector) -> Self {
        self.node_selector = node_selector;
        self
    }

    /// Override the default resource requests.
    #[must_use]
    pub fn with_resource_requests(
        mut self,
        cpu_request: impl Into<String>,
        memory_request: impl Into<String>,
    ) -> Self {
        self.cpu_request = cpu_request.into();
        self.memory_request = memory_request.into();
        self
    }

    /// Return the pod name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Return the configured image.
    #[must_use]
    pub fn image(&self) -> &str {
        &self.image
    }

    /// Build the pod object submitted to the cluster.
    #[must_use]
    pub fn build_pod(&self) -> Pod {
        let env_spec: Vec<EnvVar> = self
            .env
            .iter()
            .map(|(name, value)| EnvVar {
                name: String::from(name),
                value: Some(String::from(value)),
                value_from: None,
            })
            .collect();

        let mut requests = BTreeMap::new();
        requests.insert(String::from("cpu"), Quantity(self.cpu_request.clone()));
        requests.insert(String::from("memory"), Quantity(self.memory_request.clone()));

        let container = Container {
            name: self.name.clone(),
            image: Some(self.image.clone()),
            command: Some(vec![String::from("/bin/sh"), String::from("-c")]),
            args: Some(vec![String::from(KEEP_ALIVE_ARGS)]),
            stdin: Some(true),
            tty: Some(true),
            env: (!env_spec.is_empty()).then_some(env_spec),
            resources: Some(ResourceRequirements {
                requests: Some(requests),
                ..ResourceRequirements::default()
            }),
            ..Container::default()
        };

        let node_selector = (!self.node_selector.is_empty())
            .then(|| self.node_selector.to_label_map());

        Pod {
            metadata: ObjectMeta {
                name: Some(self.name.clone()),
                ..ObjectMeta::default()
            },
            spec: Some(PodSpec {
                restart_policy: Some(String::from(RESTART_POLICY)),
                containers: vec![container],
                node_selector,
                ..PodSpec::default()
            }),
            ..Pod::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[expect(clippy::expect_used, reason = "fixture input is statically valid")]
    fn request() -> CreatePodRequest {
        CreatePodRequest::new("worker-1", "ubuntu:24.04").expect("request should validate")
    }

    #[rstest]
    fn rejects_blank_image() {
        let result = CreatePodRequest::new("worker-1", "  ");
        assert!(matches!(
            result,
            Err(KodoError::Validation(ValidationError::MissingImage))
        ));
    }

    #[rstest]
    #[expect(clippy::expect_used, reason = "test asserts the built spec shape")]
    fn pod_spec_keeps_workload_alive_and_never_restarts() {
        let pod = request().build_pod();
        assert_eq!(pod.metadata.name.as_deref(), Some("worker-1"));

        let spec = pod.spec.expect("pod should carry a spec");
        assert_eq!(spec.restart_policy.as_deref(), Some("Never"));

        let container = spec.containers.first().expect("one container expected");
        assert_eq!(container.image.as_deref(), Some("ubuntu:24.04"));
        assert_eq!(
            container.command,
            Some(vec![String::from("/bin/sh"), String::from("-c")])
        );
        assert_eq!(container.args, Some(vec![String::from("sleep infinity")]));
    }

    #[rstest]
    #[expect(clippy::expect_used, reason = "test asserts the built spec shape")]
    fn pod_spec_carries_env_and_selector() {
        let env = EnvironmentMap::from_pairs([("X", "1")]).expect("pairs should validate");
        let selector =
            NodeSelector::from_pairs([("kubernetes.io/os", "linux")]).expect("selector valid");
        let pod = request().with_env(env).with_node_selector(selector).build_pod();

        let spec = pod.spec.expect("pod should carry a spec");
        let selector_map = spec.node_selector.expect("selector expected");
        assert_eq!(selector_map.get("kubernetes.io/os").map(String::as_str), Some("linux"));

        let container = spec.containers.first().expect("one container expected");
        let env_spec = container.env.as_ref().expect("env expected");
        assert!(env_spec.iter().any(|var| var.name == "X" && var.value.as_deref() == Some("1")));
    }

    #[rstest]
    #[expect(clippy::expect_used, reason = "test asserts the built spec shape")]
    fn pod_spec_applies_default_resource_requests() {
        let pod = request().build_pod();
        let spec = pod.spec.expect("pod should carry a spec");
        let container = spec.containers.first().expect("one container expected");
        let requests = container
            .resources
            .as_ref()
            .and_then(|resources| resources.requests.as_ref())
            .expect("requests expected");
        assert_eq!(requests.get("cpu"), Some(&Quantity(String::from("1"))));
        assert_eq!(requests.get("memory"), Some(&Quantity(String::from("1Gi"))));
    }
}
