//! Backend-agnostic workload data model.
//!
//! This module defines the vocabulary shared by both backends: the backend
//! tag, the opaque workload handle, normalised execution results, and the
//! validated environment and node-selector maps. Validation happens at
//! construction so malformed input is rejected before any backend is
//! contacted.

use std::collections::BTreeMap;
use std::fmt;
use std::time::SystemTime;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Exit code reported when a command could not be attempted at all.
///
/// Distinguishes "the workload or its transport was unreachable" from a
/// command that ran and returned non-zero.
pub const EXIT_CODE_UNAVAILABLE: i64 = -1;

/// `PATH` value injected into every workload beneath caller-supplied
/// environment.
///
/// Covers the tool prefixes commonly baked into build images so commands
/// resolve without callers spelling out a search path.
pub const DEFAULT_WORKLOAD_PATH: &str =
    "/root/.venv/bin:/root/.local/bin:/root/.cargo/bin:/usr/local/sbin:/usr/local/bin:/usr/sbin:/usr/bin:/sbin:/bin";

/// Node-selector key prefixes reserved for cluster-managed scheduling labels.
///
/// Selectors under these prefixes are rejected rather than silently passed
/// through, so a caller can never override node restrictions the cluster
/// operator has applied.
const RESERVED_SELECTOR_PREFIXES: &[&str] =
    &["node-restriction.kubernetes.io/", "node.kubernetes.io/"];

/// The backend a manager or handle is bound to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Local Docker engine.
    #[default]
    Docker,
    /// Remote Kubernetes cluster.
    Kubernetes,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Docker => f.write_str("docker"),
            Self::Kubernetes => f.write_str("kubernetes"),
        }
    }
}

/// Normalised lifecycle state of a workload.
///
/// Docker container states and Kubernetes pod phases both map into this
/// shape at the backend-adapter boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkloadStatus {
    /// Accepted by the backend but not yet running.
    Pending,
    /// Running and able to accept command execution.
    Running,
    /// Ran to completion or was stopped.
    Stopped,
    /// Entered a terminal failure state.
    Failed,
    /// The backend reported a state this library does not recognise.
    Unknown,
}

/// Opaque reference binding a caller to one workload instance and its backend.
///
/// A handle is valid only between successful creation and teardown. The
/// runner facade checks handle validity before any backend I/O, so a stale
/// or mismatched handle fails fast with a semantic error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkloadHandle {
    backend: BackendKind,
    id: String,
    namespace: Option<String>,
    created_at: SystemTime,
}

impl WorkloadHandle {
    /// Create a handle for a Docker container.
    #[must_use]
    pub fn docker(id: impl Into<String>) -> Self {
        Self {
            backend: BackendKind::Docker,
            id: id.into(),
            namespace: None,
            created_at: SystemTime::now(),
        }
    }

    /// Create a handle for a Kubernetes pod in a namespace.
    #[must_use]
    pub fn kubernetes(id: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            backend: BackendKind::Kubernetes,
            id: id.into(),
            namespace: Some(namespace.into()),
            created_at: SystemTime::now(),
        }
    }

    /// Return the backend this handle is bound to.
    #[must_use]
    pub const fn backend(&self) -> BackendKind {
        self.backend
    }

    /// Return the native identifier (container ID or pod name).
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Return the namespace for Kubernetes handles, `None` for Docker.
    #[must_use]
    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    /// Return the instant the workload was created.
    #[must_use]
    pub const fn created_at(&self) -> SystemTime {
        self.created_at
    }
}

/// Captured output and normalised exit code of a command execution.
///
/// Exit code semantics are backend-independent: `0` is success, any other
/// non-negative value is the command's own failure code, and
/// [`EXIT_CODE_UNAVAILABLE`] means the command could not be attempted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionResult {
    output: String,
    exit_code: i64,
}

impl ExecutionResult {
    /// Create a result from captured output and an exit code.
    #[must_use]
    pub fn new(output: impl Into<String>, exit_code: i64) -> Self {
        Self {
            output: output.into(),
            exit_code,
        }
    }

    /// Create a result for a command that could not be attempted.
    #[must_use]
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self {
            output: message.into(),
            exit_code: EXIT_CODE_UNAVAILABLE,
        }
    }

    /// Return the captured combined output.
    #[must_use]
    pub fn output(&self) -> &str {
        &self.output
    }

    /// Return the normalised exit code.
    #[must_use]
    pub const fn exit_code(&self) -> i64 {
        self.exit_code
    }

    /// Return whether the command ran and exited successfully.
    #[must_use]
    pub const fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Validated mapping from environment variable names to values.
///
/// Names must be non-empty and must not contain `=`; duplicate names are
/// rejected at construction. Iteration order is deterministic (sorted by
/// name) so rendered payloads are stable across runs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvironmentMap {
    entries: BTreeMap<String, String>,
}

impl EnvironmentMap {
    /// Create an empty environment map.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// Build a map from name/value pairs, rejecting invalid and duplicate names.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::EmptyEnvironmentKey` or
    /// `ValidationError::InvalidEnvironmentKey` for malformed names, and
    /// `ValidationError::DuplicateEnvironmentKey` when a name appears twice.
    pub fn from_pairs<I, K, V>(pairs: I) -> Result<Self, ValidationError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut map = Self::new();
        for (name, value) in pairs {
            map.insert(name.into(), value.into())?;
        }
        Ok(map)
    }

    /// Insert a new variable, rejecting invalid or duplicate names.
    ///
    /// # Errors
    ///
    /// Returns the same validation errors as [`Self::from_pairs`].
    pub fn insert(&mut self, name: String, value: String) -> Result<(), ValidationError> {
        validate_env_name(&name)?;
        if self.entries.contains_key(&name) {
            return Err(ValidationError::DuplicateEnvironmentKey { name });
        }
        self.entries.insert(name, value);
        Ok(())
    }

    /// Insert or overwrite a variable without the duplicate check.
    ///
    /// Used for merging caller-supplied variables over library defaults,
    /// where overriding is the intended behaviour.
    ///
    /// # Errors
    ///
    /// Returns a validation error for malformed names.
    pub fn set(&mut self, name: String, value: String) -> Result<(), ValidationError> {
        validate_env_name(&name)?;
        self.entries.insert(name, value);
        Ok(())
    }

    /// Return the value of a variable, if present.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries.get(name).map(String::as_str)
    }

    /// Return whether the map holds no variables.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Return the number of variables.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Iterate over name/value pairs in sorted name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }

    /// Build a map holding the default workload `PATH` overlaid with
    /// caller-supplied variables.
    ///
    /// # Errors
    ///
    /// Returns a validation error when a caller-supplied name is malformed.
    pub fn with_defaults(overrides: Option<&Self>) -> Result<Self, ValidationError> {
        let mut env = Self::new();
        env.set(String::from("PATH"), String::from(DEFAULT_WORKLOAD_PATH))?;
        if let Some(extra) = overrides {
            for (name, value) in extra.iter() {
                env.set(String::from(name), String::from(value))?;
            }
        }
        Ok(env)
    }

    /// Render the map into `KEY=value` entries for the Docker engine.
    #[must_use]
    pub fn to_engine_entries(&self) -> Vec<String> {
        self.entries
            .iter()
            .map(|(name, value)| format!("{name}={value}"))
            .collect()
    }
}

fn validate_env_name(name: &str) -> Result<(), ValidationError> {
    if name.is_empty() {
        return Err(ValidationError::EmptyEnvironmentKey);
    }
    if name.contains('=') || name.contains('\0') {
        return Err(ValidationError::InvalidEnvironmentKey {
            name: String::from(name),
        });
    }
    Ok(())
}

/// Validated scheduling constraint mapping label keys to required values.
///
/// Applied only by the Kubernetes backend; the Docker backend rejects a
/// non-empty selector outright rather than silently dropping it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeSelector {
    labels: BTreeMap<String, String>,
}

impl NodeSelector {
    /// Create an empty selector.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            labels: BTreeMap::new(),
        }
    }

    /// Build a selector from key/value pairs, rejecting reserved keys.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::ReservedSelectorLabel` when a key is empty
    /// or falls under a cluster-managed prefix.
    pub fn from_pairs<I, K, V>(pairs: I) -> Result<Self, ValidationError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut labels = BTreeMap::new();
        for (key, value) in pairs {
            let key_string = key.into();
            validate_selector_key(&key_string)?;
            labels.insert(key_string, value.into());
        }
        Ok(Self { labels })
    }

    /// Return whether the selector holds no labels.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Return the number of labels.
    #[must_use]
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    /// Iterate over key/value pairs in sorted key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.labels
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_str()))
    }

    /// Render the selector into the map shape pod specs expect.
    #[must_use]
    pub fn to_label_map(&self) -> BTreeMap<String, String> {
        self.labels.clone()
    }
}

fn validate_selector_key(key: &str) -> Result<(), ValidationError> {
    let reserved = key.is_empty()
        || RESERVED_SELECTOR_PREFIXES
            .iter()
            .any(|prefix| key.starts_with(prefix));
    if reserved {
        return Err(ValidationError::ReservedSelectorLabel {
            key: String::from(key),
        });
    }
    Ok(())
}
