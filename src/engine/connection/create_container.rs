//! Container creation and startup.
//!
//! This module translates a validated launch request into `Bollard`
//! container-create payloads, starts the created container, and provides the
//! client trait seam that keeps creation testable without a running daemon.

use std::future::Future;
use std::pin::Pin;

use bollard::Docker;
use bollard::models::{ContainerCreateBody, ContainerCreateResponse, HostConfig};
use bollard::query_parameters::{
    CreateContainerOptions, CreateContainerOptionsBuilder, StartContainerOptions,
};

use super::EngineConnector;
use crate::error::{ContainerError, KodoError, ValidationError};
use crate::workload::EnvironmentMap;

/// Keep-alive command run as PID 1 so the container accepts exec sessions.
const KEEP_ALIVE_CMD: &str = "/bin/sh";

/// Boxed future type returned by [`ContainerCreator::create_container`].
pub type CreateContainerFuture<'a> = Pin<
    Box<dyn Future<Output = Result<ContainerCreateResponse, bollard::errors::Error>> + Send + 'a>,
>;

/// Boxed future type returned by [`ContainerCreator::start_container`].
pub type StartContainerFuture<'a> =
    Pin<Box<dyn Future<Output = Result<(), bollard::errors::Error>> + Send + 'a>>;

/// Behaviour required to create and start a container via a backing engine
/// client.
///
/// This abstraction exists to keep container-creation logic testable without
/// a running daemon.
pub trait ContainerCreator {
    /// Create a container from `Bollard` options and body payload.
    fn create_container(
        &self,
        options: Option<CreateContainerOptions>,
        config: ContainerCreateBody,
    ) -> CreateContainerFuture<'_>;

    /// Start a previously created container.
    fn start_container(&self, container_id: &str) -> StartContainerFuture<'_>;
}

impl ContainerCreator for Docker {
    fn create_container(
        &self,
        options: Option<CreateContainerOptions>,
        config: ContainerCreateBody,
    ) -> CreateContainerFuture<'_> {
        Box::pin(async move { Self::create_container(self, options, config).await })
    }

    fn start_container(&self, container_id: &str) -> StartContainerFuture<'_> {
        let container_id_owned = String::from(container_id);
        Box::pin(async move {
            Self::start_container(self, &container_id_owned, None::<StartContainerOptions>).await
        })
    }
}

/// Container-creation request parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateContainerRequest {
    /// The container image to create from.
    image: String,

    /// Optional container name.
    name: Option<String>,

    /// Environment injected at creation.
    env: EnvironmentMap,

    /// Remove the container from the engine when it is stopped.
    auto_remove: bool,
}

impl CreateContainerRequest {
    /// Create a request for an image.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::MissingImage` when `image` is empty or
    /// whitespace-only.
    pub fn new(image: impl Into<String>) -> Result<Self, KodoError> {
        let image_value = image.into();
        let validated_image = String::from(validate_image(&image_value)?);

        Ok(Self {
            image: validated_image,
            name: None,
            env: EnvironmentMap::new(),
            auto_remove: false,
        })
    }

    /// Attach an optional container name.
    #[must_use]
    pub fn with_name(mut self, name: Option<String>) -> Self {
        self.name = name.filter(|value| !value.trim().is_empty());
        self
    }

    /// Attach creation-time environment variables.
    #[must_use]
    pub fn with_env(mut self, env: EnvironmentMap) -> Self {
        self.env = env;
        self
    }

    /// Control removal of the container when it is stopped.
    #[must_use]
    pub const fn with_auto_remove(mut self, auto_remove: bool) -> Self {
        self.auto_remove = auto_remove;
        self
    }

    /// Return the configured image.
    #[must_use]
    pub fn image(&self) -> &str {
        &self.image
    }

    /// Return the optional configured name.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Return the creation-time environment.
    #[must_use]
    pub const fn env(&self) -> &EnvironmentMap {
        &self.env
    }

    /// Return whether the container is removed on stop.
    #[must_use]
    pub const fn auto_remove(&self) -> bool {
        self.auto_remove
    }
}

impl EngineConnector {
    /// Create and start a container, returning the engine-assigned ID.
    ///
    /// Creation and startup form one logical step: a container that was
    /// created but fails to start is not handed back to the caller as a
    /// usable workload, and the start error carries the ID so the caller can
    /// clean up.
    ///
    /// # Errors
    ///
    /// Returns `ContainerError::CreateFailed` when the engine rejects the
    /// create request, and `ContainerError::StartFailed` when the created
    /// container does not start.
    pub async fn create_and_start_container<C: ContainerCreator>(
        client: &C,
        request: &CreateContainerRequest,
    ) -> Result<String, KodoError> {
        let options = build_create_options(request.name());
        let body = build_create_body(request);

        let response = client.create_container(options, body).await.map_err(|e| {
            KodoError::from(ContainerError::CreateFailed {
                message: e.to_string(),
            })
        })?;

        let container_id = response.id;
        client
            .start_container(&container_id)
            .await
            .map_err(|e| {
                KodoError::from(ContainerError::StartFailed {
                    container_id: container_id.clone(),
                    message: e.to_string(),
                })
            })?;

        Ok(container_id)
    }
}

fn validate_image(image: &str) -> Result<&str, KodoError> {
    let trimmed = image.trim();

    if trimmed.is_empty() {
        return Err(KodoError::from(ValidationError::MissingImage));
    }

    Ok(trimmed)
}

fn build_create_options(name: Option<&str>) -> Option<CreateContainerOptions> {
    name.filter(|value| !value.trim().is_empty())
        .map(|container_name| {
            CreateContainerOptionsBuilder::new()
                .name(container_name)
                .build()
        })
}

fn build_create_body(request: &CreateContainerRequest) -> ContainerCreateBody {
    let env_entries = request.env().to_engine_entries();
    ContainerCreateBody {
        image: Some(String::from(request.image())),
        cmd: Some(vec![String::from(KEEP_ALIVE_CMD)]),
        env: (!env_entries.is_empty()).then_some(env_entries),
        tty: Some(true),
        open_stdin: Some(true),
        host_config: Some(HostConfig {
            auto_remove: Some(request.auto_remove()),
            ..HostConfig::default()
        }),
        ..ContainerCreateBody::default()
    }
}
