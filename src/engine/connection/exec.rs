//! Container exec with captured output.
//!
//! This module wraps Bollard exec APIs behind a small trait seam so command
//! execution behaviour can be unit-tested without a live daemon. Commands run
//! without a terminal; stdout and stderr are drained into a single captured
//! buffer and the exit code is read back from exec inspection.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use bollard::container::LogOutput;
use bollard::exec::{CreateExecOptions, CreateExecResults, StartExecOptions, StartExecResults};
use bollard::{Docker, errors::Error as BollardError};
use futures_util::StreamExt;
use tokio::time::sleep;

use super::EngineConnector;
use crate::command::{scrub_output, shell_command};
use crate::error::{ConfigError, ContainerError, KodoError};
use crate::workload::{EnvironmentMap, ExecutionResult};

pub(super) const EXEC_INSPECT_POLL_INTERVAL_MS: u64 = 100;

/// Boxed future type returned by [`ContainerExecClient::create_exec`].
pub type CreateExecFuture<'a> =
    Pin<Box<dyn Future<Output = Result<CreateExecResults, BollardError>> + Send + 'a>>;

/// Boxed future type returned by [`ContainerExecClient::start_exec`].
pub type StartExecFuture<'a> =
    Pin<Box<dyn Future<Output = Result<StartExecResults, BollardError>> + Send + 'a>>;

/// Boxed future type returned by [`ContainerExecClient::inspect_exec`].
pub type InspectExecFuture<'a> = Pin<
    Box<
        dyn Future<Output = Result<bollard::models::ExecInspectResponse, BollardError>> + Send + 'a,
    >,
>;

/// Behaviour required to run and inspect exec sessions.
///
/// This abstraction keeps command execution testable without a live daemon.
pub trait ContainerExecClient {
    /// Create an exec session in a running container.
    fn create_exec(
        &self,
        container_id: &str,
        options: CreateExecOptions<String>,
    ) -> CreateExecFuture<'_>;

    /// Start a previously created exec session.
    fn start_exec(&self, exec_id: &str, options: Option<StartExecOptions>) -> StartExecFuture<'_>;

    /// Inspect an exec session for running status and exit code.
    fn inspect_exec(&self, exec_id: &str) -> InspectExecFuture<'_>;
}

impl ContainerExecClient for Docker {
    fn create_exec(
        &self,
        container_id: &str,
        options: CreateExecOptions<String>,
    ) -> CreateExecFuture<'_> {
        let container_id_owned = String::from(container_id);
        Box::pin(async move { Self::create_exec(self, &container_id_owned, options).await })
    }

    fn start_exec(&self, exec_id: &str, options: Option<StartExecOptions>) -> StartExecFuture<'_> {
        let exec_id_owned = String::from(exec_id);
        Box::pin(async move { Self::start_exec(self, &exec_id_owned, options).await })
    }

    fn inspect_exec(&self, exec_id: &str) -> InspectExecFuture<'_> {
        let exec_id_owned = String::from(exec_id);
        Box::pin(async move { Self::inspect_exec(self, &exec_id_owned).await })
    }
}

/// Parameters required to run a command in a running container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecRequest {
    container_id: String,
    command: String,
    env: Option<EnvironmentMap>,
    timeout: Duration,
}

impl ExecRequest {
    /// Create a new command execution request.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingRequired` when `container_id` or
    /// `command` is empty.
    pub fn new(
        container_id: impl Into<String>,
        command: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, KodoError> {
        let container_id_value = container_id.into();
        let command_value = command.into();
        for (field, value) in [
            ("container", container_id_value.as_str()),
            ("command", command_value.as_str()),
        ] {
            if value.trim().is_empty() {
                return Err(KodoError::from(ConfigError::MissingRequired {
                    field: String::from(field),
                }));
            }
        }

        Ok(Self {
            container_id: container_id_value,
            command: command_value,
            env: None,
            timeout,
        })
    }

    /// Attach per-call environment variables.
    ///
    /// These are injected inline into the assembled shell command; they never
    /// mutate container state.
    #[must_use]
    pub fn with_env(mut self, env: Option<EnvironmentMap>) -> Self {
        self.env = env.filter(|vars| !vars.is_empty());
        self
    }

    /// Return the target container identifier.
    #[must_use]
    pub fn container_id(&self) -> &str {
        &self.container_id
    }

    /// Return the command text.
    #[must_use]
    pub fn command(&self) -> &str {
        &self.command
    }

    /// Return the per-call environment, if any.
    #[must_use]
    pub const fn env(&self) -> Option<&EnvironmentMap> {
        self.env.as_ref()
    }

    /// Return the execution timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl EngineConnector {
    /// Execute a command in a running container, capturing its output.
    ///
    /// Blocks until the command's streams close and its exit code is
    /// available, bounded by the request timeout. On timeout the remote
    /// process may still be running; the session is abandoned rather than
    /// killed (documented limitation).
    ///
    /// # Errors
    ///
    /// Returns `ContainerError::ExecFailed` when the session cannot be
    /// created, started, streamed, or inspected, or when the timeout elapses.
    pub async fn exec_captured<C: ContainerExecClient>(
        client: &C,
        request: &ExecRequest,
    ) -> Result<ExecutionResult, KodoError> {
        let create_result = client
            .create_exec(request.container_id(), build_create_exec_options(request))
            .await
            .map_err(|error| {
                exec_failed(
                    request.container_id(),
                    format!("create exec failed: {error}"),
                )
            })?;

        let exec_id = create_result.id;
        let run = run_exec_session(client, request, &exec_id);
        tokio::time::timeout(request.timeout(), run)
            .await
            .map_err(|_| {
                exec_failed(
                    request.container_id(),
                    format!(
                        "command timed out after {} seconds",
                        request.timeout().as_secs()
                    ),
                )
            })?
    }
}

async fn run_exec_session<C: ContainerExecClient>(
    client: &C,
    request: &ExecRequest,
    exec_id: &str,
) -> Result<ExecutionResult, KodoError> {
    let start_result = client
        .start_exec(exec_id, Some(build_start_exec_options()))
        .await
        .map_err(|error| {
            exec_failed(
                request.container_id(),
                format!("start exec failed: {error}"),
            )
        })?;

    let raw_output = match start_result {
        StartExecResults::Attached { mut output, .. } => {
            let mut collected = String::new();
            while let Some(chunk) = output.next().await {
                let log_output = chunk.map_err(|error| {
                    exec_failed(
                        request.container_id(),
                        format!("exec stream failed: {error}"),
                    )
                })?;
                match log_output {
                    LogOutput::StdOut { message }
                    | LogOutput::StdErr { message }
                    | LogOutput::Console { message }
                    | LogOutput::StdIn { message } => {
                        collected.push_str(&String::from_utf8_lossy(message.as_ref()));
                    }
                }
            }
            collected
        }
        StartExecResults::Detached => {
            return Err(exec_failed(
                request.container_id(),
                "daemon returned detached start result for attached exec",
            ));
        }
    };

    let exit_code = wait_for_exit_code(client, request.container_id(), exec_id).await?;
    Ok(ExecutionResult::new(scrub_output(&raw_output), exit_code))
}

pub(super) async fn wait_for_exit_code<C: ContainerExecClient>(
    client: &C,
    container_id: &str,
    exec_id: &str,
) -> Result<i64, KodoError> {
    loop {
        let inspect = client
            .inspect_exec(exec_id)
            .await
            .map_err(|error| exec_failed(container_id, format!("inspect exec failed: {error}")))?;

        if inspect.running.unwrap_or(false) {
            sleep(Duration::from_millis(EXEC_INSPECT_POLL_INTERVAL_MS)).await;
            continue;
        }

        if let Some(exit_code) = inspect.exit_code {
            return Ok(exit_code);
        }

        return Err(exec_failed(
            container_id,
            format!("exec session '{exec_id}' completed without an exit code"),
        ));
    }
}

fn build_create_exec_options(request: &ExecRequest) -> CreateExecOptions<String> {
    CreateExecOptions::<String> {
        attach_stdin: Some(false),
        attach_stdout: Some(true),
        attach_stderr: Some(true),
        tty: Some(false),
        cmd: Some(shell_command(request.command(), request.env())),
        ..CreateExecOptions::default()
    }
}

const fn build_start_exec_options() -> StartExecOptions {
    StartExecOptions {
        detach: false,
        tty: false,
        output_capacity: None,
    }
}

pub(super) fn exec_failed(container_id: &str, message: impl Into<String>) -> KodoError {
    KodoError::from(ContainerError::ExecFailed {
        container_id: String::from(container_id),
        message: message.into(),
    })
}

#[cfg(test)]
mod tests;
