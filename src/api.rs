//! Orchestration API for kodo commands.
//!
//! This module provides the library-facing orchestration for the `docker`
//! and `kubernetes` commands: build a runner, launch the workload, run the
//! command, and always clean up - on success, on command failure, and on
//! every error path in between. Functions here accept library-owned types
//! (not clap types), never print, and never call `std::process::exit`; the
//! CLI adapter owns presentation and exit codes.

use tracing::error;

use crate::config::AppConfig;
use crate::error::{ConfigError, KodoError};
use crate::runner::ContainerRunner;
use crate::workload::{
    BackendKind, EnvironmentMap, EXIT_CODE_UNAVAILABLE, ExecutionResult, NodeSelector,
};

/// Process exit code for failures before any command ran.
///
/// Distinct from every command exit code the CLI mirrors, so callers can
/// tell "your command failed" from "kodo could not run your command".
pub const SETUP_FAILURE_EXIT_CODE: i32 = 125;

/// Parameters for launching a workload and running one command in it.
pub struct RunParams<'a> {
    /// Resolved application configuration.
    pub config: &'a AppConfig,
    /// Backend to run against.
    pub backend: BackendKind,
    /// Image to launch.
    pub image: &'a str,
    /// Workload name; generated from the image when `None`.
    pub name: Option<String>,
    /// Command to execute once the workload is ready.
    pub command: &'a str,
    /// Creation-time environment variables.
    pub environment: Option<EnvironmentMap>,
    /// Scheduling constraint, honoured only by the Kubernetes backend.
    pub node_selector: Option<NodeSelector>,
}

/// Launch a workload, run the command, and tear everything down.
///
/// Cleanup runs on every path: after a successful command, after a failed
/// command, and after a start that never produced a usable workload.
///
/// # Errors
///
/// Returns validation, connection, creation, and execution errors from the
/// selected backend. A command that runs and exits non-zero is NOT an
/// error; its exit code travels in the returned [`ExecutionResult`].
pub async fn run_workload(params: RunParams<'_>) -> Result<ExecutionResult, KodoError> {
    let RunParams {
        config,
        backend,
        image,
        name,
        command,
        environment,
        node_selector,
    } = params;

    let mut runner = match backend {
        BackendKind::Docker => ContainerRunner::docker(config).await?,
        BackendKind::Kubernetes => ContainerRunner::kubernetes(config).await?,
    };

    let handle = match runner
        .start_container(image, name, environment, node_selector)
        .await
    {
        Ok(handle) => handle,
        Err(start_error) => {
            // Safe after a partially-completed start: teardown is
            // best-effort and never masks the original failure.
            runner.cleanup().await;
            return Err(start_error);
        }
    };

    let exec_result = runner.execute_command(&handle, command, None).await;
    runner.cleanup().await;

    exec_result.map_err(|exec_error| {
        error!(id = handle.id(), error = %exec_error, "command execution failed");
        exec_error
    })
}

/// Map an execution result onto a process exit code.
///
/// Mirrors the command's own exit code where possible; the unavailable
/// sentinel and out-of-range codes collapse to setup-failure and generic
/// failure respectively.
#[must_use]
pub fn process_exit_code(result: &ExecutionResult) -> i32 {
    if result.exit_code() == EXIT_CODE_UNAVAILABLE {
        return SETUP_FAILURE_EXIT_CODE;
    }
    u8::try_from(result.exit_code()).map_or(1, i32::from)
}

/// Parse a `--env` JSON object into a validated environment map.
///
/// # Errors
///
/// Returns `ConfigError::InvalidValue` for malformed JSON or a non-object
/// value, and validation errors for malformed variable names.
pub fn parse_environment(raw: Option<&str>) -> Result<Option<EnvironmentMap>, KodoError> {
    let Some(pairs) = parse_json_object(raw, "--env")? else {
        return Ok(None);
    };
    EnvironmentMap::from_pairs(pairs)
        .map(Some)
        .map_err(KodoError::from)
}

/// Parse a `--node-selector` JSON object into a validated selector.
///
/// # Errors
///
/// Returns `ConfigError::InvalidValue` for malformed JSON or a non-object
/// value, and validation errors for reserved label keys.
pub fn parse_node_selector(raw: Option<&str>) -> Result<Option<NodeSelector>, KodoError> {
    let Some(pairs) = parse_json_object(raw, "--node-selector")? else {
        return Ok(None);
    };
    NodeSelector::from_pairs(pairs)
        .map(Some)
        .map_err(KodoError::from)
}

/// Parse an optional JSON object argument into string pairs.
///
/// Non-string values are rendered as their JSON text, mirroring what a
/// caller would see in the object literal.
fn parse_json_object(
    raw: Option<&str>,
    field: &str,
) -> Result<Option<Vec<(String, String)>>, KodoError> {
    let Some(text) = raw else {
        return Ok(None);
    };

    let value: serde_json::Value =
        serde_json::from_str(text).map_err(|e| ConfigError::InvalidValue {
            field: String::from(field),
            reason: format!("invalid JSON: {e}"),
        })?;

    let object = value.as_object().ok_or_else(|| ConfigError::InvalidValue {
        field: String::from(field),
        reason: String::from("must be a JSON object"),
    })?;

    let pairs = object
        .iter()
        .map(|(key, entry)| {
            let rendered = entry
                .as_str()
                .map_or_else(|| entry.to_string(), String::from);
            (key.clone(), rendered)
        })
        .collect();
    Ok(Some(pairs))
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[expect(clippy::expect_used, reason = "test asserts the happy path")]
    fn environment_json_parses_into_a_map() {
        let env = parse_environment(Some(r#"{"KEY1":"value1","KEY2":"value2"}"#))
            .expect("object should parse")
            .expect("map should be present");
        assert_eq!(env.get("KEY1"), Some("value1"));
        assert_eq!(env.get("KEY2"), Some("value2"));
    }

    #[rstest]
    fn missing_environment_is_none() {
        assert!(matches!(parse_environment(None), Ok(None)));
    }

    #[rstest]
    #[case("not json")]
    #[case("[1, 2]")]
    #[case("\"string\"")]
    fn malformed_environment_json_is_rejected(#[case] raw: &str) {
        let result = parse_environment(Some(raw));
        assert!(matches!(
            result,
            Err(KodoError::Config(ConfigError::InvalidValue { ref field, .. })) if field == "--env"
        ));
    }

    #[rstest]
    #[expect(clippy::expect_used, reason = "test asserts value rendering")]
    fn non_string_environment_values_are_rendered_as_json_text() {
        let env = parse_environment(Some(r#"{"PORT":8080}"#))
            .expect("object should parse")
            .expect("map should be present");
        assert_eq!(env.get("PORT"), Some("8080"));
    }

    #[rstest]
    #[expect(clippy::expect_used, reason = "test asserts the happy path")]
    fn node_selector_json_parses_into_a_selector() {
        let selector = parse_node_selector(Some(r#"{"kubernetes.io/os":"linux"}"#))
            .expect("object should parse")
            .expect("selector should be present");
        assert_eq!(selector.len(), 1);
    }

    #[rstest]
    fn reserved_selector_keys_are_rejected_at_parse_time() {
        let result =
            parse_node_selector(Some(r#"{"node-restriction.kubernetes.io/team":"ml"}"#));
        assert!(matches!(result, Err(KodoError::Validation(_))));
    }

    #[rstest]
    #[case(ExecutionResult::new("", 0), 0)]
    #[case(ExecutionResult::new("", 7), 7)]
    #[case(ExecutionResult::new("", 256), 1)]
    #[case(ExecutionResult::unavailable("proxy down"), SETUP_FAILURE_EXIT_CODE)]
    fn process_exit_codes_mirror_command_exits(
        #[case] result: ExecutionResult,
        #[case] expected: i32,
    ) {
        assert_eq!(process_exit_code(&result), expected);
    }
}
