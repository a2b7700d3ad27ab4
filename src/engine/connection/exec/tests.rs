//! Unit tests for captured-output container exec.

use bollard::container::LogOutput;
use bollard::errors::Error as BollardError;
use futures_util::stream;
use mockall::mock;
use rstest::rstest;

use super::*;
use crate::error::{ConfigError, ContainerError, KodoError};
use crate::workload::EnvironmentMap;

mock! {
    #[derive(Debug)]
    ExecClient {}

    impl ContainerExecClient for ExecClient {
        fn create_exec(&self, container_id: &str, options: CreateExecOptions<String>) -> CreateExecFuture<'_>;
        fn start_exec(&self, exec_id: &str, options: Option<StartExecOptions>) -> StartExecFuture<'_>;
        fn inspect_exec(&self, exec_id: &str) -> InspectExecFuture<'_>;
    }
}

const EXEC_TIMEOUT: Duration = Duration::from_secs(5);

#[expect(clippy::expect_used, reason = "fixture input is statically valid")]
fn request(command: &str) -> ExecRequest {
    ExecRequest::new("abc123", command, EXEC_TIMEOUT).expect("request should validate")
}

fn setup_create_exec(client: &mut MockExecClient, expected_script: &'static str) {
    client
        .expect_create_exec()
        .times(1)
        .returning(move |container_id, options| {
            assert_eq!(container_id, "abc123");
            assert_eq!(options.tty, Some(false));
            assert_eq!(options.attach_stdout, Some(true));
            assert_eq!(options.attach_stderr, Some(true));
            assert_eq!(
                options.cmd,
                Some(vec![
                    String::from("/bin/sh"),
                    String::from("-c"),
                    String::from(expected_script),
                ])
            );
            Box::pin(async {
                Ok(CreateExecResults {
                    id: String::from("exec-1"),
                })
            })
        });
}

fn setup_start_exec(client: &mut MockExecClient, output_messages: Vec<&'static [u8]>) {
    client.expect_start_exec().times(1).returning(move |_, _| {
        let output_chunks = output_messages
            .iter()
            .map(|message| {
                Ok(LogOutput::StdOut {
                    message: Vec::from(*message).into(),
                })
            })
            .collect::<Vec<Result<LogOutput, BollardError>>>();
        let output_stream = stream::iter(output_chunks);
        Box::pin(async move {
            Ok(StartExecResults::Attached {
                output: Box::pin(output_stream),
                input: Box::pin(tokio::io::sink()),
            })
        })
    });
}

fn setup_inspect_exec(client: &mut MockExecClient, exit_code: i64) {
    client.expect_inspect_exec().returning(move |_| {
        Box::pin(async move {
            Ok(bollard::models::ExecInspectResponse {
                running: Some(false),
                exit_code: Some(exit_code),
                ..bollard::models::ExecInspectResponse::default()
            })
        })
    });
}

#[rstest]
#[case("")]
#[case("   ")]
fn request_rejects_blank_commands(#[case] command: &str) {
    let result = ExecRequest::new("abc123", command, EXEC_TIMEOUT);
    assert!(matches!(
        result,
        Err(KodoError::Config(ConfigError::MissingRequired { ref field })) if field == "command"
    ));
}

#[rstest]
fn request_rejects_blank_container_id() {
    let result = ExecRequest::new("  ", "echo hi", EXEC_TIMEOUT);
    assert!(matches!(
        result,
        Err(KodoError::Config(ConfigError::MissingRequired { ref field })) if field == "container"
    ));
}

#[rstest]
#[expect(clippy::expect_used, reason = "test asserts construction succeeds")]
fn request_inlines_per_call_env_in_script() {
    let env = EnvironmentMap::from_pairs([("X", "1")]).expect("pairs should validate");
    let exec_request = request("echo $X").with_env(Some(env));
    let options = build_create_exec_options(&exec_request);
    assert_eq!(
        options.cmd,
        Some(vec![
            String::from("/bin/sh"),
            String::from("-c"),
            String::from("export X=1; echo $X"),
        ])
    );
}

#[tokio::test]
#[expect(clippy::expect_used, reason = "test asserts the happy path")]
async fn exec_captures_output_and_exit_code() {
    let mut client = MockExecClient::new();
    setup_create_exec(&mut client, "echo hi");
    setup_start_exec(&mut client, vec![b"hi", b"\n"]);
    setup_inspect_exec(&mut client, 0);

    let result = EngineConnector::exec_captured(&client, &request("echo hi"))
        .await
        .expect("exec should succeed");

    assert_eq!(result.output(), "hi\n");
    assert_eq!(result.exit_code(), 0);
    assert!(result.success());
}

#[tokio::test]
#[expect(clippy::expect_used, reason = "test asserts the happy path")]
async fn exec_propagates_non_zero_exit_code() {
    let mut client = MockExecClient::new();
    setup_create_exec(&mut client, "exit 7");
    setup_start_exec(&mut client, Vec::new());
    setup_inspect_exec(&mut client, 7);

    let result = EngineConnector::exec_captured(&client, &request("exit 7"))
        .await
        .expect("exec should succeed");

    assert_eq!(result.exit_code(), 7);
    assert!(!result.success());
}

#[tokio::test]
#[expect(clippy::expect_used, reason = "test asserts output scrubbing")]
async fn exec_scrubs_ansi_escapes_from_output() {
    let mut client = MockExecClient::new();
    setup_create_exec(&mut client, "ls");
    setup_start_exec(&mut client, vec![b"\x1b[31mred\x1b[0m\r\n"]);
    setup_inspect_exec(&mut client, 0);

    let result = EngineConnector::exec_captured(&client, &request("ls"))
        .await
        .expect("exec should succeed");

    assert_eq!(result.output(), "red\n");
}

#[tokio::test]
async fn exec_surfaces_create_failure() {
    let mut client = MockExecClient::new();
    client.expect_create_exec().returning(|_, _| {
        Box::pin(async {
            Err(BollardError::DockerResponseServerError {
                status_code: 409,
                message: String::from("container not running"),
            })
        })
    });

    let result = EngineConnector::exec_captured(&client, &request("echo hi")).await;

    assert!(matches!(
        result,
        Err(KodoError::Container(ContainerError::ExecFailed { ref container_id, .. }))
            if container_id == "abc123"
    ));
}

#[tokio::test]
#[expect(clippy::expect_used, reason = "fixture input is statically valid")]
async fn exec_times_out_when_session_never_completes() {
    let mut client = MockExecClient::new();
    client.expect_create_exec().returning(|_, _| {
        Box::pin(async {
            Ok(CreateExecResults {
                id: String::from("exec-1"),
            })
        })
    });
    client.expect_start_exec().returning(|_, _| {
        Box::pin(futures_util::future::pending::<
            Result<StartExecResults, BollardError>,
        >())
    });

    let exec_request = ExecRequest::new("abc123", "sleep 60", Duration::from_millis(50))
        .expect("request should validate");
    let result = EngineConnector::exec_captured(&client, &exec_request).await;

    assert!(matches!(
        result,
        Err(KodoError::Container(ContainerError::ExecFailed { ref message, .. }))
            if message.contains("timed out")
    ));
}
