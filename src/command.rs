//! Stateless helpers shared by both backends.
//!
//! Workload-name generation, shell command assembly with inline per-call
//! environment, captured-output scrubbing, and exit-code extraction from the
//! cluster exec status shape. Backend-specific result types stop here; the
//! managers hand callers only [`crate::workload::ExecutionResult`].

use std::io;

use camino::Utf8Path;
use cap_std::ambient_authority;
use cap_std::fs_utf8::Dir;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Status;
use tar::{Builder, EntryType, Header};
use uuid::Uuid;

use crate::workload::EnvironmentMap;

/// Shell used to run commands inside workloads.
pub const WORKLOAD_SHELL: &str = "/bin/sh";

/// Maximum length of a generated workload name.
///
/// Kubernetes object names are capped at 63 characters (DNS label), and the
/// same bound keeps Docker container names tidy.
const MAX_NAME_LEN: usize = 63;

/// Length of the random suffix appended to generated names.
const NAME_SUFFIX_LEN: usize = 10;

/// Status value reported by the cluster for a successful exec.
const EXEC_STATUS_SUCCESS: &str = "Success";

/// Status reason reported for a command that exited non-zero.
const EXEC_REASON_NON_ZERO: &str = "NonZeroExitCode";

/// Status cause reason carrying the numeric exit code.
const EXEC_CAUSE_EXIT_CODE: &str = "ExitCode";

/// Generate a unique workload name from an image reference.
///
/// The image reference is sanitised into a DNS-label-safe prefix (lowercase
/// alphanumerics and dashes) and suffixed with a random discriminator, so
/// repeated launches of the same image never collide.
#[must_use]
pub fn unique_workload_name(image: &str) -> String {
    let sanitised = sanitise_image_reference(image);
    let prefix_limit = MAX_NAME_LEN - NAME_SUFFIX_LEN - 1;
    let capped: String = sanitised.chars().take(prefix_limit).collect();
    let prefix = capped.trim_matches('-');
    let suffix: String = Uuid::new_v4()
        .simple()
        .to_string()
        .chars()
        .take(NAME_SUFFIX_LEN)
        .collect();
    if prefix.is_empty() {
        format!("workload-{suffix}")
    } else {
        format!("{prefix}-{suffix}")
    }
}

fn sanitise_image_reference(image: &str) -> String {
    image
        .trim()
        .chars()
        .map(|c| {
            let lower = c.to_ascii_lowercase();
            if lower.is_ascii_alphanumeric() {
                lower
            } else {
                '-'
            }
        })
        .collect()
}

/// Assemble the argv for running a shell command in a workload.
///
/// When `env` is supplied, the variables are injected inline as `export`
/// statements ahead of the command. Docker containers cannot receive new
/// persistent environment after start, so per-call variables must travel
/// inside the assembled command rather than mutate container state; the
/// same assembly is used for pods to keep behaviour identical.
#[must_use]
pub fn shell_command(command: &str, env: Option<&EnvironmentMap>) -> Vec<String> {
    let script = env
        .filter(|vars| !vars.is_empty())
        .map_or_else(
            || String::from(command),
            |vars| {
                let exports: Vec<String> = vars
                    .iter()
                    .map(|(name, value)| format!("export {name}={}", shell_words::quote(value)))
                    .collect();
                format!("{}; {command}", exports.join("; "))
            },
        );
    vec![
        String::from(WORKLOAD_SHELL),
        String::from("-c"),
        script,
    ]
}

/// Strip ANSI escape sequences and carriage returns from captured output.
///
/// Workloads frequently run with colourised tooling on a pseudo-terminal;
/// callers comparing output care about the text, not the styling bytes.
#[must_use]
pub fn scrub_output(raw: &str) -> String {
    let mut scrubbed = String::with_capacity(raw.len());
    let mut chars = raw.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\r' => {}
            '\u{1b}' => {
                if chars.peek() == Some(&'[') {
                    chars.next();
                    // Consume CSI parameter bytes up to and including the
                    // final byte (0x40..=0x7e).
                    for param in chars.by_ref() {
                        if ('\u{40}'..='\u{7e}').contains(&param) {
                            break;
                        }
                    }
                }
            }
            other => scrubbed.push(other),
        }
    }
    scrubbed
}

/// File mode applied to uploaded archive entries.
///
/// Fixed so extraction does not depend on host permission bits.
const UPLOAD_FILE_MODE: u32 = 0o644;

/// Split an in-container destination path into directory and entry name.
///
/// `/work/data.txt` becomes `("/work", "data.txt")`; a bare name lands in
/// `/`.
#[must_use]
pub fn split_destination(dest_path: &str) -> (String, String) {
    dest_path.rsplit_once('/').map_or_else(
        || (String::from("/"), String::from(dest_path)),
        |(dir, name)| {
            let directory = if dir.is_empty() {
                String::from("/")
            } else {
                String::from(dir)
            };
            (directory, String::from(name))
        },
    )
}

/// Build a single-entry tar archive from a host file.
///
/// Both backends extract uploads from a tar stream, so a single host file is
/// wrapped into a one-entry archive stored under `entry_name`.
///
/// # Errors
///
/// Returns an `io::Error` when the host file cannot be read or the archive
/// cannot be assembled.
pub fn build_single_file_archive(local_path: &Utf8Path, entry_name: &str) -> io::Result<Vec<u8>> {
    let current_dir = Utf8Path::new(".");
    let parent = local_path.parent().unwrap_or(current_dir);
    let file_name = local_path.file_name().unwrap_or(local_path.as_str());

    let dir = Dir::open_ambient_dir(parent, ambient_authority())?;
    let contents = dir.read(file_name)?;

    let mut builder = Builder::new(Vec::new());
    let mut header = Header::new_gnu();
    header.set_entry_type(EntryType::Regular);
    header.set_size(contents.len() as u64);
    header.set_mode(UPLOAD_FILE_MODE);
    header.set_cksum();
    builder.append_data(&mut header, entry_name, contents.as_slice())?;
    builder.finish()?;
    builder.into_inner()
}

/// Extract a normalised exit code from a cluster exec status.
///
/// The exec subresource reports success as a `Success` status, and a
/// non-zero command exit as a `NonZeroExitCode` failure whose details carry
/// the numeric code in an `ExitCode` cause. Returns `None` when the status
/// carries no recognisable exit code.
#[must_use]
pub fn exit_code_from_exec_status(status: Option<&Status>) -> Option<i64> {
    let status = status?;
    if status.status.as_deref() == Some(EXEC_STATUS_SUCCESS) {
        return Some(0);
    }
    if status.reason.as_deref() != Some(EXEC_REASON_NON_ZERO) {
        return None;
    }
    status
        .details
        .as_ref()?
        .causes
        .as_ref()?
        .iter()
        .find(|cause| cause.reason.as_deref() == Some(EXEC_CAUSE_EXIT_CODE))
        .and_then(|cause| cause.message.as_deref())
        .and_then(|message| message.parse::<i64>().ok())
}

#[cfg(test)]
mod tests {
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::{Status, StatusCause, StatusDetails};
    use rstest::rstest;

    use super::*;

    #[rstest]
    fn unique_names_are_distinct_and_label_safe() {
        let first = unique_workload_name("ubuntu:20.04");
        let second = unique_workload_name("ubuntu:20.04");
        assert_ne!(first, second);
        assert!(first.len() <= 63);
        assert!(first.starts_with("ubuntu-20-04-"));
        assert!(
            first
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        );
    }

    #[rstest]
    fn unique_name_for_registry_image_sanitises_slashes() {
        let name = unique_workload_name("ghcr.io/acme/tool:latest");
        assert!(name.starts_with("ghcr-io-acme-tool-latest-"));
    }

    #[rstest]
    fn empty_image_falls_back_to_generic_prefix() {
        let name = unique_workload_name("::");
        assert!(name.starts_with("workload-"));
    }

    #[rstest]
    fn shell_command_without_env_wraps_verbatim() {
        let argv = shell_command("echo hi", None);
        assert_eq!(
            argv,
            vec![
                String::from("/bin/sh"),
                String::from("-c"),
                String::from("echo hi"),
            ]
        );
    }

    #[rstest]
    #[expect(clippy::expect_used, reason = "test asserts construction succeeds")]
    fn shell_command_injects_exports_before_command() {
        let env = EnvironmentMap::from_pairs([("X", "1")]).expect("pairs should validate");
        let argv = shell_command("echo $X", Some(&env));
        assert_eq!(
            argv.last().map(String::as_str),
            Some("export X=1; echo $X")
        );
    }

    #[rstest]
    #[expect(clippy::expect_used, reason = "test asserts construction succeeds")]
    fn shell_command_quotes_values_with_spaces() {
        let env =
            EnvironmentMap::from_pairs([("GREETING", "hello world")]).expect("pairs should validate");
        let argv = shell_command("env", Some(&env));
        assert_eq!(
            argv.last().map(String::as_str),
            Some("export GREETING='hello world'; env")
        );
    }

    #[rstest]
    #[case("plain text", "plain text")]
    #[case("line\r\n", "line\n")]
    #[case("\u{1b}[31mred\u{1b}[0m", "red")]
    fn scrub_output_removes_styling(#[case] raw: &str, #[case] expected: &str) {
        assert_eq!(scrub_output(raw), expected);
    }

    fn non_zero_status(code: &str) -> Status {
        Status {
            status: Some(String::from("Failure")),
            reason: Some(String::from("NonZeroExitCode")),
            details: Some(StatusDetails {
                causes: Some(vec![StatusCause {
                    reason: Some(String::from("ExitCode")),
                    message: Some(String::from(code)),
                    ..StatusCause::default()
                }]),
                ..StatusDetails::default()
            }),
            ..Status::default()
        }
    }

    #[rstest]
    fn success_status_maps_to_zero() {
        let status = Status {
            status: Some(String::from("Success")),
            ..Status::default()
        };
        assert_eq!(exit_code_from_exec_status(Some(&status)), Some(0));
    }

    #[rstest]
    fn non_zero_status_yields_the_reported_code() {
        let status = non_zero_status("7");
        assert_eq!(exit_code_from_exec_status(Some(&status)), Some(7));
    }

    #[rstest]
    fn unparseable_exit_code_yields_none() {
        let status = non_zero_status("not-a-number");
        assert_eq!(exit_code_from_exec_status(Some(&status)), None);
    }

    #[rstest]
    fn missing_status_yields_none() {
        assert_eq!(exit_code_from_exec_status(None), None);
    }

    #[rstest]
    #[case("/work/data.txt", "/work", "data.txt")]
    #[case("/data.txt", "/", "data.txt")]
    #[case("data.txt", "/", "data.txt")]
    fn split_destination_separates_dir_and_name(
        #[case] dest: &str,
        #[case] expected_dir: &str,
        #[case] expected_name: &str,
    ) {
        let (dir, name) = split_destination(dest);
        assert_eq!(dir, expected_dir);
        assert_eq!(name, expected_name);
    }

    #[rstest]
    #[expect(clippy::expect_used, reason = "test asserts archive round-trip")]
    fn archive_contains_the_file_under_entry_name() {
        use std::io::Read;

        let temp = tempfile::tempdir().expect("tempdir should be created");
        let temp_path = camino::Utf8PathBuf::from_path_buf(temp.path().join("patch.diff"))
            .expect("path should be utf8");
        std::fs::write(&temp_path, b"--- a\n+++ b\n").expect("write should succeed");

        let archive_bytes =
            build_single_file_archive(&temp_path, "patch.diff").expect("archive should build");

        let mut archive = tar::Archive::new(archive_bytes.as_slice());
        let mut entries = archive.entries().expect("entries should parse");
        let mut entry = entries
            .next()
            .expect("archive should hold one entry")
            .expect("entry should parse");
        assert_eq!(
            entry.path().expect("entry path should parse").to_string_lossy(),
            "patch.diff"
        );
        let mut contents = String::new();
        entry
            .read_to_string(&mut contents)
            .expect("entry should read");
        assert_eq!(contents, "--- a\n+++ b\n");
    }
}
