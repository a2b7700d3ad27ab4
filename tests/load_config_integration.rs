//! Integration tests for the `load_config()` public API.
//!
//! These tests validate the end-to-end behaviour of `load_config()` from the
//! `kodo::config` module, testing CLI argument parsing through to final
//! configuration values.

use std::io::Write;

use camino::Utf8PathBuf;
use kodo::config::{Cli, Commands, DockerArgs, env_var_names, load_config};
use serial_test::serial;
use tempfile::NamedTempFile;

/// Clears all `KODO_*` environment variables to ensure test isolation.
///
/// Uses [`env_var_names()`] from the loader to stay in sync with the actual
/// environment variable mappings; `KODO_CONFIG_PATH` is cleared separately as
/// it is handled by the config discovery mechanism.
///
/// # Safety
///
/// This function uses `std::env::remove_var` which is unsafe in Rust 2024.
/// It is safe to call in the context of these tests because:
/// - All tests that modify environment state are marked `#[serial]`
/// - No concurrent access to these environment variables is occurring
fn clear_kodo_env() {
    for var in env_var_names() {
        // SAFETY: Tests are run serially via `#[serial]` attribute,
        // preventing concurrent access to environment variables.
        unsafe {
            std::env::remove_var(var);
        }
    }
    // SAFETY: As above; tests are serialised.
    unsafe {
        std::env::remove_var("KODO_CONFIG_PATH");
    }
}

/// Helper: Creates a CLI struct with a config file path.
///
/// Uses the `docker` subcommand with a fixed image; the image always lands
/// in the merged configuration via the CLI override layer.
fn cli_with_config(config_path: Option<Utf8PathBuf>) -> Cli {
    Cli {
        config: config_path,
        engine_socket: None,
        command: Commands::Docker(DockerArgs {
            image: String::from("test-image:v1"),
            name: None,
            cmd: String::from("echo test"),
            env: None,
        }),
    }
}

/// Helper: Creates a temporary config file with the given TOML content.
///
/// # Errors
///
/// Returns an error if the temporary file cannot be created or written to.
fn temp_config_file(content: &str) -> std::io::Result<NamedTempFile> {
    let mut file = NamedTempFile::new()?;
    file.write_all(content.as_bytes())?;
    Ok(file)
}

#[test]
#[serial]
fn load_config_returns_defaults_when_no_sources_provided() {
    clear_kodo_env();

    let cli = cli_with_config(None);
    let config = load_config(&cli).expect("load_config should succeed with defaults");

    assert!(config.engine_socket.is_none());
    assert_eq!(config.kubernetes.namespace, "default");
    assert!(config.docker.auto_remove);
    assert!(!config.proxy.enabled);
    assert_eq!(config.timeouts.exec_secs, 300);
    // The subcommand image travels through the CLI layer.
    assert_eq!(config.image.as_deref(), Some("test-image:v1"));
}

#[test]
#[serial]
fn load_config_loads_from_config_file() {
    clear_kodo_env();

    let toml_content = r#"
        engine_socket = "unix:///from/config/file.sock"

        [kubernetes]
        namespace = "workers"

        [docker]
        auto_remove = false
    "#;
    let config_file = temp_config_file(toml_content).expect("failed to create temp config");
    let config_path = Utf8PathBuf::try_from(config_file.path().to_path_buf())
        .expect("path should be valid UTF-8");

    let cli = cli_with_config(Some(config_path));
    let config = load_config(&cli).expect("load_config should succeed");

    assert_eq!(
        config.engine_socket.as_deref(),
        Some("unix:///from/config/file.sock")
    );
    assert_eq!(config.kubernetes.namespace, "workers");
    assert!(!config.docker.auto_remove);
    // Defaults should still apply for unset fields.
    assert_eq!(config.kubernetes.cpu_request, "1");
}

#[test]
#[serial]
fn load_config_env_overrides_file() {
    clear_kodo_env();

    let toml_content = r#"
        [kubernetes]
        namespace = "from-file"
    "#;
    let config_file = temp_config_file(toml_content).expect("failed to create temp config");
    let config_path = Utf8PathBuf::try_from(config_file.path().to_path_buf())
        .expect("path should be valid UTF-8");

    // SAFETY: Tests are run serially via `#[serial]` attribute.
    unsafe {
        std::env::set_var("KODO_KUBERNETES_NAMESPACE", "from-env");
    }

    let cli = cli_with_config(Some(config_path));
    let result = load_config(&cli);
    clear_kodo_env();

    let config = result.expect("load_config should succeed");
    assert_eq!(config.kubernetes.namespace, "from-env");
}

#[test]
#[serial]
fn load_config_cli_socket_overrides_everything() {
    clear_kodo_env();

    // SAFETY: Tests are run serially via `#[serial]` attribute.
    unsafe {
        std::env::set_var("KODO_ENGINE_SOCKET", "unix:///from/env.sock");
    }

    let mut cli = cli_with_config(None);
    cli.engine_socket = Some(String::from("unix:///from/cli.sock"));
    let result = load_config(&cli);
    clear_kodo_env();

    let config = result.expect("load_config should succeed");
    assert_eq!(config.engine_socket.as_deref(), Some("unix:///from/cli.sock"));
}

#[test]
#[serial]
fn load_config_rejects_invalid_typed_env_values() {
    clear_kodo_env();

    // SAFETY: Tests are run serially via `#[serial]` attribute.
    unsafe {
        std::env::set_var("KODO_DOCKER_AUTO_REMOVE", "maybe");
    }

    let cli = cli_with_config(None);
    let result = load_config(&cli);
    clear_kodo_env();

    assert!(result.is_err(), "invalid bool value should fail fast");
}

#[test]
#[serial]
fn load_config_rejects_invalid_numeric_env_values() {
    clear_kodo_env();

    // SAFETY: Tests are run serially via `#[serial]` attribute.
    unsafe {
        std::env::set_var("KODO_PROXY_PORT", "not-a-port");
    }

    let cli = cli_with_config(None);
    let result = load_config(&cli);
    clear_kodo_env();

    assert!(result.is_err(), "invalid integer value should fail fast");
}
