//! Integration tests for the CLI argument surface.
//!
//! The CLI contract is an external boundary: subcommand names, flag names,
//! and defaults are what scripts depend on, so they are pinned here with
//! `clap`'s in-process parser.

use clap::Parser;
use kodo::config::{Cli, Commands};

#[test]
fn docker_subcommand_parses_image_env_and_default_cmd() {
    let cli = Cli::try_parse_from([
        "kodo",
        "docker",
        "--image",
        "ubuntu:24.04",
        "--env",
        r#"{"X":"1"}"#,
    ])
    .expect("arguments should parse");

    let Commands::Docker(args) = cli.command else {
        panic!("expected the docker subcommand");
    };
    assert_eq!(args.image, "ubuntu:24.04");
    assert_eq!(args.env.as_deref(), Some(r#"{"X":"1"}"#));
    assert_eq!(args.cmd, "echo \"Hello from Docker!\"");
    assert!(args.name.is_none());
}

#[test]
fn docker_subcommand_requires_an_image() {
    let result = Cli::try_parse_from(["kodo", "docker"]);
    assert!(result.is_err(), "--image is required");
}

#[test]
fn kubernetes_subcommand_parses_namespace_and_node_selector() {
    let cli = Cli::try_parse_from([
        "kodo",
        "kubernetes",
        "--image",
        "ubuntu:24.04",
        "--namespace",
        "workers",
        "--node-selector",
        r#"{"kubernetes.io/os":"linux"}"#,
        "--cmd",
        "uname -a",
    ])
    .expect("arguments should parse");

    let Commands::Kubernetes(args) = cli.command else {
        panic!("expected the kubernetes subcommand");
    };
    assert_eq!(args.image, "ubuntu:24.04");
    assert_eq!(args.namespace.as_deref(), Some("workers"));
    assert_eq!(
        args.node_selector.as_deref(),
        Some(r#"{"kubernetes.io/os":"linux"}"#)
    );
    assert_eq!(args.cmd, "uname -a");
}

#[test]
fn kubernetes_subcommand_accepts_a_kubeconfig_path() {
    let cli = Cli::try_parse_from([
        "kodo",
        "kubernetes",
        "--image",
        "ubuntu:24.04",
        "--kubeconfig",
        "/home/user/.kube/config",
    ])
    .expect("arguments should parse");

    let Commands::Kubernetes(args) = cli.command else {
        panic!("expected the kubernetes subcommand");
    };
    assert_eq!(
        args.kubeconfig.as_ref().map(|p| p.as_str()),
        Some("/home/user/.kube/config")
    );
}

#[test]
fn global_flags_are_accepted_after_the_subcommand() {
    let cli = Cli::try_parse_from([
        "kodo",
        "docker",
        "--image",
        "ubuntu:24.04",
        "--engine-socket",
        "unix:///run/user/1000/docker.sock",
    ])
    .expect("arguments should parse");

    assert_eq!(
        cli.engine_socket.as_deref(),
        Some("unix:///run/user/1000/docker.sock")
    );
}
