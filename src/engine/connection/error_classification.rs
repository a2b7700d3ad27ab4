//! Error classification helpers for container engine connection failures.
//!
//! Low-level `Bollard` errors are converted into semantic `ContainerError`
//! variants so callers receive actionable diagnostics: a missing socket and
//! a permissions problem call for different fixes than a generic transport
//! failure.

use std::error::Error as _;
use std::path::Path;

use crate::error::ContainerError;

/// Extract the filesystem path from a socket URI.
///
/// Strips the scheme prefix (`unix://`, `npipe://`) to get the raw path.
/// HTTP endpoints and bare paths return `None`; they either have no
/// filesystem path or lack the scheme prefix needed for reliable extraction.
fn socket_path(socket_uri: &str) -> Option<&Path> {
    socket_uri
        .strip_prefix("unix://")
        .or_else(|| socket_uri.strip_prefix("npipe://"))
        .map(Path::new)
}

/// Classify a `Bollard` connection error into a semantic `ContainerError`.
///
/// Walks the error and its source chain looking for an I/O error kind, and
/// maps `NotFound` and `PermissionDenied` to path-carrying variants when the
/// endpoint has a filesystem path. Everything else falls back to
/// `ConnectionFailed`.
pub(super) fn classify_connection_error(
    bollard_error: &bollard::errors::Error,
    socket_uri: &str,
) -> ContainerError {
    let path = socket_path(socket_uri);
    let message = bollard_error.to_string();

    if let bollard::errors::Error::SocketNotFoundError(_) = bollard_error
        && let Some(found_path) = path
    {
        return ContainerError::SocketNotFound {
            path: found_path.to_path_buf(),
        };
    }

    match (io_error_kind(bollard_error), path) {
        (Some(std::io::ErrorKind::NotFound), Some(found_path)) => ContainerError::SocketNotFound {
            path: found_path.to_path_buf(),
        },
        (Some(std::io::ErrorKind::PermissionDenied), Some(found_path)) => {
            ContainerError::PermissionDenied {
                path: found_path.to_path_buf(),
            }
        }
        _ => ContainerError::ConnectionFailed { message },
    }
}

/// Find an `io::Error` kind on the error itself or anywhere in its source
/// chain.
fn io_error_kind(error: &bollard::errors::Error) -> Option<std::io::ErrorKind> {
    if let bollard::errors::Error::IOError { err } = error {
        return Some(err.kind());
    }

    let mut current: Option<&(dyn std::error::Error + 'static)> = error.source();
    while let Some(source) = current {
        if let Some(io_err) = source.downcast_ref::<std::io::Error>() {
            return Some(io_err.kind());
        }
        current = source.source();
    }
    None
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    fn io_not_found_maps_to_socket_not_found() {
        let error = bollard::errors::Error::IOError {
            err: std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        };
        let classified = classify_connection_error(&error, "unix:///var/run/docker.sock");
        assert!(matches!(
            classified,
            ContainerError::SocketNotFound { ref path } if path.ends_with("docker.sock")
        ));
    }

    #[rstest]
    fn io_permission_denied_maps_to_permission_denied() {
        let error = bollard::errors::Error::IOError {
            err: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        let classified = classify_connection_error(&error, "unix:///var/run/docker.sock");
        assert!(matches!(classified, ContainerError::PermissionDenied { .. }));
    }

    #[rstest]
    fn http_endpoints_fall_back_to_connection_failed() {
        let error = bollard::errors::Error::IOError {
            err: std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        };
        let classified = classify_connection_error(&error, "http://localhost:2375");
        assert!(matches!(classified, ContainerError::ConnectionFailed { .. }));
    }
}
