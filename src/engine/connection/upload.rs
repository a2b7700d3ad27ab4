//! File upload into container filesystems using tar archives.
//!
//! The engine's archive endpoint expects a tar stream extracted into a
//! target directory; archive assembly is shared with the cluster backend in
//! [`crate::command`].

use std::future::Future;
use std::pin::Pin;

use bollard::query_parameters::{UploadToContainerOptions, UploadToContainerOptionsBuilder};
use bollard::{Docker, body_full};
use camino::Utf8Path;

use super::EngineConnector;
use crate::command::{build_single_file_archive, split_destination};
use crate::error::{ContainerError, KodoError};

/// Boxed future type returned by [`ContainerUploader`] implementors.
pub type UploadToContainerFuture<'a> =
    Pin<Box<dyn Future<Output = Result<(), bollard::errors::Error>> + Send + 'a>>;

/// Behaviour required to upload an archive payload into a container.
///
/// This abstraction keeps upload logic testable without a live daemon.
pub trait ContainerUploader {
    /// Upload a tar archive payload into `container_id`.
    fn upload_to_container(
        &self,
        container_id: &str,
        options: Option<UploadToContainerOptions>,
        archive_bytes: Vec<u8>,
    ) -> UploadToContainerFuture<'_>;
}

impl ContainerUploader for Docker {
    fn upload_to_container(
        &self,
        container_id: &str,
        options: Option<UploadToContainerOptions>,
        archive_bytes: Vec<u8>,
    ) -> UploadToContainerFuture<'_> {
        let container_id_owned = String::from(container_id);

        Box::pin(async move {
            Self::upload_to_container(
                self,
                &container_id_owned,
                options,
                body_full(archive_bytes.into()),
            )
            .await
        })
    }
}

impl EngineConnector {
    /// Copy a host file into a running container.
    ///
    /// # Errors
    ///
    /// Returns `ContainerError::UploadFailed` when the host file cannot be
    /// read or the engine rejects the archive.
    pub async fn upload_file<C: ContainerUploader>(
        client: &C,
        container_id: &str,
        local_path: &Utf8Path,
        dest_path: &str,
    ) -> Result<(), KodoError> {
        let (dest_dir, entry_name) = split_destination(dest_path);

        let archive = build_single_file_archive(local_path, &entry_name).map_err(|error| {
            upload_failed(container_id, format!("failed to read {local_path}: {error}"))
        })?;

        let options = UploadToContainerOptionsBuilder::default()
            .path(&dest_dir)
            .build();
        client
            .upload_to_container(container_id, Some(options), archive)
            .await
            .map_err(|error| upload_failed(container_id, error.to_string()))
    }
}

fn upload_failed(container_id: &str, message: impl Into<String>) -> KodoError {
    KodoError::from(ContainerError::UploadFailed {
        container_id: String::from(container_id),
        message: message.into(),
    })
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use camino::Utf8PathBuf;
    use rstest::rstest;

    use super::*;

    struct CapturingUploader {
        paths: Arc<Mutex<Vec<String>>>,
    }

    impl ContainerUploader for CapturingUploader {
        fn upload_to_container(
            &self,
            _container_id: &str,
            options: Option<UploadToContainerOptions>,
            _archive_bytes: Vec<u8>,
        ) -> UploadToContainerFuture<'_> {
            if let (Ok(mut paths), Some(opts)) = (self.paths.lock(), options) {
                paths.push(format!("{opts:?}"));
            }
            Box::pin(async { Ok(()) })
        }
    }

    #[rstest]
    #[expect(clippy::expect_used, reason = "test asserts the happy path")]
    fn upload_targets_destination_directory() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let temp_path = Utf8PathBuf::from_path_buf(temp.path().join("data.txt"))
            .expect("path should be utf8");
        std::fs::write(&temp_path, b"payload").expect("write should succeed");

        let paths = Arc::new(Mutex::new(Vec::new()));
        let client = CapturingUploader {
            paths: Arc::clone(&paths),
        };

        let runtime = tokio::runtime::Runtime::new().expect("runtime should build");
        runtime
            .block_on(EngineConnector::upload_file(
                &client,
                "abc123",
                &temp_path,
                "/work/data.txt",
            ))
            .expect("upload should succeed");

        let recorded = paths.lock().expect("mutex should not be poisoned");
        assert_eq!(recorded.len(), 1);
        assert!(recorded.first().is_some_and(|options| options.contains("/work")));
    }

    #[rstest]
    fn missing_local_file_maps_to_upload_failed() {
        let client = CapturingUploader {
            paths: Arc::new(Mutex::new(Vec::new())),
        };
        let runtime = match tokio::runtime::Runtime::new() {
            Ok(runtime) => runtime,
            Err(_) => return,
        };
        let result = runtime.block_on(EngineConnector::upload_file(
            &client,
            "abc123",
            Utf8Path::new("/nonexistent/file.txt"),
            "/work/file.txt",
        ));
        assert!(matches!(
            result,
            Err(KodoError::Container(ContainerError::UploadFailed { .. }))
        ));
    }
}
