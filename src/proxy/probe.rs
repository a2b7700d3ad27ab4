//! HTTP health probe seam for the proxy tunnel.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tracing::trace;

/// Timeout applied to a single probe request.
const PROBE_TIMEOUT_SECS: u64 = 2;

/// Boxed future type returned by [`HealthProbe::probe`].
pub type ProbeFuture<'a> = Pin<Box<dyn Future<Output = bool> + Send + 'a>>;

/// Behaviour required to check a local health endpoint.
pub trait HealthProbe {
    /// Issue a GET against `url`; `true` means the endpoint answered with a
    /// success status.
    fn probe(&self, url: &str) -> ProbeFuture<'_>;
}

/// Probe backed by a `reqwest` client.
pub struct HttpHealthProbe {
    client: reqwest::Client,
}

impl HttpHealthProbe {
    /// Build a probe with a short per-request timeout.
    #[must_use]
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(PROBE_TIMEOUT_SECS))
            .build()
            .unwrap_or_default();
        Self { client }
    }
}

impl Default for HttpHealthProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthProbe for HttpHealthProbe {
    fn probe(&self, url: &str) -> ProbeFuture<'_> {
        let request = self.client.get(url);
        let url_owned = String::from(url);
        Box::pin(async move {
            match request.send().await {
                Ok(response) => response.status().is_success(),
                Err(error) => {
                    trace!(url = %url_owned, error = %error, "health probe failed");
                    false
                }
            }
        })
    }
}
