//! Local API proxy lifecycle management.
//!
//! `ProxyManager` owns one tunnel process that exposes an otherwise
//! unreachable cluster API server on a local port. The lifecycle is a small
//! state machine: spawn, poll an HTTP health endpoint with bounded attempts
//! until healthy, serve requests while the process stays alive, and stop with
//! a bounded grace period. A session that dies between calls is detected by a
//! process liveness check before use and surfaced as unavailable; restarting
//! is an explicit caller decision, never implicit.
//!
//! The spawned child is registered with kill-on-drop, so the process is
//! released on every exit path even when `stop` is never reached.

mod probe;
mod process;

#[cfg(test)]
mod tests;

pub use probe::{HealthProbe, HttpHealthProbe, ProbeFuture};
pub use process::{SystemTunnelSpawner, TunnelChild, TunnelSpawner, WaitFuture};

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::config::ProxyConfig;
use crate::error::{KodoError, ProxyError};

/// Health state of a proxy session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyHealth {
    /// Spawned, health endpoint not yet confirmed.
    Starting,
    /// Health endpoint responded; traffic can be routed.
    Healthy,
    /// Process alive but the health endpoint stopped responding.
    Unhealthy,
    /// Process terminated.
    Stopped,
}

/// One live tunnel process bound to a local port.
///
/// Owned exclusively by the [`ProxyManager`] that started it; sessions are
/// never shared across managers, which keeps port and process ownership
/// unambiguous.
pub struct ProxySession {
    local_port: u16,
    target: String,
    child: Box<dyn TunnelChild>,
    health: ProxyHealth,
}

impl ProxySession {
    /// Return the local port the tunnel listens on.
    #[must_use]
    pub const fn local_port(&self) -> u16 {
        self.local_port
    }

    /// Return a description of the tunnel target.
    #[must_use]
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Return the last observed health state.
    #[must_use]
    pub const fn health(&self) -> ProxyHealth {
        self.health
    }

    /// Return the base URL for routing API traffic through the tunnel.
    #[must_use]
    pub fn local_url(&self) -> String {
        format!("http://127.0.0.1:{}", self.local_port)
    }
}

/// Manages the lifecycle of one local proxy process.
pub struct ProxyManager<S: TunnelSpawner, P: HealthProbe> {
    config: ProxyConfig,
    spawner: S,
    probe: P,
    session: Option<ProxySession>,
}

impl ProxyManager<SystemTunnelSpawner, HttpHealthProbe> {
    /// Build a manager using the system process spawner and HTTP probe.
    #[must_use]
    pub fn new(config: ProxyConfig) -> Self {
        Self::with_parts(config, SystemTunnelSpawner, HttpHealthProbe::new())
    }
}

impl<S: TunnelSpawner, P: HealthProbe> ProxyManager<S, P> {
    /// Build a manager from explicit spawner and probe implementations.
    #[must_use]
    pub const fn with_parts(config: ProxyConfig, spawner: S, probe: P) -> Self {
        Self {
            config,
            spawner,
            probe,
            session: None,
        }
    }

    /// Return the active session, if one was started.
    #[must_use]
    pub const fn session(&self) -> Option<&ProxySession> {
        self.session.as_ref()
    }

    /// Start the tunnel process and wait for it to become healthy.
    ///
    /// Returns the existing session when one is already healthy. On any
    /// startup failure the half-started process is killed before the error
    /// is surfaced, so no child process outlives a failed start.
    ///
    /// # Errors
    ///
    /// Returns `ProxyError::SpawnFailed` when the process cannot be spawned,
    /// `ProxyError::ExitedDuringStartup` when it dies before the health
    /// endpoint responds, and `ProxyError::StartTimeout` when the bounded
    /// probe attempts are exhausted.
    pub async fn start(&mut self) -> Result<&ProxySession, KodoError> {
        if self.session.is_some() {
            if self.ensure_healthy().is_ok() {
                return self
                    .session
                    .as_ref()
                    .ok_or_else(|| KodoError::from(self.unavailable("session lost during start")));
            }
            // The previous session died; this call is the explicit restart,
            // so reap the dead process and spawn a fresh tunnel.
            if let Some(mut dead) = self.session.take() {
                terminate_child(&mut dead.child, self.config.stop_grace_secs).await;
            }
        }

        let port = self.config.port;
        let args = vec![String::from("proxy"), format!("--port={port}")];
        info!(command = %self.config.command, port, "starting API proxy");

        let child = self
            .spawner
            .spawn(&self.config.command, &args)
            .map_err(|error| {
                KodoError::from(ProxyError::SpawnFailed {
                    command: self.config.command.clone(),
                    message: error.to_string(),
                })
            })?;

        let mut session = ProxySession {
            local_port: port,
            target: format!("{} proxy", self.config.command),
            child,
            health: ProxyHealth::Starting,
        };

        match self.await_healthy(&mut session).await {
            Ok(()) => {
                session.health = ProxyHealth::Healthy;
                debug!(port, "proxy is healthy");
                self.session = Some(session);
                self.session
                    .as_ref()
                    .ok_or_else(|| KodoError::from(self.unavailable("session lost during start")))
            }
            Err(error) => {
                terminate_child(&mut session.child, self.config.stop_grace_secs).await;
                Err(error)
            }
        }
    }

    /// Poll the health endpoint until it responds or attempts are exhausted.
    async fn await_healthy(&self, session: &mut ProxySession) -> Result<(), KodoError> {
        let url = format!("{}{}", session.local_url(), self.config.health_path);
        let interval = Duration::from_millis(self.config.health_interval_ms);

        for _ in 0..self.config.health_attempts {
            if let Some(status) = session.child.try_wait().ok().flatten() {
                return Err(KodoError::from(ProxyError::ExitedDuringStartup {
                    message: status.to_string(),
                }));
            }

            if self.probe.probe(&url).await {
                return Ok(());
            }

            tokio::time::sleep(interval).await;
        }

        Err(KodoError::from(ProxyError::StartTimeout {
            attempts: self.config.health_attempts,
            port: self.config.port,
        }))
    }

    /// Verify the session's process is still alive before routing traffic.
    ///
    /// A dead process marks the session stopped and fails; the manager never
    /// restarts implicitly.
    ///
    /// # Errors
    ///
    /// Returns `ProxyError::Unavailable` when no session was started or the
    /// process has exited.
    pub fn ensure_healthy(&mut self) -> Result<(), KodoError> {
        let Some(session) = self.session.as_mut() else {
            return Err(KodoError::from(self.unavailable("proxy was never started")));
        };

        match session.child.try_wait() {
            Ok(None) => Ok(()),
            Ok(Some(status)) => {
                session.health = ProxyHealth::Stopped;
                Err(KodoError::from(self.unavailable(format!(
                    "proxy process exited: {status}"
                ))))
            }
            Err(error) => {
                session.health = ProxyHealth::Unhealthy;
                Err(KodoError::from(self.unavailable(format!(
                    "proxy liveness check failed: {error}"
                ))))
            }
        }
    }

    /// Stop the tunnel process.
    ///
    /// Terminates the process, waits up to the configured grace period for it
    /// to exit, and force-kills it if still alive. Idempotent: stopping an
    /// already-stopped manager is a no-op success.
    pub async fn stop(&mut self) {
        let Some(mut session) = self.session.take() else {
            return;
        };

        info!(port = session.local_port, "stopping API proxy");
        terminate_child(&mut session.child, self.config.stop_grace_secs).await;
        session.health = ProxyHealth::Stopped;
    }

    fn unavailable(&self, message: impl Into<String>) -> ProxyError {
        ProxyError::Unavailable {
            port: self.config.port,
            message: message.into(),
        }
    }
}

/// Kill a tunnel child and wait briefly for it to exit.
async fn terminate_child(child: &mut Box<dyn TunnelChild>, grace_secs: u64) {
    if let Err(error) = child.start_kill() {
        // An InvalidInput error means the process already exited.
        if error.kind() != std::io::ErrorKind::InvalidInput {
            warn!(error = %error, "failed to signal proxy process");
        }
    }

    let grace = Duration::from_secs(grace_secs);
    match tokio::time::timeout(grace, child.wait()).await {
        Ok(Ok(status)) => debug!(%status, "proxy process exited"),
        Ok(Err(error)) => warn!(error = %error, "failed to reap proxy process"),
        Err(_) => {
            warn!(grace_secs, "proxy process did not exit within grace period, force killing");
            if let Err(error) = child.start_kill() {
                warn!(error = %error, "force kill failed");
            }
            drop(child.wait().await);
        }
    }
}
