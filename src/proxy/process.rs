//! Process-spawn seam for the proxy tunnel.
//!
//! The manager drives child processes through small traits so lifecycle
//! behaviour (startup death, liveness, kill) can be unit-tested without
//! spawning real processes.

use std::future::Future;
use std::io;
use std::pin::Pin;
use std::process::{ExitStatus, Stdio};

use tokio::process::{Child, Command};

/// Boxed future type returned by [`TunnelChild::wait`].
pub type WaitFuture<'a> = Pin<Box<dyn Future<Output = io::Result<ExitStatus>> + Send + 'a>>;

/// Behaviour required of a spawned tunnel process.
pub trait TunnelChild: Send + Sync {
    /// Check for an exit status without blocking; `None` means still running.
    fn try_wait(&mut self) -> io::Result<Option<ExitStatus>>;

    /// Signal the process to terminate.
    fn start_kill(&mut self) -> io::Result<()>;

    /// Wait for the process to exit and reap it.
    fn wait(&mut self) -> WaitFuture<'_>;
}

impl TunnelChild for Child {
    fn try_wait(&mut self) -> io::Result<Option<ExitStatus>> {
        Self::try_wait(self)
    }

    fn start_kill(&mut self) -> io::Result<()> {
        Self::start_kill(self)
    }

    fn wait(&mut self) -> WaitFuture<'_> {
        Box::pin(async move { Self::wait(self).await })
    }
}

/// Behaviour required to spawn a tunnel process.
pub trait TunnelSpawner {
    /// Spawn `command` with `args`, returning a handle to the child.
    ///
    /// # Errors
    ///
    /// Returns an `io::Error` when the executable cannot be spawned.
    fn spawn(&self, command: &str, args: &[String]) -> io::Result<Box<dyn TunnelChild>>;
}

/// Spawner backed by `tokio::process`.
///
/// Children are registered with kill-on-drop so a dropped manager releases
/// its process on every exit path, and their stdio is discarded - the tunnel
/// speaks HTTP on its port, not on its pipes.
pub struct SystemTunnelSpawner;

impl TunnelSpawner for SystemTunnelSpawner {
    fn spawn(&self, command: &str, args: &[String]) -> io::Result<Box<dyn TunnelChild>> {
        let child = Command::new(command)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()?;
        Ok(Box::new(child))
    }
}
