//! Unit tests for the proxy lifecycle state machine.

use std::io;
use std::process::ExitStatus;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use rstest::{fixture, rstest};

use super::*;
use crate::config::ProxyConfig;
use crate::error::{KodoError, ProxyError};

/// Shared view of a fake child process state.
#[derive(Clone)]
struct ChildState {
    exit_status: Arc<Mutex<Option<ExitStatus>>>,
    kill_count: Arc<AtomicU32>,
}

impl ChildState {
    fn running() -> Self {
        Self {
            exit_status: Arc::new(Mutex::new(None)),
            kill_count: Arc::new(AtomicU32::new(0)),
        }
    }

    fn exited() -> Self {
        Self {
            exit_status: Arc::new(Mutex::new(Some(ExitStatus::default()))),
            kill_count: Arc::new(AtomicU32::new(0)),
        }
    }

    fn mark_exited(&self) {
        if let Ok(mut status) = self.exit_status.lock() {
            *status = Some(ExitStatus::default());
        }
    }

    fn kills(&self) -> u32 {
        self.kill_count.load(Ordering::SeqCst)
    }

    fn current(&self) -> Option<ExitStatus> {
        self.exit_status.lock().ok().and_then(|status| *status)
    }
}

struct FakeChild {
    state: ChildState,
}

impl TunnelChild for FakeChild {
    fn try_wait(&mut self) -> io::Result<Option<ExitStatus>> {
        Ok(self.state.current())
    }

    fn start_kill(&mut self) -> io::Result<()> {
        self.state.kill_count.fetch_add(1, Ordering::SeqCst);
        self.state.mark_exited();
        Ok(())
    }

    fn wait(&mut self) -> WaitFuture<'_> {
        let status = self.state.current().unwrap_or_default();
        Box::pin(async move { Ok(status) })
    }
}

/// Spawner handing out prepared fake children in order.
struct StubSpawner {
    children: Mutex<Vec<Box<dyn TunnelChild>>>,
    spawn_error: bool,
}

impl StubSpawner {
    fn with_child(state: ChildState) -> Self {
        Self::with_children(vec![state])
    }

    fn with_children(states: Vec<ChildState>) -> Self {
        let children = states
            .into_iter()
            .map(|state| Box::new(FakeChild { state }) as Box<dyn TunnelChild>)
            .collect();
        Self {
            children: Mutex::new(children),
            spawn_error: false,
        }
    }

    fn failing() -> Self {
        Self {
            children: Mutex::new(Vec::new()),
            spawn_error: true,
        }
    }
}

impl TunnelSpawner for StubSpawner {
    fn spawn(&self, _command: &str, _args: &[String]) -> io::Result<Box<dyn TunnelChild>> {
        if self.spawn_error {
            return Err(io::Error::new(io::ErrorKind::NotFound, "no such executable"));
        }
        self.children
            .lock()
            .ok()
            .and_then(|mut queue| {
                if queue.is_empty() {
                    None
                } else {
                    Some(queue.remove(0))
                }
            })
            .ok_or_else(|| io::Error::other("spawner exhausted"))
    }
}

/// Probe that reports healthy starting from a configured attempt.
struct StubProbe {
    healthy_from_attempt: u32,
    calls: AtomicU32,
}

impl StubProbe {
    fn healthy_from(attempt: u32) -> Self {
        Self {
            healthy_from_attempt: attempt,
            calls: AtomicU32::new(0),
        }
    }

    fn never_healthy() -> Self {
        Self::healthy_from(u32::MAX)
    }

    fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

impl HealthProbe for StubProbe {
    fn probe(&self, _url: &str) -> ProbeFuture<'_> {
        let attempt = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        let healthy = attempt >= self.healthy_from_attempt;
        Box::pin(async move { healthy })
    }
}

#[fixture]
fn fast_config() -> ProxyConfig {
    ProxyConfig {
        health_interval_ms: 1,
        health_attempts: 3,
        stop_grace_secs: 1,
        ..ProxyConfig::default()
    }
}

#[tokio::test]
#[expect(clippy::expect_used, reason = "test asserts the happy path")]
async fn start_becomes_healthy_after_probe_succeeds() {
    let state = ChildState::running();
    let mut manager = ProxyManager::with_parts(
        fast_config(),
        StubSpawner::with_child(state.clone()),
        StubProbe::healthy_from(2),
    );

    let session = manager.start().await.expect("start should succeed");

    assert_eq!(session.health(), ProxyHealth::Healthy);
    assert_eq!(session.local_port(), 8001);
    assert_eq!(session.local_url(), "http://127.0.0.1:8001");
    assert_eq!(state.kills(), 0);
}

#[tokio::test]
async fn start_fails_and_kills_child_when_process_exits_during_startup() {
    let state = ChildState::exited();
    let mut manager = ProxyManager::with_parts(
        fast_config(),
        StubSpawner::with_child(state.clone()),
        StubProbe::never_healthy(),
    );

    let result = manager.start().await;

    assert!(matches!(
        result,
        Err(KodoError::Proxy(ProxyError::ExitedDuringStartup { .. }))
    ));
    assert!(manager.session().is_none());
}

#[tokio::test]
async fn start_times_out_after_bounded_probe_attempts() {
    let state = ChildState::running();
    let probe = StubProbe::never_healthy();
    let mut manager = ProxyManager::with_parts(
        fast_config(),
        StubSpawner::with_child(state.clone()),
        probe,
    );

    let result = manager.start().await;

    assert!(matches!(
        result,
        Err(KodoError::Proxy(ProxyError::StartTimeout { attempts: 3, port: 8001 }))
    ));
    assert_eq!(manager.probe.call_count(), 3);
    // The half-started process must not linger.
    assert!(state.kills() >= 1);
}

#[tokio::test]
async fn spawn_failure_is_reported_with_the_command() {
    let mut manager = ProxyManager::with_parts(
        fast_config(),
        StubSpawner::failing(),
        StubProbe::never_healthy(),
    );

    let result = manager.start().await;

    assert!(matches!(
        result,
        Err(KodoError::Proxy(ProxyError::SpawnFailed { ref command, .. })) if command == "kubectl"
    ));
}

#[tokio::test]
#[expect(clippy::expect_used, reason = "test asserts the happy path")]
async fn ensure_healthy_detects_a_dead_process() {
    let state = ChildState::running();
    let mut manager = ProxyManager::with_parts(
        fast_config(),
        StubSpawner::with_child(state.clone()),
        StubProbe::healthy_from(1),
    );
    manager.start().await.expect("start should succeed");
    manager.ensure_healthy().expect("live process should pass");

    state.mark_exited();

    let result = manager.ensure_healthy();
    assert!(matches!(
        result,
        Err(KodoError::Proxy(ProxyError::Unavailable { port: 8001, .. }))
    ));
}

#[tokio::test]
async fn ensure_healthy_without_start_reports_unavailable() {
    let mut manager = ProxyManager::with_parts(
        fast_config(),
        StubSpawner::failing(),
        StubProbe::never_healthy(),
    );

    let result = manager.ensure_healthy();
    assert!(matches!(
        result,
        Err(KodoError::Proxy(ProxyError::Unavailable { .. }))
    ));
}

#[tokio::test]
#[expect(clippy::expect_used, reason = "test asserts explicit restart")]
async fn start_replaces_a_dead_session() {
    let first = ChildState::running();
    let second = ChildState::running();
    let mut manager = ProxyManager::with_parts(
        fast_config(),
        StubSpawner::with_children(vec![first.clone(), second.clone()]),
        StubProbe::healthy_from(1),
    );
    manager.start().await.expect("first start should succeed");

    first.mark_exited();
    assert!(manager.ensure_healthy().is_err());

    let session = manager.start().await.expect("restart should succeed");
    assert_eq!(session.health(), ProxyHealth::Healthy);
    assert_eq!(second.kills(), 0);
}

#[tokio::test]
#[expect(clippy::expect_used, reason = "test asserts the happy path")]
async fn stop_is_idempotent() {
    let state = ChildState::running();
    let mut manager = ProxyManager::with_parts(
        fast_config(),
        StubSpawner::with_child(state.clone()),
        StubProbe::healthy_from(1),
    );
    manager.start().await.expect("start should succeed");

    manager.stop().await;
    assert_eq!(state.kills(), 1);
    assert!(manager.session().is_none());

    // A second stop, and a stop without a session, are no-op successes.
    manager.stop().await;
    assert_eq!(state.kills(), 1);
}
