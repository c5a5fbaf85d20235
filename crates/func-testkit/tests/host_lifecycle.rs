//! Integration tests for the FunctionApplicationFactory lifecycle.
//!
//! A shell script stands in for `func`, so these run without the Functions
//! tooling installed.
#![cfg(unix)]

use async_trait::async_trait;
use func_testkit::{
    FactorySettings, FuncTestError, FunctionApplicationFactory, HealthProbe, HostState,
    LineCallback, PathLocator,
};
use std::net::TcpListener;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tempfile::TempDir;
use url::Url;

/// Write an executable `func` script into `dir`.
fn fake_func(dir: &Path, body: &str) -> PathBuf {
    let path = dir.join("func");
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    let mut permissions = std::fs::metadata(&path).unwrap().permissions();
    permissions.set_mode(0o755);
    std::fs::set_permissions(&path, permissions).unwrap();
    path
}

fn settings(func: &Path) -> FactorySettings {
    FactorySettings::new()
        .with_executable_path(func)
        .with_startup_delay(Duration::from_millis(300))
        .with_shutdown_delay(Duration::from_secs(2))
}

fn factory(dir: &TempDir, args: &[&str], settings: FactorySettings) -> FunctionApplicationFactory {
    let locator = PathLocator::new(dir.path()).unwrap();
    FunctionApplicationFactory::new(&locator, args, settings).unwrap()
}

fn free_port() -> u16 {
    TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

/// Probe that fails a fixed number of times before succeeding.
struct CountingProbe {
    failures: u32,
    calls: AtomicU32,
}

impl CountingProbe {
    fn new(failures: u32) -> Arc<Self> {
        Arc::new(Self {
            failures,
            calls: AtomicU32::new(0),
        })
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HealthProbe for CountingProbe {
    async fn probe(&self, _url: &Url) -> func_testkit::Result<()> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.failures {
            Err(FuncTestError::Other("connection refused".into()))
        } else {
            Ok(())
        }
    }
}

#[tokio::test]
async fn test_start_and_stop_running_host() {
    let dir = TempDir::new().unwrap();
    let func = fake_func(dir.path(), "echo \"Host started in $(pwd)\"\nsleep 30");

    let lines = Arc::new(Mutex::new(Vec::<String>::new()));
    let sink = Arc::clone(&lines);
    let on_stdout: LineCallback = Arc::new(move |line: &str| sink.lock().unwrap().push(line.to_string()));
    let on_stderr: LineCallback = Arc::new(|_: &str| {});

    let port = free_port();
    let port_arg = port.to_string();
    let mut factory = factory(&dir, &["--port", &port_arg, "--cors", "*"], settings(&func))
        .with_output(on_stdout, on_stderr);

    factory.start().await.unwrap();
    assert_eq!(factory.state(), HostState::Running);
    assert_eq!(factory.port(), Some(port));
    assert!(factory.port_substitution().is_none());
    assert_eq!(factory.launch_args()[0], "start");
    assert!(factory.launch_args().contains(&port_arg));
    assert_eq!(
        factory.base_url().unwrap().as_str(),
        format!("http://localhost:{port}/")
    );

    // Starting a running host does nothing.
    let pid = factory.pid();
    factory.start().await.unwrap();
    assert_eq!(factory.pid(), pid);

    let deadline = Instant::now() + Duration::from_secs(5);
    while lines.lock().unwrap().is_empty() && Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(lines.lock().unwrap()[0].starts_with("Host started in"));

    factory.stop().await.unwrap();
    assert_eq!(factory.state(), HostState::Stopped);
    assert!(factory.pid().is_none());

    // Stop is idempotent.
    factory.stop().await.unwrap();
    assert_eq!(factory.state(), HostState::Stopped);
}

#[tokio::test]
async fn test_early_exit_fails_startup() {
    let dir = TempDir::new().unwrap();
    let func = fake_func(dir.path(), "echo 'No job functions found' >&2\nexit 3");
    let mut factory = factory(&dir, &[], settings(&func).with_startup_delay(Duration::from_secs(10)));

    let started = Instant::now();
    let err = factory.start().await.unwrap_err();

    assert!(matches!(err, FuncTestError::StartupFailed { exit_code: Some(3) }));
    assert!(started.elapsed() < Duration::from_secs(10));
    assert_eq!(factory.state(), HostState::Failed);

    // Nothing left to stop.
    factory.stop().await.unwrap();
    assert_eq!(factory.state(), HostState::Failed);
}

#[tokio::test]
async fn test_busy_port_is_substituted() {
    let dir = TempDir::new().unwrap();
    let func = fake_func(dir.path(), "sleep 30");

    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let busy = listener.local_addr().unwrap().port();
    let busy_arg = busy.to_string();

    let mut factory = factory(&dir, &["-p", &busy_arg], settings(&func));
    factory.start().await.unwrap();

    let substitution = factory.port_substitution().unwrap();
    assert_eq!(substitution.requested, busy);
    assert_ne!(substitution.assigned, busy);
    assert_eq!(factory.port(), Some(substitution.assigned));

    let args = factory.launch_args();
    assert!(!args.contains(&busy_arg));
    let index = args.iter().position(|a| a == "--port").unwrap();
    assert_eq!(args[index + 1], substitution.assigned.to_string());

    factory.stop().await.unwrap();
}

#[tokio::test]
async fn test_health_check_success_skips_deadline() {
    let dir = TempDir::new().unwrap();
    let func = fake_func(dir.path(), "sleep 30");
    let probe = CountingProbe::new(1);

    let mut factory = factory(
        &dir,
        &[],
        settings(&func)
            .with_startup_delay(Duration::from_secs(30))
            .with_health_check_endpoint("/api/health"),
    )
    .with_health_probe(probe.clone());

    let started = Instant::now();
    factory.start().await.unwrap();

    assert!(started.elapsed() < Duration::from_secs(10));
    assert_eq!(probe.calls(), 2);
    assert_eq!(factory.state(), HostState::Running);

    factory.stop().await.unwrap();
}

#[tokio::test]
async fn test_health_check_exhaustion_leaves_host_for_stop() {
    let dir = TempDir::new().unwrap();
    let func = fake_func(dir.path(), "sleep 30");
    let probe = CountingProbe::new(u32::MAX);

    let mut factory = factory(
        &dir,
        &[],
        settings(&func)
            .with_startup_delay(Duration::from_secs(30))
            .with_health_check_endpoint("/api/health")
            .with_health_check_max_attempts(2),
    )
    .with_health_probe(probe.clone());

    let err = factory.start().await.unwrap_err();
    assert!(matches!(err, FuncTestError::HealthCheckExhausted { attempts: 2, .. }));
    assert_eq!(probe.calls(), 2);
    assert_eq!(factory.state(), HostState::Failed);
    assert!(factory.pid().is_some());

    factory.stop().await.unwrap();
    assert_eq!(factory.state(), HostState::Stopped);
    assert!(factory.pid().is_none());
}

#[tokio::test]
async fn test_host_exiting_while_running_is_reported_on_stop() {
    let dir = TempDir::new().unwrap();
    let func = fake_func(dir.path(), "sleep 1\nexit 2");
    let mut factory = factory(&dir, &[], settings(&func));

    factory.start().await.unwrap();
    tokio::time::sleep(Duration::from_millis(1500)).await;

    let err = factory.stop().await.unwrap_err();
    assert_eq!(err.exit_code(), Some(2));
    assert!(matches!(err, FuncTestError::StoppedPrematurely { exit_code: 2 }));
    assert_eq!(factory.state(), HostState::Stopped);
}

#[tokio::test]
async fn test_restart_after_stop() {
    let dir = TempDir::new().unwrap();
    let func = fake_func(dir.path(), "sleep 30");
    let mut factory = factory(&dir, &[], settings(&func));

    factory.start().await.unwrap();
    let first = factory.pid();
    factory.stop().await.unwrap();

    factory.start().await.unwrap();
    assert_eq!(factory.state(), HostState::Running);
    assert!(factory.pid().is_some());
    assert_ne!(factory.pid(), first);

    factory.stop().await.unwrap();
}

#[tokio::test]
async fn test_create_client_starts_host() {
    let dir = TempDir::new().unwrap();
    let func = fake_func(dir.path(), "sleep 30");
    let port = free_port();
    let port_arg = port.to_string();
    let mut factory = factory(
        &dir,
        &["--port", &port_arg, "--useHttps"],
        settings(&func).with_default_client_timeout(Duration::from_secs(7)),
    );

    let client = factory.create_client().await.unwrap();
    assert_eq!(factory.state(), HostState::Running);
    assert_eq!(
        client.base_url().as_str(),
        format!("https://localhost:{port}/")
    );

    factory.stop().await.unwrap();
}

#[tokio::test]
async fn test_invalid_port_fails_before_spawn() {
    let dir = TempDir::new().unwrap();
    let func = fake_func(dir.path(), "sleep 30");
    let mut factory = factory(&dir, &["-p:abc"], settings(&func));

    let err = factory.start().await.unwrap_err();
    assert!(matches!(err, FuncTestError::InvalidPort { .. }));
    assert!(factory.pid().is_none());
}

#[test]
fn test_missing_project_directory() {
    let dir = TempDir::new().unwrap();
    let err = PathLocator::new(dir.path().join("Non.Existent.Project")).unwrap_err();
    assert!(matches!(err, FuncTestError::DirectoryNotFound(_)));
}
