//! Host lifecycle orchestration.
//!
//! [`FunctionApplicationFactory`] owns one `func start` process. `start` picks
//! a port, spawns the host in the located project directory and races its
//! exit against the startup deadline and an optional health check. `stop`
//! kills the process tree and reports a host that had already failed.
//!
//! ```text
//! NotStarted ─start─▶ Starting ─ready─▶ Running ─stop─▶ Stopping ─▶ Stopped
//!                        │                                            │
//!                        └──failed──▶ Failed ◀────────── start ───────┘
//! ```

mod launch;
mod race;

pub use launch::PortSubstitution;

use crate::cancel::CancellationToken;
use crate::cmdline::{self, CommandOption};
use crate::config::{FactorySettings, HostConfig, NetworkConfig};
use crate::error::{FuncTestError, Result};
use crate::locator::FunctionLocator;
use crate::network::{self, HealthProbe, HostClient, ReqwestProbe};
use crate::process::{Executable, ExecutableOptions, LineCallback, ProcessExit};
use futures::FutureExt;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};
use url::Url;

/// Lifecycle state of the supervised host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum HostState {
    NotStarted,
    Starting,
    Running,
    Stopping,
    Stopped,
    Failed,
}

/// Starts, probes and stops a local Azure Functions host for a test suite.
pub struct FunctionApplicationFactory {
    options: Vec<CommandOption>,
    startup_directory: PathBuf,
    settings: FactorySettings,
    use_https: bool,
    verbose: bool,
    health_probe: Option<Arc<dyn HealthProbe>>,
    on_stdout: LineCallback,
    on_stderr: LineCallback,
    state: HostState,
    port: Option<u16>,
    launch_args: Vec<String>,
    port_substitution: Option<PortSubstitution>,
    host: Option<Executable>,
}

impl std::fmt::Debug for FunctionApplicationFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FunctionApplicationFactory")
            .field("startup_directory", &self.startup_directory)
            .field("state", &self.state)
            .field("port", &self.port)
            .field("launch_args", &self.launch_args)
            .field("host", &self.host)
            .finish_non_exhaustive()
    }
}

impl FunctionApplicationFactory {
    /// Create a factory for the project found by `locator`.
    ///
    /// `args` are passed to `func start` after the `start` command. They are
    /// parsed here but validated on [`start`](Self::start).
    pub fn new<I, S>(
        locator: &dyn FunctionLocator,
        args: I,
        settings: FactorySettings,
    ) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let startup_directory = locator.startup_directory()?;
        Ok(Self::in_directory(startup_directory, args, settings))
    }

    /// Create a factory that starts the host in `startup_directory`.
    pub fn in_directory<I, S>(
        startup_directory: impl Into<PathBuf>,
        args: I,
        settings: FactorySettings,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let options = cmdline::parse(args);
        let use_https = launch::has_switch(&options, HostConfig::HTTPS_KEY);
        let verbose = settings.verbose || launch::has_switch(&options, HostConfig::VERBOSE_KEY);

        let on_stdout: LineCallback = Arc::new(|line: &str| println!("{line}"));
        let on_stderr: LineCallback = Arc::new(|line: &str| eprintln!("{line}"));

        Self {
            options,
            startup_directory: startup_directory.into(),
            settings,
            use_https,
            verbose,
            health_probe: None,
            on_stdout,
            on_stderr,
            state: HostState::NotStarted,
            port: None,
            launch_args: Vec::new(),
            port_substitution: None,
            host: None,
        }
    }

    /// Replace the HTTP probe used by the health check.
    pub fn with_health_probe(mut self, probe: Arc<dyn HealthProbe>) -> Self {
        self.health_probe = Some(probe);
        self
    }

    /// Send host output somewhere other than this process's stdout/stderr.
    pub fn with_output(mut self, on_stdout: LineCallback, on_stderr: LineCallback) -> Self {
        self.on_stdout = on_stdout;
        self.on_stderr = on_stderr;
        self
    }

    pub fn state(&self) -> HostState {
        self.state
    }

    pub fn settings(&self) -> &FactorySettings {
        &self.settings
    }

    pub fn startup_directory(&self) -> &Path {
        &self.startup_directory
    }

    /// Caller options as parsed, without `start` or port rewriting.
    pub fn options(&self) -> &[CommandOption] {
        &self.options
    }

    /// Port selected by the last `start`.
    pub fn port(&self) -> Option<u16> {
        self.port
    }

    /// Arguments passed to `func` by the last `start`.
    pub fn launch_args(&self) -> &[String] {
        &self.launch_args
    }

    /// Set when the requested port was busy and another one was used.
    pub fn port_substitution(&self) -> Option<PortSubstitution> {
        self.port_substitution
    }

    pub fn uses_https(&self) -> bool {
        self.use_https
    }

    pub fn is_verbose(&self) -> bool {
        self.verbose
    }

    /// Pid of the running host.
    pub fn pid(&self) -> Option<u32> {
        self.host.as_ref().and_then(Executable::pid)
    }

    /// `http(s)://localhost:<port>` for the selected port.
    pub fn base_url(&self) -> Result<Url> {
        let port = self.port.ok_or(FuncTestError::NotStarted)?;
        let scheme = if self.use_https { "https" } else { "http" };
        Url::parse(&format!("{}://{}:{}", scheme, NetworkConfig::LOCALHOST, port)).map_err(|e| {
            FuncTestError::Config {
                message: format!("Invalid base address: {}", e),
            }
        })
    }

    /// Start the host. Does nothing when it is already running.
    pub async fn start(&mut self) -> Result<()> {
        if self.state == HostState::Running {
            return Ok(());
        }

        // A host left behind by a failed health check.
        if let Some(mut stale) = self.host.take() {
            stale.dispose();
        }

        self.state = HostState::Starting;
        match self.launch().await {
            Ok(()) => {
                self.state = HostState::Running;
                info!("Host running at {}", self.base_url()?);
                Ok(())
            }
            Err(e) => {
                self.state = HostState::Failed;
                if matches!(e, FuncTestError::StartupFailed { .. }) {
                    if let Some(mut host) = self.host.take() {
                        host.dispose();
                    }
                }
                Err(e)
            }
        }
    }

    async fn launch(&mut self) -> Result<()> {
        let plan = launch::plan_launch(
            &self.options,
            network::is_port_available,
            network::find_available_port,
        )?;
        self.port = Some(plan.port);
        self.port_substitution = plan.substitution;
        self.launch_args = plan.args();

        let health_check = self.health_check()?;
        let program = resolve_executable(self.settings.executable_path.as_deref(), || {
            which::which(HostConfig::FUNC_COMMAND).ok()
        })?;

        if let Some(substitution) = plan.substitution {
            if self.verbose {
                info!(
                    "Switching from port {} to {} as port {} is unavailable",
                    substitution.requested, substitution.assigned, substitution.requested
                );
            } else {
                debug!(
                    "Switching from port {} to {} as port {} is unavailable",
                    substitution.requested, substitution.assigned, substitution.requested
                );
            }
        }

        let mut host = Executable::new(program, self.launch_args.clone(), self.host_options());
        if !self.verbose {
            debug!("Executing {}", host.command_line());
        }
        host.start(
            Some(Arc::clone(&self.on_stdout)),
            Some(Arc::clone(&self.on_stderr)),
            None,
        )
        .await?;

        let exit = host
            .wait_for_exit()
            .map(|exit| exit.unwrap_or(ProcessExit::Terminated));
        self.host = Some(host);

        let cancel = CancellationToken::new();
        let attempts = self.settings.health_check_max_attempts;
        let health = health_check.map(|(url, probe)| {
            let cancel = &cancel;
            async move {
                network::wait_until_healthy(
                    probe.as_ref(),
                    &url,
                    attempts,
                    NetworkConfig::HEALTH_CHECK_INTERVAL,
                    cancel,
                )
                .await
            }
        });

        race::race_startup(exit, self.settings.startup_delay, health, &cancel).await
    }

    /// Resolve the health-check target and probe, if one is configured.
    ///
    /// Runs before the host is spawned so bad settings never leave a process
    /// behind.
    fn health_check(&self) -> Result<Option<(Url, Arc<dyn HealthProbe>)>> {
        let Some(endpoint) = &self.settings.health_check_endpoint else {
            return Ok(None);
        };
        if self.settings.health_check_max_attempts == 0 {
            return Err(FuncTestError::Config {
                message: "health-check-max-attempts must be at least 1".to_string(),
            });
        }

        let url = health_check_url(&self.base_url()?, endpoint)?;
        let probe: Arc<dyn HealthProbe> = match &self.health_probe {
            Some(probe) => Arc::clone(probe),
            None => Arc::new(ReqwestProbe::new()?),
        };
        Ok(Some((url, probe)))
    }

    fn host_options(&self) -> ExecutableOptions {
        ExecutableOptions::new()
            .with_working_dir(&self.startup_directory)
            .with_echo_command(self.verbose)
    }

    /// Stop the host.
    ///
    /// The process tree is killed and given `shutdown_delay` to exit. A host
    /// that had already exited with a positive code is reported as
    /// [`FuncTestError::StoppedPrematurely`]; the handle is released either
    /// way. Stopping a factory with no live host does nothing.
    pub async fn stop(&mut self) -> Result<()> {
        let Some(mut host) = self.host.take() else {
            return Ok(());
        };

        self.state = HostState::Stopping;
        let probe = host.try_get_exit_code(self.settings.shutdown_delay).await;
        host.dispose();
        self.state = HostState::Stopped;

        let probe = probe?;
        if !probe.exited {
            warn!("Host did not exit within {:?}", self.settings.shutdown_delay);
        }
        match probe.code {
            Some(code) if code > 0 => Err(FuncTestError::StoppedPrematurely { exit_code: code }),
            _ => Ok(()),
        }
    }

    /// Start the host if needed and return a client bound to it.
    pub async fn create_client(&mut self) -> Result<HostClient> {
        self.start().await?;
        HostClient::new(self.base_url()?, self.settings.default_client_timeout)
    }

    /// Kill the host without waiting for it. Never fails.
    pub fn dispose(&mut self) {
        if let Some(mut host) = self.host.take() {
            host.dispose();
        }
    }
}

impl Drop for FunctionApplicationFactory {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// Join `endpoint` onto `base`, refusing anything that leaves the host.
fn health_check_url(base: &Url, endpoint: &str) -> Result<Url> {
    let invalid = |reason: String| FuncTestError::Config {
        message: format!("Invalid health check endpoint '{}': {}", endpoint, reason),
    };

    let url = base.join(endpoint).map_err(|e| invalid(e.to_string()))?;
    let same_origin = url.scheme() == base.scheme()
        && url.host_str() == base.host_str()
        && url.port_or_known_default() == base.port_or_known_default();
    if !same_origin {
        return Err(invalid(format!("must stay on {}", base.origin().ascii_serialization())));
    }
    Ok(url)
}

/// Pick the `func` executable: an existing explicit path, else `search`.
fn resolve_executable<F>(explicit: Option<&Path>, search: F) -> Result<PathBuf>
where
    F: FnOnce() -> Option<PathBuf>,
{
    if let Some(path) = explicit {
        if path.is_file() {
            return Ok(path.to_path_buf());
        }
        debug!("Configured executable {} does not exist, searching PATH", path.display());
    }

    search().ok_or_else(|| FuncTestError::ToolNotFound {
        tool: HostConfig::FUNC_COMMAND.to_string(),
    })
}
