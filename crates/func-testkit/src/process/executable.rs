//! Supervised child process.
//!
//! An [`Executable`] spawns one program and hands the child to a watcher
//! task. The watcher is the only owner of the OS handle: it reaps the process,
//! publishes the exit through a `watch` channel and performs root kills on
//! request, so a pid is never signalled after it has been reaped.

use super::tree;
use crate::cmdline;
use crate::error::{FuncTestError, Result};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Receives one line of process output, without its line terminator.
pub type LineCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// How long `run` waits for trailing output after the process has exited.
const OUTPUT_DRAIN_TIMEOUT: Duration = Duration::from_millis(500);

#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

/// Terminal state of a supervised process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessExit {
    /// The process exited with this code.
    Code(i32),
    /// The OS reported no exit code (killed by a signal).
    Terminated,
}

impl ProcessExit {
    pub fn code(&self) -> Option<i32> {
        match self {
            ProcessExit::Code(code) => Some(*code),
            ProcessExit::Terminated => None,
        }
    }
}

/// Outcome of [`Executable::try_get_exit_code`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitProbe {
    /// The process was observed to exit within the timeout.
    pub exited: bool,
    /// Exit code, when the process exited with one.
    pub code: Option<i32>,
}

/// Launch options for an [`Executable`].
#[derive(Debug, Clone)]
pub struct ExecutableOptions {
    /// Capture stdout/stderr and deliver them line by line.
    pub stream_output: bool,
    /// Inherit the caller's stdio instead of piping or discarding it.
    pub share_console: bool,
    /// Show a console window on Windows.
    pub visible_window: bool,
    /// Working directory; the current directory when unset.
    pub working_dir: Option<PathBuf>,
    /// Log the full command line before spawning.
    pub echo_command: bool,
}

impl Default for ExecutableOptions {
    fn default() -> Self {
        Self {
            stream_output: true,
            share_console: false,
            visible_window: false,
            working_dir: None,
            echo_command: false,
        }
    }
}

impl ExecutableOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_stream_output(mut self, stream: bool) -> Self {
        self.stream_output = stream;
        self
    }

    pub fn with_share_console(mut self, share: bool) -> Self {
        self.share_console = share;
        self
    }

    pub fn with_visible_window(mut self, visible: bool) -> Self {
        self.visible_window = visible;
        self
    }

    pub fn with_working_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.working_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    pub fn with_echo_command(mut self, echo: bool) -> Self {
        self.echo_command = echo;
        self
    }
}

/// Handles to a spawned process.
struct Running {
    pid: u32,
    started_at: Instant,
    exit_rx: watch::Receiver<Option<ProcessExit>>,
    kill: Arc<Notify>,
    readers: Vec<JoinHandle<()>>,
}

impl Running {
    fn exit_status(&self) -> Option<ProcessExit> {
        *self.exit_rx.borrow()
    }

    fn exit_signal(&self) -> impl std::future::Future<Output = ProcessExit> + Send + 'static {
        let mut rx = self.exit_rx.clone();
        async move {
            match rx.wait_for(Option::is_some).await {
                Ok(exit) => (*exit).unwrap_or(ProcessExit::Terminated),
                // Watcher gone without publishing: the runtime is shutting down.
                Err(_) => ProcessExit::Terminated,
            }
        }
    }

    fn kill_tree(&self) {
        if self.exit_status().is_some() {
            return;
        }
        let killed = tree::kill_descendants(self.pid);
        if !killed.is_empty() {
            debug!("Killed {} descendant(s) of {}", killed.len(), self.pid);
        }
        self.kill.notify_one();
    }
}

/// A program run under supervision.
pub struct Executable {
    program: PathBuf,
    args: Vec<String>,
    options: ExecutableOptions,
    running: Option<Running>,
}

impl std::fmt::Debug for Executable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Executable")
            .field("program", &self.program)
            .field("args", &self.args)
            .field("pid", &self.pid())
            .field("exit", &self.exit_status())
            .finish()
    }
}

impl Executable {
    pub fn new<I, S>(program: impl Into<PathBuf>, args: I, options: ExecutableOptions) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            options,
            running: None,
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Program and arguments as one display string.
    pub fn command_line(&self) -> String {
        let program = self.program.display().to_string();
        if self.args.is_empty() {
            cmdline::to_command_line(&[program])
        } else {
            format!(
                "{} {}",
                cmdline::to_command_line(&[program]),
                cmdline::to_command_line(&self.args)
            )
        }
    }

    /// OS process id, once started.
    pub fn pid(&self) -> Option<u32> {
        self.running.as_ref().map(|r| r.pid)
    }

    pub fn started_at(&self) -> Option<Instant> {
        self.running.as_ref().map(|r| r.started_at)
    }

    pub fn is_started(&self) -> bool {
        self.running.is_some()
    }

    /// Exit status if the process has already exited.
    pub fn exit_status(&self) -> Option<ProcessExit> {
        self.running.as_ref().and_then(Running::exit_status)
    }

    /// Spawn the process.
    ///
    /// Output lines are delivered to the callbacks in arrival order, per
    /// stream. When `stdin` is given it is written as a single line and the
    /// pipe is closed. Calling `start` on a started process does nothing.
    pub async fn start(
        &mut self,
        on_stdout: Option<LineCallback>,
        on_stderr: Option<LineCallback>,
        stdin: Option<&str>,
    ) -> Result<()> {
        if self.running.is_some() {
            warn!("{} is already started", self.program.display());
            return Ok(());
        }

        let working_dir = match &self.options.working_dir {
            Some(dir) => dir.clone(),
            None => std::env::current_dir()?,
        };

        if self.options.echo_command {
            info!("> {} (in {})", self.command_line(), working_dir.display());
        }

        let mut command = self.build_command(&working_dir, stdin.is_some());
        let mut child = command.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                FuncTestError::ExecutableNotFound {
                    program: self.program.display().to_string(),
                }
            } else {
                FuncTestError::io_with_path(e, &self.program)
            }
        })?;

        let pid = child.id().ok_or_else(|| {
            FuncTestError::Other(format!(
                "{} exited before its pid could be read",
                self.program.display()
            ))
        })?;
        debug!("Started {} (pid {})", self.program.display(), pid);

        let mut readers = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            readers.push(spawn_line_reader(stdout, on_stdout));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(spawn_line_reader(stderr, on_stderr));
        }

        let stdin_pipe = child.stdin.take();

        let (exit_tx, exit_rx) = watch::channel(None);
        let kill = Arc::new(Notify::new());
        tokio::spawn(watch_child(child, Arc::clone(&kill), exit_tx));

        self.running = Some(Running {
            pid,
            started_at: Instant::now(),
            exit_rx,
            kill,
            readers,
        });

        if let (Some(mut pipe), Some(line)) = (stdin_pipe, stdin) {
            let written = async {
                pipe.write_all(line.as_bytes()).await?;
                pipe.write_all(b"\n").await?;
                pipe.shutdown().await
            }
            .await;
            match written {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {
                    debug!("Process {} closed stdin before input was written", pid);
                }
                Err(e) => return Err(FuncTestError::io_with_path(e, &self.program)),
            }
        }

        Ok(())
    }

    fn build_command(&self, working_dir: &Path, pipe_stdin: bool) -> Command {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .current_dir(working_dir)
            .kill_on_drop(true);

        if self.options.share_console {
            command
                .stdout(Stdio::inherit())
                .stderr(Stdio::inherit())
                .stdin(if pipe_stdin {
                    Stdio::piped()
                } else {
                    Stdio::inherit()
                });
        } else {
            let output = || {
                if self.options.stream_output {
                    Stdio::piped()
                } else {
                    Stdio::null()
                }
            };
            command
                .stdout(output())
                .stderr(output())
                .stdin(if pipe_stdin {
                    Stdio::piped()
                } else {
                    Stdio::null()
                });
        }

        #[cfg(windows)]
        {
            if !self.options.visible_window && !self.options.share_console {
                command.creation_flags(CREATE_NO_WINDOW);
            }
        }

        command
    }

    /// Run to completion.
    ///
    /// Starts the process if needed, then waits for it to exit. With a
    /// `timeout`, the whole tree is killed when it elapses and
    /// [`FuncTestError::Timeout`] is returned.
    pub async fn run(
        &mut self,
        on_stdout: Option<LineCallback>,
        on_stderr: Option<LineCallback>,
        timeout: Option<Duration>,
        stdin: Option<&str>,
    ) -> Result<ProcessExit> {
        if self.running.is_none() {
            self.start(on_stdout, on_stderr, stdin).await?;
        }

        let exit = self.wait_for_exit();
        let exit = match timeout {
            None => exit.await?,
            Some(limit) => match tokio::time::timeout(limit, exit).await {
                Ok(exit) => exit?,
                Err(_) => {
                    warn!(
                        "{} did not exit within {:?}; killing process tree",
                        self.program.display(),
                        limit
                    );
                    self.kill_tree();
                    return Err(FuncTestError::Timeout(limit));
                }
            },
        };

        self.drain_output().await;
        Ok(exit)
    }

    /// Resolve once the process has exited.
    pub fn wait_for_exit(
        &self,
    ) -> impl std::future::Future<Output = Result<ProcessExit>> + Send + 'static {
        let signal = self.running.as_ref().map(Running::exit_signal);
        async move {
            match signal {
                Some(signal) => Ok(signal.await),
                None => Err(FuncTestError::NotStarted),
            }
        }
    }

    /// Kill the process tree, then wait up to `timeout` for the exit code.
    ///
    /// Works on a process that has already exited.
    pub async fn try_get_exit_code(&self, timeout: Duration) -> Result<ExitProbe> {
        let running = self.running.as_ref().ok_or(FuncTestError::NotStarted)?;
        running.kill_tree();

        match tokio::time::timeout(timeout, running.exit_signal()).await {
            Ok(exit) => Ok(ExitProbe {
                exited: true,
                code: exit.code(),
            }),
            Err(_) => {
                debug!("Process {} did not report an exit within {:?}", running.pid, timeout);
                Ok(ExitProbe {
                    exited: false,
                    code: None,
                })
            }
        }
    }

    /// Kill every descendant, then the process itself. No-op once exited.
    pub fn kill_tree(&self) {
        if let Some(running) = &self.running {
            running.kill_tree();
        }
    }

    /// Kill the tree and release the process handles. Never fails.
    pub fn dispose(&mut self) {
        if let Some(running) = self.running.take() {
            running.kill_tree();
        }
    }

    async fn drain_output(&mut self) {
        let Some(running) = self.running.as_mut() else {
            return;
        };
        for reader in running.readers.drain(..) {
            // Grandchildren can keep a pipe open after the root exits.
            if tokio::time::timeout(OUTPUT_DRAIN_TIMEOUT, reader).await.is_err() {
                debug!("Output reader for {} still open after exit", running.pid);
            }
        }
    }
}

impl Drop for Executable {
    fn drop(&mut self) {
        self.dispose();
    }
}

fn spawn_line_reader<R>(reader: R, callback: Option<LineCallback>) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if let Some(callback) = &callback {
                        callback(&line);
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    debug!("Stopped reading process output: {}", e);
                    break;
                }
            }
        }
    })
}

async fn watch_child(
    mut child: Child,
    kill: Arc<Notify>,
    exit_tx: watch::Sender<Option<ProcessExit>>,
) {
    let status = loop {
        tokio::select! {
            status = child.wait() => break status,
            _ = kill.notified() => {
                if let Err(e) = kill_root(&mut child) {
                    debug!("Failed to kill process: {}", e);
                }
            }
        }
    };

    let exit = match status {
        Ok(status) => status.code().map_or(ProcessExit::Terminated, ProcessExit::Code),
        Err(e) => {
            debug!("Failed to wait for process: {}", e);
            ProcessExit::Terminated
        }
    };
    let _ = exit_tx.send(Some(exit));
}

fn kill_root(child: &mut Child) -> Result<()> {
    // TerminateProcess through the platform layer reports -1 instead of the
    // exit code 1 that `start_kill` uses, which reads as a failure.
    #[cfg(windows)]
    {
        if let Some(pid) = child.id() {
            crate::platform::kill_process(pid)?;
        }
        Ok(())
    }

    #[cfg(not(windows))]
    {
        child.start_kill().map_err(FuncTestError::from)
    }
}
