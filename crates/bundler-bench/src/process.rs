//! Dev server and build subprocess control
//!
//! A [`ToolProcess`] runs a tool's start and build commands, scrapes their
//! stdout for the duration line and tears the whole process tree down when
//! the server is stopped.
//!
//! Commands are spawned in their own process group (`npm run` forks a shell
//! which forks the tool, which may fork watchers and workers). Stopping the
//! server signals the group rather than the direct child, so nothing keeps
//! holding the port once the next tool starts.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, ChildStdout, Command};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, instrument, trace, warn};

use crate::config::BuildCompletion;
use crate::error::{BenchError, Result};
use crate::pattern::{strip_ansi, DurationPattern};
use crate::runner::Phase;
use crate::tool::{BuildToolDescriptor, CommandSpec};

/// A dev server that reported itself ready
struct RunningServer {
    child: Child,
    pid: Option<u32>,
    drains: Vec<JoinHandle<()>>,
}

/// Subprocess controller for one build tool
pub struct ToolProcess {
    tool: BuildToolDescriptor,
    working_dir: PathBuf,
    stop_grace: Duration,
    server: Option<RunningServer>,
}

impl ToolProcess {
    /// Create a controller running the tool's commands inside `working_dir`
    pub fn new(tool: BuildToolDescriptor, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            tool,
            working_dir: working_dir.into(),
            stop_grace: Duration::from_secs(2),
            server: None,
        }
    }

    /// Time between SIGTERM and SIGKILL when stopping the server
    pub fn with_stop_grace(mut self, grace: Duration) -> Self {
        self.stop_grace = grace;
        self
    }

    /// PID of the running dev server process (also its process group id)
    pub fn server_pid(&self) -> Option<u32> {
        self.server.as_ref().and_then(|s| s.pid)
    }

    /// Start the dev server and wait for its ready line
    ///
    /// Returns the startup duration the tool printed, in milliseconds.
    ///
    /// # Errors
    ///
    /// - [`BenchError::Spawn`] if the command cannot be started
    /// - [`BenchError::ProcessExited`] if it exits before printing a ready line
    /// - [`BenchError::PhaseTimeout`] if no ready line appears within `deadline`
    #[instrument(skip(self), fields(tool = %self.tool.name))]
    pub async fn start_server(&mut self, deadline: Duration) -> Result<f64> {
        if self.server.is_some() {
            warn!("Dev server already running, stopping it first");
            self.stop_server().await?;
        }

        let started = Instant::now();
        debug!("Running start command: {}", self.tool.start);
        let mut child = spawn(&self.tool.start, &self.working_dir)?;
        let pid = child.id();
        let (mut lines, stderr_drain) = take_output(&mut child, &self.tool.name)?;

        let scanned = scan_for_duration(
            &mut child,
            &mut lines,
            self.tool.ready_pattern(),
            &self.tool.start,
            Phase::ServerStarting,
            started,
            deadline,
        )
        .await;

        match scanned {
            Ok(ready_ms) => {
                // Keep consuming output so the server never blocks on a full pipe
                let stdout_drain = drain(lines, self.tool.name.clone(), "stdout");
                self.server = Some(RunningServer {
                    child,
                    pid,
                    drains: vec![stdout_drain, stderr_drain],
                });
                Ok(ready_ms)
            }
            Err(e) => {
                warn!("({} failed) {}", self.tool.start, e);
                stderr_drain.abort();
                terminate_tree(&mut child, pid, self.stop_grace).await;
                Err(e)
            }
        }
    }

    /// Stop the dev server and every process it spawned
    ///
    /// Does nothing if no server is running.
    #[instrument(skip(self), fields(tool = %self.tool.name))]
    pub async fn stop_server(&mut self) -> Result<()> {
        let Some(mut server) = self.server.take() else {
            return Ok(());
        };

        // Closing our ends of the pipes first
        drop(server.child.stdin.take());
        for drain in &server.drains {
            drain.abort();
        }

        terminate_tree(&mut server.child, server.pid, self.stop_grace).await;
        debug!("Dev server stopped");
        Ok(())
    }

    /// Run the production build and wait for its summary line
    ///
    /// Returns the build duration the tool printed, in milliseconds. With
    /// [`BuildCompletion::OnMatch`] this returns as soon as the line appears,
    /// possibly while the build process is still running; the process is
    /// then reaped in the background.
    #[instrument(skip(self), fields(tool = %self.tool.name))]
    pub async fn build(&self, deadline: Duration, completion: BuildCompletion) -> Result<f64> {
        let started = Instant::now();
        info!("Running build command: {}", self.tool.build);
        let mut child = spawn(&self.tool.build, &self.working_dir)?;
        let pid = child.id();
        let (mut lines, stderr_drain) = take_output(&mut child, &self.tool.name)?;

        let build_ms = match scan_for_duration(
            &mut child,
            &mut lines,
            self.tool.build_pattern(),
            &self.tool.build,
            Phase::Building,
            started,
            deadline,
        )
        .await
        {
            Ok(ms) => ms,
            Err(e) => {
                stderr_drain.abort();
                terminate_tree(&mut child, pid, self.stop_grace).await;
                return Err(e);
            }
        };

        match completion {
            BuildCompletion::OnMatch => {
                let tool = self.tool.name.clone();
                tokio::spawn(async move {
                    drain(lines, tool.clone(), "stdout").await.ok();
                    match child.wait().await {
                        Ok(status) => trace!(tool = %tool, "Build process exited with {}", status),
                        Err(e) => warn!(tool = %tool, "Failed to reap build process: {}", e),
                    }
                });
            }
            BuildCompletion::OnExit => {
                let remaining = deadline.saturating_sub(started.elapsed());
                let exit = timeout(remaining, async {
                    drain(lines, self.tool.name.clone(), "stdout").await.ok();
                    child.wait().await
                })
                .await;

                match exit {
                    Ok(Ok(status)) if !status.success() => {
                        warn!("Build reported {}ms but exited with {}", build_ms, status);
                    }
                    Ok(Ok(_)) => {}
                    Ok(Err(e)) => return Err(e.into()),
                    Err(_) => {
                        terminate_tree(&mut child, pid, self.stop_grace).await;
                        return Err(BenchError::timeout(Phase::Building, started));
                    }
                }
            }
        }

        Ok(build_ms)
    }
}

impl Drop for ToolProcess {
    fn drop(&mut self) {
        if let Some(server) = self.server.as_mut() {
            for drain in &server.drains {
                drain.abort();
            }
            if let Some(pid) = server.pid {
                signal_group(pid, GroupSignal::Kill);
            }
            let _ = server.child.start_kill();
        }
    }
}

fn spawn(command: &CommandSpec, working_dir: &Path) -> Result<Child> {
    let mut cmd = Command::new(&command.program);
    cmd.args(&command.args)
        .current_dir(working_dir)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    #[cfg(unix)]
    cmd.process_group(0);

    cmd.spawn().map_err(|source| BenchError::Spawn {
        command: command.to_string(),
        source,
    })
}

/// Line reader over a child pipe that tolerates non-UTF-8 output
///
/// Tools print whatever their terminal locale produces; invalid sequences
/// become U+FFFD instead of ending the stream.
struct OutputLines<R> {
    reader: BufReader<R>,
    buf: Vec<u8>,
}

impl<R: AsyncRead + Unpin> OutputLines<R> {
    fn new(inner: R) -> Self {
        Self {
            reader: BufReader::new(inner),
            buf: Vec::new(),
        }
    }

    /// Next line without its terminator; `None` at end of stream
    async fn next_line(&mut self) -> std::io::Result<Option<String>> {
        self.buf.clear();
        if self.reader.read_until(b'\n', &mut self.buf).await? == 0 {
            return Ok(None);
        }
        if self.buf.ends_with(b"\n") {
            self.buf.pop();
            if self.buf.ends_with(b"\r") {
                self.buf.pop();
            }
        }
        Ok(Some(String::from_utf8_lossy(&self.buf).into_owned()))
    }
}

/// Split off stdout for scanning and start draining stderr
fn take_output(
    child: &mut Child,
    tool: &str,
) -> Result<(OutputLines<ChildStdout>, JoinHandle<()>)> {
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| std::io::Error::other("child stdout was not captured"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| std::io::Error::other("child stderr was not captured"))?;

    let stderr_drain = drain(OutputLines::new(stderr), tool.to_string(), "stderr");
    Ok((OutputLines::new(stdout), stderr_drain))
}

/// Read stdout until a line matches `pattern`, the process exits, or the deadline passes
async fn scan_for_duration(
    child: &mut Child,
    lines: &mut OutputLines<ChildStdout>,
    pattern: &DurationPattern,
    command: &CommandSpec,
    phase: Phase,
    started: Instant,
    deadline: Duration,
) -> Result<f64> {
    let remaining = deadline.saturating_sub(started.elapsed());
    timeout(remaining, scan_lines(child, lines, pattern, command))
        .await
        .map_err(|_| BenchError::timeout(phase, started))?
}

async fn scan_lines(
    child: &mut Child,
    lines: &mut OutputLines<ChildStdout>,
    pattern: &DurationPattern,
    command: &CommandSpec,
) -> Result<f64> {
    while let Some(line) = lines.next_line().await? {
        debug!("{}", strip_ansi(&line));
        if let Some(ms) = pattern.parse_line(&line) {
            return Ok(ms);
        }
    }

    // stdout closed without a match: the process is on its way out
    let status = child.wait().await?;
    Err(BenchError::ProcessExited {
        command: command.to_string(),
        code: status.code(),
    })
}

fn drain<R>(mut lines: OutputLines<R>, tool: String, stream: &'static str) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => trace!(tool = %tool, stream, "{}", strip_ansi(&line)),
                Ok(None) => break,
                Err(e) => {
                    warn!(tool = %tool, stream, "Stopped reading output: {}", e);
                    break;
                }
            }
        }
    })
}

#[derive(Debug, Clone, Copy)]
enum GroupSignal {
    Terminate,
    Kill,
}

#[cfg(unix)]
fn signal_group(pgid: u32, signal: GroupSignal) {
    use nix::errno::Errno;
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    let signal = match signal {
        GroupSignal::Terminate => Signal::SIGTERM,
        GroupSignal::Kill => Signal::SIGKILL,
    };
    match killpg(Pid::from_raw(pgid as i32), signal) {
        Ok(()) | Err(Errno::ESRCH) => {}
        Err(e) => warn!("Failed to send {:?} to process group {}: {}", signal, pgid, e),
    }
}

#[cfg(not(unix))]
fn signal_group(_pgid: u32, _signal: GroupSignal) {}

/// SIGTERM the group, give it `grace` to exit, then SIGKILL whatever is left
async fn terminate_tree(child: &mut Child, pid: Option<u32>, grace: Duration) {
    if let Some(pid) = pid {
        signal_group(pid, GroupSignal::Terminate);
        if timeout(grace, child.wait()).await.is_err() {
            debug!("Process group {} ignored SIGTERM for {:?}", pid, grace);
        }
        // Descendants may outlive the leader
        signal_group(pid, GroupSignal::Kill);
    }

    if let Err(e) = child.start_kill() {
        trace!("start_kill: {}", e);
    }
    if let Err(e) = child.wait().await {
        warn!("Failed to reap child process: {}", e);
    }
}
