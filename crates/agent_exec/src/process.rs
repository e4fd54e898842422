//! Child process management: piped spawn for structured streaming, PTY spawn
//! for interactive and hybrid modes.

use std::{
    collections::BTreeMap,
    io::{self, Read, Write},
    path::PathBuf,
    process::Stdio,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use portable_pty::{native_pty_system, CommandBuilder, PtySize};
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    process::Command,
    sync::mpsc,
    time,
};
use tracing::debug;

use crate::ExecError;

/// How the child is wired up. `Structured` keeps separate pipes; the PTY
/// modes merge output and accept raw keystrokes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProcessMode {
    #[default]
    Structured,
    Interactive,
    Hybrid,
}

impl ProcessMode {
    pub fn uses_pty(&self) -> bool {
        matches!(self, ProcessMode::Interactive | ProcessMode::Hybrid)
    }
}

/// Everything needed to start one agent child.
#[derive(Debug, Clone)]
pub struct SpawnSpec {
    pub executable: PathBuf,
    pub argv: Vec<String>,
    /// Extends (never replaces) the parent environment.
    pub env: BTreeMap<String, String>,
    pub work_dir: PathBuf,
    pub mode: ProcessMode,
    pub pty_cols: u16,
    pub pty_rows: u16,
}

/// Final child status. `signal` is set when the child died to a signal
/// (Unix pipes only; PTY children report an exit code).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitSummary {
    pub exit_code: Option<i32>,
    pub signal: Option<i32>,
}

impl ExitSummary {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Line-oriented byte sink into the child's stdin.
pub enum ByteSink {
    Stream(Box<dyn AsyncWrite + Send + Unpin>),
    Channel(Option<mpsc::UnboundedSender<Vec<u8>>>),
}

impl ByteSink {
    pub async fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        match self {
            ByteSink::Stream(writer) => {
                writer.write_all(bytes).await?;
                writer.flush().await
            }
            ByteSink::Channel(sender) => match sender {
                Some(tx) => tx
                    .send(bytes.to_vec())
                    .map_err(|_| io::Error::from(io::ErrorKind::BrokenPipe)),
                None => Err(io::Error::from(io::ErrorKind::BrokenPipe)),
            },
        }
    }

    pub async fn shutdown(&mut self) -> io::Result<()> {
        match self {
            ByteSink::Stream(writer) => writer.shutdown().await,
            ByteSink::Channel(sender) => {
                sender.take();
                Ok(())
            }
        }
    }
}

/// Chunked byte source off the child's stdout or stderr.
pub enum ByteSource {
    Stream(Box<dyn AsyncRead + Send + Unpin>),
    Channel(mpsc::UnboundedReceiver<Vec<u8>>),
}

impl ByteSource {
    /// Next chunk, or `None` at end-of-stream.
    pub async fn next_chunk(&mut self) -> io::Result<Option<Vec<u8>>> {
        match self {
            ByteSource::Stream(reader) => {
                let mut chunk = [0u8; 4096];
                let n = reader.read(&mut chunk).await?;
                Ok((n > 0).then(|| chunk[..n].to_vec()))
            }
            ByteSource::Channel(rx) => Ok(rx.recv().await),
        }
    }
}

enum ChildHandle {
    Piped(tokio::process::Child),
    Pty {
        child: Box<dyn portable_pty::Child + Send + Sync>,
        master: Box<dyn portable_pty::MasterPty + Send>,
    },
}

/// One spawned agent child with its streams and a signalling handle.
pub struct ChildProcess {
    pid: u32,
    handle: ChildHandle,
    stdin: Option<ByteSink>,
    stdout: Option<ByteSource>,
    stderr: Option<ByteSource>,
    terminated: Arc<AtomicBool>,
}

impl std::fmt::Debug for ChildProcess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChildProcess")
            .field("pid", &self.pid)
            .finish_non_exhaustive()
    }
}

impl ChildProcess {
    pub fn spawn(spec: &SpawnSpec) -> Result<Self, ExecError> {
        if !spec.work_dir.is_dir() {
            return Err(ExecError::WorkDir(spec.work_dir.clone()));
        }
        if spec.mode.uses_pty() {
            Self::spawn_pty(spec)
        } else {
            Self::spawn_piped(spec)
        }
    }

    fn spawn_piped(spec: &SpawnSpec) -> Result<Self, ExecError> {
        let mut command = Command::new(&spec.executable);
        command
            .args(&spec.argv)
            .current_dir(&spec.work_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        for (key, value) in &spec.env {
            command.env(key, value);
        }
        // Group leader so teardown can reach grandchildren.
        #[cfg(unix)]
        command.process_group(0);

        let mut child = spawn_with_retry(&mut command, &spec.executable)?;
        let pid = child.id().unwrap_or_default();

        let stdin = child.stdin.take().map(|s| ByteSink::Stream(Box::new(s) as _));
        let stdout = child
            .stdout
            .take()
            .map(|s| ByteSource::Stream(Box::new(s) as _));
        let stderr = child
            .stderr
            .take()
            .map(|s| ByteSource::Stream(Box::new(s) as _));

        Ok(Self {
            pid,
            handle: ChildHandle::Piped(child),
            stdin,
            stdout,
            stderr,
            terminated: Arc::new(AtomicBool::new(false)),
        })
    }

    fn spawn_pty(spec: &SpawnSpec) -> Result<Self, ExecError> {
        let pty_system = native_pty_system();
        let pair = pty_system
            .openpty(PtySize {
                rows: spec.pty_rows,
                cols: spec.pty_cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| ExecError::Pty(format!("failed to open PTY: {e}")))?;

        let mut cmd = CommandBuilder::new(spec.executable.as_os_str());
        for arg in &spec.argv {
            cmd.arg(arg);
        }
        cmd.cwd(&spec.work_dir);
        for (key, value) in &spec.env {
            cmd.env(key, value);
        }

        let child = pair
            .slave
            .spawn_command(cmd)
            .map_err(|e| ExecError::Pty(format!("failed to spawn PTY command: {e}")))?;
        drop(pair.slave);
        let pid = child.process_id().unwrap_or_default();

        let mut reader = pair
            .master
            .try_clone_reader()
            .map_err(|e| ExecError::Pty(format!("failed to clone PTY reader: {e}")))?;
        let mut writer = pair
            .master
            .take_writer()
            .map_err(|e| ExecError::Pty(format!("failed to take PTY writer: {e}")))?;

        // Bridge the blocking PTY endpoints onto channels so the rest of the
        // supervisor stays async.
        let (out_tx, out_rx) = mpsc::unbounded_channel::<Vec<u8>>();
        tokio::task::spawn_blocking(move || {
            let mut chunk = [0u8; 4096];
            loop {
                match reader.read(&mut chunk) {
                    Ok(0) | Err(_) => break,
                    Ok(n) => {
                        if out_tx.send(chunk[..n].to_vec()).is_err() {
                            break;
                        }
                    }
                }
            }
        });

        let (in_tx, mut in_rx) = mpsc::unbounded_channel::<Vec<u8>>();
        tokio::task::spawn_blocking(move || {
            while let Some(bytes) = in_rx.blocking_recv() {
                if writer.write_all(&bytes).is_err() {
                    break;
                }
                let _ = writer.flush();
            }
        });

        Ok(Self {
            pid,
            handle: ChildHandle::Pty {
                child,
                master: pair.master,
            },
            stdin: Some(ByteSink::Channel(Some(in_tx))),
            stdout: Some(ByteSource::Channel(out_rx)),
            // Stderr is merged into the PTY stream.
            stderr: None,
            terminated: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn take_stdin(&mut self) -> Option<ByteSink> {
        self.stdin.take()
    }

    pub fn take_stdout(&mut self) -> Option<ByteSource> {
        self.stdout.take()
    }

    pub fn take_stderr(&mut self) -> Option<ByteSource> {
        self.stderr.take()
    }

    /// Resolves once, after the child terminates. PTY children are polled
    /// since `portable_pty` has no async wait.
    pub async fn wait(&mut self) -> Result<ExitSummary, ExecError> {
        match &mut self.handle {
            ChildHandle::Piped(child) => {
                let status = child.wait().await?;
                Ok(ExitSummary {
                    exit_code: status.code(),
                    signal: status_signal(&status),
                })
            }
            ChildHandle::Pty { child, .. } => {
                let poll_interval = Duration::from_millis(50);
                loop {
                    match child.try_wait().map_err(ExecError::Io)? {
                        Some(status) => {
                            return Ok(ExitSummary {
                                exit_code: Some(status.exit_code().min(255) as i32),
                                signal: None,
                            });
                        }
                        None => time::sleep(poll_interval).await,
                    }
                }
            }
        }
    }

    /// Resizes the PTY; silently ignored for piped children.
    pub fn resize(&self, cols: u16, rows: u16) -> Result<(), ExecError> {
        match &self.handle {
            ChildHandle::Piped(_) => Ok(()),
            ChildHandle::Pty { master, .. } => master
                .resize(PtySize {
                    rows,
                    cols,
                    pixel_width: 0,
                    pixel_height: 0,
                })
                .map_err(|e| ExecError::Pty(format!("resize failed: {e}"))),
        }
    }

    /// Pid-based signalling handle that outlives the mutable borrow on the
    /// process, so teardown can run from a spawned task.
    pub fn signaller(&self) -> ProcessSignaller {
        ProcessSignaller {
            pid: self.pid,
            terminated: self.terminated.clone(),
        }
    }
}

/// Signals for the supervisor's needs: cooperative interrupt and the
/// SIGTERM-then-SIGKILL teardown ladder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessSignal {
    Interrupt,
    Terminate,
    Kill,
}

#[derive(Clone)]
pub struct ProcessSignaller {
    pid: u32,
    terminated: Arc<AtomicBool>,
}

impl ProcessSignaller {
    /// Best-effort signal delivery; a no-op once the child is gone.
    #[cfg(unix)]
    pub fn signal(&self, signal: ProcessSignal) {
        use nix::sys::signal::{killpg, Signal};
        use nix::unistd::Pid;

        let sig = match signal {
            ProcessSignal::Interrupt => Signal::SIGINT,
            ProcessSignal::Terminate => Signal::SIGTERM,
            ProcessSignal::Kill => Signal::SIGKILL,
        };
        let pgid = Pid::from_raw(self.pid as i32);
        if let Err(e) = killpg(pgid, sig) {
            debug!(pid = self.pid, ?signal, "signal delivery failed: {e}");
        }
    }

    #[cfg(windows)]
    pub fn signal(&self, signal: ProcessSignal) {
        if !matches!(signal, ProcessSignal::Kill | ProcessSignal::Terminate) {
            return;
        }
        if let Err(e) = std::process::Command::new("taskkill")
            .args(["/PID", &self.pid.to_string(), "/T", "/F"])
            .output()
        {
            debug!(pid = self.pid, "taskkill failed: {e}");
        }
    }

    #[cfg(not(any(unix, windows)))]
    pub fn signal(&self, _signal: ProcessSignal) {
        tracing::warn!(pid = self.pid, "signal delivery unsupported on this platform");
    }

    /// SIGTERM now, SIGKILL after the grace period. Only the first call
    /// sends anything.
    pub fn terminate_graceful(&self, grace: Duration) {
        if self.terminated.swap(true, Ordering::SeqCst) {
            return;
        }
        self.signal(ProcessSignal::Terminate);
        let escalate = self.clone();
        std::thread::spawn(move || {
            std::thread::sleep(grace);
            escalate.signal(ProcessSignal::Kill);
        });
    }
}

#[cfg(unix)]
fn status_signal(status: &std::process::ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

#[cfg(not(unix))]
fn status_signal(_status: &std::process::ExitStatus) -> Option<i32> {
    None
}

/// ETXTBSY shows up when the binary was just written (fake binaries in tests,
/// freshly installed CLIs); retry briefly before giving up.
fn spawn_with_retry(
    command: &mut Command,
    binary: &std::path::Path,
) -> Result<tokio::process::Child, ExecError> {
    let mut backoff = Duration::from_millis(2);
    for attempt in 0..5 {
        match command.spawn() {
            Ok(child) => return Ok(child),
            Err(source) => {
                let is_busy = matches!(source.kind(), std::io::ErrorKind::ExecutableFileBusy)
                    || source.raw_os_error() == Some(26);
                if is_busy && attempt < 4 {
                    std::thread::sleep(backoff);
                    backoff = std::cmp::min(backoff * 2, Duration::from_millis(50));
                    continue;
                }
                return Err(ExecError::Spawn {
                    binary: binary.to_path_buf(),
                    source,
                });
            }
        }
    }

    unreachable!("spawn_with_retry returns before exhausting retries")
}
