//! Spawning and supervising external node processes.
//!
//! Every spawned child is owned by a supervisor task that waits for it to
//! exit or for its kill switch to fire, whichever comes first. Output is
//! read line by line, passed to the optional callbacks as it arrives and
//! accumulated for the caller.

use std::{
    collections::HashMap,
    io,
    path::PathBuf,
    process::{ExitStatus, Stdio},
    sync::Arc,
    time::Duration,
};

use tokio::{
    io::{AsyncBufReadExt, AsyncRead, BufReader},
    process::Command,
    sync::oneshot,
    task::JoinHandle,
};

use crate::{
    NodeflowError, Result,
    runtime::{ProcessHandle, ProcessRegistry},
    workflow::NodeId,
};

/// How long to keep reading pipes of a killed process before giving up.
/// Grandchildren may hold them open indefinitely.
const KILLED_DRAIN_TIMEOUT: Duration = Duration::from_millis(200);

pub type OutputHandle = Arc<dyn Fn(&str) + Send + Sync>;
pub type ErrorHandle = Arc<dyn Fn(&NodeflowError) + Send + Sync>;

#[derive(Clone, Default)]
pub struct RunOptions {
    /// Registers the process under this node id while it runs.
    pub node_id: Option<NodeId>,
    pub is_task: bool,
    pub cwd: Option<PathBuf>,
    /// Added on top of the inherited environment.
    pub env: HashMap<String, String>,
    pub on_stdout: Option<OutputHandle>,
    pub on_stderr: Option<OutputHandle>,
    pub on_error: Option<ErrorHandle>,
}

impl RunOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node(
        mut self,
        node_id: &str,
        is_task: bool,
    ) -> Self {
        self.node_id = Some(node_id.to_string());
        self.is_task = is_task;
        self
    }

    pub fn cwd<P: Into<PathBuf>>(
        mut self,
        cwd: P,
    ) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn env(
        mut self,
        key: &str,
        value: &str,
    ) -> Self {
        self.env.insert(key.to_string(), value.to_string());
        self
    }

    pub fn envs<I, K, V>(
        mut self,
        vars: I,
    ) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.env.extend(vars.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    pub fn on_stdout(
        mut self,
        f: impl Fn(&str) + Send + Sync + 'static,
    ) -> Self {
        self.on_stdout = Some(Arc::new(f));
        self
    }

    pub fn on_stderr(
        mut self,
        f: impl Fn(&str) + Send + Sync + 'static,
    ) -> Self {
        self.on_stderr = Some(Arc::new(f));
        self
    }

    pub fn on_error(
        mut self,
        f: impl Fn(&NodeflowError) + Send + Sync + 'static,
    ) -> Self {
        self.on_error = Some(Arc::new(f));
        self
    }
}

/// Captured result of a finished process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    pub stdout: String,
    pub stderr: String,
    /// `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,
}

/// A running process whose lifecycle belongs to the caller.
pub struct DetachedProcess {
    handle: ProcessHandle,
    exit: oneshot::Receiver<io::Result<ExitStatus>>,
    stdout: JoinHandle<String>,
    stderr: JoinHandle<String>,
}

impl DetachedProcess {
    pub fn handle(&self) -> &ProcessHandle {
        &self.handle
    }

    pub fn pid(&self) -> Option<u32> {
        self.handle.pid()
    }

    pub fn kill(&self) -> bool {
        self.handle.kill()
    }

    /// Wait for exit and collect the output, whatever the exit code.
    pub async fn wait(self) -> Result<ProcessOutput> {
        let (output, _) = self.finish().await?;
        Ok(output)
    }

    async fn finish(self) -> Result<(ProcessOutput, ExitStatus)> {
        let status = self.exit.await.map_err(|_| NodeflowError::Engine("process supervisor dropped".to_string()))??;

        let killed = self.handle.is_killed();
        let stdout = drain(self.stdout, killed).await;
        let stderr = drain(self.stderr, killed).await;

        Ok((
            ProcessOutput {
                stdout,
                stderr,
                exit_code: status.code(),
            },
            status,
        ))
    }
}

pub struct ProcessRunner {
    registry: Arc<ProcessRegistry>,
}

impl ProcessRunner {
    pub fn new(registry: Arc<ProcessRegistry>) -> Self {
        Self {
            registry,
        }
    }

    pub fn registry(&self) -> Arc<ProcessRegistry> {
        self.registry.clone()
    }

    /// Run `command` to completion.
    ///
    /// A non-zero exit is `ProcessExecution`, unless a stop was requested or
    /// this process was killed, in which case it is `StopSuppressed`.
    pub async fn run(
        &self,
        command: &str,
        args: &[String],
        options: RunOptions,
    ) -> Result<ProcessOutput> {
        let on_error = options.on_error.clone();
        let process = self.spawn(command, args, options)?;
        let handle = process.handle.clone();

        let (output, status) = process.finish().await?;
        if status.success() {
            return Ok(output);
        }

        if handle.is_killed() || self.registry.is_stop_requested() {
            tracing::debug!(command = %command, nid = ?handle.node_id(), code = ?output.exit_code, "process ended by stop request");
            return Err(NodeflowError::StopSuppressed);
        }

        let err = NodeflowError::ProcessExecution {
            code: output.exit_code,
            stdout: output.stdout,
            stderr: output.stderr,
        };
        tracing::error!(command = %command, nid = ?handle.node_id(), error = %err, "process failed");
        if let Some(f) = on_error {
            f(&err);
        }
        Err(err)
    }

    /// Spawn `command` and return immediately with the live process.
    pub fn run_detached(
        &self,
        command: &str,
        args: &[String],
        options: RunOptions,
    ) -> Result<DetachedProcess> {
        self.spawn(command, args, options)
    }

    /// Kill every registered process. See [`ProcessRegistry::kill_all`].
    pub fn kill_all(&self) -> usize {
        self.registry.kill_all()
    }

    fn spawn(
        &self,
        command: &str,
        args: &[String],
        options: RunOptions,
    ) -> Result<DetachedProcess> {
        let mut cmd = Command::new(command);
        cmd.args(args).envs(&options.env).stdin(Stdio::null()).stdout(Stdio::piped()).stderr(Stdio::piped()).kill_on_drop(true);
        if let Some(cwd) = &options.cwd {
            cmd.current_dir(cwd);
        }

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                let err = spawn_error(command, e);
                tracing::error!(command = %command, error = %err, "failed to spawn process");
                if let Some(f) = &options.on_error {
                    f(&err);
                }
                return Err(err);
            }
        };

        let handle = ProcessHandle::new(options.node_id.clone(), child.id(), options.is_task);
        tracing::debug!(command = %command, nid = ?handle.node_id(), pid = ?handle.pid(), "process spawned");

        let stdout = match child.stdout.take() {
            Some(out) => pump(out, options.on_stdout.clone()),
            None => tokio::spawn(async { String::new() }),
        };
        let stderr = match child.stderr.take() {
            Some(err) => pump(err, options.on_stderr.clone()),
            None => tokio::spawn(async { String::new() }),
        };

        self.registry.register(handle.clone());

        let (exit_tx, exit_rx) = oneshot::channel();
        let registry = self.registry.clone();
        let supervised = handle.clone();
        tokio::spawn(async move {
            let kill = supervised.kill_signal();
            let exited = tokio::select! {
                status = child.wait() => Some(status),
                _ = kill.wait() => None,
            };
            let status = match exited {
                Some(status) => status,
                None => {
                    if let Err(e) = child.start_kill() {
                        tracing::warn!(pid = ?supervised.pid(), error = %e, "failed to kill process");
                    }
                    child.wait().await
                }
            };

            let failed = !matches!(&status, Ok(s) if s.success());
            // A failed task stays tracked until it is stopped explicitly.
            if !(supervised.is_task() && failed && !supervised.is_killed()) {
                registry.deregister(supervised.id());
            }
            tracing::debug!(nid = ?supervised.node_id(), pid = ?supervised.pid(), status = ?status, "process exited");

            let _ = exit_tx.send(status);
        });

        Ok(DetachedProcess {
            handle,
            exit: exit_rx,
            stdout,
            stderr,
        })
    }
}

fn spawn_error(
    program: &str,
    e: io::Error,
) -> NodeflowError {
    let message = match e.kind() {
        io::ErrorKind::NotFound => format!("`{}` was not found. Install it, or set `interpreter` in the engine config to its full path", program),
        io::ErrorKind::PermissionDenied => format!("`{}` is not executable. Check its permissions or set `interpreter` in the engine config", program),
        _ => format!("failed to launch `{}`: {}", program, e),
    };
    NodeflowError::ProcessSpawn {
        program: program.to_string(),
        message,
    }
}

fn pump<R>(
    reader: R,
    on_line: Option<OutputHandle>,
) -> JoinHandle<String>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(reader);
        let mut captured = String::new();
        let mut buf = Vec::new();

        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break,
                Ok(_) => {
                    let chunk = String::from_utf8_lossy(&buf);
                    if let Some(f) = &on_line {
                        f(chunk.trim_end_matches(['\r', '\n']));
                    }
                    captured.push_str(&chunk);
                }
                Err(e) => {
                    tracing::warn!(error = %e, "failed to read process output");
                    break;
                }
            }
        }

        captured
    })
}

async fn drain(
    reader: JoinHandle<String>,
    killed: bool,
) -> String {
    if killed {
        let abort = reader.abort_handle();
        match tokio::time::timeout(KILLED_DRAIN_TIMEOUT, reader).await {
            Ok(joined) => joined.unwrap_or_default(),
            Err(_) => {
                abort.abort();
                String::new()
            }
        }
    } else {
        reader.await.unwrap_or_default()
    }
}
