//! Bridge to the external transfer executable.
//!
//! A [`ProcessBridge`] describes one invocation of `git upload-pack` or
//! `git receive-pack` in stateless-RPC mode against a repository directory.
//! Every request gets its own bridge and its own child process; nothing here is
//! pooled or shared.
//!
//! Standard output and standard error are always drained concurrently so that a
//! child which fills one pipe while the caller is reading the other cannot
//! deadlock the request.

use crate::{GitError, Result, Service};
use bytes::Bytes;
use futures_util::stream::{self, Stream, StreamExt};
use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tokio::task::JoinHandle;
use tokio_util::io::ReaderStream;
use tracing::{debug, warn};

/// How the transfer executable is invoked.
///
/// The final command line is
/// `<program> <leading_args..> <subcommand> --stateless-rpc [--advertise-refs] <repo>`.
#[derive(Debug, Clone)]
pub struct GitCommand {
    program: PathBuf,
    leading_args: Vec<OsString>,
}

impl Default for GitCommand {
    fn default() -> Self {
        Self::new("git")
    }
}

impl GitCommand {
    /// Creates a command that runs `program`.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            leading_args: Vec::new(),
        }
    }

    /// Arguments placed before the service subcommand.
    pub fn with_leading_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.leading_args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Program that will be executed.
    pub fn program(&self) -> &Path {
        &self.program
    }
}

/// Per-invocation options.
#[derive(Debug, Clone, Default)]
pub struct BridgeOptions {
    /// Only list refs, do not negotiate a transfer.
    pub advertise_refs: bool,
    /// Value forwarded as `GIT_PROTOCOL`.
    pub git_protocol: Option<String>,
}

/// One invocation of the transfer executable.
#[derive(Debug, Clone)]
pub struct ProcessBridge {
    git: GitCommand,
    repo: PathBuf,
    service: Service,
    options: BridgeOptions,
}

impl ProcessBridge {
    /// Creates a bridge for `service` against the repository at `repo`.
    pub fn new(git: &GitCommand, repo: impl Into<PathBuf>, service: Service) -> Self {
        Self {
            git: git.clone(),
            repo: repo.into(),
            service,
            options: BridgeOptions::default(),
        }
    }

    /// Runs in advertise-only mode.
    pub fn advertise_refs(mut self) -> Self {
        self.options.advertise_refs = true;
        self
    }

    /// Forwards the client's `Git-Protocol` header.
    pub fn git_protocol(mut self, value: Option<String>) -> Self {
        self.options.git_protocol = value;
        self
    }

    /// Service this bridge runs.
    pub fn service(&self) -> Service {
        self.service
    }

    /// Repository directory the process runs against.
    pub fn repo(&self) -> &Path {
        &self.repo
    }

    /// Arguments passed to the program.
    pub fn args(&self) -> Vec<OsString> {
        let mut args = self.git.leading_args.clone();
        args.push(self.service.subcommand().into());
        args.push("--stateless-rpc".into());
        if self.options.advertise_refs {
            args.push("--advertise-refs".into());
        }
        args.push(self.repo.clone().into_os_string());
        args
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.git.program);
        cmd.args(self.args())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(protocol) = &self.options.git_protocol {
            cmd.env("GIT_PROTOCOL", protocol);
        }
        cmd
    }

    /// Spawns the process.
    pub fn start(&self) -> Result<RunningBridge> {
        let mut child = self.command().spawn().map_err(|source| GitError::Spawn {
            program: self.git.program.clone(),
            source,
        })?;

        let stdin = take_pipe(child.stdin.take(), "stdin")?;
        let stdout = take_pipe(child.stdout.take(), "stdout")?;
        let stderr = take_pipe(child.stderr.take(), "stderr")?;

        debug!(
            service = %self.service,
            repo = %self.repo.display(),
            pid = ?child.id(),
            advertise_refs = self.options.advertise_refs,
            "Transfer process started"
        );

        Ok(RunningBridge {
            service: self.service,
            child,
            stdin,
            stdout,
            stderr,
        })
    }

    /// Starts the process with empty input, waits for it and returns its standard output.
    pub async fn run_to_completion(&self) -> Result<Vec<u8>> {
        let output = self.start()?.collect(Bytes::new()).await?;
        if !output.status.success() {
            return Err(GitError::ProcessFailed {
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim_end().to_string(),
            });
        }
        Ok(output.stdout)
    }
}

fn take_pipe<T>(pipe: Option<T>, name: &str) -> Result<T> {
    pipe.ok_or_else(|| GitError::Io(io::Error::other(format!("{name} pipe not available"))))
}

/// Everything a finished process produced.
#[derive(Debug)]
pub struct BridgeOutput {
    /// Standard output.
    pub stdout: Vec<u8>,
    /// Standard error.
    pub stderr: Vec<u8>,
    /// Exit status.
    pub status: ExitStatus,
}

/// A started transfer process with all three standard streams attached.
#[derive(Debug)]
pub struct RunningBridge {
    service: Service,
    child: Child,
    stdin: ChildStdin,
    stdout: ChildStdout,
    stderr: ChildStderr,
}

impl RunningBridge {
    /// OS process id, if the process has not been reaped yet.
    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    /// Feeds `input`, drains both output streams and waits for exit.
    pub async fn collect(self, input: Bytes) -> Result<BridgeOutput> {
        let RunningBridge {
            service,
            mut child,
            stdin,
            mut stdout,
            stderr,
        } = self;

        let writer = tokio::spawn(write_input(stdin, input));
        let stderr_task = tokio::spawn(drain(stderr));

        let mut out = Vec::new();
        stdout.read_to_end(&mut out).await?;
        let err = join(stderr_task).await?;
        join(writer).await?;

        let status = child.wait().await?;
        debug!(service = %service, code = ?status.code(), "Transfer process exited");

        Ok(BridgeOutput {
            stdout: out,
            stderr: err,
            status,
        })
    }

    /// Feeds `input` and returns the process output as a byte stream.
    ///
    /// The stream yields standard output as it is produced, then everything the
    /// process wrote to standard error, and ends once the process has exited.
    /// Dropping the stream kills the process.
    pub fn into_output_stream(
        self,
        input: Bytes,
    ) -> impl Stream<Item = io::Result<Bytes>> + Send + 'static {
        self.into_output_stream_with(input, |_| {})
    }

    /// Like [`into_output_stream`](Self::into_output_stream), calling `on_exit`
    /// with the exit status once the process has been reaped.
    ///
    /// `on_exit` is not called if the stream is dropped early.
    pub fn into_output_stream_with<F>(
        self,
        input: Bytes,
        on_exit: F,
    ) -> impl Stream<Item = io::Result<Bytes>> + Send + 'static
    where
        F: FnOnce(ExitStatus) + Send + 'static,
    {
        let RunningBridge {
            service,
            mut child,
            stdin,
            stdout,
            stderr,
        } = self;

        let writer = tokio::spawn(write_input(stdin, input));
        let stderr_task = tokio::spawn(drain(stderr));

        let tail = stream::once(async move {
            join(writer).await?;
            let err = join(stderr_task).await?;
            let status = child.wait().await?;
            if status.success() {
                debug!(service = %service, "Transfer process exited");
            } else {
                warn!(
                    service = %service,
                    code = ?status.code(),
                    stderr = %String::from_utf8_lossy(&err).trim_end(),
                    "Transfer process exited unsuccessfully"
                );
            }
            on_exit(status);
            Ok::<_, io::Error>(Bytes::from(err))
        });

        ReaderStream::new(stdout).chain(tail)
    }
}

async fn write_input(mut stdin: ChildStdin, input: Bytes) -> io::Result<()> {
    let result = async {
        stdin.write_all(&input).await?;
        stdin.shutdown().await
    }
    .await;

    match result {
        // The process may exit without reading everything it was sent.
        Err(e) if e.kind() == io::ErrorKind::BrokenPipe => {
            debug!("Transfer process closed stdin early");
            Ok(())
        }
        other => other,
    }
}

async fn drain(mut stderr: ChildStderr) -> io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    stderr.read_to_end(&mut buf).await?;
    Ok(buf)
}

async fn join<T>(handle: JoinHandle<io::Result<T>>) -> io::Result<T> {
    handle.await.map_err(io::Error::other)?
}
