//! Child process launch and the three stream relay loops

use crate::normalize::CrlfNormalizer;
use gdai_core::{GdaiError, Result};
use std::io::Write;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tracing::{debug, info, warn};

/// Largest chunk moved per read
pub const CHUNK_SIZE: usize = 1024;

/// Exit code used when the child cannot be started or reports none
pub const FAILURE_EXIT_CODE: i32 = 1;

/// How long output and error relays may keep draining after the child exits
pub const DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// A running child with all three standard streams piped
pub struct ChildHandle {
    child: Child,
    command: String,
}

/// Spawn `command` with piped stdin, stdout and stderr
pub fn start(command: &str, args: &[String]) -> Result<ChildHandle> {
    let child = Command::new(command)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| GdaiError::Launch {
            command: command.to_string(),
            reason: e.to_string(),
        })?;

    info!("Started {} (pid {:?})", command, child.id());

    Ok(ChildHandle {
        child,
        command: command.to_string(),
    })
}

impl ChildHandle {
    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn take_stdin(&mut self) -> Option<ChildStdin> {
        self.child.stdin.take()
    }

    pub fn take_stdout(&mut self) -> Option<ChildStdout> {
        self.child.stdout.take()
    }

    pub fn take_stderr(&mut self) -> Option<ChildStderr> {
        self.child.stderr.take()
    }

    /// Wait for the child to exit and return its exit code
    ///
    /// A child terminated by a signal has no code and maps to `FAILURE_EXIT_CODE`.
    pub async fn wait(&mut self) -> Result<i32> {
        let status = self.child.wait().await?;
        debug!("{} exited with {}", self.command, status);
        Ok(status.code().unwrap_or(FAILURE_EXIT_CODE))
    }
}

/// Copy `input` to the child's stdin verbatim, flushing after every chunk
///
/// Returns the number of bytes forwarded. Ends on EOF of `input` or once the
/// child stops accepting writes; either way the child's stdin is closed.
pub async fn relay_input<R, W>(mut input: R, mut child_stdin: W) -> u64
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = [0u8; CHUNK_SIZE];
    let mut total = 0u64;

    loop {
        let n = match input.read(&mut buf).await {
            Ok(0) => {
                debug!("Input closed after {} bytes", total);
                break;
            }
            Ok(n) => n,
            Err(e) => {
                debug!("{}", GdaiError::StreamClosed(format!("input: {}", e)));
                break;
            }
        };

        if let Err(e) = write_and_flush(&mut child_stdin, &buf[..n]).await {
            debug!("{}", GdaiError::StreamClosed(format!("child stdin: {}", e)));
            break;
        }
        total += n as u64;
    }

    let _ = child_stdin.shutdown().await;
    total
}

/// Copy the child's stdout to `sink`, rewriting CRLF to LF
pub async fn relay_output<R, W>(child_stdout: R, sink: FallbackWriter<W>) -> u64
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pump(child_stdout, sink, Some(CrlfNormalizer::new())).await
}

/// Copy the child's stderr to `sink` unchanged
pub async fn relay_error<R, W>(child_stderr: R, sink: FallbackWriter<W>) -> u64
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pump(child_stderr, sink, None).await
}

async fn pump<R, W>(
    mut source: R,
    mut sink: FallbackWriter<W>,
    mut normalizer: Option<CrlfNormalizer>,
) -> u64
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = [0u8; CHUNK_SIZE];
    let mut total = 0u64;

    loop {
        let n = match source.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                debug!("{}", GdaiError::StreamClosed(format!("{}: {}", sink.name, e)));
                break;
            }
        };

        let chunk = match normalizer.as_mut() {
            Some(normalizer) => normalizer.push(&buf[..n]),
            None => buf[..n].to_vec(),
        };
        total += sink.write_chunk(&chunk).await;
    }

    if let Some(tail) = normalizer.as_mut().map(CrlfNormalizer::finish) {
        total += sink.write_chunk(&tail).await;
    }

    debug!("{} relay finished after {} bytes", sink.name, total);
    total
}

async fn write_and_flush<W: AsyncWrite + Unpin>(writer: &mut W, data: &[u8]) -> std::io::Result<()> {
    writer.write_all(data).await?;
    writer.flush().await
}

/// Async writer backed by a blocking handle to the same stream
///
/// Chunks the primary writer rejects are retried on the fallback. If both
/// fail the chunk is dropped and the relay keeps reading.
pub struct FallbackWriter<W> {
    name: &'static str,
    primary: W,
    fallback: Box<dyn Write + Send>,
}

impl<W: AsyncWrite + Unpin> FallbackWriter<W> {
    pub fn new(name: &'static str, primary: W, fallback: Box<dyn Write + Send>) -> Self {
        Self {
            name,
            primary,
            fallback,
        }
    }

    /// Write and flush one chunk, returning how many bytes were delivered
    pub async fn write_chunk(&mut self, data: &[u8]) -> u64 {
        if data.is_empty() {
            return 0;
        }

        let primary_err = match write_and_flush(&mut self.primary, data).await {
            Ok(()) => return data.len() as u64,
            Err(e) => e,
        };

        debug!("{} write failed ({}), using fallback", self.name, primary_err);
        let fallback = self
            .fallback
            .write_all(data)
            .and_then(|()| self.fallback.flush());

        match fallback {
            Ok(()) => data.len() as u64,
            Err(e) => {
                warn!(
                    "{}; dropped {} bytes",
                    GdaiError::StreamClosed(format!("{}: {}", self.name, e)),
                    data.len()
                );
                0
            }
        }
    }
}

/// Relay the process's own stdio to and from `child` until it exits
///
/// Returns the child's exit code.
pub async fn run(mut child: ChildHandle) -> Result<i32> {
    let stdin = child.take_stdin();
    let stdout = child.take_stdout();
    let stderr = child.take_stderr();

    let input_task = stdin.map(|pipe| tokio::spawn(relay_input(tokio::io::stdin(), pipe)));

    let output_task = stdout.map(|pipe| {
        let sink = FallbackWriter::new(
            "stdout",
            tokio::io::stdout(),
            Box::new(std::io::stdout()),
        );
        tokio::spawn(relay_output(pipe, sink))
    });

    let error_task = stderr.map(|pipe| {
        let sink = FallbackWriter::new(
            "stderr",
            tokio::io::stderr(),
            Box::new(std::io::stderr()),
        );
        tokio::spawn(relay_error(pipe, sink))
    });

    let code = child.wait().await?;
    info!("{} exited with code {}", child.command(), code);

    for task in [output_task, error_task].into_iter().flatten() {
        if tokio::time::timeout(DRAIN_TIMEOUT, task).await.is_err() {
            warn!("Relay still draining after {:?}, giving up", DRAIN_TIMEOUT);
        }
    }

    // Blocked on our stdin; nothing left to forward to.
    if let Some(task) = input_task {
        task.abort();
    }

    Ok(code)
}
