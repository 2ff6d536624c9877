//! One engine process per invocation.
//!
//! The credential reaches the child only through its environment; argv carries
//! the operation and its scalar arguments, stdin the JSON input document.
//! Stdin is fed and stdout and stderr are drained on their own threads while
//! the parent waits, so neither a long sequence nor an envelope larger than
//! the pipe buffer can stall the child.

use std::fmt;
use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use super::{parse_envelope, Engine, EngineInvocation, EngineResult};
use crate::error::{GatewayError, GatewayResult};

/// Environment variable through which the engine receives its credential.
pub const CREDENTIAL_ENV: &str = "ALPHAGENOME_API_KEY";

/// Poll interval while waiting on an engine with a timeout.
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Bearer credential for the prediction service. Never printed.
#[derive(Clone)]
pub struct Credential(String);

impl Credential {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(<redacted>)")
    }
}

/// Program and leading arguments used to start the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
}

/// Engine that spawns a fresh process for every invocation.
#[derive(Debug, Clone)]
pub struct ProcessEngine {
    command: EngineCommand,
    credential: Credential,
    timeout: Option<Duration>,
}

impl ProcessEngine {
    pub const fn new(command: EngineCommand, credential: Credential) -> Self {
        Self {
            command,
            credential,
            timeout: None,
        }
    }

    /// Kill and report engines that run longer than `timeout`.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    fn spawn(&self, invocation: &EngineInvocation) -> GatewayResult<Child> {
        Command::new(&self.command.program)
            .args(&self.command.args)
            .args(invocation.argv())
            .env(CREDENTIAL_ENV, self.credential.expose())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| GatewayError::Launch {
                program: self.command.program.display().to_string(),
                reason: e.to_string(),
            })
    }

    fn wait(&self, child: &mut Child, operation: &str) -> GatewayResult<ExitStatus> {
        let io_error = |e: std::io::Error| GatewayError::Io {
            operation: operation.to_owned(),
            reason: format!("failed to wait for engine: {e}"),
        };

        let Some(limit) = self.timeout else {
            return child.wait().map_err(io_error);
        };

        let started = Instant::now();
        loop {
            if let Some(status) = child.try_wait().map_err(io_error)? {
                return Ok(status);
            }
            if started.elapsed() >= limit {
                warn!(operation, timeout_ms = limit.as_millis(), "engine timed out, killing");
                let _ = child.kill();
                let _ = child.wait();
                return Err(GatewayError::Timeout {
                    operation: operation.to_owned(),
                    after: limit,
                });
            }
            std::thread::sleep(POLL_INTERVAL);
        }
    }
}

impl Engine for ProcessEngine {
    fn invoke(&self, invocation: &EngineInvocation) -> EngineResult {
        let operation = invocation.operation();
        let flags: Vec<&str> = invocation.args().iter().map(|(f, _)| f.as_str()).collect();
        debug!(operation, ?flags, program = %self.command.program.display(), "spawning engine");

        let started = Instant::now();
        let mut child = self.spawn(invocation)?;
        let stdin = feed(child.stdin.take(), invocation.stdin_document());
        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        // On timeout the pipe threads are left to finish on their own once
        // the killed process's pipes close.
        let status = self.wait(&mut child, operation)?;
        let stdout = collect(operation, stdout)?;
        let stderr = collect(operation, stderr)?;

        info!(
            operation,
            code = ?status.code(),
            stdout_bytes = stdout.len(),
            elapsed_ms = started.elapsed().as_millis(),
            "engine finished"
        );

        if !status.success() {
            let diagnostic = if stderr.iter().all(u8::is_ascii_whitespace) {
                String::from_utf8_lossy(&stdout).trim().to_owned()
            } else {
                String::from_utf8_lossy(&stderr).trim().to_owned()
            };
            return Err(GatewayError::Exit {
                operation: operation.to_owned(),
                code: status.code(),
                stderr: diagnostic,
            });
        }

        if !stderr.is_empty() {
            debug!(operation, stderr = %String::from_utf8_lossy(&stderr), "engine stderr");
        }
        collect(operation, stdin)?;

        parse_envelope(operation, &stdout)
    }
}

/// Write `document` to the child's stdin and close it. An engine that exits
/// without reading its input is not an error.
fn feed<W: Write + Send + 'static>(
    pipe: Option<W>,
    document: Vec<u8>,
) -> JoinHandle<io::Result<()>> {
    std::thread::spawn(move || {
        let Some(mut pipe) = pipe else {
            return Ok(());
        };
        match pipe.write_all(&document).and_then(|()| pipe.flush()) {
            Err(e) if e.kind() != io::ErrorKind::BrokenPipe => Err(e),
            _ => Ok(()),
        }
    })
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> JoinHandle<io::Result<Vec<u8>>> {
    std::thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            pipe.read_to_end(&mut buf)?;
        }
        Ok(buf)
    })
}

fn collect<T>(operation: &str, reader: JoinHandle<io::Result<T>>) -> GatewayResult<T> {
    let io_error = |reason: String| GatewayError::Io {
        operation: operation.to_owned(),
        reason,
    };
    reader
        .join()
        .map_err(|_| io_error("engine pipe thread panicked".to_owned()))?
        .map_err(|e| io_error(format!("engine pipe I/O failed: {e}")))
}
