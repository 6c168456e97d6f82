use crate::core::errors::ToolFailure;
use crate::core::models::Stage;
use crate::ui::observer::{LineObserver, OutputStream};
use std::collections::VecDeque;
use std::path::Path;
use std::process::Stdio;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

const STDERR_TAIL_LINES: usize = 10;
const TERMINATE_GRACE: Duration = Duration::from_secs(3);

/// Everything needed to launch one external tool.
pub struct CommandSpec<'a> {
    pub tool: &'a str,
    pub program: &'a Path,
    pub args: &'a [String],
    pub timeout: Duration,
    pub stage: Stage,
}

#[derive(Debug)]
pub struct CommandResult {
    pub exit_code: Option<i32>,
    pub stderr_tail: String,
    pub duration_ms: u128,
    pub pid: Option<u32>,
}

enum Completion {
    Exited(std::io::Result<std::process::ExitStatus>),
    TimedOut,
    Cancelled,
}

/// Run a tool to completion, streaming each output line to `observer` as it
/// arrives. The child is terminated on timeout or cancellation and a non-zero
/// exit is reported as a failure carrying the last lines of stderr.
pub async fn execute(
    spec: &CommandSpec<'_>,
    observer: &dyn LineObserver,
    cancel: &CancellationToken,
) -> Result<CommandResult, ToolFailure> {
    let start = Instant::now();
    tracing::debug!("Executing: {:?} {:?}", spec.program, spec.args);

    let mut cmd = Command::new(spec.program);
    cmd.args(spec.args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = cmd.spawn().map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => ToolFailure::NotFound {
            tool: spec.tool.to_string(),
        },
        _ => ToolFailure::Spawn {
            tool: spec.tool.to_string(),
            reason: e.to_string(),
        },
    })?;

    let pid = child.id();
    let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
        terminate(&mut child).await;
        return Err(ToolFailure::Spawn {
            tool: spec.tool.to_string(),
            reason: "output pipes were not captured".to_string(),
        });
    };

    let tail = Mutex::new(VecDeque::with_capacity(STDERR_TAIL_LINES));

    let completion = {
        let run = async {
            let (_, _, status) = tokio::join!(
                pump_lines(stdout, spec.stage, OutputStream::Stdout, observer, None),
                pump_lines(stderr, spec.stage, OutputStream::Stderr, observer, Some(&tail)),
                child.wait()
            );
            status
        };
        tokio::select! {
            status = run => Completion::Exited(status),
            _ = sleep(spec.timeout) => Completion::TimedOut,
            _ = cancel.cancelled() => Completion::Cancelled,
        }
    };

    let stderr_tail = tail
        .lock()
        .map(|lines| lines.iter().cloned().collect::<Vec<_>>().join("\n"))
        .unwrap_or_default();
    let duration_ms = start.elapsed().as_millis();

    match completion {
        Completion::Exited(Ok(status)) if status.success() => Ok(CommandResult {
            exit_code: status.code(),
            stderr_tail,
            duration_ms,
            pid,
        }),
        Completion::Exited(Ok(status)) => Err(ToolFailure::NonZeroExit {
            tool: spec.tool.to_string(),
            code: status.code(),
            stderr_tail,
        }),
        Completion::Exited(Err(e)) => Err(ToolFailure::Spawn {
            tool: spec.tool.to_string(),
            reason: format!("process error: {}", e),
        }),
        Completion::TimedOut => {
            tracing::warn!("{} exceeded {}s, terminating", spec.tool, spec.timeout.as_secs());
            terminate(&mut child).await;
            Err(ToolFailure::TimedOut {
                tool: spec.tool.to_string(),
                after: spec.timeout,
            })
        }
        Completion::Cancelled => {
            tracing::info!("Interrupt received, terminating {}", spec.tool);
            terminate(&mut child).await;
            Err(ToolFailure::Interrupted {
                tool: spec.tool.to_string(),
            })
        }
    }
}

/// Lines are decoded lossily; tools occasionally emit raw bytes from banners.
async fn pump_lines<R>(
    reader: R,
    stage: Stage,
    stream: OutputStream,
    observer: &dyn LineObserver,
    tail: Option<&Mutex<VecDeque<String>>>,
) where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf);
                let line = line.trim_end_matches(['\n', '\r']);
                observer.on_line(stage, stream, line);
                if let Some(tail) = tail
                    && let Ok(mut lines) = tail.lock()
                {
                    if lines.len() == STDERR_TAIL_LINES {
                        lines.pop_front();
                    }
                    lines.push_back(line.to_string());
                }
            }
            Err(e) => {
                tracing::debug!("Stopped reading {:?} for {}: {}", stream, stage, e);
                break;
            }
        }
    }
}

/// Ask politely first, then kill if the process ignores the signal.
async fn terminate(child: &mut Child) {
    if send_sigterm(child)
        && let Ok(Ok(_)) = tokio::time::timeout(TERMINATE_GRACE, child.wait()).await
    {
        return;
    }
    if let Err(e) = child.kill().await {
        tracing::debug!("Failed to kill child process: {}", e);
    }
}

#[cfg(unix)]
fn send_sigterm(child: &Child) -> bool {
    match child.id() {
        // SAFETY: plain signal delivery to a pid we spawned and still own.
        Some(pid) => unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) == 0 },
        None => false,
    }
}

#[cfg(not(unix))]
fn send_sigterm(_child: &Child) -> bool {
    false
}
