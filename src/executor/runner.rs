// Process executor - spawns, streams, paces progress and enforces timeouts

use crate::executor::config::{ExecutorConfig, RunLimits};
use crate::executor::context::ExecutionContext;
use crate::executor::error::ExecutorError;
use crate::executor::types::{ExecutionRequest, ExecutionResult, ProgressSnapshot};
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Child;
use tokio::sync::{Semaphore, mpsc};
use tokio::time::{MissedTickBehavior, timeout};
use tracing::{debug, info, warn};

/// Channel that receives progress snapshots while a request runs
pub type ProgressSender = mpsc::UnboundedSender<ProgressSnapshot>;

/// How long to wait for a killed child to be reaped
const KILL_GRACE: Duration = Duration::from_secs(2);
const DRAIN_IDLE: Duration = Duration::from_millis(50);
const DRAIN_BUDGET: Duration = Duration::from_millis(500);

/// Runs terminal commands through the platform interpreter
pub struct ProcessExecutor {
    config: ExecutorConfig,
    permits: Arc<Semaphore>,
}

impl ProcessExecutor {
    pub fn new(config: ExecutorConfig) -> Self {
        let max = config.max_concurrent.max(1);
        debug!(
            platform = ?config.platform,
            max_concurrent = max,
            output_dir = %config.output_dir.display(),
            "initializing process executor"
        );
        Self {
            permits: Arc::new(Semaphore::new(max)),
            config,
        }
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Number of children currently running
    pub fn in_flight(&self) -> usize {
        self.config.max_concurrent.max(1) - self.permits.available_permits()
    }

    /// Execute `request` to completion
    ///
    /// Long-running commands push snapshots into `progress`; every snapshot
    /// is sent before this future resolves. Failures never escape: they are
    /// reported through the returned result.
    pub async fn execute(
        &self,
        request: &ExecutionRequest,
        limits: &RunLimits,
        progress: Option<&ProgressSender>,
    ) -> ExecutionResult {
        let _permit = match self.permits.acquire().await {
            Ok(permit) => permit,
            Err(_) => {
                return ExecutionContext::new(request, limits.clone()).failed(ExecutorError::Closed.to_string());
            }
        };

        // Timing starts once a slot is held, queueing is not run time
        let ctx = ExecutionContext::new(request, limits.clone());

        info!(
            request_id = %ctx.id,
            command = %request.command_text.chars().take(100).collect::<String>(),
            cwd = %request.working_directory.display(),
            long_running = ctx.long_running,
            timeout_ms = request.timeout_ms,
            "executing terminal command"
        );

        let mut command = self.config.platform.command(&request.command_text);
        command
            .current_dir(&request.working_directory)
            .envs(request.environment_overrides.iter().cloned())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        // Own process group, so a timeout can reach everything the shell started
        #[cfg(unix)]
        command.process_group(0);

        let child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                let err = ExecutorError::SpawnFailed(request.command_text.clone(), e.to_string());
                warn!(request_id = %ctx.id, error = %err, "spawn failed");
                return ctx.failed(err.to_string());
            }
        };

        let result = drive(child, ctx, request, progress).await;

        info!(
            request_id = %result.request_id,
            exit_code = ?result.exit_code,
            success = result.success,
            timed_out = result.timed_out,
            duration_ms = result.duration_ms(),
            output_bytes = result.stdout.len() + result.stderr.len(),
            "terminal command finished"
        );
        result
    }
}

async fn read_some<R: AsyncRead + Unpin>(stream: &mut Option<R>, buf: &mut [u8]) -> std::io::Result<usize> {
    match stream {
        Some(s) => s.read(buf).await,
        None => std::future::pending().await,
    }
}

async fn drive(
    mut child: Child,
    mut ctx: ExecutionContext,
    request: &ExecutionRequest,
    progress: Option<&ProgressSender>,
) -> ExecutionResult {
    let mut stdout = child.stdout.take();
    let mut stderr = child.stderr.take();
    let mut out_buf = vec![0u8; 8192];
    let mut err_buf = vec![0u8; 8192];

    let interval = ctx.progress_interval().max(Duration::from_millis(1));
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let deadline = tokio::time::sleep(Duration::from_millis(request.timeout_ms));
    tokio::pin!(deadline);

    let mut exit_code: Option<Option<i32>> = None;
    let mut timed_out = false;

    // Ends when the child exits; output still in flight is drained below
    while exit_code.is_none() {
        tokio::select! {
            read = read_some(&mut stdout, &mut out_buf) => match read {
                Ok(0) => stdout = None,
                Ok(n) => ctx.push_stdout(&out_buf[..n]),
                Err(e) => {
                    warn!(request_id = %ctx.id, error = %e, "stdout read failed");
                    stdout = None;
                }
            },
            read = read_some(&mut stderr, &mut err_buf) => match read {
                Ok(0) => stderr = None,
                Ok(n) => ctx.push_stderr(&err_buf[..n]),
                Err(e) => {
                    warn!(request_id = %ctx.id, error = %e, "stderr read failed");
                    stderr = None;
                }
            },
            status = child.wait() => {
                exit_code = Some(match status {
                    Ok(status) => status.code(),
                    Err(e) => {
                        let err = ExecutorError::WaitFailed(request.command_text.clone(), e.to_string());
                        warn!(request_id = %ctx.id, error = %err, "wait failed");
                        None
                    }
                });
            }
            _ = ticker.tick(), if ctx.long_running => {
                if let Some(snapshot) = ctx.snapshot(Instant::now()) {
                    emit(progress, snapshot);
                }
            }
            _ = &mut deadline => {
                timed_out = true;
                break;
            }
        }
    }

    if timed_out {
        warn!(request_id = %ctx.id, timeout_ms = request.timeout_ms, "command timed out, killing");
        terminate(&mut child).await;
    }

    // A background job may still hold the pipes open, so never wait for EOF
    drain_ready(&mut stdout, &mut out_buf, &mut ctx, true).await;
    drain_ready(&mut stderr, &mut err_buf, &mut ctx, false).await;

    if ctx.long_running && ctx.emitted() == 0 && ctx.elapsed() >= ctx.progress_interval() {
        if let Some(snapshot) = ctx.snapshot(Instant::now()) {
            emit(progress, snapshot);
        }
    }

    ctx.finish(exit_code.flatten(), timed_out)
}

fn emit(progress: Option<&ProgressSender>, snapshot: ProgressSnapshot) {
    debug!(request_id = %snapshot.request_id, elapsed_ms = snapshot.elapsed_ms, "progress snapshot");
    if let Some(tx) = progress {
        if tx.send(snapshot).is_err() {
            debug!("progress receiver dropped");
        }
    }
}

async fn terminate(child: &mut Child) {
    #[cfg(unix)]
    if let Some(pid) = child.id() {
        // SAFETY: killpg has no memory effects; the child leads group `pid`
        // and is not reaped yet, so the id cannot have been reused
        if unsafe { libc::killpg(pid as libc::pid_t, libc::SIGKILL) } != 0 {
            debug!(error = %std::io::Error::last_os_error(), "killpg failed");
        }
    }
    if let Err(e) = child.start_kill() {
        debug!(error = %e, "kill failed, process already gone");
    }
    match timeout(KILL_GRACE, child.wait()).await {
        Ok(Ok(status)) => debug!(status = ?status, "killed process reaped"),
        Ok(Err(e)) => warn!(error = %e, "failed to reap killed process"),
        Err(_) => warn!("killed process did not exit within grace period"),
    }
}

/// Read what is already buffered on `stream`
///
/// Stops at EOF, after `DRAIN_IDLE` without data, or once `DRAIN_BUDGET`
/// is spent, whichever comes first. The stream is closed afterwards.
async fn drain_ready<R: AsyncRead + Unpin>(
    stream: &mut Option<R>,
    buf: &mut [u8],
    ctx: &mut ExecutionContext,
    is_stdout: bool,
) {
    let drained = timeout(DRAIN_BUDGET, async {
        while stream.is_some() {
            match timeout(DRAIN_IDLE, read_some(stream, buf)).await {
                Ok(Ok(n)) if n > 0 => {
                    if is_stdout {
                        ctx.push_stdout(&buf[..n]);
                    } else {
                        ctx.push_stderr(&buf[..n]);
                    }
                }
                _ => *stream = None,
            }
        }
    })
    .await;
    if drained.is_err() {
        debug!(request_id = %ctx.id, is_stdout, "pipe still busy after exit, stopped draining");
    }
    *stream = None;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_flight_starts_at_zero() {
        let executor = ProcessExecutor::new(ExecutorConfig::default());
        assert_eq!(executor.in_flight(), 0);
    }
}
