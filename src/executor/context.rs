// Per-request execution state: captured streams, chunk log, progress pacing

use crate::executor::classify::is_long_running;
use crate::executor::config::RunLimits;
use crate::executor::types::{ExecutionRequest, ExecutionResult, ProgressSnapshot, TIMEOUT_EXIT_CODE};
use chrono::{DateTime, Utc};
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Incremental UTF-8 decoder that tolerates characters split across reads
#[derive(Debug, Default)]
struct StreamBuffer {
    text: String,
    pending: Vec<u8>,
    captured_bytes: usize,
    dropped_bytes: usize,
    /// Offset into `text` already covered by the chunk log
    chunk_offset: usize,
}

impl StreamBuffer {
    fn push(&mut self, bytes: &[u8], cap: usize) {
        let room = cap.saturating_sub(self.captured_bytes);
        let (kept, dropped) = bytes.split_at(bytes.len().min(room));
        self.captured_bytes += kept.len();
        self.dropped_bytes += dropped.len();
        self.pending.extend_from_slice(kept);
        self.decode();
    }

    fn decode(&mut self) {
        loop {
            match std::str::from_utf8(&self.pending) {
                Ok(valid) => {
                    self.text.push_str(valid);
                    self.pending.clear();
                    return;
                }
                Err(e) => {
                    let valid_up_to = e.valid_up_to();
                    self.text
                        .push_str(&String::from_utf8_lossy(&self.pending[..valid_up_to]));
                    match e.error_len() {
                        // Incomplete character at the end: wait for more bytes
                        None => {
                            self.pending.drain(..valid_up_to);
                            return;
                        }
                        Some(len) => {
                            self.text.push(char::REPLACEMENT_CHARACTER);
                            self.pending.drain(..valid_up_to + len);
                        }
                    }
                }
            }
        }
    }

    fn flush(&mut self) {
        if !self.pending.is_empty() {
            self.text.push_str(&String::from_utf8_lossy(&self.pending));
            self.pending.clear();
        }
    }

    fn take_delta(&mut self) -> &str {
        let start = self.chunk_offset;
        self.chunk_offset = self.text.len();
        &self.text[start..]
    }
}

/// State owned by exactly one running request
#[derive(Debug)]
pub struct ExecutionContext {
    pub id: Uuid,
    pub long_running: bool,
    started: Instant,
    started_at: DateTime<Utc>,
    limits: RunLimits,
    stdout: StreamBuffer,
    stderr: StreamBuffer,
    chunks: Vec<String>,
    last_emit: Option<Instant>,
    emitted: usize,
}

impl ExecutionContext {
    pub fn new(request: &ExecutionRequest, limits: RunLimits) -> Self {
        Self {
            id: Uuid::new_v4(),
            long_running: is_long_running(&request.command_text),
            started: Instant::now(),
            started_at: Utc::now(),
            limits,
            stdout: StreamBuffer::default(),
            stderr: StreamBuffer::default(),
            chunks: Vec::new(),
            last_emit: None,
            emitted: 0,
        }
    }

    pub fn push_stdout(&mut self, bytes: &[u8]) {
        self.stdout.push(bytes, self.limits.max_buffer_bytes);
    }

    pub fn push_stderr(&mut self, bytes: &[u8]) {
        self.stderr.push(bytes, self.limits.max_buffer_bytes);
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn progress_interval(&self) -> Duration {
        self.limits.progress_interval
    }

    /// Number of snapshots produced so far
    pub fn emitted(&self) -> usize {
        self.emitted
    }

    /// Produce a snapshot if this request streams progress and the interval
    /// since the last one has passed
    pub fn snapshot(&mut self, now: Instant) -> Option<ProgressSnapshot> {
        if !self.long_running {
            return None;
        }
        let reference = self.last_emit.unwrap_or(self.started);
        if now.duration_since(reference) < self.limits.progress_interval {
            return None;
        }
        self.last_emit = Some(now);
        self.emitted += 1;
        self.record_chunk();

        Some(ProgressSnapshot {
            request_id: self.id,
            elapsed_ms: now.duration_since(self.started).as_millis() as u64,
            partial_output: tail_chars(&self.combined(), self.limits.snapshot_chars),
        })
    }

    fn record_chunk(&mut self) {
        if !self.limits.save_chunks {
            return;
        }
        let mut chunk = self.stdout.take_delta().to_string();
        let err = self.stderr.take_delta();
        if !err.is_empty() {
            if !chunk.is_empty() && !chunk.ends_with('\n') {
                chunk.push('\n');
            }
            chunk.push_str(err);
        }
        if !chunk.is_empty() {
            self.chunks.push(chunk);
        }
    }

    fn combined(&self) -> String {
        let out = self.stdout.text.trim_end();
        let err = self.stderr.text.trim_end();
        match (out.is_empty(), err.is_empty()) {
            (_, true) => out.to_string(),
            (true, false) => err.to_string(),
            (false, false) => format!("{}\n{}", out, err),
        }
    }

    /// Consume the context into the final result
    ///
    /// `exit_code` is `None` when the process could not be waited on.
    pub fn finish(mut self, exit_code: Option<i32>, timed_out: bool) -> ExecutionResult {
        self.stdout.flush();
        self.stderr.flush();
        if self.emitted > 0 {
            self.record_chunk();
        }

        let combined_output = self.combined().trim().to_string();
        let exit_code = if timed_out { Some(TIMEOUT_EXIT_CODE) } else { exit_code };

        ExecutionResult {
            request_id: self.id,
            success: !timed_out && exit_code == Some(0),
            exit_code,
            stdout: self.stdout.text,
            stderr: self.stderr.text,
            combined_output,
            started_at: self.started_at,
            finished_at: Utc::now(),
            timed_out,
            long_running: self.long_running,
            chunks: self.chunks,
            dropped_bytes: self.stdout.dropped_bytes + self.stderr.dropped_bytes,
        }
    }

    /// Result for a request whose process never started
    pub fn failed(mut self, message: impl Into<String>) -> ExecutionResult {
        self.stderr.text = message.into();
        self.finish(None, false)
    }
}

fn tail_chars(text: &str, max: usize) -> String {
    let total = text.chars().count();
    if total <= max {
        return text.to_string();
    }
    let tail: String = text.chars().skip(total - max).collect();
    format!("...{}", tail)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits(interval_ms: u64) -> RunLimits {
        RunLimits {
            progress_interval: Duration::from_millis(interval_ms),
            save_chunks: true,
            max_buffer_bytes: 1024,
            snapshot_chars: 100,
        }
    }

    #[test]
    fn test_short_command_never_snapshots() {
        let request = ExecutionRequest::terminal("echo hi", ".");
        let mut ctx = ExecutionContext::new(&request, limits(0));
        assert!(!ctx.long_running);
        assert!(ctx.snapshot(Instant::now() + Duration::from_secs(10)).is_none());
    }

    #[test]
    fn test_snapshots_are_paced() {
        let request = ExecutionRequest::terminal("wget http://example.com", ".");
        let mut ctx = ExecutionContext::new(&request, limits(1000));
        let start = Instant::now();

        assert!(ctx.snapshot(start).is_none());
        ctx.push_stdout(b"part one\n");
        let first = ctx.snapshot(start + Duration::from_millis(1500)).unwrap();
        assert!(first.partial_output.contains("part one"));
        assert!(ctx.snapshot(start + Duration::from_millis(2000)).is_none());

        ctx.push_stderr(b"part two\n");
        assert!(ctx.snapshot(start + Duration::from_millis(2600)).is_some());
        assert_eq!(ctx.emitted(), 2);

        let result = ctx.finish(Some(0), false);
        assert_eq!(result.chunks, vec!["part one\n".to_string(), "part two\n".to_string()]);
    }

    #[test]
    fn test_split_utf8_is_reassembled() {
        let request = ExecutionRequest::terminal("echo", ".");
        let mut ctx = ExecutionContext::new(&request, limits(1000));
        let bytes = "héllo".as_bytes();
        ctx.push_stdout(&bytes[..2]);
        ctx.push_stdout(&bytes[2..]);
        let result = ctx.finish(Some(0), false);
        assert_eq!(result.stdout, "héllo");
    }

    #[test]
    fn test_buffer_cap_drops_excess() {
        let request = ExecutionRequest::terminal("yes", ".");
        let mut ctx = ExecutionContext::new(&request, limits(1000));
        ctx.push_stdout(&[b'a'; 2000]);
        let result = ctx.finish(Some(0), false);
        assert_eq!(result.stdout.len(), 1024);
        assert_eq!(result.dropped_bytes, 976);
    }

    #[test]
    fn test_timeout_result_shape() {
        let request = ExecutionRequest::terminal("sleep 10", ".");
        let ctx = ExecutionContext::new(&request, limits(1000));
        let result = ctx.finish(None, true);
        assert!(!result.success);
        assert!(result.timed_out);
        assert_eq!(result.exit_code, Some(TIMEOUT_EXIT_CODE));
    }

    #[test]
    fn test_tail_chars() {
        assert_eq!(tail_chars("abcdef", 3), "...def");
        assert_eq!(tail_chars("abc", 3), "abc");
    }
}
