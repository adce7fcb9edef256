// Final operator message for a terminal command

use crate::executor::classify::is_source_control_inspection;
use crate::executor::types::ExecutionResult;
use crate::output::{OutputManager, chunk_join, truncate};

/// Build the reply text for `result`
///
/// Applies, in order: the chunk-log spill (joined chunks longer than twice
/// the cap), the source-control spill (inspection output longer than 1.5x
/// the cap) and the hard cap. At most one file is written.
pub fn render_result(
    result: &ExecutionResult,
    command: &str,
    cap: usize,
    spill_enabled: bool,
    output: &OutputManager,
) -> String {
    let mut spilled = None;

    if spill_enabled && !result.chunks.is_empty() {
        let joined = chunk_join(&result.chunks);
        if joined.chars().count() > cap.saturating_mul(2) {
            spilled = output.spill(command, &joined);
        }
    }

    let visible = result.visible_output();
    let visible_chars = visible.chars().count();

    let mut body = if visible.is_empty() {
        "(no output)".to_string()
    } else if visible_chars <= cap {
        visible.to_string()
    } else if spill_enabled
        && spilled.is_none()
        && is_source_control_inspection(command)
        && visible_chars as f64 > cap as f64 * 1.5
    {
        match output.spill(command, visible) {
            Some(path) => {
                let head: String = visible.chars().take(cap).collect();
                format!(
                    "{}\n... [{} chars, full output saved to {}]",
                    head,
                    visible_chars,
                    path.display()
                )
            }
            None => truncate(visible, cap).0,
        }
    } else {
        truncate(visible, cap).0
    };

    if result.dropped_bytes > 0 {
        body.push_str(&format!(
            "\n[{} bytes beyond the capture buffer were discarded]",
            result.dropped_bytes
        ));
    }

    with_status(result, body, spilled.as_deref())
}

fn with_status(result: &ExecutionResult, body: String, spilled: Option<&std::path::Path>) -> String {
    let status = if result.timed_out {
        format!(
            "[timed out after {:.1}s, exit {}]",
            result.duration_ms() as f64 / 1000.0,
            result.exit_code.unwrap_or_default()
        )
    } else {
        match (result.success, result.exit_code) {
            (true, _) => "[exit 0]".to_string(),
            (false, Some(code)) => format!("[failed, exit {}]", code),
            (false, None) => "[failed to run]".to_string(),
        }
    };

    let mut message = format!("{}\n{}", status, body);
    if let Some(path) = spilled {
        message.push_str(&format!("\nFull output saved to {}", path.display()));
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::types::ExecutionResult;
    use chrono::Utc;
    use uuid::Uuid;

    fn result(stdout: &str, stderr: &str, code: i32) -> ExecutionResult {
        ExecutionResult {
            request_id: Uuid::new_v4(),
            success: code == 0,
            exit_code: Some(code),
            stdout: stdout.to_string(),
            stderr: stderr.to_string(),
            combined_output: String::new(),
            started_at: Utc::now(),
            finished_at: Utc::now(),
            timed_out: false,
            long_running: false,
            chunks: Vec::new(),
            dropped_bytes: 0,
        }
    }

    #[test]
    fn test_stderr_preferred_even_on_success() {
        let dir = tempfile::tempdir().unwrap();
        let output = OutputManager::new(dir.path());
        let text = render_result(&result("out", "warning: x", 0), "cmd", 100, true, &output);
        assert!(text.starts_with("[exit 0]"));
        assert!(text.contains("warning: x"));
        assert!(!text.contains("out\n"));
    }

    #[test]
    fn test_hard_truncation() {
        let dir = tempfile::tempdir().unwrap();
        let output = OutputManager::new(dir.path());
        let long = "x".repeat(500);
        let text = render_result(&result(&long, "", 1), "cat file", 100, true, &output);
        assert!(text.starts_with("[failed, exit 1]"));
        assert!(text.contains("500 chars total"));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_git_inspection_spills() {
        let dir = tempfile::tempdir().unwrap();
        let output = OutputManager::new(dir.path());
        let long = "commit abc\n".repeat(100);
        let text = render_result(&result(&long, "", 0), "git log", 100, true, &output);
        assert!(text.contains("full output saved to"));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_git_inspection_spill_keeps_discard_note() {
        let dir = tempfile::tempdir().unwrap();
        let output = OutputManager::new(dir.path());
        let mut res = result(&"commit abc\n".repeat(100), "", 0);
        res.dropped_bytes = 4096;
        let text = render_result(&res, "git log", 100, true, &output);
        assert!(text.contains("full output saved to"));
        assert!(text.ends_with("[4096 bytes beyond the capture buffer were discarded]"));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_chunk_log_spill_writes_one_file() {
        let dir = tempfile::tempdir().unwrap();
        let output = OutputManager::new(dir.path());
        let mut res = result(&"y".repeat(400), "", 0);
        res.chunks = vec!["a".repeat(150), "b".repeat(150)];
        let text = render_result(&res, "git log", 100, true, &output);
        assert!(text.contains("Full output saved to"));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_empty_output() {
        let dir = tempfile::tempdir().unwrap();
        let output = OutputManager::new(dir.path());
        let text = render_result(&result("", "", 0), "true", 100, true, &output);
        assert_eq!(text, "[exit 0]\n(no output)");
    }
}
