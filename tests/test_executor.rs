// Integration tests for the process executor
// Run with cargo test --test test_executor

#[path = "../src/executor/mod.rs"]
mod executor;

#[path = "../src/history/mod.rs"]
mod history;

#[path = "../src/output/mod.rs"]
mod output;

#[path = "../src/settings/mod.rs"]
mod settings;

use std::path::Path;
use std::time::Duration;

fn init_tracing() {
    use std::sync::Once;
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_target(true)
            .init();
    });
}

fn create_executor(output_dir: &Path) -> executor::ProcessExecutor {
    executor::ProcessExecutor::new(executor::ExecutorConfig {
        output_dir: output_dir.to_path_buf(),
        ..Default::default()
    })
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use executor::{ExecutionRequest, RunLimits, TIMEOUT_EXIT_CODE, render_result};
    use output::OutputManager;
    use settings::ToolsConfiguration;
    use tokio::sync::mpsc;

    /// echo with default settings: success, trimmed output, no spill
    #[tokio::test]
    async fn test_echo_hello() {
        init_tracing();
        let dir = tempfile::tempdir().unwrap();
        let executor = create_executor(&dir.path().join("output"));
        let config = ToolsConfiguration::default();

        let request = ExecutionRequest::terminal("echo hello", dir.path()).with_timeout_ms(config.timeout_ms);
        let result = executor.execute(&request, &RunLimits::from(&config), None).await;

        assert!(result.success);
        assert_eq!(result.exit_code, Some(0));
        assert_eq!(result.combined_output, "hello");
        assert!(!result.timed_out);

        let output = OutputManager::new(dir.path().join("output"));
        let text = render_result(&result, "echo hello", config.max_output_length, config.spill_enabled, &output);
        assert_eq!(text, "[exit 0]\nhello");
        assert!(!dir.path().join("output").exists(), "no spill file expected");
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_a_result() {
        init_tracing();
        let dir = tempfile::tempdir().unwrap();
        let executor = create_executor(dir.path());

        let request = ExecutionRequest::terminal("echo oops >&2; exit 3", dir.path());
        let result = executor.execute(&request, &RunLimits::default(), None).await;

        assert!(!result.success);
        assert_eq!(result.exit_code, Some(3));
        assert_eq!(result.visible_output(), "oops");
    }

    #[tokio::test]
    async fn test_working_directory_and_env() {
        init_tracing();
        let dir = tempfile::tempdir().unwrap();
        let executor = create_executor(dir.path());

        let request = ExecutionRequest::terminal("pwd; echo $OPCONSOLE_TEST_VAR", dir.path())
            .with_env("OPCONSOLE_TEST_VAR", "from-request");
        let result = executor.execute(&request, &RunLimits::default(), None).await;

        assert!(result.success);
        let canonical = dir.path().canonicalize().unwrap();
        assert!(result.stdout.contains(canonical.to_str().unwrap()) || result.stdout.contains(dir.path().to_str().unwrap()));
        assert!(result.stdout.contains("from-request"));
    }

    /// Timeout kills the process: exit 124, and the shell never reaches its next step
    #[tokio::test]
    async fn test_timeout_kills_process() {
        init_tracing();
        let dir = tempfile::tempdir().unwrap();
        let executor = create_executor(dir.path());
        let marker = dir.path().join("marker");

        let command = format!("echo started; sleep 1 && touch {}", marker.display());
        let request = ExecutionRequest::terminal(command, dir.path()).with_timeout_ms(200);
        let result = executor.execute(&request, &RunLimits::default(), None).await;

        assert!(!result.success);
        assert!(result.timed_out);
        assert_eq!(result.exit_code, Some(TIMEOUT_EXIT_CODE));
        assert_eq!(result.exit_code, Some(124));
        assert!(result.stdout.contains("started"));

        tokio::time::sleep(Duration::from_millis(1300)).await;
        assert!(!marker.exists(), "killed shell must not run the rest of the command");
        assert_eq!(executor.in_flight(), 0);
    }

    /// Alive and not a zombie waiting for an absent reaper
    #[cfg(target_os = "linux")]
    fn process_alive(pid: u32) -> bool {
        match std::fs::read_to_string(format!("/proc/{}/stat", pid)) {
            Ok(stat) => stat
                .rsplit_once(')')
                .and_then(|(_, rest)| rest.trim_start().chars().next())
                .is_some_and(|state| state != 'Z' && state != 'X'),
            Err(_) => false,
        }
    }

    /// A timeout takes down everything the shell started, not just the shell
    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_timeout_kills_background_children() {
        init_tracing();
        let dir = tempfile::tempdir().unwrap();
        let executor = create_executor(dir.path());
        let pid_file = dir.path().join("child.pid");

        let command = format!("sleep 37 & echo $! > {}; wait", pid_file.display());
        let request = ExecutionRequest::terminal(command, dir.path()).with_timeout_ms(300);
        let result = executor.execute(&request, &RunLimits::default(), None).await;

        assert!(result.timed_out);
        assert_eq!(result.exit_code, Some(TIMEOUT_EXIT_CODE));

        let pid: u32 = std::fs::read_to_string(&pid_file).unwrap().trim().parse().unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(!process_alive(pid), "background sleep {} survived the timeout", pid);
    }

    /// The shell's own exit decides the result even if a background job keeps the pipes open
    #[tokio::test]
    async fn test_background_job_does_not_delay_result() {
        init_tracing();
        let dir = tempfile::tempdir().unwrap();
        let executor = create_executor(dir.path());

        let request = ExecutionRequest::terminal("echo hi; sleep 4 &", dir.path()).with_timeout_ms(1500);
        let started = std::time::Instant::now();
        let result = executor.execute(&request, &RunLimits::default(), None).await;

        assert!(result.success);
        assert!(!result.timed_out);
        assert_eq!(result.exit_code, Some(0));
        assert_eq!(result.stdout.trim(), "hi");
        assert!(started.elapsed() < Duration::from_millis(1200), "took {:?}", started.elapsed());
    }

    /// Time spent waiting for a free slot is not counted as run time
    #[tokio::test]
    async fn test_queue_wait_excluded_from_duration() {
        init_tracing();
        let dir = tempfile::tempdir().unwrap();
        let executor = executor::ProcessExecutor::new(executor::ExecutorConfig {
            max_concurrent: 1,
            output_dir: dir.path().to_path_buf(),
            ..Default::default()
        });

        let slow = ExecutionRequest::terminal("sleep 0.5", dir.path());
        let quick = ExecutionRequest::terminal("echo quick", dir.path());
        let limits = RunLimits::default();
        let (first, second) = tokio::join!(
            executor.execute(&slow, &limits, None),
            executor.execute(&quick, &limits, None)
        );

        assert!(first.success && second.success);
        assert!(first.duration_ms() >= 450);
        assert!(second.started_at >= first.finished_at);
        assert!(second.duration_ms() < 400, "queued run reported {}ms", second.duration_ms());
    }

    /// Long-running commands stream increasing snapshots, all before the result
    #[tokio::test]
    async fn test_long_running_progress() {
        init_tracing();
        let dir = tempfile::tempdir().unwrap();
        let executor = create_executor(dir.path());
        let config = ToolsConfiguration {
            progress_interval_ms: 100,
            ..ToolsConfiguration::default()
        };

        let command = "tar --version >/dev/null 2>&1; for i in 1 2 3 4 5; do echo step $i; sleep 0.12; done";
        let request = ExecutionRequest::terminal(command, dir.path());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let result = executor.execute(&request, &RunLimits::from(&config), Some(&tx)).await;
        drop(tx);

        assert!(result.success);
        assert!(result.long_running);

        let mut snapshots = Vec::new();
        while let Some(snapshot) = rx.recv().await {
            snapshots.push(snapshot);
        }
        assert!(snapshots.len() >= 2, "expected several snapshots, got {}", snapshots.len());
        assert!(snapshots.windows(2).all(|w| w[0].elapsed_ms < w[1].elapsed_ms));
        assert!(snapshots.iter().all(|s| s.request_id == result.request_id));
        assert!(result.chunks.join("").contains("step 5"));
    }

    #[tokio::test]
    async fn test_short_command_sends_no_progress() {
        init_tracing();
        let dir = tempfile::tempdir().unwrap();
        let executor = create_executor(dir.path());

        let (tx, mut rx) = mpsc::unbounded_channel();
        let request = ExecutionRequest::terminal("sleep 0.3; echo done", dir.path());
        let result = executor.execute(&request, &RunLimits::default(), Some(&tx)).await;
        drop(tx);

        assert!(result.success);
        assert!(!result.long_running);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_concurrent_runs_are_bounded() {
        init_tracing();
        let dir = tempfile::tempdir().unwrap();
        let executor = std::sync::Arc::new(executor::ProcessExecutor::new(executor::ExecutorConfig {
            max_concurrent: 2,
            output_dir: dir.path().to_path_buf(),
            ..Default::default()
        }));

        let mut handles = Vec::new();
        for n in 0..4 {
            let executor = executor.clone();
            let cwd = dir.path().to_path_buf();
            handles.push(tokio::spawn(async move {
                let request = ExecutionRequest::terminal(format!("sleep 0.2; echo {}", n), cwd);
                executor.execute(&request, &RunLimits::default(), None).await
            }));
        }

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(executor.in_flight() <= 2);

        for handle in handles {
            assert!(handle.await.unwrap().success);
        }
        assert_eq!(executor.in_flight(), 0);
    }
}
