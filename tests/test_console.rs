// Integration tests for the console facade
// Run with cargo test --test test_console

#[path = "../src/comm/mod.rs"]
mod comm;

#[path = "../src/console/mod.rs"]
mod console;

#[path = "../src/eval/mod.rs"]
mod eval;

#[path = "../src/executor/mod.rs"]
mod executor;

#[path = "../src/history/mod.rs"]
mod history;

#[path = "../src/inspect/mod.rs"]
mod inspect;

#[path = "../src/output/mod.rs"]
mod output;

#[path = "../src/settings/mod.rs"]
mod settings;

use console::{ChannelSink, Console, ConsoleError, DaemonConfig, NullSink, ReplySink, ValidationError};
use history::CommandKind;
use std::path::Path;
use std::rc::Rc;
use tokio::sync::{mpsc, oneshot};
use tokio_test::{assert_err, assert_ok};

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

fn daemon_config(dir: &Path) -> DaemonConfig {
    let mut config = DaemonConfig::with_home(dir.join("home"));
    config.working_root = dir.join("work");
    std::fs::create_dir_all(&config.working_root).unwrap();
    config
}

fn null() -> Rc<dyn ReplySink> {
    Rc::new(NullSink)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Denylisted text is rejected before spawn and leaves no history
    #[tokio::test]
    async fn test_denylisted_command_rejected() {
        init_tracing();
        let dir = tempfile::tempdir().unwrap();
        let console = Console::new(&daemon_config(dir.path()));

        let result = console.handle("run-terminal sudo rm -rf /", "test", null()).await;
        match result {
            Err(ConsoleError::Validation(ValidationError::Denylisted(needle))) => {
                assert!("sudo rm -rf /".contains(&needle));
            }
            other => panic!("expected denylist rejection, got {:?}", other),
        }
        assert!(console.history_entries(10, None).await.is_empty());

        assert_ok!(console.handle("config set shell_enabled false", "test", null()).await);
        let disabled = console.handle("run-terminal echo hi", "test", null()).await;
        assert!(matches!(
            disabled,
            Err(ConsoleError::Validation(ValidationError::ShellDisabled))
        ));
        assert!(console.history_entries(10, None).await.is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_terminal_records_history() {
        init_tracing();
        let dir = tempfile::tempdir().unwrap();
        let console = Console::new(&daemon_config(dir.path())).with_home_dir(dir.path());

        let reply = console.handle("run-terminal echo hello", "test", null()).await.unwrap();
        assert_eq!(reply, "[exit 0]\nhello");

        let failed = console.handle("run-terminal exit 2", "test", null()).await.unwrap();
        assert!(failed.starts_with("[failed, exit 2]"));

        let home = console.handle("run-terminal-home ls -d home work", "test", null()).await.unwrap();
        assert!(home.contains("home") && home.contains("work"));

        let entries = console.history_entries(10, Some(CommandKind::Terminal)).await;
        let texts: Vec<&str> = entries.iter().map(|e| e.command_text.as_str()).collect();
        assert_eq!(texts, ["ls -d home work", "exit 2", "echo hello"]);
        assert_eq!(entries[1].exit_code, Some(2));
    }

    /// Snapshots of a long-running command reach the sink before the reply
    #[cfg(unix)]
    #[tokio::test]
    async fn test_terminal_progress_reaches_sink() {
        init_tracing();
        let dir = tempfile::tempdir().unwrap();
        let console = Console::new(&daemon_config(dir.path()));
        console.handle("config set progress_interval_ms 100", "test", null()).await.unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        let sink: Rc<dyn ReplySink> = Rc::new(ChannelSink::new(tx));
        let reply = console
            .handle(
                "run-terminal tar --version >/dev/null 2>&1; for i in 1 2 3 4; do echo step $i; sleep 0.12; done",
                "test",
                sink,
            )
            .await
            .unwrap();
        assert!(reply.starts_with("[exit 0]"));
        assert!(reply.ends_with("step 4"));

        let mut updates = Vec::new();
        while let Some(update) = rx.recv().await {
            updates.push(update);
        }
        assert!(!updates.is_empty());
        assert!(updates.iter().all(|u| u.content.starts_with("[running ")));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_snippet_bindings() {
        init_tracing();
        let dir = tempfile::tempdir().unwrap();
        let console = Console::new(&daemon_config(dir.path()));

        let reply = console
            .handle(
                "run-code const r = await executor.run('echo hi'); return r.stdout.trim() + ':' + r.exitCode",
                "test",
                null(),
            )
            .await
            .unwrap();
        assert!(reply.starts_with("hi:0\n[string, "), "{}", reply);

        let denied = console
            .handle("run-code await executor.run('sudo reboot')", "test", null())
            .await
            .unwrap();
        assert!(denied.contains("denylisted"), "{}", denied);

        let files = console
            .handle(
                "run-code await fs.writeFile('a.txt', 'abc'); return (await fs.readFile('a.txt')) + fs.exists('a.txt')",
                "test",
                null(),
            )
            .await
            .unwrap();
        assert!(files.starts_with("abctrue\n"), "{}", files);
        assert!(dir.path().join("work").join("a.txt").exists());

        let setting = console
            .handle("run-code config.get('history_size')", "test", null())
            .await
            .unwrap();
        assert!(setting.starts_with("100\n[string, "), "{}", setting);
    }

    #[tokio::test]
    async fn test_reply_binding_sends_interim_message() {
        init_tracing();
        let dir = tempfile::tempdir().unwrap();
        let console = Console::new(&daemon_config(dir.path()));

        let (tx, mut rx) = mpsc::unbounded_channel();
        let sink: Rc<dyn ReplySink> = Rc::new(ChannelSink::new(tx));
        let reply = console
            .handle("run-code await reply('halfway'); return 5", "test", sink)
            .await
            .unwrap();
        assert!(reply.starts_with("5\n[number, "));

        assert_eq!(rx.recv().await.unwrap().content, "halfway");
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_inspect_scenario() {
        init_tracing();
        let dir = tempfile::tempdir().unwrap();
        let console = Console::new(&daemon_config(dir.path()));

        let reply = console.handle("inspect {a:1,b:[1,2,3]}", "test", null()).await.unwrap();
        assert!(reply.contains("Properties (6):"), "{}", reply);
        assert!(reply.contains("  a: number = 1\n"));
        assert!(reply.contains("  b[0]: number = 1  [element]"));

        let entries = console.history_entries(1, None).await;
        assert_eq!(entries[0].kind, CommandKind::Code);
        assert_eq!(entries[0].command_text, "{a:1,b:[1,2,3]}");
    }

    #[tokio::test]
    async fn test_snippet_timeout_uses_configured_limit() {
        init_tracing();
        let dir = tempfile::tempdir().unwrap();
        let console = Console::new(&daemon_config(dir.path()));
        console.handle("config set timeout_ms 100", "test", null()).await.unwrap();

        let reply = console
            .handle("run-code await sleep(5000); return 1", "test", null())
            .await
            .unwrap();
        assert!(reply.contains("Evaluation timed out after 100 ms"), "{}", reply);
        assert_eq!(console.history_entries(1, None).await[0].exit_code, Some(1));
    }

    /// History capacity 2 keeps the two newest entries, also after a restart
    #[tokio::test]
    async fn test_history_capacity_and_persistence() {
        init_tracing();
        let dir = tempfile::tempdir().unwrap();
        let config = daemon_config(dir.path());
        {
            let console = Console::new(&config);
            console.handle("config set history_size 2", "test", null()).await.unwrap();
            for snippet in ["'A'", "'B'", "'C'"] {
                console.handle(&format!("run-code {}", snippet), "test", null()).await.unwrap();
            }
        }

        let console = Console::new(&config);
        assert_eq!(console.config().await.history_size, 2);
        let texts: Vec<String> = console
            .history_entries(10, None)
            .await
            .into_iter()
            .map(|e| e.command_text)
            .collect();
        assert_eq!(texts, ["'C'", "'B'"]);

        let listing = console.handle("history 1", "test", null()).await.unwrap();
        assert_eq!(listing.lines().count(), 1);
        assert!(listing.starts_with("1. [code] 'C'"));
    }

    #[tokio::test]
    async fn test_help_and_unknown_command() {
        init_tracing();
        let dir = tempfile::tempdir().unwrap();
        let console = Console::new(&daemon_config(dir.path()));

        let help = assert_ok!(console.handle("help", "test", null()).await);
        assert!(help.contains("run-terminal <command>"));

        let err = assert_err!(console.handle("launch rockets", "test", null()).await);
        assert_eq!(err.to_string(), "Unknown command 'launch'. Type 'help' for the command list");
    }

    /// Transport requests get a response and a closed progress channel
    #[tokio::test]
    async fn test_handle_user_request() {
        init_tracing();
        let dir = tempfile::tempdir().unwrap();
        let console = Console::new(&daemon_config(dir.path()));

        let (reply_tx, reply_rx) = oneshot::channel();
        let (progress_tx, mut progress_rx) = mpsc::unbounded_channel();
        console
            .handle_user_request(comm::UserRequest {
                content: "config set bogus 1".to_string(),
                reply: reply_tx,
                progress: progress_tx,
                source_addr: "127.0.0.1:5000".parse().unwrap(),
            })
            .await;

        let response = reply_rx.await.unwrap();
        assert!(response.is_error);
        assert!(progress_rx.recv().await.is_none());

        let (reply_tx, reply_rx) = oneshot::channel();
        let (progress_tx, _progress_rx) = mpsc::unbounded_channel();
        console
            .handle_user_request(comm::UserRequest {
                content: "run-code event.source".to_string(),
                reply: reply_tx,
                progress: progress_tx,
                source_addr: "127.0.0.1:5000".parse().unwrap(),
            })
            .await;
        let response = reply_rx.await.unwrap();
        assert!(!response.is_error);
        assert!(response.content.starts_with("127.0.0.1:5000\n[string, "));
    }
}
