// Output module - truncation, chunk joining and spill-to-file

use chrono::Local;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Longest sanitized command fragment used in a spill file name
const MAX_NAME_CHARS: usize = 50;

/// Keep the first `cap` characters of `text`
///
/// Returns the visible text and whether anything was cut. The notice names
/// the original length in characters.
pub fn truncate(text: &str, cap: usize) -> (String, bool) {
    let total = text.chars().count();
    if total <= cap {
        return (text.to_string(), false);
    }
    let mut visible: String = text.chars().take(cap).collect();
    visible.push_str(&format!("\n... [truncated, {} chars total]", total));
    (visible, true)
}

/// Join periodic chunk captures with a blank line between them
pub fn chunk_join(chunks: &[String]) -> String {
    chunks
        .iter()
        .map(|c| c.trim_end_matches('\n'))
        .filter(|c| !c.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Turn a command line into a file-name fragment
pub fn sanitize_file_name(command: &str) -> String {
    let mut name: String = command
        .trim()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .take(MAX_NAME_CHARS)
        .collect();
    while name.contains("__") {
        name = name.replace("__", "_");
    }
    let name = name.trim_matches('_').to_string();
    if name.is_empty() {
        "output".to_string()
    } else {
        name
    }
}

/// Writes oversized output under a dedicated directory
#[derive(Debug, Clone)]
pub struct OutputManager {
    dir: PathBuf,
}

impl OutputManager {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Persist `full_text` to a timestamped log file
    ///
    /// Never fails outward: errors are logged and `None` is returned.
    pub fn spill(&self, original_command: &str, full_text: &str) -> Option<PathBuf> {
        if let Err(e) = fs::create_dir_all(&self.dir) {
            warn!(dir = %self.dir.display(), error = %e, "cannot create output directory");
            return None;
        }

        let stamp = Local::now().format("%Y%m%d-%H%M%S%3f");
        let base = format!("{}_{}", stamp, sanitize_file_name(original_command));
        let mut path = self.dir.join(format!("{base}.log"));
        let mut n = 1;
        while path.exists() {
            path = self.dir.join(format!("{base}-{n}.log"));
            n += 1;
        }

        let content = format!("$ {}\n\n{}", original_command, full_text);
        match fs::write(&path, content) {
            Ok(()) => {
                debug!(path = %path.display(), chars = full_text.chars().count(), "output spilled");
                Some(path)
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to spill output");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    #[test]
    fn test_truncate_short_text_is_identity() {
        let mut rng = rand::thread_rng();
        for _ in 0..50 {
            let len = rng.gen_range(0..40);
            let text: String = (0..len).map(|_| rng.gen_range('a'..='z')).collect();
            let (visible, cut) = truncate(&text, 40);
            assert_eq!(visible, text);
            assert!(!cut);
        }
    }

    #[test]
    fn test_truncate_counts_chars() {
        let text = "héllo wörld";
        let (visible, cut) = truncate(text, 5);
        assert!(cut);
        assert!(visible.starts_with("héllo\n"));
        assert!(visible.contains("11 chars total"));
    }

    #[test]
    fn test_chunk_join_uses_blank_lines() {
        let chunks = vec!["one\n".to_string(), String::new(), "two".to_string()];
        assert_eq!(chunk_join(&chunks), "one\n\ntwo");
    }

    #[test]
    fn test_sanitize_file_name() {
        assert_eq!(sanitize_file_name("git log --oneline | head"), "git_log_--oneline_head");
        assert_eq!(sanitize_file_name("///"), "output");
        assert!(sanitize_file_name(&"x".repeat(200)).len() <= MAX_NAME_CHARS);
    }

    #[test]
    fn test_spill_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let manager = OutputManager::new(dir.path().join("output"));

        let first = manager.spill("cat big.txt", "payload").unwrap();
        let second = manager.spill("cat big.txt", "payload").unwrap();
        assert_ne!(first, second);

        let content = std::fs::read_to_string(&first).unwrap();
        assert!(content.contains("payload"));
        assert!(first.file_name().unwrap().to_string_lossy().contains("cat_big_txt"));
    }

    #[test]
    fn test_spill_failure_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "x").unwrap();

        let manager = OutputManager::new(blocker.join("output"));
        assert!(manager.spill("ls", "text").is_none());
    }
}
