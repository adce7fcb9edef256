// Command classification - which commands stream progress

use regex::{Regex, RegexSet};
use std::sync::LazyLock;

/// Network, install, download, scan and archive commands
static LONG_RUNNING: LazyLock<RegexSet> = LazyLock::new(|| {
    RegexSet::new([
        r"(?i)\bgit\s+(clone|pull|push|fetch|submodule)\b",
        r"(?i)\b(npm|pnpm|yarn|pip3?|cargo|go|gem|composer)\s+(install|i|add|update|upgrade|build|get)\b",
        r"(?i)\b(apt|apt-get|yum|dnf|brew|pacman)\s+(install|update|upgrade|-S)\b",
        r"(?i)\b(curl|wget|aria2c)\b",
        r"(?i)\bfind\s+/",
        r"(?i)\bdu\s+-",
        r"\bls\s+-[a-zA-Z]*R",
        r"(?i)\b(tar|zip|unzip|7z|gzip|gunzip|rsync|scp)\b",
        r"(?i)\bdocker\s+(pull|build|push)\b",
    ])
    .expect("long-running patterns are valid")
});

static SOURCE_CONTROL_INSPECTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bgit\s+(log|diff|show|status|blame|reflog)\b")
        .expect("source control pattern is valid")
});

/// Whether `command` should stream progress snapshots
pub fn is_long_running(command: &str) -> bool {
    LONG_RUNNING.is_match(command)
}

/// Whether `command` inspects a repository and may produce huge output
pub fn is_source_control_inspection(command: &str) -> bool {
    SOURCE_CONTROL_INSPECTION.is_match(command)
}
