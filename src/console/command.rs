// Operator command parsing

use crate::console::error::ValidationError;
use crate::history::CommandKind;

/// Entries listed by `history` when no limit is given
pub const DEFAULT_HISTORY_LIMIT: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    /// Shell text run in the working root
    RunTerminal(String),
    /// Shell text run in the operator's home directory
    RunTerminalHome(String),
    RunCode(String),
    Inspect(String),
    History {
        kind: Option<CommandKind>,
        limit: usize,
    },
    HistoryClear,
    ConfigShow,
    ConfigSet {
        key: String,
        value: String,
    },
    ConfigReset,
    Help,
}

impl ConsoleCommand {
    /// Split operator text into a command and its arguments
    ///
    /// The first word selects the command; everything after it is kept
    /// verbatim (newlines included) for shell text and snippets.
    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(ValidationError::EmptyCommand);
        }
        let (word, rest) = match input.find(char::is_whitespace) {
            Some(at) => (&input[..at], input[at..].trim()),
            None => (input, ""),
        };

        let body = |rest: &str| {
            if rest.is_empty() {
                Err(ValidationError::EmptyCommand)
            } else {
                Ok(rest.to_string())
            }
        };

        match word.to_ascii_lowercase().as_str() {
            "run-terminal" => body(rest).map(ConsoleCommand::RunTerminal),
            "run-terminal-home" => body(rest).map(ConsoleCommand::RunTerminalHome),
            "run-code" => body(rest).map(ConsoleCommand::RunCode),
            "inspect" => body(rest).map(ConsoleCommand::Inspect),
            "history" => parse_history(rest),
            "config" => parse_config(rest),
            "help" => Ok(ConsoleCommand::Help),
            other => Err(ValidationError::UnknownCommand(other.to_string())),
        }
    }
}

fn parse_history(rest: &str) -> Result<ConsoleCommand, ValidationError> {
    let mut kind = None;
    let mut limit = DEFAULT_HISTORY_LIMIT;
    for arg in rest.split_whitespace() {
        if arg.eq_ignore_ascii_case("clear") {
            return Ok(ConsoleCommand::HistoryClear);
        }
        if let Ok(n) = arg.parse::<usize>() {
            limit = n;
        } else {
            kind = Some(
                arg.parse::<CommandKind>()
                    .map_err(|_| ValidationError::BadArguments(format!("unknown history kind '{}'", arg)))?,
            );
        }
    }
    Ok(ConsoleCommand::History { kind, limit })
}

fn parse_config(rest: &str) -> Result<ConsoleCommand, ValidationError> {
    let mut parts = rest.splitn(2, char::is_whitespace);
    let action = parts.next().unwrap_or("").to_ascii_lowercase();
    let args = parts.next().unwrap_or("").trim();
    match action.as_str() {
        "" | "show" => Ok(ConsoleCommand::ConfigShow),
        "reset" => Ok(ConsoleCommand::ConfigReset),
        "set" => {
            let mut kv = args.splitn(2, char::is_whitespace);
            match (kv.next(), kv.next().map(str::trim)) {
                (Some(key), Some(value)) if !key.is_empty() && !value.is_empty() => Ok(ConsoleCommand::ConfigSet {
                    key: key.to_string(),
                    value: value.to_string(),
                }),
                _ => Err(ValidationError::BadArguments("usage: config set <key> <value>".to_string())),
            }
        }
        other => Err(ValidationError::BadArguments(format!(
            "unknown config action '{}' (show, set, reset)",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_commands_keep_body_verbatim() {
        assert_eq!(
            ConsoleCommand::parse("run-terminal   ls -la | head").unwrap(),
            ConsoleCommand::RunTerminal("ls -la | head".to_string())
        );
        assert_eq!(
            ConsoleCommand::parse("run-terminal-home pwd").unwrap(),
            ConsoleCommand::RunTerminalHome("pwd".to_string())
        );
        assert_eq!(
            ConsoleCommand::parse("run-code\nconst a = 1\nreturn a").unwrap(),
            ConsoleCommand::RunCode("const a = 1\nreturn a".to_string())
        );
        assert_eq!(
            ConsoleCommand::parse("INSPECT {a:1}").unwrap(),
            ConsoleCommand::Inspect("{a:1}".to_string())
        );
    }

    #[test]
    fn test_empty_and_unknown() {
        assert_eq!(ConsoleCommand::parse("   "), Err(ValidationError::EmptyCommand));
        assert_eq!(ConsoleCommand::parse("run-terminal"), Err(ValidationError::EmptyCommand));
        assert_eq!(
            ConsoleCommand::parse("deploy now"),
            Err(ValidationError::UnknownCommand("deploy".to_string()))
        );
    }

    #[test]
    fn test_history_arguments() {
        assert_eq!(
            ConsoleCommand::parse("history").unwrap(),
            ConsoleCommand::History {
                kind: None,
                limit: DEFAULT_HISTORY_LIMIT
            }
        );
        assert_eq!(
            ConsoleCommand::parse("history code 5").unwrap(),
            ConsoleCommand::History {
                kind: Some(CommandKind::Code),
                limit: 5
            }
        );
        assert_eq!(ConsoleCommand::parse("history clear").unwrap(), ConsoleCommand::HistoryClear);
        assert!(matches!(
            ConsoleCommand::parse("history bogus"),
            Err(ValidationError::BadArguments(_))
        ));
    }

    #[test]
    fn test_config_arguments() {
        assert_eq!(ConsoleCommand::parse("config").unwrap(), ConsoleCommand::ConfigShow);
        assert_eq!(ConsoleCommand::parse("config reset").unwrap(), ConsoleCommand::ConfigReset);
        assert_eq!(
            ConsoleCommand::parse("config set denylist rm -rf /, mkfs").unwrap(),
            ConsoleCommand::ConfigSet {
                key: "denylist".to_string(),
                value: "rm -rf /, mkfs".to_string()
            }
        );
        assert!(matches!(
            ConsoleCommand::parse("config set timeout_ms"),
            Err(ValidationError::BadArguments(_))
        ));
    }
}
