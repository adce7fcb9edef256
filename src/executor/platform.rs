// Platform invocation - how command text reaches the system interpreter

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use tokio::process::Command;

/// Strategy for building the interpreter invocation, chosen once at startup
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlatformInvocation {
    /// `<shell> -c <text>`
    Posix { shell: String },
    /// `powershell -EncodedCommand <base64 UTF-16LE>`, which keeps
    /// non-ASCII text intact regardless of the console code page
    PowerShell { program: String },
}

impl PlatformInvocation {
    /// Pick the strategy for the current OS
    pub fn detect() -> Self {
        if cfg!(windows) {
            PlatformInvocation::PowerShell {
                program: "powershell.exe".to_string(),
            }
        } else {
            PlatformInvocation::Posix {
                shell: std::env::var("OPCONSOLE_SHELL").unwrap_or_else(|_| "/bin/sh".to_string()),
            }
        }
    }

    /// Program and arguments for `command_text`
    pub fn argv(&self, command_text: &str) -> (String, Vec<String>) {
        match self {
            PlatformInvocation::Posix { shell } => {
                (shell.clone(), vec!["-c".to_string(), command_text.to_string()])
            }
            PlatformInvocation::PowerShell { program } => (
                program.clone(),
                vec![
                    "-NoProfile".to_string(),
                    "-NonInteractive".to_string(),
                    "-EncodedCommand".to_string(),
                    encode_powershell(command_text),
                ],
            ),
        }
    }

    /// Build a ready-to-configure command
    pub fn command(&self, command_text: &str) -> Command {
        let (program, args) = self.argv(command_text);
        let mut command = Command::new(program);
        command.args(args);
        command
    }
}

/// Base64 of the UTF-16LE encoding, as PowerShell's `-EncodedCommand` expects
pub fn encode_powershell(text: &str) -> String {
    let bytes: Vec<u8> = text.encode_utf16().flat_map(u16::to_le_bytes).collect();
    STANDARD.encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_posix_argv() {
        let platform = PlatformInvocation::Posix {
            shell: "/bin/sh".to_string(),
        };
        let (program, args) = platform.argv("echo hi");
        assert_eq!(program, "/bin/sh");
        assert_eq!(args, vec!["-c", "echo hi"]);
    }

    #[test]
    fn test_powershell_encoding_preserves_unicode() {
        assert_eq!(encode_powershell("echo hi"), "ZQBjAGgAbwAgAGgAaQA=");
        assert_eq!(encode_powershell("echo 你好"), "ZQBjAGgAbwAgAGBPfVk=");

        let platform = PlatformInvocation::PowerShell {
            program: "powershell.exe".to_string(),
        };
        let (_, args) = platform.argv("echo hi");
        assert_eq!(args.last().unwrap(), "ZQBjAGgAbwAgAGgAaQA=");
    }
}
