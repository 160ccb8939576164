//! Exit codes and user-facing error output

use crate::config::ConfigError;
use colored::Colorize;

/// Semantic exit codes for the CLI
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    Success = 0,
    GeneralError = 1,
    Misuse = 2,
    NetworkError = 3,
    FilesystemError = 4,
    Banned = 5,
}

impl ExitCode {
    pub fn code(self) -> i32 {
        self as i32
    }
}

/// Map an error chain to the exit code it should produce
///
/// The first recognised error in the chain decides.
pub fn exit_code(err: &anyhow::Error) -> ExitCode {
    for cause in err.chain() {
        if let Some(core) = cause.downcast_ref::<anidb_queue_core::Error>() {
            return match core {
                e if e.is_banned() => ExitCode::Banned,
                anidb_queue_core::Error::Validation(_) => ExitCode::Misuse,
                anidb_queue_core::Error::Protocol(_) => ExitCode::NetworkError,
                anidb_queue_core::Error::Io(_) => ExitCode::FilesystemError,
                anidb_queue_core::Error::Internal(_) => ExitCode::GeneralError,
            };
        }
        if cause.downcast_ref::<ConfigError>().is_some() {
            return ExitCode::Misuse;
        }
        if cause.downcast_ref::<serde_json::Error>().is_some() {
            return ExitCode::Misuse;
        }
        if cause.downcast_ref::<std::io::Error>().is_some() {
            return ExitCode::FilesystemError;
        }
    }
    ExitCode::GeneralError
}

/// Render an error for stderr
///
/// With `debug` every cause in the chain is listed.
pub fn format_for_user(err: &anyhow::Error, debug: bool) -> String {
    let mut output = format!("{} {err}", "Error:".red().bold());
    if debug {
        for cause in err.chain().skip(1) {
            output.push_str(&format!("\n  {} {cause}", "caused by:".yellow()));
        }
    } else if let Some(cause) = err.chain().nth(1) {
        output.push_str(&format!(": {cause}"));
    }
    if let Some(hint) = hint(exit_code(err)) {
        output.push_str(&format!("\n\n{}", hint.dimmed()));
    }
    output
}

fn hint(code: ExitCode) -> Option<&'static str> {
    match code {
        ExitCode::Misuse => Some("Run 'anidb-queue --help' for usage information"),
        ExitCode::NetworkError => Some("Check your connection and the AniDB server status"),
        ExitCode::Banned => Some("AniDB has banned this client; wait before retrying"),
        _ => None,
    }
}
