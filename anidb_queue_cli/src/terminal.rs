//! Terminal detection

use is_terminal::IsTerminal;
use std::env;
use std::io::stdout;

/// Whether a person is likely watching stdout and can answer prompts
pub fn is_interactive() -> bool {
    if !stdout().is_terminal() {
        return false;
    }

    // CI runners sometimes allocate a TTY
    if is_ci_environment() {
        return false;
    }

    env::var("DEBIAN_FRONTEND").unwrap_or_default() != "noninteractive"
}

/// Turn colours off when nobody will see them
pub fn configure_colors() {
    let dumb = env::var("TERM").is_ok_and(|t| t == "dumb");
    if !stdout().is_terminal() || dumb {
        colored::control::set_override(false);
    }
}

fn is_ci_environment() -> bool {
    [
        "CI",
        "CONTINUOUS_INTEGRATION",
        "JENKINS_URL",
        "GITHUB_ACTIONS",
        "GITLAB_CI",
        "BUILDKITE",
        "TF_BUILD",
    ]
    .iter()
    .any(|var| env::var(var).is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_ci_is_never_interactive() {
        // SAFETY: serialized with the other environment tests
        unsafe { env::set_var("CI", "true") };
        assert!(!is_interactive());
        unsafe { env::remove_var("CI") };
    }
}
