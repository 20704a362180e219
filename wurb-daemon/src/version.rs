//! Build identity, printed by `wurb-daemon version` and reported in `status`

use serde::Serialize;
use std::fmt;

/// What was built, from where, for which board
#[derive(Debug, Clone, Serialize)]
pub struct BuildInfo {
    pub version: &'static str,
    pub git_commit: Option<&'static str>,
    pub target: &'static str,
    /// GPIO switches need rppal, which only builds on Linux
    pub gpio: bool,
}

impl BuildInfo {
    pub fn current() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION"),
            git_commit: option_env!("WURB_GIT_COMMIT"),
            target: env!("WURB_TARGET"),
            gpio: cfg!(target_os = "linux"),
        }
    }

    /// One line for the start-up log: `v0.1.0 (aarch64-unknown-linux-gnu, 1a2b3c4)`
    pub fn summary(&self) -> String {
        match self.git_commit {
            Some(commit) => format!("v{} ({}, {})", self.version, self.target, commit),
            None => format!("v{} ({})", self.version, self.target),
        }
    }
}

impl fmt::Display for BuildInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "wurb-daemon {}", self.version)?;
        writeln!(f, "  target:  {}", self.target)?;
        writeln!(f, "  commit:  {}", self.git_commit.unwrap_or("unknown"))?;
        writeln!(
            f,
            "  gpio:    {}",
            if self.gpio { "available" } else { "not on this platform" }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(git_commit: Option<&'static str>) -> BuildInfo {
        BuildInfo {
            version: "0.1.0",
            git_commit,
            target: "aarch64-unknown-linux-gnu",
            gpio: true,
        }
    }

    #[test]
    fn test_summary() {
        assert_eq!(
            info(Some("1a2b3c4")).summary(),
            "v0.1.0 (aarch64-unknown-linux-gnu, 1a2b3c4)"
        );
        assert_eq!(info(None).summary(), "v0.1.0 (aarch64-unknown-linux-gnu)");
    }

    #[test]
    fn test_report_lines() {
        let report = info(None).to_string();
        assert!(report.starts_with("wurb-daemon 0.1.0\n"));
        assert!(report.contains("commit:  unknown"));
        assert!(report.contains("gpio:    available"));
    }

    #[test]
    fn test_current_matches_package() {
        let current = BuildInfo::current();
        assert_eq!(current.version, env!("CARGO_PKG_VERSION"));
        assert!(!current.target.is_empty());
    }
}
