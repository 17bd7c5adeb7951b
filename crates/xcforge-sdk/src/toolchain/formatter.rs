//! Human-readable formatters for xcodebuild output.

use std::io;
use std::process::{Child, Command, Stdio};

/// A line-oriented filter that reads raw xcodebuild output on stdin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Formatter {
    Xcbeautify,
    Xcpretty,
    /// Any other program that filters stdin to stdout, run without arguments.
    Custom(&'static str),
}

impl Formatter {
    /// Detection order.
    pub const ALL: [Formatter; 2] = [Formatter::Xcbeautify, Formatter::Xcpretty];

    pub fn program(&self) -> &'static str {
        match self {
            Formatter::Xcbeautify => "xcbeautify",
            Formatter::Xcpretty => "xcpretty",
            Formatter::Custom(program) => *program,
        }
    }

    pub fn args(&self) -> &'static [&'static str] {
        match self {
            Formatter::Xcbeautify | Formatter::Custom(_) => &[],
            Formatter::Xcpretty => &["--color"],
        }
    }

    pub fn is_available(&self) -> bool {
        which::which(self.program()).is_ok()
    }

    /// First formatter found on PATH.
    pub fn detect() -> Option<Self> {
        Self::ALL.into_iter().find(Formatter::is_available)
    }

    /// Starts the formatter with a piped stdin and inherited stdout/stderr.
    pub(crate) fn spawn(&self) -> io::Result<Child> {
        Command::new(self.program())
            .args(self.args())
            .stdin(Stdio::piped())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .spawn()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_xcbeautify_preferred() {
        assert_eq!(Formatter::ALL[0], Formatter::Xcbeautify);
        assert_eq!(Formatter::Xcpretty.args(), ["--color"]);
    }

    #[test]
    fn test_custom_formatter() {
        let formatter = Formatter::Custom("cat");
        assert_eq!(formatter.program(), "cat");
        assert!(formatter.args().is_empty());
    }
}
