//! External tool invocation.
//!
//! Every compiler, librarian, `lipo` and `xcodebuild` call goes through the
//! [`Toolchain`] trait. A non-zero exit is an ordinary [`ToolOutput`] with
//! `success == false`; so are spawn failures and timeouts. Callers decide
//! per slice whether to continue.
//!
//! [`ProcessToolchain`] runs real processes. In streaming mode, output is
//! echoed as it arrives and, for invocations marked [`Invocation::formatted`],
//! piped through a [`Formatter`] such as `xcbeautify`.

pub mod formatter;

use std::io::{self, BufRead, BufReader, Read, Write};
use std::process::{Child, ChildStdin, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

pub use formatter::Formatter;

use crate::types::BuildContext;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Runs external tools.
pub trait Toolchain: Send + Sync {
    fn run(&self, invocation: &Invocation) -> ToolOutput;
}

/// One external command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    /// Echo output while the tool runs.
    pub stream: bool,
    /// Pipe streamed stdout through the configured formatter.
    pub formatted: bool,
}

impl Invocation {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            stream: false,
            formatted: false,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn stream(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }

    pub fn formatted(mut self, formatted: bool) -> Self {
        self.formatted = formatted;
        self
    }

    /// Shell-like rendering for logs.
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .map(|part| {
                if part.contains(' ') {
                    format!("\"{}\"", part)
                } else {
                    part.to_string()
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Result of one tool run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolOutput {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
    /// `None` when the tool was killed, timed out, or never started.
    pub exit_code: Option<i32>,
    pub timed_out: bool,
}

impl ToolOutput {
    /// A successful run with the given stdout.
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            success: true,
            stdout: stdout.into(),
            exit_code: Some(0),
            ..Self::default()
        }
    }

    /// A failed run with the given exit code and stderr.
    pub fn failed(exit_code: Option<i32>, stderr: impl Into<String>) -> Self {
        Self {
            success: false,
            stderr: stderr.into(),
            exit_code,
            ..Self::default()
        }
    }

    /// The most useful description of a failure: stderr, else stdout.
    pub fn error_message(&self) -> String {
        let stderr = self.stderr.trim();
        if !stderr.is_empty() {
            return stderr.to_string();
        }
        let stdout = self.stdout.trim();
        if !stdout.is_empty() {
            return stdout.to_string();
        }
        match self.exit_code {
            Some(code) => format!("exited with status {}", code),
            None => "terminated without an exit status".to_string(),
        }
    }
}

/// Runs real processes.
#[derive(Debug, Clone, Default)]
pub struct ProcessToolchain {
    formatter: Option<Formatter>,
    timeout: Option<Duration>,
}

impl ProcessToolchain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Timeout from `ctx`; formatter detected on PATH when `ctx.use_formatter` is set.
    pub fn from_context(ctx: &BuildContext) -> Self {
        let formatter = if ctx.use_formatter {
            Formatter::detect()
        } else {
            None
        };
        if let Some(formatter) = formatter {
            log::debug!("Using {} to format xcodebuild output", formatter.program());
        }
        Self {
            formatter,
            timeout: ctx.timeout,
        }
    }

    pub fn formatter(mut self, formatter: Option<Formatter>) -> Self {
        self.formatter = formatter;
        self
    }

    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    fn execute(&self, invocation: &Invocation) -> io::Result<ToolOutput> {
        let mut cmd = Command::new(&invocation.program);
        cmd.args(&invocation.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = cmd.spawn()?;

        let mut formatter_child = None;
        let stdout_echo = if !invocation.stream {
            Echo::Silent
        } else if let (true, Some(formatter)) = (invocation.formatted, self.formatter) {
            match formatter.spawn() {
                Ok(mut fmt) => match fmt.stdin.take() {
                    Some(stdin) => {
                        formatter_child = Some(fmt);
                        Echo::Pipe(stdin)
                    }
                    None => Echo::Stdout,
                },
                Err(e) => {
                    log::debug!("{} unavailable ({}), streaming raw output", formatter.program(), e);
                    Echo::Stdout
                }
            }
        } else {
            Echo::Stdout
        };
        let stderr_echo = if invocation.stream {
            Echo::Stderr
        } else {
            Echo::Silent
        };

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let stdout_reader = thread::spawn(move || pump(stdout, stdout_echo));
        let stderr_reader = thread::spawn(move || pump(stderr, stderr_echo));

        let status = wait_with_deadline(&mut child, self.timeout)?;

        let Some(status) = status else {
            // Grandchildren may still hold the pipes open; leave the readers behind.
            if let Some(mut fmt) = formatter_child {
                let _ = fmt.kill();
                let _ = fmt.wait();
            }
            let secs = self.timeout.map(|t| t.as_secs()).unwrap_or_default();
            return Ok(ToolOutput {
                timed_out: true,
                ..ToolOutput::failed(
                    None,
                    format!("{} timed out after {}s", invocation.program, secs),
                )
            });
        };

        let stdout = stdout_reader.join().unwrap_or_default();
        let stderr = stderr_reader.join().unwrap_or_default();
        if let Some(mut fmt) = formatter_child {
            // The formatter's own status never replaces the tool's.
            let _ = fmt.wait();
        }

        Ok(ToolOutput {
            success: status.success(),
            stdout,
            stderr,
            exit_code: status.code(),
            timed_out: false,
        })
    }
}

impl Toolchain for ProcessToolchain {
    fn run(&self, invocation: &Invocation) -> ToolOutput {
        log::debug!("$ {}", invocation.command_line());
        match self.execute(invocation) {
            Ok(output) => output,
            Err(e) => ToolOutput::failed(
                None,
                format!(
                    "Failed to start {}.\n\nError: {}\n\nEnsure the tool is installed and available on PATH.",
                    invocation.program, e
                ),
            ),
        }
    }
}

fn wait_with_deadline(child: &mut Child, timeout: Option<Duration>) -> io::Result<Option<ExitStatus>> {
    let Some(timeout) = timeout else {
        return child.wait().map(Some);
    };
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if Instant::now() >= deadline {
            let _ = child.kill();
            let _ = child.wait();
            return Ok(None);
        }
        thread::sleep(POLL_INTERVAL);
    }
}

enum Echo {
    Silent,
    Stdout,
    Stderr,
    Pipe(ChildStdin),
}

impl Echo {
    fn write(&mut self, line: &[u8]) {
        let result = match self {
            Echo::Silent => Ok(()),
            Echo::Stdout => io::stdout().write_all(line),
            Echo::Stderr => io::stderr().write_all(line),
            Echo::Pipe(stdin) => stdin.write_all(line),
        };
        if result.is_err() && matches!(self, Echo::Pipe(_)) {
            *self = Echo::Stdout;
            let _ = io::stdout().write_all(line);
        }
    }
}

/// Copies `source` line by line into `echo`, returning everything read.
fn pump<R: Read>(source: Option<R>, mut echo: Echo) -> String {
    let Some(source) = source else {
        return String::new();
    };
    let mut reader = BufReader::new(source);
    let mut captured = Vec::new();
    let mut line = Vec::new();
    loop {
        line.clear();
        match reader.read_until(b'\n', &mut line) {
            Ok(0) | Err(_) => break,
            Ok(_) => {
                echo.write(&line);
                captured.extend_from_slice(&line);
            }
        }
    }
    String::from_utf8_lossy(&captured).into_owned()
}
