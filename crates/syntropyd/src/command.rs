//! Subprocess execution with a deadline.

use std::collections::HashMap;
use std::io::Read;
use std::process::{Command, Stdio};
use std::sync::Mutex;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

pub trait CommandRunner: Send + Sync {
    /// Run `program` with `args`. `Err` means the program could not be started
    /// or did not finish within `timeout`.
    fn run(&self, program: &str, args: &[&str], timeout: Duration) -> std::io::Result<CommandOutput>;

    /// Run a command line through the OS shell
    fn run_shell(&self, line: &str, timeout: Duration) -> std::io::Result<CommandOutput> {
        if cfg!(windows) {
            self.run("cmd", &["/C", line], timeout)
        } else {
            self.run("sh", &["-c", line], timeout)
        }
    }
}

/// Runs real processes, killing them once the deadline passes
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemCommandRunner;

impl CommandRunner for SystemCommandRunner {
    fn run(&self, program: &str, args: &[&str], timeout: Duration) -> std::io::Result<CommandOutput> {
        debug!("Executing: {} {:?}", program, args);

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        // Drain pipes on helper threads so a chatty child cannot block on a full pipe
        let stdout = child.stdout.take().map(drain);
        let stderr = child.stderr.take().map(drain);

        let deadline = Instant::now() + timeout;
        let status = loop {
            if let Some(status) = child.try_wait()? {
                break status;
            }
            if Instant::now() >= deadline {
                warn!("Command '{}' exceeded {:?}, killing it", program, timeout);
                let _ = child.kill();
                let _ = child.wait();
                return Err(std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    format!("{} timed out after {:?}", program, timeout),
                ));
            }
            thread::sleep(POLL_INTERVAL);
        };

        let collect = |h: Option<thread::JoinHandle<String>>| {
            h.and_then(|h| h.join().ok()).unwrap_or_default()
        };

        Ok(CommandOutput {
            success: status.success(),
            stdout: collect(stdout),
            stderr: collect(stderr),
        })
    }
}

fn drain<R: Read + Send + 'static>(mut pipe: R) -> thread::JoinHandle<String> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf);
        String::from_utf8_lossy(&buf).into_owned()
    })
}

/// Replays canned outputs keyed by the full command line. Unknown commands
/// fail to start, like a missing binary.
#[derive(Debug, Default)]
pub struct ScriptedRunner {
    responses: HashMap<String, CommandOutput>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a successful command and its stdout
    pub fn ok(mut self, line: &str, stdout: &str) -> Self {
        self.responses.insert(
            line.to_string(),
            CommandOutput {
                success: true,
                stdout: stdout.to_string(),
                stderr: String::new(),
            },
        );
        self
    }

    /// Register a command that starts but exits non-zero
    pub fn fail(mut self, line: &str, stderr: &str) -> Self {
        self.responses.insert(
            line.to_string(),
            CommandOutput {
                success: false,
                stdout: String::new(),
                stderr: stderr.to_string(),
            },
        );
        self
    }

    /// Command lines seen so far, in call order
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    fn key(program: &str, args: &[&str]) -> String {
        std::iter::once(program)
            .chain(args.iter().copied())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl CommandRunner for ScriptedRunner {
    fn run(&self, program: &str, args: &[&str], _timeout: Duration) -> std::io::Result<CommandOutput> {
        let key = Self::key(program, args);
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(key.clone());
        }
        self.responses.get(&key).cloned().ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::NotFound, format!("{}: not found", program))
        })
    }

    fn run_shell(&self, line: &str, timeout: Duration) -> std::io::Result<CommandOutput> {
        self.run(line, &[], timeout)
    }
}
