//! Bounded, cancellable subprocess execution.
//!
//! Contract: one external process per call, an explicit argument vector
//! (never a shell string), a finite timeout, optional working directory, and
//! bounded output capture. Diagnostic streams always go to anonymous
//! temporary files rather than pipes, so a chatty tool can never deadlock
//! against a full pipe buffer; the files are unlinked at creation and vanish
//! on every exit path.
//!
//! Cancellation is polled between wait intervals. On cancellation or timeout
//! the child receives SIGTERM, then SIGKILL after a short grace period.

#![allow(missing_docs)]

pub mod cancel;

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use crate::core::errors::{Result, UnpackrError};
use crate::runner::cancel::CancelToken;

/// Poll interval while waiting on a child.
const WAIT_POLL: Duration = Duration::from_millis(50);

/// Grace period between SIGTERM and SIGKILL.
const KILL_GRACE: Duration = Duration::from_secs(2);

/// Default cap on captured bytes per stream.
const DEFAULT_CAPTURE_LIMIT: usize = 256 * 1024;

/// Fixed timeout for media probe and decode invocations.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(60);

const EXTRACTION_FLOOR: Duration = Duration::from_secs(5 * 60);
const EXTRACTION_CAP: Duration = Duration::from_secs(2 * 3600);
const PARITY_FLOOR: Duration = Duration::from_secs(10 * 60);
const PARITY_CAP: Duration = Duration::from_secs(3 * 3600);

/// Dynamic extraction timeout: `max(5 min, 1.5 × bytes / (10 MiB/s))`,
/// capped at 2 h.
#[must_use]
pub fn extraction_timeout(size_bytes: u64) -> Duration {
    let secs = size_bytes.saturating_mul(3) / 2 / (10 * 1024 * 1024);
    Duration::from_secs(secs)
        .max(EXTRACTION_FLOOR)
        .min(EXTRACTION_CAP)
}

/// Dynamic parity timeout: `max(10 min, 2.0 × bytes / (5 MiB/s))`,
/// capped at 3 h.
#[must_use]
pub fn parity_timeout(size_bytes: u64) -> Duration {
    let secs = size_bytes.saturating_mul(2) / (5 * 1024 * 1024);
    Duration::from_secs(secs).max(PARITY_FLOOR).min(PARITY_CAP)
}

/// One external tool invocation.
#[derive(Debug, Clone)]
pub struct ToolInvocation {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub timeout: Duration,
    /// Cap on captured bytes per stream; the head is kept.
    pub capture_limit: usize,
}

impl ToolInvocation {
    #[must_use]
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args,
            cwd: None,
            timeout,
            capture_limit: DEFAULT_CAPTURE_LIMIT,
        }
    }

    #[must_use]
    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }
}

/// How a child ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    /// Exited on its own with this code.
    Exited(i32),
    /// Killed after exceeding its timeout.
    TimedOut,
    /// Killed because the run was cancelled.
    Cancelled,
}

impl RunStatus {
    #[must_use]
    pub const fn success(self) -> bool {
        matches!(self, Self::Exited(0))
    }
}

/// Captured result of one invocation.
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub status: RunStatus,
    pub stdout: String,
    pub stderr: String,
    pub duration: Duration,
}

impl RunOutput {
    /// Combined stdout + stderr, lowercased for keyword scanning.
    #[must_use]
    pub fn combined_lower(&self) -> String {
        let mut out = String::with_capacity(self.stdout.len() + self.stderr.len() + 1);
        out.push_str(&self.stdout.to_lowercase());
        out.push('\n');
        out.push_str(&self.stderr.to_lowercase());
        out
    }
}

/// The runner: owns the cancellation token and a hard run deadline.
#[derive(Debug, Clone)]
pub struct SubprocessRunner {
    cancel: CancelToken,
    /// Global run deadline; spawns past it are refused (invariant I4).
    deadline: Option<Instant>,
}

impl SubprocessRunner {
    #[must_use]
    pub fn new(cancel: CancelToken) -> Self {
        Self {
            cancel,
            deadline: None,
        }
    }

    #[must_use]
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    #[must_use]
    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Spawn and wait, bounded by the invocation timeout, the global
    /// deadline, and the cancellation flag.
    pub fn run(&self, invocation: &ToolInvocation) -> Result<RunOutput> {
        // Invariant I8: every subprocess carries a finite, non-zero timeout.
        if invocation.timeout.is_zero() {
            return Err(UnpackrError::SafetyRefusal {
                invariant: "I8",
                path: invocation.program.clone(),
                reason: "subprocess timeout must be finite and non-zero".to_string(),
            });
        }
        // Invariant I4: operations that would cross the global budget fail.
        let now = Instant::now();
        if let Some(deadline) = self.deadline
            && now + invocation.timeout > deadline
        {
            return Err(UnpackrError::SafetyRefusal {
                invariant: "I4",
                path: invocation.program.clone(),
                reason: "invocation would cross the global runtime budget".to_string(),
            });
        }
        if self.cancel.is_cancelled() {
            return Err(UnpackrError::Cancelled);
        }

        let mut stdout_file = capture_file(&invocation.program)?;
        let mut stderr_file = capture_file(&invocation.program)?;

        let mut command = Command::new(&invocation.program);
        command
            .args(&invocation.args)
            .stdin(Stdio::null())
            .stdout(Stdio::from(clone_handle(&stdout_file, &invocation.program)?))
            .stderr(Stdio::from(clone_handle(&stderr_file, &invocation.program)?));
        if let Some(cwd) = &invocation.cwd {
            command.current_dir(cwd);
        }

        let mut child = command.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                UnpackrError::ToolFailed {
                    tool: invocation.program.display().to_string(),
                    details: "binary not found".to_string(),
                }
            } else {
                UnpackrError::io(&invocation.program, e)
            }
        })?;

        let started = Instant::now();
        let timeout_at = started + invocation.timeout;
        let status = loop {
            match child.try_wait() {
                Ok(Some(exit)) => break RunStatus::Exited(exit.code().unwrap_or(-1)),
                Ok(None) => {}
                Err(e) => {
                    let _ = child.kill();
                    return Err(UnpackrError::io(&invocation.program, e));
                }
            }
            if self.cancel.is_cancelled() {
                terminate(&mut child);
                break RunStatus::Cancelled;
            }
            if Instant::now() >= timeout_at {
                terminate(&mut child);
                break RunStatus::TimedOut;
            }
            std::thread::sleep(WAIT_POLL);
        };

        let stdout = read_capture(&mut stdout_file, invocation.capture_limit);
        let stderr = read_capture(&mut stderr_file, invocation.capture_limit);

        Ok(RunOutput {
            status,
            stdout,
            stderr,
            duration: started.elapsed(),
        })
    }
}

/// Anonymous capture file: unlinked at creation, gone on every exit path.
fn capture_file(program: &std::path::Path) -> Result<File> {
    tempfile::tempfile().map_err(|e| UnpackrError::io(program, e))
}

fn clone_handle(file: &File, program: &std::path::Path) -> Result<File> {
    file.try_clone().map_err(|e| UnpackrError::io(program, e))
}

fn read_capture(file: &mut File, limit: usize) -> String {
    if file.seek(SeekFrom::Start(0)).is_err() {
        return String::new();
    }
    let mut buf = Vec::with_capacity(limit.min(64 * 1024));
    let mut handle = file.take(limit as u64);
    if handle.read_to_end(&mut buf).is_err() {
        return String::new();
    }
    String::from_utf8_lossy(&buf).into_owned()
}

/// SIGTERM, short grace, then SIGKILL.
fn terminate(child: &mut std::process::Child) {
    #[cfg(unix)]
    {
        use nix::sys::signal::{Signal, kill};
        use nix::unistd::Pid;

        let pid = Pid::from_raw(child.id().try_into().unwrap_or(0));
        if pid.as_raw() > 0 && kill(pid, Signal::SIGTERM).is_ok() {
            let grace_until = Instant::now() + KILL_GRACE;
            while Instant::now() < grace_until {
                if matches!(child.try_wait(), Ok(Some(_))) {
                    return;
                }
                std::thread::sleep(WAIT_POLL);
            }
        }
    }
    let _ = child.kill();
    let _ = child.wait();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(script: &str, timeout: Duration) -> ToolInvocation {
        ToolInvocation::new(
            "/bin/sh",
            vec!["-c".to_string(), script.to_string()],
            timeout,
        )
    }

    #[test]
    fn extraction_timeout_floors_and_caps() {
        // Tiny set: floor applies.
        assert_eq!(extraction_timeout(1024), Duration::from_secs(300));
        // 10 GiB at 10 MiB/s × 1.5 = 1536 s.
        assert_eq!(
            extraction_timeout(10 * 1024 * 1024 * 1024),
            Duration::from_secs(1536)
        );
        // Absurd size: cap applies.
        assert_eq!(extraction_timeout(u64::MAX / 4), EXTRACTION_CAP);
    }

    #[test]
    fn parity_timeout_floors_and_caps() {
        assert_eq!(parity_timeout(1024), Duration::from_secs(600));
        // 10 GiB at 5 MiB/s × 2 = 4096 s.
        assert_eq!(
            parity_timeout(10 * 1024 * 1024 * 1024),
            Duration::from_secs(4096)
        );
        assert_eq!(parity_timeout(u64::MAX / 4), PARITY_CAP);
    }

    #[test]
    fn zero_timeout_refused_i8() {
        let runner = SubprocessRunner::new(CancelToken::new());
        let err = runner.run(&sh("true", Duration::ZERO)).unwrap_err();
        assert_eq!(err.code(), "UPK-2001");
        assert!(err.to_string().contains("I8"));
    }

    #[test]
    fn captures_stdout_and_stderr() {
        let runner = SubprocessRunner::new(CancelToken::new());
        let out = runner
            .run(&sh("echo hello; echo oops >&2", Duration::from_secs(10)))
            .unwrap();
        assert!(out.status.success());
        assert_eq!(out.stdout.trim(), "hello");
        assert_eq!(out.stderr.trim(), "oops");
    }

    #[test]
    fn nonzero_exit_is_reported_not_an_error() {
        let runner = SubprocessRunner::new(CancelToken::new());
        let out = runner.run(&sh("exit 3", Duration::from_secs(10))).unwrap();
        assert_eq!(out.status, RunStatus::Exited(3));
        assert!(!out.status.success());
    }

    #[test]
    fn missing_binary_reported_as_tool_failure() {
        let runner = SubprocessRunner::new(CancelToken::new());
        let invocation = ToolInvocation::new(
            "/nonexistent/unpackr-test-tool",
            vec![],
            Duration::from_secs(5),
        );
        let err = runner.run(&invocation).unwrap_err();
        assert_eq!(err.code(), "UPK-3101");
    }

    #[test]
    fn timeout_kills_the_child() {
        let runner = SubprocessRunner::new(CancelToken::new());
        let started = Instant::now();
        let out = runner
            .run(&sh("sleep 30", Duration::from_millis(200)))
            .unwrap();
        assert_eq!(out.status, RunStatus::TimedOut);
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn pre_cancelled_run_refuses_to_spawn() {
        let token = CancelToken::new();
        token.cancel();
        let runner = SubprocessRunner::new(token);
        let err = runner.run(&sh("true", Duration::from_secs(5))).unwrap_err();
        assert_eq!(err.code(), "UPK-3103");
    }

    #[test]
    fn cancellation_terminates_running_child() {
        let token = CancelToken::new();
        let runner = SubprocessRunner::new(token.clone());
        let handle = std::thread::spawn(move || runner.run(&sh("sleep 30", Duration::from_secs(60))));
        std::thread::sleep(Duration::from_millis(300));
        token.cancel();
        let out = handle.join().unwrap().unwrap();
        assert_eq!(out.status, RunStatus::Cancelled);
    }

    #[test]
    fn deadline_crossing_refused_i4() {
        let runner = SubprocessRunner::new(CancelToken::new())
            .with_deadline(Instant::now() + Duration::from_secs(1));
        let err = runner.run(&sh("true", Duration::from_secs(60))).unwrap_err();
        assert!(err.to_string().contains("I4"));
    }

    #[test]
    fn capture_limit_truncates() {
        let runner = SubprocessRunner::new(CancelToken::new());
        let mut invocation = sh("yes x | head -c 100000", Duration::from_secs(10));
        invocation.capture_limit = 1024;
        let out = runner.run(&invocation).unwrap();
        assert!(out.stdout.len() <= 1024);
    }

    #[test]
    fn large_output_does_not_deadlock() {
        // A pipe-buffer-sized burst on both streams would deadlock a naive
        // pipe reader; temp-file capture must not care.
        let runner = SubprocessRunner::new(CancelToken::new());
        let out = runner
            .run(&sh(
                "yes out | head -c 400000; yes err | head -c 400000 >&2",
                Duration::from_secs(20),
            ))
            .unwrap();
        assert!(out.status.success());
    }

    #[test]
    fn combined_lower_joins_streams() {
        let output = RunOutput {
            status: RunStatus::Exited(0),
            stdout: "Repair FAILED".to_string(),
            stderr: "All files are CORRECT".to_string(),
            duration: Duration::ZERO,
        };
        let combined = output.combined_lower();
        assert!(combined.contains("repair failed"));
        assert!(combined.contains("all files are correct"));
    }
}
