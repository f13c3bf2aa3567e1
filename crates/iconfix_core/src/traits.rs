//! Port for probing and invoking external command-line tools.
//!
//! The repair pipeline depends only on this trait; the process-spawning
//! adapter lives in `iconfix_tools`. Tests substitute fakes (always-absent,
//! always-failing, always-hanging) without spawning real processes.

use crate::error::Result;
use std::ffi::OsStr;
use std::time::Duration;

/// Outcome of one completed tool invocation.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    /// Whether the child exited with a zero status.
    pub success: bool,

    /// Captured stderr text, empty when nothing was emitted.
    pub stderr: String,
}

pub trait ToolInvoker {
    /// Probes whether `tool` is present on the host by invoking it with a
    /// harmless flag (typically a version query).
    ///
    /// Never errors: spawn failure, a non-zero exit, or any other problem
    /// is reported as "unavailable".
    fn is_available(&self, tool: &str, probe_args: &[&str]) -> bool;

    /// Runs `tool` with `args`, enforcing `timeout` as an upper bound on
    /// wall-clock time.
    ///
    /// Returns `Err` when the tool cannot be spawned
    /// ([`ToolUnavailable`](crate::RepairError::ToolUnavailable)) or when it
    /// exceeds the timeout ([`ToolExecution`](crate::RepairError::ToolExecution));
    /// a tool that ran to completion with a non-zero status is an `Ok` with
    /// `success == false` so the caller can report its stderr.
    fn run(&self, tool: &str, args: &[&OsStr], timeout: Duration) -> Result<ToolOutput>;
}
