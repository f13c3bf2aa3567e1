//! Subprocess adapter for the `ToolInvoker` port.

use iconfix_core::{RepairError, Result, ToolInvoker, ToolOutput};
use std::ffi::OsStr;
use std::io::Read;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Invokes external tools as real child processes.
///
/// Every invocation is bounded by the caller's timeout: the child is polled
/// with `try_wait` against a deadline and killed when it overruns, so a
/// misbehaving tool can never hang the pipeline.
pub struct SystemToolInvoker;

impl ToolInvoker for SystemToolInvoker {
    fn is_available(&self, tool: &str, probe_args: &[&str]) -> bool {
        Command::new(tool)
            .args(probe_args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|status| status.success())
            .unwrap_or(false)
    }

    fn run(&self, tool: &str, args: &[&OsStr], timeout: Duration) -> Result<ToolOutput> {
        let mut child = Command::new(tool)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| RepairError::ToolUnavailable(format!("{tool}: {e}")))?;

        // Drained on a separate thread so a chatty tool cannot fill the
        // pipe and deadlock while the parent polls the deadline.
        let stderr_pipe = child.stderr.take();
        let drain = thread::Builder::new()
            .name(format!("{tool}-stderr"))
            .spawn(move || {
                let mut captured = String::new();
                if let Some(mut pipe) = stderr_pipe {
                    let _ = pipe.read_to_string(&mut captured);
                }
                captured
            })
            .expect("failed to spawn stderr drain thread");

        match wait_with_deadline(&mut child, timeout) {
            Ok(Some(status)) => {
                let stderr = drain.join().unwrap_or_default();
                Ok(ToolOutput {
                    success: status.success(),
                    stderr,
                })
            }
            Ok(None) => {
                reap(&mut child);
                let _ = drain.join();
                Err(RepairError::ToolExecution {
                    tool: tool.to_string(),
                    message: format!("timed out after {}s", timeout.as_secs_f32()),
                })
            }
            Err(e) => {
                reap(&mut child);
                let _ = drain.join();
                Err(e.into())
            }
        }
    }
}

fn wait_with_deadline(child: &mut Child, timeout: Duration) -> std::io::Result<Option<ExitStatus>> {
    let deadline = Instant::now() + timeout;

    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if Instant::now() >= deadline {
            return Ok(None);
        }
        thread::sleep(WAIT_POLL_INTERVAL);
    }
}

fn reap(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}
