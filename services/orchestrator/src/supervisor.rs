//! Runs an external collaborator (Roundtable, Builder) as a subprocess:
//! JSON on stdin, JSON on stdout, a wall-clock deadline, never throws past
//! the Dispatcher boundary (grounded on
//! `dispatcher.py::_run_roundtable_subprocess`/`initiate_roundtable`).

use std::process::Output;
use std::time::Duration;

use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{error, warn};

/// The result of one subprocess invocation. Every failure mode — spawn
/// failure, timeout, non-zero exit, unparseable stdout — collapses to
/// `Err`; the Dispatcher never sees this escape as a Rust error.
#[derive(Debug, Clone, PartialEq)]
pub enum SupervisorOutcome {
    Ok { output: Value },
    Err { error: String },
}

impl SupervisorOutcome {
    /// The `{transcript, summary}` shape Roundtable's own payload carries,
    /// defaulted on failure so downstream code never has to branch on
    /// `Ok`/`Err` just to find an empty transcript.
    pub fn into_value(self) -> Value {
        match self {
            Self::Ok { output } => output,
            Self::Err { error } => serde_json::json!({ "error": error, "transcript": [], "summary": "" }),
        }
    }
}

pub struct Supervisor;

impl Supervisor {
    /// Spawn `program args...`, write `input` as JSON to its stdin, and wait
    /// up to `timeout` for it to exit with a JSON object on stdout.
    ///
    /// The child runs in its own process group (`setsid`-equivalent via
    /// `process_group(0)`), so a grandchild it spawns (e.g. `uv run python
    /// -m services.roundtable` forking off a `python` interpreter) is in the
    /// same group. `kill_on_drop` alone only reaches the immediate child; on
    /// timeout we instead signal the whole group with `SIGKILL` so nothing
    /// is left running past the deadline.
    pub async fn run(program: &str, args: &[&str], input: &Value, timeout: Duration) -> SupervisorOutcome {
        let input_json = match serde_json::to_string(input) {
            Ok(text) => text,
            Err(err) => return SupervisorOutcome::Err { error: format!("could not encode subprocess input: {err}") },
        };

        let mut command = Command::new(program);
        command
            .args(args)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        command.process_group(0);

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(err) => {
                error!(program, error = %err, "failed to spawn subprocess");
                return SupervisorOutcome::Err { error: format!("failed to spawn {program}: {err}") };
            }
        };

        if let Some(mut stdin) = child.stdin.take() {
            if let Err(err) = stdin.write_all(input_json.as_bytes()).await {
                warn!(program, error = %err, "failed to write subprocess stdin");
            }
            drop(stdin);
        }

        let pid = child.id();

        match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => Self::outcome_from_output(program, output),
            Ok(Err(err)) => {
                error!(program, error = %err, "failed waiting on subprocess");
                SupervisorOutcome::Err { error: format!("subprocess wait failed: {err}") }
            }
            Err(_elapsed) => {
                error!(program, timeout_seconds = timeout.as_secs(), "subprocess timed out");
                if let Some(pid) = pid {
                    kill_process_group(pid);
                }
                SupervisorOutcome::Err { error: "subprocess timed out".to_string() }
            }
        }
    }

    fn outcome_from_output(program: &str, output: Output) -> SupervisorOutcome {
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            error!(program, code = ?output.status.code(), error = %stderr, "subprocess exited non-zero");
            return SupervisorOutcome::Err { error: stderr.trim().to_string() };
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        match serde_json::from_str(&stdout) {
            Ok(value) => SupervisorOutcome::Ok { output: value },
            Err(err) => {
                error!(program, error = %err, "failed to parse subprocess stdout as json");
                SupervisorOutcome::Err { error: format!("invalid JSON output: {err}") }
            }
        }
    }
}

/// Send `SIGKILL` to every process in `pid`'s process group (its negative
/// pid), reaching grandchildren a plain `kill_on_drop` on the immediate
/// child would orphan. The child must have been spawned with
/// `process_group(0)` for this to target more than just itself.
#[cfg(unix)]
fn kill_process_group(pid: u32) {
    // SAFETY: `kill` with a negative pid signals the whole process group;
    // it has no memory-safety preconditions, only the usual permission
    // rules enforced by the kernel.
    unsafe {
        libc::kill(-(pid as libc::pid_t), libc::SIGKILL);
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pid: u32) {}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_program_resolves_to_error_not_a_panic() {
        let result = Supervisor::run(
            "definitely-not-a-real-binary-on-this-system",
            &[],
            &serde_json::json!({}),
            Duration::from_secs(2),
        )
        .await;
        assert!(matches!(result, SupervisorOutcome::Err { .. }));
    }

    #[tokio::test]
    async fn echoes_stdin_through_cat() {
        let input = serde_json::json!({"prompt": "hi"});
        let result = Supervisor::run("cat", &[], &input, Duration::from_secs(2)).await;
        assert_eq!(result, SupervisorOutcome::Ok { output: input });
    }

    #[tokio::test]
    async fn slow_subprocess_times_out() {
        let result = Supervisor::run("sleep", &["5"], &serde_json::json!({}), Duration::from_millis(50)).await;
        assert!(matches!(result, SupervisorOutcome::Err { .. }));
    }

    #[tokio::test]
    #[cfg(unix)]
    async fn timed_out_subprocess_does_not_orphan_its_own_child() {
        // `sh -c 'sleep 5 & echo $!; wait'` forks a grandchild `sleep`. If
        // only the immediate `sh` were killed, that `sleep` would keep
        // running after this function returns.
        let pid_file = std::env::temp_dir().join(format!("supervisor_test_grandchild_pid_{}", std::process::id()));
        let result = Supervisor::run(
            "sh",
            &["-c", &format!("sleep 5 & echo $! > {}; wait", pid_file.display())],
            &serde_json::json!({}),
            Duration::from_millis(100),
        )
        .await;
        assert!(matches!(result, SupervisorOutcome::Err { .. }));

        if let Ok(pid_text) = std::fs::read_to_string(&pid_file) {
            if let Ok(pid) = pid_text.trim().parse::<libc::pid_t>() {
                tokio::time::sleep(Duration::from_millis(50)).await;
                let still_alive = unsafe { libc::kill(pid, 0) == 0 };
                assert!(!still_alive, "grandchild sleep process was orphaned after subprocess timeout");
            }
        }
        let _ = std::fs::remove_file(&pid_file);
    }

    #[test]
    fn failed_outcome_defaults_to_empty_transcript() {
        let value = SupervisorOutcome::Err { error: "boom".to_string() }.into_value();
        assert_eq!(value["transcript"], serde_json::json!([]));
        assert_eq!(value["summary"], serde_json::json!(""));
    }
}
