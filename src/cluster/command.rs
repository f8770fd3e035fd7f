//! External command execution for kubectl, helm and suite commands.

use std::collections::VecDeque;
use std::process::{ExitStatus, Stdio};

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::error::ClusterError;

/// Lines of stderr kept for error reporting
const STDERR_TAIL_LINES: usize = 20;

/// Render a command line for logs and error messages
pub(crate) fn command_line(program: &str, args: &[String]) -> String {
    if args.is_empty() {
        program.to_string()
    } else {
        format!("{} {}", program, args.join(" "))
    }
}

/// Run a command and return stdout, failing on a non-zero exit.
///
/// The child is killed if the returned future is dropped.
pub(crate) async fn run_command(program: &str, args: &[String]) -> Result<String, ClusterError> {
    let line = command_line(program, args);
    debug!(command = %line, "Running command");

    let output = Command::new(program)
        .args(args)
        .kill_on_drop(true)
        .output()
        .await?;

    if !output.status.success() {
        return Err(ClusterError::command_failed(
            line,
            String::from_utf8_lossy(&output.stderr).trim(),
        ));
    }

    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

/// Exit status and trailing stderr of a streamed command
#[derive(Debug)]
pub(crate) struct StreamedOutput {
    pub status: ExitStatus,
    pub stderr_tail: Vec<String>,
}

/// Run a command, forwarding its output to the log line by line.
///
/// A non-zero exit is not an error here; callers decide what it means. The
/// child is killed if the returned future is dropped.
pub(crate) async fn run_command_streaming(
    program: &str,
    args: &[String],
    env: &[(String, String)],
) -> Result<StreamedOutput, ClusterError> {
    let line = command_line(program, args);
    info!(command = %line, "Starting command");

    let mut command = Command::new(program);
    command
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    for (key, value) in env {
        command.env(key, value);
    }

    let mut child = command.spawn()?;
    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    // Drain both pipes concurrently so neither can fill up and stall the child
    let (_, stderr_tail) = tokio::join!(
        forward_lines(stdout, false),
        forward_lines(stderr, true)
    );

    let status = child.wait().await?;
    debug!(command = %line, %status, "Command exited");

    Ok(StreamedOutput {
        status,
        stderr_tail: stderr_tail.into(),
    })
}

async fn forward_lines<R>(pipe: Option<R>, is_stderr: bool) -> VecDeque<String>
where
    R: AsyncRead + Unpin,
{
    let mut tail = VecDeque::with_capacity(STDERR_TAIL_LINES);
    let Some(pipe) = pipe else {
        return tail;
    };

    let mut lines = BufReader::new(pipe).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if is_stderr {
                    info!(target: "install_harness::suite", stream = "stderr", "{}", line);
                    if tail.len() == STDERR_TAIL_LINES {
                        tail.pop_front();
                    }
                    tail.push_back(line);
                } else {
                    info!(target: "install_harness::suite", stream = "stdout", "{}", line);
                }
            }
            Ok(None) => break,
            Err(e) => {
                warn!(error = %e, "Failed to read command output");
                break;
            }
        }
    }
    tail
}
