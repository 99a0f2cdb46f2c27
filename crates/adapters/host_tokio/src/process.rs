//! External process execution on Tokio.

use std::process::Stdio;

use cellhub_engine::ports::{ExitCallback, ProcessHost, SpawnOutcome, SpawnRequest};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::runtime::Handle;
use tracing::debug;

/// Spawns host processes as Tokio child processes. The exit callback is
/// invoked exactly once per spawn, with a synthetic failure outcome when
/// the process could not be started at all.
pub struct TokioProcessHost {
    runtime: Handle,
}

impl TokioProcessHost {
    /// Must be called from within a Tokio runtime.
    #[must_use]
    pub fn new() -> Self {
        Self::with_runtime(Handle::current())
    }

    #[must_use]
    pub fn with_runtime(runtime: Handle) -> Self {
        Self { runtime }
    }
}

impl Default for TokioProcessHost {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessHost for TokioProcessHost {
    fn spawn(&self, request: SpawnRequest, on_exit: ExitCallback) {
        self.runtime.spawn(async move {
            let outcome = run(request).await;
            on_exit(outcome);
        });
    }
}

async fn run(request: SpawnRequest) -> SpawnOutcome {
    debug!(argv = ?request.argv, "spawning process");
    let Some((program, args)) = request.argv.split_first() else {
        return failure("empty argv");
    };
    let mut command = Command::new(program);
    command
        .args(args)
        .stdin(if request.stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(pipe_if(request.capture_stdout))
        .stderr(pipe_if(request.capture_stderr));

    let mut child = match command.spawn() {
        Ok(child) => child,
        Err(err) => return failure(&err.to_string()),
    };
    if let Some(input) = request.stdin {
        if let Some(mut stdin) = child.stdin.take() {
            if let Err(err) = stdin.write_all(input.as_bytes()).await {
                // Reap the child before reporting, so a dead pipe does not
                // leave a zombie behind.
                let _ = child.kill().await;
                return failure(&err.to_string());
            }
            // Dropping stdin closes the pipe so the child sees EOF.
        }
    }
    match child.wait_with_output().await {
        Ok(output) => SpawnOutcome {
            // Termination by signal reports as -1.
            exit_status: output.status.code().unwrap_or(-1),
            stdout: request
                .capture_stdout
                .then(|| String::from_utf8_lossy(&output.stdout).into_owned()),
            stderr: request
                .capture_stderr
                .then(|| String::from_utf8_lossy(&output.stderr).into_owned()),
        },
        Err(err) => failure(&err.to_string()),
    }
}

fn pipe_if(capture: bool) -> Stdio {
    if capture { Stdio::piped() } else { Stdio::null() }
}

fn failure(reason: &str) -> SpawnOutcome {
    SpawnOutcome {
        exit_status: -1,
        stdout: None,
        stderr: Some(reason.to_string()),
    }
}
