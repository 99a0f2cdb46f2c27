//! Process host port: spawning with an exit callback.

/// Description of one process to spawn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpawnRequest {
    /// Program and arguments; `argv[0]` is the program.
    pub argv: Vec<String>,
    pub capture_stdout: bool,
    pub capture_stderr: bool,
    /// Text piped to the child's stdin, if any.
    pub stdin: Option<String>,
}

impl SpawnRequest {
    /// Run `command` through `/bin/sh -c`.
    #[must_use]
    pub fn shell(command: impl Into<String>) -> Self {
        Self {
            argv: vec!["/bin/sh".to_string(), "-c".to_string(), command.into()],
            capture_stdout: false,
            capture_stderr: false,
            stdin: None,
        }
    }

    /// Capture both stdout and stderr.
    #[must_use]
    pub fn capture_output(mut self) -> Self {
        self.capture_stdout = true;
        self.capture_stderr = true;
        self
    }

    /// Pipe `input` to the child's stdin.
    #[must_use]
    pub fn with_stdin(mut self, input: impl Into<String>) -> Self {
        self.stdin = Some(input.into());
        self
    }
}

/// What the host reports back when the child exits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpawnOutcome {
    pub exit_status: i32,
    /// Captured stdout, present only when requested.
    pub stdout: Option<String>,
    /// Captured stderr, present only when requested.
    pub stderr: Option<String>,
}

impl SpawnOutcome {
    #[must_use]
    pub fn success(&self) -> bool {
        self.exit_status == 0
    }
}

/// Invoked exactly once per spawn, after the child exits, including
/// non-zero-status completions and spawn failures.
pub type ExitCallback = Box<dyn FnOnce(SpawnOutcome) + Send>;

/// Spawns processes asynchronously. `spawn` must return immediately; the
/// callback is delivered in a later turn.
pub trait ProcessHost: Send + Sync {
    fn spawn(&self, request: SpawnRequest, on_exit: ExitCallback);
}

impl<T: ProcessHost> ProcessHost for std::sync::Arc<T> {
    fn spawn(&self, request: SpawnRequest, on_exit: ExitCallback) {
        (**self).spawn(request, on_exit);
    }
}
