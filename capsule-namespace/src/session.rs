//! Interactive shell inside the prepared namespaces

#![allow(unsafe_code)]

use std::io;
use std::os::unix::process::{CommandExt, ExitStatusExt};
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};

use capsule_core::ProgramInfo;
use nix::sys::signal::{signal, SigHandler, Signal};

/// Prompt evaluated by the shell on every line
pub const PROMPT_TEMPLATE: &str = "📦 [$(whoami)@$(hostname)] ~$(pwd) ‣ ";

/// Signals the shell owns while it is in the foreground
const TERMINAL_SIGNALS: [Signal; 2] = [Signal::SIGINT, Signal::SIGQUIT];

/// Exit code reported when the shell cannot be started
pub const SHELL_NOT_STARTED: i32 = 127;

/// Spawns the shell and waits for the user to leave it
#[derive(Debug, Clone)]
pub struct SessionRunner {
    shell: PathBuf,
    prompt: String,
}

impl SessionRunner {
    /// Create a runner for the program's configured shell
    #[must_use]
    pub fn new(program: &ProgramInfo) -> Self {
        Self {
            shell: program.shell().to_path_buf(),
            prompt: PROMPT_TEMPLATE.to_string(),
        }
    }

    /// Replace the prompt template
    #[must_use]
    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = prompt.into();
        self
    }

    /// Shell that will be started
    #[must_use]
    pub fn shell(&self) -> &Path {
        &self.shell
    }

    /// Build the shell command
    ///
    /// The environment is replaced by a single `PS1`; stdio is inherited.
    /// SIGINT and SIGQUIT are back to their defaults in the shell even when
    /// the caller ignores them.
    #[must_use]
    pub fn command(&self) -> Command {
        let mut command = Command::new(&self.shell);
        command
            .env_clear()
            .env("PS1", &self.prompt)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());

        // SAFETY: the hook only calls sigaction(2), which is async-signal-safe
        unsafe {
            command.pre_exec(restore_terminal_signals);
        }
        command
    }

    /// Run the shell to completion and return its exit code
    ///
    /// A shell that fails to start yields no session and
    /// [`SHELL_NOT_STARTED`].
    #[must_use]
    pub fn run(&self) -> i32 {
        tracing::info!(shell = %self.shell.display(), "Starting shell");

        // Installed before the spawn so a Ctrl-C can never skip teardown
        let _guard = IgnoreTerminalSignals::install();

        let mut child = match self.command().spawn() {
            Ok(child) => child,
            Err(e) => {
                tracing::error!(
                    shell = %self.shell.display(),
                    error = %e,
                    "Failed to start shell"
                );
                return SHELL_NOT_STARTED;
            }
        };

        match child.wait() {
            Ok(status) => {
                let code = exit_code(status);
                tracing::info!(exit_code = code, "Shell exited");
                code
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to wait for shell");
                SHELL_NOT_STARTED
            }
        }
    }
}

/// Map an exit status to a shell-style exit code
#[must_use]
pub fn exit_code(status: ExitStatus) -> i32 {
    status
        .code()
        .or_else(|| status.signal().map(|signal| 128 + signal))
        .unwrap_or(1)
}

/// Ignores SIGINT and SIGQUIT until dropped
pub(crate) struct IgnoreTerminalSignals {
    previous: Vec<(Signal, SigHandler)>,
}

impl IgnoreTerminalSignals {
    pub(crate) fn install() -> Self {
        let previous = TERMINAL_SIGNALS
            .into_iter()
            .filter_map(|sig| {
                // SAFETY: installing SIG_IGN runs no handler code
                unsafe { signal(sig, SigHandler::SigIgn) }
                    .ok()
                    .map(|old| (sig, old))
            })
            .collect();

        Self { previous }
    }
}

/// Reset terminal signals to their default action in a freshly forked child
fn restore_terminal_signals() -> io::Result<()> {
    for sig in TERMINAL_SIGNALS {
        // SAFETY: SIG_DFL runs no handler code
        unsafe { signal(sig, SigHandler::SigDfl) }.map_err(io::Error::from)?;
    }
    Ok(())
}

impl Drop for IgnoreTerminalSignals {
    fn drop(&mut self) {
        for (sig, handler) in self.previous.drain(..) {
            // SAFETY: restores the disposition that was in place before
            let _ = unsafe { signal(sig, handler) };
        }
    }
}
