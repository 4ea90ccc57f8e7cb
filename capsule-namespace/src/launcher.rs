//! Re-execution of the program inside new namespaces
//!
//! This module uses `unsafe` for clone(2) and execv(2). The namespaces are
//! created by the kernel together with the child, so the child must be a
//! fresh process rather than the caller after unshare(2).

#![allow(unsafe_code)]

use std::ffi::{CString, OsStr, OsString};
use std::fs::File;
use std::io::{Read, Write};
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};
use std::ptr;

use capsule_core::{Error, Result};
use nix::fcntl::OFlag;
use nix::sched::clone;
use nix::sys::signal::{kill, Signal};
use nix::sys::wait::{waitpid, WaitStatus};
use nix::unistd::{pipe2, Pid};

use crate::config::{CapabilityRequest, Namespace, NamespaceFlagSet};
use crate::identity::IdentityMapping;
use crate::session::IgnoreTerminalSignals;

/// Mode token that starts a namespaced shell
pub const RUN_TOKEN: &str = "-run";

/// Mode token of the re-executed child; not meant for humans
pub const NAMESPACE_TOKEN: &str = "-ns";

/// Image of the running program
const SELF_EXE: &str = "/proc/self/exe";

/// Stack for the cloned child until it execs
const CHILD_STACK_SIZE: usize = 1024 * 1024;

/// Exit code of a child whose exec failed
const EXEC_FAILED: isize = 127;

/// Argument vector of the re-executed child
///
/// `original` is the invocation without the program name. Every occurrence
/// of the run token is dropped, everything else is forwarded untouched,
/// including arguments that are not valid UTF-8.
#[must_use]
pub fn forwarded_args<I, S>(original: I) -> Vec<OsString>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    std::iter::once(OsString::from(NAMESPACE_TOKEN))
        .chain(
            original
                .into_iter()
                .filter(|arg| !is_run_token(arg.as_ref()))
                .map(|arg| arg.as_ref().to_os_string()),
        )
        .collect()
}

fn is_run_token(arg: &OsStr) -> bool {
    let arg = arg.as_bytes();
    let token = RUN_TOKEN.as_bytes();
    arg == token || arg.strip_prefix(b"-") == Some(token)
}

/// Everything needed to create the namespaced child
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchPlan {
    flags: NamespaceFlagSet,
    identity: IdentityMapping,
    args: Vec<OsString>,
}

impl LaunchPlan {
    /// Compile `request` and build the child's arguments from `original_args`
    #[must_use]
    pub fn new<I, S>(request: &CapabilityRequest, identity: IdentityMapping, original_args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        Self {
            flags: NamespaceFlagSet::compile(request),
            identity,
            args: forwarded_args(original_args),
        }
    }

    /// Namespaces created for the child
    #[must_use]
    pub const fn flags(&self) -> NamespaceFlagSet {
        self.flags
    }

    /// Identity tables to install, only when a user namespace is created
    #[must_use]
    pub const fn identity(&self) -> Option<&IdentityMapping> {
        if self.flags.contains(Namespace::User) {
            Some(&self.identity)
        } else {
            None
        }
    }

    /// Child argument vector, without the program name
    #[must_use]
    pub fn args(&self) -> &[OsString] {
        &self.args
    }
}

/// Starts the program image again in new namespaces
#[derive(Debug, Clone)]
pub struct Launcher {
    executable: PathBuf,
}

impl Launcher {
    /// Create a launcher that re-executes the running binary
    #[must_use]
    pub fn new() -> Self {
        Self::with_executable(SELF_EXE)
    }

    /// Create a launcher for another executable
    #[must_use]
    pub fn with_executable(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
        }
    }

    /// Executable started in the child
    #[must_use]
    pub fn executable(&self) -> &Path {
        &self.executable
    }

    /// Clone the child, install its id maps, let it exec and wait for it
    ///
    /// The child inherits stdin, stdout and stderr. Returns the child's exit
    /// code, or `128 + signal` when it was killed.
    ///
    /// # Errors
    /// Returns error if the child cannot be created, its id maps cannot be
    /// written, or waiting for it fails
    pub fn launch(&self, plan: &LaunchPlan) -> Result<i32> {
        let program = to_cstring(self.executable.as_os_str())?;
        let argv = std::iter::once(Ok(program.clone()))
            .chain(plan.args().iter().map(|arg| to_cstring(arg)))
            .collect::<Result<Vec<_>>>()?;

        // Pointers are built up front: the child must not allocate before exec
        let argv_ptrs: Vec<*const libc::c_char> = argv
            .iter()
            .map(|arg| arg.as_ptr())
            .chain(std::iter::once(ptr::null()))
            .collect();

        let (ready_rx, ready_tx) = pipe2(OFlag::O_CLOEXEC)?;
        let ready_rx = File::from(ready_rx);
        let mut ready_tx = File::from(ready_tx);

        tracing::info!(
            executable = %self.executable.display(),
            namespaces = ?plan.flags().enabled_namespaces(),
            "Launching namespaced child"
        );

        let mut stack = vec![0u8; CHILD_STACK_SIZE];
        let child_main = Box::new(|| wait_and_exec(&ready_rx, &program, &argv_ptrs));

        // SAFETY: the child only reads the pipe and execs, both plain
        // system calls on memory prepared before the clone.
        let child = unsafe {
            clone(
                child_main,
                &mut stack,
                plan.flags().clone_flags(),
                Some(Signal::SIGCHLD as libc::c_int),
            )
        }
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to clone namespaced child");
            Error::launch(format!("clone failed: {e}"))
        })?;
        drop(ready_rx);

        tracing::debug!(pid = %child, "Child created");

        if let Err(e) = release_child(child, plan, &mut ready_tx) {
            let _ = kill(child, Signal::SIGKILL);
            let _ = waitpid(child, None);
            return Err(e);
        }
        drop(ready_tx);

        let _guard = IgnoreTerminalSignals::install();
        wait_for_exit(child)
    }
}

impl Default for Launcher {
    fn default() -> Self {
        Self::new()
    }
}

fn to_cstring(value: &OsStr) -> Result<CString> {
    CString::new(value.as_bytes())
        .map_err(|e| Error::launch(format!("Invalid argument {value:?}: {e}")))
}

/// Install the id maps, then let the child continue to exec
fn release_child(child: Pid, plan: &LaunchPlan, ready_tx: &mut File) -> Result<()> {
    if let Some(identity) = plan.identity() {
        identity.write_to(child)?;
    }
    ready_tx.write_all(&[1])?;
    Ok(())
}

/// Body of the cloned child
fn wait_and_exec(ready: &File, program: &CString, argv: &[*const libc::c_char]) -> isize {
    let mut byte = [0u8; 1];
    let mut reader = ready;
    if !matches!(reader.read(&mut byte), Ok(1)) {
        return 1;
    }

    // SAFETY: `argv` is a null-terminated array of pointers into CStrings
    // that outlive this call.
    unsafe {
        libc::execv(program.as_ptr(), argv.as_ptr());
    }
    EXEC_FAILED
}

/// Wait for the child and translate its status into an exit code
fn wait_for_exit(child: Pid) -> Result<i32> {
    loop {
        match waitpid(child, None) {
            Ok(WaitStatus::Exited(_, exit_code)) => {
                tracing::info!(exit_code, "Child exited");
                return Ok(exit_code);
            }
            Ok(WaitStatus::Signaled(_, signal, _)) => {
                tracing::warn!(?signal, "Child terminated by signal");
                return Ok(128 + signal as i32);
            }
            Ok(status) => {
                tracing::debug!(?status, "Child status");
            }
            Err(nix::errno::Errno::EINTR) => {
                tracing::debug!("Wait interrupted by signal, continuing");
            }
            Err(nix::errno::Errno::ECHILD) => {
                tracing::error!(pid = %child, "Exit status of child was lost");
                return Err(Error::launch(format!(
                    "exit status of child {child} is unavailable"
                )));
            }
            Err(e) => {
                tracing::error!(error = %e, "Wait failed");
                return Err(Error::launch(format!("Wait failed: {e}")));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forwarded_args_drop_run_token() {
        let args = forwarded_args(["-run", "-uid", "-mnt=/tmp/rootfs", "-pid"]);
        assert_eq!(args, vec!["-ns", "-uid", "-mnt=/tmp/rootfs", "-pid"]);
    }

    #[test]
    fn test_forwarded_args_keep_order_and_position() {
        let args = forwarded_args(["-uts", "-run", "-hostname=testbox"]);
        assert_eq!(args, vec!["-ns", "-uts", "-hostname=testbox"]);

        let args = forwarded_args(["--run", "-ipc"]);
        assert_eq!(args, vec!["-ns", "-ipc"]);
    }

    #[test]
    fn test_forwarded_args_keep_non_utf8_bytes() {
        let mount = OsStr::from_bytes(b"-mnt=/tmp/root\xff");
        let args = forwarded_args([OsStr::new("-run"), mount, OsStr::new("-pid")]);

        assert_eq!(args.len(), 3);
        assert_eq!(args[1].as_bytes(), b"-mnt=/tmp/root\xff");
        assert!(to_cstring(&args[1]).is_ok());
    }

    #[test]
    fn test_wait_for_unrelated_process_is_an_error() {
        // pid 1 is never a child of the test process, so its status is unavailable
        let err = wait_for_exit(Pid::from_raw(1)).unwrap_err();
        assert!(matches!(err, Error::Launch { .. }));
    }

    #[test]
    fn test_forwarded_args_without_flags() {
        assert_eq!(forwarded_args(["-run"]), vec!["-ns"]);
        assert_eq!(forwarded_args(Vec::<OsString>::new()), vec!["-ns"]);
    }

    #[test]
    fn test_identity_only_with_user_namespace() {
        let identity = IdentityMapping::new(1000, 1000);

        let plain = LaunchPlan::new(&CapabilityRequest::new().with_uts(true), identity, ["-run"]);
        assert!(plain.identity().is_none());

        let user = LaunchPlan::new(&CapabilityRequest::new().with_user_id(true), identity, ["-run"]);
        assert_eq!(user.identity(), Some(&identity));
    }

    #[test]
    fn test_plan_flags_match_request() {
        let request = CapabilityRequest::new()
            .with_mount_root("/")
            .with_process_id(true)
            .with_user_id(true);
        let plan = LaunchPlan::new(&request, IdentityMapping::for_current_user(), ["-run"]);

        assert_eq!(plan.flags(), request.to_flag_set());
        assert_eq!(plan.flags().enabled_namespaces(), vec!["mnt", "pid", "user"]);
    }

    #[test]
    fn test_launch_without_namespaces_relays_exit_code() {
        let plan = LaunchPlan::new(&CapabilityRequest::new(), IdentityMapping::new(0, 0), ["-run"]);

        assert_eq!(Launcher::with_executable("/bin/true").launch(&plan).unwrap(), 0);
        assert_eq!(Launcher::with_executable("/bin/false").launch(&plan).unwrap(), 1);
    }

    #[test]
    fn test_launch_missing_executable() {
        let plan = LaunchPlan::new(&CapabilityRequest::new(), IdentityMapping::new(0, 0), ["-run"]);
        let code = Launcher::with_executable("/nonexistent/capsule")
            .launch(&plan)
            .unwrap();

        assert_eq!(code, EXEC_FAILED as i32);
    }
}
