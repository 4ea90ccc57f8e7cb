//! Per-namespace setup and teardown actions
//!
//! Each requested namespace is prepared by one [`NamespaceStep`]. Steps run
//! inside the freshly cloned namespaces, so every action here only affects
//! the current process tree.

use std::path::Path;

use capsule_core::{Error, Result};

use crate::config::{Namespace, ResolvedConfig};
use crate::system::HostSystem;

/// Where the proc filesystem goes, relative to the new root
const PROC_MOUNT_POINT: &str = "proc";

/// Result of a single setup or teardown action
///
/// `applied` is true both when the action ran and when it was skipped
/// because nothing was requested. `error` is only set for real failures.
#[derive(Debug)]
pub struct SetupOutcome {
    applied: bool,
    error: Option<Error>,
}

impl SetupOutcome {
    /// The action ran successfully
    #[must_use]
    pub const fn performed() -> Self {
        Self {
            applied: true,
            error: None,
        }
    }

    /// Nothing was requested, so nothing ran
    #[must_use]
    pub const fn skipped() -> Self {
        Self::performed()
    }

    /// The action failed
    #[must_use]
    pub const fn failed(error: Error) -> Self {
        Self {
            applied: false,
            error: Some(error),
        }
    }

    /// Build an outcome from raw parts
    #[must_use]
    pub const fn from_parts(applied: bool, error: Option<Error>) -> Self {
        Self { applied, error }
    }

    /// Whether the step counts as applied
    #[must_use]
    pub const fn is_applied(&self) -> bool {
        self.applied
    }

    /// Failure reported by the step, if any
    #[must_use]
    pub const fn error(&self) -> Option<&Error> {
        self.error.as_ref()
    }

    /// Fatal only when the step is not applied AND reported an error
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        !self.applied && self.error.is_some()
    }

    /// Halting guard: turn a fatal outcome into an error
    ///
    /// # Errors
    /// Returns the step's error when the outcome [is fatal](Self::is_fatal)
    pub fn into_result(self) -> Result<()> {
        match self {
            Self {
                applied: false,
                error: Some(error),
            } => Err(error),
            _ => Ok(()),
        }
    }
}

impl From<Result<()>> for SetupOutcome {
    fn from(result: Result<()>) -> Self {
        match result {
            Ok(()) => Self::performed(),
            Err(error) => Self::failed(error),
        }
    }
}

/// One namespace's setup/teardown pair
pub trait NamespaceStep {
    /// Namespace this step prepares
    fn namespace(&self) -> Namespace;

    /// Perform in-namespace setup
    fn setup(&self, config: &ResolvedConfig, system: &dyn HostSystem) -> SetupOutcome;

    /// Undo whatever setup left behind that the kernel will not reclaim
    fn teardown(&self, _config: &ResolvedConfig, _system: &dyn HostSystem) -> SetupOutcome {
        SetupOutcome::skipped()
    }
}

/// Steps for every namespace, in dependency order
#[must_use]
pub fn default_steps() -> Vec<Box<dyn NamespaceStep>> {
    vec![
        Box::new(MountEntry),
        Box::new(UtsEntry),
        Box::new(IpcEntry),
        Box::new(NetworkEntry),
        Box::new(ProcessIdEntry),
        Box::new(UserIdEntry),
    ]
}

/// Enters the requested root filesystem
#[derive(Debug, Clone, Copy, Default)]
pub struct MountEntry;

impl NamespaceStep for MountEntry {
    fn namespace(&self) -> Namespace {
        Namespace::Mount
    }

    fn setup(&self, config: &ResolvedConfig, system: &dyn HostSystem) -> SetupOutcome {
        let Some(root) = config.mount_root() else {
            return SetupOutcome::skipped();
        };

        tracing::debug!(root = %root.display(), "Changing root");

        // The root change and the chdir are one unit: never keep going with
        // only one of them applied.
        let entered = system
            .change_root(root)
            .map_err(|e| Error::setup("mnt", format!("chroot to {} failed: {e}", root.display())))
            .and_then(|()| {
                system
                    .change_dir(Path::new("/"))
                    .map_err(|e| Error::setup("mnt", format!("chdir to / failed: {e}")))
            });

        entered.into()
    }
}

/// Sets the container hostname
#[derive(Debug, Clone, Copy, Default)]
pub struct UtsEntry;

impl NamespaceStep for UtsEntry {
    fn namespace(&self) -> Namespace {
        Namespace::Uts
    }

    fn setup(&self, config: &ResolvedConfig, system: &dyn HostSystem) -> SetupOutcome {
        let Some(hostname) = config.hostname() else {
            return SetupOutcome::skipped();
        };

        tracing::debug!(hostname = %hostname, "Setting hostname");

        system
            .set_hostname(hostname)
            .map_err(|e| Error::setup("uts", format!("sethostname({hostname}) failed: {e}")))
            .into()
    }
}

/// IPC namespace; the fresh namespace needs no extra setup yet
#[derive(Debug, Clone, Copy, Default)]
pub struct IpcEntry;

impl NamespaceStep for IpcEntry {
    fn namespace(&self) -> Namespace {
        Namespace::Ipc
    }

    fn setup(&self, _config: &ResolvedConfig, _system: &dyn HostSystem) -> SetupOutcome {
        SetupOutcome::skipped()
    }
}

/// Network namespace; interfaces are not provisioned
#[derive(Debug, Clone, Copy, Default)]
pub struct NetworkEntry;

impl NamespaceStep for NetworkEntry {
    fn namespace(&self) -> Namespace {
        Namespace::Network
    }

    fn setup(&self, _config: &ResolvedConfig, _system: &dyn HostSystem) -> SetupOutcome {
        SetupOutcome::skipped()
    }
}

/// Mounts `/proc` for the new PID namespace
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessIdEntry;

impl NamespaceStep for ProcessIdEntry {
    fn namespace(&self) -> Namespace {
        Namespace::ProcessId
    }

    fn setup(&self, config: &ResolvedConfig, system: &dyn HostSystem) -> SetupOutcome {
        if !config.process_id() {
            return SetupOutcome::skipped();
        }
        if config.mount_root().is_none() {
            return SetupOutcome::failed(Error::configuration("option -pid requires -mnt"));
        }

        tracing::debug!(mount_point = PROC_MOUNT_POINT, "Mounting proc");

        system
            .mount_proc(Path::new(PROC_MOUNT_POINT))
            .map_err(|e| Error::setup("pid", format!("mounting proc failed: {e}")))
            .into()
    }

    fn teardown(&self, config: &ResolvedConfig, system: &dyn HostSystem) -> SetupOutcome {
        if !config.mounts_proc() {
            return SetupOutcome::skipped();
        }

        tracing::debug!("Unmounting /proc");

        system
            .unmount(Path::new("/proc"))
            .map_err(|e| Error::setup("pid", format!("unmounting /proc failed: {e}")))
            .into()
    }
}

/// User namespace; the id maps were written when the process was cloned
#[derive(Debug, Clone, Copy, Default)]
pub struct UserIdEntry;

impl NamespaceStep for UserIdEntry {
    fn namespace(&self) -> Namespace {
        Namespace::User
    }

    fn setup(&self, _config: &ResolvedConfig, _system: &dyn HostSystem) -> SetupOutcome {
        SetupOutcome::skipped()
    }
}
