//! System call seam for in-namespace setup

use std::cell::RefCell;
use std::path::{Path, PathBuf};

use capsule_core::{Error, Result};
use nix::mount::{mount, umount, MsFlags};
use nix::unistd::{chdir, chroot, sethostname};

/// Host operations performed by setup steps
///
/// This allows for different implementations:
/// - [`LinuxSystem`] - Real system calls through `nix`
/// - [`RecordingSystem`] - Testing without touching the host
pub trait HostSystem {
    /// Change the filesystem root
    ///
    /// # Errors
    /// Returns error if chroot(2) fails
    fn change_root(&self, path: &Path) -> Result<()>;

    /// Change the working directory
    ///
    /// # Errors
    /// Returns error if chdir(2) fails
    fn change_dir(&self, path: &Path) -> Result<()>;

    /// Set the hostname of the current UTS namespace
    ///
    /// # Errors
    /// Returns error if sethostname(2) fails
    fn set_hostname(&self, name: &str) -> Result<()>;

    /// Mount a fresh proc filesystem at `target`
    ///
    /// # Errors
    /// Returns error if mount(2) fails
    fn mount_proc(&self, target: &Path) -> Result<()>;

    /// Unmount the filesystem at `target`
    ///
    /// # Errors
    /// Returns error if umount(2) fails
    fn unmount(&self, target: &Path) -> Result<()>;
}

/// Real Linux implementation
#[derive(Debug, Clone, Copy, Default)]
pub struct LinuxSystem;

impl HostSystem for LinuxSystem {
    fn change_root(&self, path: &Path) -> Result<()> {
        chroot(path)?;
        Ok(())
    }

    fn change_dir(&self, path: &Path) -> Result<()> {
        chdir(path)?;
        Ok(())
    }

    fn set_hostname(&self, name: &str) -> Result<()> {
        sethostname(name)?;
        Ok(())
    }

    fn mount_proc(&self, target: &Path) -> Result<()> {
        mount(
            Some("proc"),
            target,
            Some("proc"),
            MsFlags::empty(),
            None::<&str>,
        )?;
        Ok(())
    }

    fn unmount(&self, target: &Path) -> Result<()> {
        umount(target)?;
        Ok(())
    }
}

/// A system call recorded by [`RecordingSystem`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SysCall {
    /// chroot(2)
    ChangeRoot(PathBuf),
    /// chdir(2)
    ChangeDir(PathBuf),
    /// sethostname(2)
    SetHostname(String),
    /// mount(2) of a proc filesystem
    MountProc(PathBuf),
    /// umount(2)
    Unmount(PathBuf),
}

impl SysCall {
    /// Name of the underlying system call
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::ChangeRoot(_) => "chroot",
            Self::ChangeDir(_) => "chdir",
            Self::SetHostname(_) => "sethostname",
            Self::MountProc(_) => "mount",
            Self::Unmount(_) => "umount",
        }
    }
}

/// Recording backend for testing (doesn't touch the host)
///
/// Every call is logged; a call whose name was registered with
/// [`RecordingSystem::failing`] is logged and then fails with `EPERM`.
///
/// # Example
/// ```
/// use capsule_namespace::{HostSystem, RecordingSystem, SysCall};
///
/// let system = RecordingSystem::new().failing("sethostname");
///
/// system.change_dir("/".as_ref()).unwrap();
/// assert!(system.set_hostname("box").is_err());
///
/// assert_eq!(
///     system.calls(),
///     vec![SysCall::ChangeDir("/".into()), SysCall::SetHostname("box".into())]
/// );
/// ```
#[derive(Debug, Default)]
pub struct RecordingSystem {
    calls: RefCell<Vec<SysCall>>,
    failing: Vec<&'static str>,
}

impl RecordingSystem {
    /// Create a backend where every call succeeds
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call named `name` fail
    #[must_use]
    pub fn failing(mut self, name: &'static str) -> Self {
        self.failing.push(name);
        self
    }

    /// Calls made so far, in order
    #[must_use]
    pub fn calls(&self) -> Vec<SysCall> {
        self.calls.borrow().clone()
    }

    /// Forget recorded calls
    pub fn clear(&self) {
        self.calls.borrow_mut().clear();
    }

    fn record(&self, call: SysCall) -> Result<()> {
        let name = call.name();
        self.calls.borrow_mut().push(call);

        if self.failing.contains(&name) {
            return Err(Error::System(nix::Error::EPERM));
        }
        Ok(())
    }
}

impl HostSystem for RecordingSystem {
    fn change_root(&self, path: &Path) -> Result<()> {
        self.record(SysCall::ChangeRoot(path.to_path_buf()))
    }

    fn change_dir(&self, path: &Path) -> Result<()> {
        self.record(SysCall::ChangeDir(path.to_path_buf()))
    }

    fn set_hostname(&self, name: &str) -> Result<()> {
        self.record(SysCall::SetHostname(name.to_string()))
    }

    fn mount_proc(&self, target: &Path) -> Result<()> {
        self.record(SysCall::MountProc(target.to_path_buf()))
    }

    fn unmount(&self, target: &Path) -> Result<()> {
        self.record(SysCall::Unmount(target.to_path_buf()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_system_logs_in_order() {
        let system = RecordingSystem::new();

        system.change_root(Path::new("/srv/rootfs")).unwrap();
        system.change_dir(Path::new("/")).unwrap();
        system.mount_proc(Path::new("proc")).unwrap();

        assert_eq!(
            system.calls(),
            vec![
                SysCall::ChangeRoot(PathBuf::from("/srv/rootfs")),
                SysCall::ChangeDir(PathBuf::from("/")),
                SysCall::MountProc(PathBuf::from("proc")),
            ]
        );
    }

    #[test]
    fn test_recording_system_failure_injection() {
        let system = RecordingSystem::new().failing("umount");

        let err = system.unmount(Path::new("/proc")).unwrap_err();
        assert!(matches!(err, Error::System(nix::Error::EPERM)));
        assert_eq!(system.calls().len(), 1);

        system.clear();
        assert!(system.calls().is_empty());
    }
}
