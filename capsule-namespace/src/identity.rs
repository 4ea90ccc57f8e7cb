//! UID/GID mapping for the user namespace

use std::fs;
use std::slice;

use capsule_core::{Error, Result};
use nix::unistd::{getgid, getuid, Pid};

/// One line of a `uid_map`/`gid_map` table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdMapEntry {
    /// First id inside the namespace
    pub container_id: u32,
    /// First id on the host
    pub host_id: u32,
    /// Number of consecutive ids mapped
    pub size: u32,
}

impl IdMapEntry {
    /// Map container root onto a single host id
    #[must_use]
    pub const fn root_to(host_id: u32) -> Self {
        Self {
            container_id: 0,
            host_id,
            size: 1,
        }
    }

    /// Render in the kernel's `inside outside count` format
    #[must_use]
    pub fn to_map_line(&self) -> String {
        format!("{} {} {}\n", self.container_id, self.host_id, self.size)
    }
}

/// Identity tables handed to a new user namespace
///
/// There is exactly one entry per axis: container id `0` maps to the
/// invoking user's real id, with a range of one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdentityMapping {
    uid: IdMapEntry,
    gid: IdMapEntry,
}

impl IdentityMapping {
    /// Map container root onto the given host ids
    #[must_use]
    pub const fn new(host_uid: u32, host_gid: u32) -> Self {
        Self {
            uid: IdMapEntry::root_to(host_uid),
            gid: IdMapEntry::root_to(host_gid),
        }
    }

    /// Map container root onto the real uid/gid of this process
    #[must_use]
    pub fn for_current_user() -> Self {
        Self::new(getuid().as_raw(), getgid().as_raw())
    }

    /// UID table
    #[must_use]
    pub fn uid_entries(&self) -> &[IdMapEntry] {
        slice::from_ref(&self.uid)
    }

    /// GID table
    #[must_use]
    pub fn gid_entries(&self) -> &[IdMapEntry] {
        slice::from_ref(&self.gid)
    }

    /// Contents for `/proc/<pid>/uid_map`
    #[must_use]
    pub fn uid_map(&self) -> String {
        render(self.uid_entries())
    }

    /// Contents for `/proc/<pid>/gid_map`
    #[must_use]
    pub fn gid_map(&self) -> String {
        render(self.gid_entries())
    }

    /// Install the tables for a freshly cloned child.
    ///
    /// `setgroups` must be denied before an unprivileged process may write
    /// `gid_map`.
    ///
    /// # Errors
    /// Returns [`Error::Launch`] if any of the proc files cannot be written
    pub fn write_to(&self, pid: Pid) -> Result<()> {
        let base = format!("/proc/{pid}");

        write_proc_file(&format!("{base}/uid_map"), &self.uid_map())?;
        write_proc_file(&format!("{base}/setgroups"), "deny")?;
        write_proc_file(&format!("{base}/gid_map"), &self.gid_map())?;

        tracing::debug!(
            pid = %pid,
            uid = self.uid.host_id,
            gid = self.gid.host_id,
            "Identity mapping installed"
        );

        Ok(())
    }
}

fn render(entries: &[IdMapEntry]) -> String {
    entries.iter().map(IdMapEntry::to_map_line).collect()
}

fn write_proc_file(path: &str, contents: &str) -> Result<()> {
    fs::write(path, contents).map_err(|e| {
        tracing::error!(path, error = %e, "Failed to write identity mapping");
        Error::launch(format!("Failed to write {path}: {e}"))
    })
}
