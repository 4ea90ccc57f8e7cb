//! Namespace orchestration for a single isolated shell
//!
//! The work is split in two phases around a re-exec of the program:
//! - Phase 1 ([`Launcher`]) compiles the request into clone flags and starts
//!   the program again inside the new namespaces, with a fixed uid/gid map
//! - Phase 2 ([`NamespaceInitializer`]) runs inside those namespaces, enters
//!   the root filesystem, sets the hostname and mounts `/proc`, then hands
//!   over to the [`SessionRunner`] and finally tears down the proc mount

#![warn(missing_docs, clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]

pub mod config;
pub mod identity;
pub mod initializer;
pub mod launcher;
pub mod session;
pub mod steps;
pub mod system;

pub use config::{CapabilityRequest, ConfigResolver, Namespace, NamespaceFlagSet, ResolvedConfig};
pub use identity::{IdMapEntry, IdentityMapping};
pub use initializer::NamespaceInitializer;
pub use launcher::{forwarded_args, LaunchPlan, Launcher, NAMESPACE_TOKEN, RUN_TOKEN};
pub use session::{SessionRunner, PROMPT_TEMPLATE};
pub use steps::{
    default_steps, IpcEntry, MountEntry, NamespaceStep, NetworkEntry, ProcessIdEntry,
    SetupOutcome, UserIdEntry, UtsEntry,
};
pub use system::{HostSystem, LinuxSystem, RecordingSystem, SysCall};
