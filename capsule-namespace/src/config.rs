//! Capability requests, namespace flag compilation and config resolution

use std::fmt;
use std::path::{Path, PathBuf};

use capsule_core::{Error, ProgramInfo, Result};
use nix::sched::CloneFlags;
use serde::{Deserialize, Serialize};

/// Isolation dimensions a shell can be placed in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
    /// Filesystem root (mount namespace)
    Mount,
    /// Hostname and domain name
    Uts,
    /// System V IPC and POSIX message queues
    Ipc,
    /// Network stack
    Network,
    /// Process-id tree
    ProcessId,
    /// User and group identity
    User,
}

impl Namespace {
    /// Every dimension, in setup order
    pub const ALL: [Self; 6] = [
        Self::Mount,
        Self::Uts,
        Self::Ipc,
        Self::Network,
        Self::ProcessId,
        Self::User,
    ];

    /// Clone flag requesting a new namespace of this kind
    #[must_use]
    pub const fn clone_flag(self) -> CloneFlags {
        match self {
            Self::Mount => CloneFlags::CLONE_NEWNS,
            Self::Uts => CloneFlags::CLONE_NEWUTS,
            Self::Ipc => CloneFlags::CLONE_NEWIPC,
            Self::Network => CloneFlags::CLONE_NEWNET,
            Self::ProcessId => CloneFlags::CLONE_NEWPID,
            Self::User => CloneFlags::CLONE_NEWUSER,
        }
    }

    /// Short name, as used under `/proc/<pid>/ns`
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Mount => "mnt",
            Self::Uts => "uts",
            Self::Ipc => "ipc",
            Self::Network => "net",
            Self::ProcessId => "pid",
            Self::User => "user",
        }
    }

    /// Whether `request` asks for this namespace and it can be created.
    ///
    /// The mount namespace additionally needs the root to be an existing
    /// directory right now. Any error while checking counts as "missing".
    #[must_use]
    pub fn is_satisfied_by(self, request: &CapabilityRequest) -> bool {
        match self {
            Self::Mount => request.mount_root().is_some_and(Path::is_dir),
            Self::Uts => request.uts,
            Self::Ipc => request.ipc,
            Self::Network => request.network,
            Self::ProcessId => request.process_id,
            Self::User => request.user_id,
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Requested isolation dimensions and their parameters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityRequest {
    /// Root filesystem to enter
    pub mount_root: Option<PathBuf>,

    /// Enable UTS namespace (hostname)
    pub uts: bool,

    /// Hostname override for the UTS namespace
    pub hostname: Option<String>,

    /// Enable IPC namespace
    pub ipc: bool,

    /// Enable network namespace
    pub network: bool,

    /// Enable PID namespace
    pub process_id: bool,

    /// Enable user namespace
    pub user_id: bool,
}

impl CapabilityRequest {
    /// Create an empty request (no isolation)
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the root filesystem to enter
    #[must_use]
    pub fn with_mount_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.mount_root = Some(root.into());
        self
    }

    /// Enable UTS namespace
    #[must_use]
    pub fn with_uts(mut self, enable: bool) -> Self {
        self.uts = enable;
        self
    }

    /// Set hostname for UTS namespace
    #[must_use]
    pub fn with_hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = Some(hostname.into());
        self
    }

    /// Enable IPC namespace
    #[must_use]
    pub fn with_ipc(mut self, enable: bool) -> Self {
        self.ipc = enable;
        self
    }

    /// Enable network namespace
    #[must_use]
    pub fn with_network(mut self, enable: bool) -> Self {
        self.network = enable;
        self
    }

    /// Enable PID namespace
    #[must_use]
    pub fn with_process_id(mut self, enable: bool) -> Self {
        self.process_id = enable;
        self
    }

    /// Enable user namespace
    #[must_use]
    pub fn with_user_id(mut self, enable: bool) -> Self {
        self.user_id = enable;
        self
    }

    /// Mount root, if one was given and it is not empty
    #[must_use]
    pub fn mount_root(&self) -> Option<&Path> {
        self.mount_root
            .as_deref()
            .filter(|root| !root.as_os_str().is_empty())
    }

    /// Compile the request into clone flags
    #[must_use]
    pub fn to_flag_set(&self) -> NamespaceFlagSet {
        NamespaceFlagSet::compile(self)
    }
}

/// Namespaces that will actually be created for the child
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NamespaceFlagSet(CloneFlags);

impl NamespaceFlagSet {
    /// No namespaces
    #[must_use]
    pub const fn empty() -> Self {
        Self(CloneFlags::empty())
    }

    /// Union of the flags of every satisfiable namespace in `request`
    #[must_use]
    pub fn compile(request: &CapabilityRequest) -> Self {
        Namespace::ALL
            .into_iter()
            .filter(|ns| ns.is_satisfied_by(request))
            .fold(Self::empty(), |flags, ns| flags | ns)
    }

    /// Raw flags for clone(2)
    #[must_use]
    pub const fn clone_flags(self) -> CloneFlags {
        self.0
    }

    /// Check if a namespace is in the set
    #[must_use]
    pub const fn contains(self, namespace: Namespace) -> bool {
        self.0.contains(namespace.clone_flag())
    }

    /// Check if no namespace is requested
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0.is_empty()
    }

    /// Get list of enabled namespace names
    #[must_use]
    pub fn enabled_namespaces(self) -> Vec<&'static str> {
        Namespace::ALL
            .into_iter()
            .filter(|ns| self.contains(*ns))
            .map(Namespace::name)
            .collect()
    }
}

impl Default for NamespaceFlagSet {
    fn default() -> Self {
        Self::empty()
    }
}

impl std::ops::BitOr for NamespaceFlagSet {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl std::ops::BitOr<Namespace> for NamespaceFlagSet {
    type Output = Self;

    fn bitor(self, rhs: Namespace) -> Self {
        Self(self.0 | rhs.clone_flag())
    }
}

/// Validates a request and fills in defaults
#[derive(Debug, Clone)]
pub struct ConfigResolver {
    program: ProgramInfo,
}

impl ConfigResolver {
    /// Create a resolver using `program` for defaults
    #[must_use]
    pub const fn new(program: ProgramInfo) -> Self {
        Self { program }
    }

    /// Check cross-namespace requirements and resolve the hostname.
    ///
    /// Nothing is mutated here, so a configuration error is always
    /// reported before any system call.
    ///
    /// # Errors
    /// Returns [`Error::Configuration`] when the PID namespace is requested
    /// without a mount root.
    pub fn resolve(&self, request: CapabilityRequest) -> Result<ResolvedConfig> {
        if request.process_id && request.mount_root().is_none() {
            tracing::error!("PID namespace requested without a mount root");
            return Err(Error::configuration("option -pid requires -mnt"));
        }

        let hostname = request.uts.then(|| {
            request
                .hostname
                .clone()
                .filter(|name| !name.is_empty())
                .unwrap_or_else(|| self.program.name().to_string())
        });

        Ok(ResolvedConfig { request, hostname })
    }
}

/// A validated request with its effective hostname
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedConfig {
    pub(crate) request: CapabilityRequest,
    pub(crate) hostname: Option<String>,
}

impl ResolvedConfig {
    /// The original request
    #[must_use]
    pub const fn request(&self) -> &CapabilityRequest {
        &self.request
    }

    /// Root filesystem to enter, if any
    #[must_use]
    pub fn mount_root(&self) -> Option<&Path> {
        self.request.mount_root()
    }

    /// Hostname to set; `None` when the UTS namespace is not requested
    #[must_use]
    pub fn hostname(&self) -> Option<&str> {
        self.hostname.as_deref()
    }

    /// Whether the PID namespace was requested
    #[must_use]
    pub const fn process_id(&self) -> bool {
        self.request.process_id
    }

    /// Whether `/proc` gets mounted inside the new root
    #[must_use]
    pub fn mounts_proc(&self) -> bool {
        self.process_id() && self.mount_root().is_some()
    }
}

impl fmt::Display for ResolvedConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = |on: bool| if on { "enabled" } else { "disabled" };

        writeln!(f, "Namespace configuration:")?;
        match self.mount_root() {
            Some(root) => writeln!(f, "  mount:   enabled ({})", root.display())?,
            None => writeln!(f, "  mount:   disabled")?,
        }
        match self.hostname() {
            Some(name) => writeln!(f, "  uts:     enabled ({name})")?,
            None => writeln!(f, "  uts:     disabled")?,
        }
        writeln!(f, "  ipc:     {}", state(self.request.ipc))?;
        writeln!(f, "  network: {}", state(self.request.network))?;
        writeln!(f, "  pid:     {}", state(self.request.process_id))?;
        writeln!(f, "  user:    {}", state(self.request.user_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver() -> ConfigResolver {
        ConfigResolver::new(ProgramInfo::new("Capsule", "0.0.0", "/bin/sh"))
    }

    #[test]
    fn test_empty_request_has_no_flags() {
        let flags = CapabilityRequest::new().to_flag_set();
        assert!(flags.is_empty());
        assert!(flags.enabled_namespaces().is_empty());
    }

    #[test]
    fn test_boolean_flags_mirror_request() {
        let flags = CapabilityRequest::new()
            .with_uts(true)
            .with_ipc(true)
            .with_network(true)
            .with_process_id(true)
            .with_user_id(true)
            .to_flag_set();

        assert!(flags.contains(Namespace::Uts));
        assert!(flags.contains(Namespace::Ipc));
        assert!(flags.contains(Namespace::Network));
        assert!(flags.contains(Namespace::ProcessId));
        assert!(flags.contains(Namespace::User));
        assert!(!flags.contains(Namespace::Mount));
    }

    #[test]
    fn test_mount_flag_requires_existing_directory() {
        let existing = CapabilityRequest::new().with_mount_root("/");
        assert!(existing.to_flag_set().contains(Namespace::Mount));

        let missing = CapabilityRequest::new().with_mount_root("/definitely/not/a/rootfs");
        assert!(!missing.to_flag_set().contains(Namespace::Mount));

        let empty = CapabilityRequest::new().with_mount_root("");
        assert!(!empty.to_flag_set().contains(Namespace::Mount));
    }

    #[test]
    fn test_mount_flag_rejects_regular_file() {
        let file = concat!(env!("CARGO_MANIFEST_DIR"), "/Cargo.toml");
        let request = CapabilityRequest::new().with_mount_root(file);

        assert!(!request.to_flag_set().contains(Namespace::Mount));
    }

    #[test]
    fn test_flag_set_is_union_of_single_bits() {
        let request = CapabilityRequest::new()
            .with_mount_root("/")
            .with_uts(true)
            .with_process_id(true);

        let union = Namespace::ALL
            .into_iter()
            .rev()
            .filter(|ns| ns.is_satisfied_by(&request))
            .fold(NamespaceFlagSet::empty(), |acc, ns| acc | ns);

        assert_eq!(request.to_flag_set(), union);
        assert_eq!(
            request.to_flag_set().clone_flags(),
            CloneFlags::CLONE_NEWNS | CloneFlags::CLONE_NEWUTS | CloneFlags::CLONE_NEWPID
        );
    }

    #[test]
    fn test_enabled_namespaces() {
        let flags = CapabilityRequest::new()
            .with_network(true)
            .with_user_id(true)
            .to_flag_set();

        assert_eq!(flags.enabled_namespaces(), vec!["net", "user"]);
    }

    #[test]
    fn test_pid_without_mount_is_configuration_error() {
        let request = CapabilityRequest::new().with_process_id(true);
        let err = resolver().resolve(request).unwrap_err();

        assert!(err.is_configuration());
    }

    #[test]
    fn test_pid_with_missing_mount_root_still_resolves() {
        let request = CapabilityRequest::new()
            .with_mount_root("/definitely/not/a/rootfs")
            .with_process_id(true);

        let config = resolver().resolve(request).unwrap();
        assert!(config.mounts_proc());
    }

    #[test]
    fn test_hostname_defaults_to_program_name() {
        let config = resolver()
            .resolve(CapabilityRequest::new().with_uts(true))
            .unwrap();

        assert_eq!(config.hostname(), Some("Capsule"));
    }

    #[test]
    fn test_hostname_override() {
        let config = resolver()
            .resolve(CapabilityRequest::new().with_uts(true).with_hostname("foo"))
            .unwrap();

        assert_eq!(config.hostname(), Some("foo"));
    }

    #[test]
    fn test_hostname_untouched_without_uts() {
        let config = resolver()
            .resolve(CapabilityRequest::new().with_hostname("foo"))
            .unwrap();

        assert_eq!(config.hostname(), None);
    }

    #[test]
    fn test_resolved_config_display() {
        let config = resolver()
            .resolve(
                CapabilityRequest::new()
                    .with_mount_root("/srv/rootfs")
                    .with_uts(true)
                    .with_process_id(true),
            )
            .unwrap();

        let display = config.to_string();
        assert!(display.contains("mount:   enabled (/srv/rootfs)"));
        assert!(display.contains("uts:     enabled (Capsule)"));
        assert!(display.contains("pid:     enabled"));
        assert!(display.contains("ipc:     disabled"));
    }
}
