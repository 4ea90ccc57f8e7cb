//! Immutable program identity

use std::path::{Path, PathBuf};

/// Name used for the version banner and as the default container hostname
pub const PROGRAM_NAME: &str = "Capsule";

/// Shell started inside the namespaces
pub const DEFAULT_SHELL: &str = "/bin/sh";

/// Program name, version and shell path
///
/// Built once in `main` and handed to every component that needs it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramInfo {
    name: String,
    version: String,
    shell: PathBuf,
}

impl ProgramInfo {
    /// Create program info from explicit values
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        shell: impl Into<PathBuf>,
    ) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            shell: shell.into(),
        }
    }

    /// Program info of this build
    #[must_use]
    pub fn current() -> Self {
        Self::new(PROGRAM_NAME, env!("CARGO_PKG_VERSION"), DEFAULT_SHELL)
    }

    /// Program name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Program version
    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Shell to run inside the namespaces
    #[must_use]
    pub fn shell(&self) -> &Path {
        &self.shell
    }

    /// Version banner, e.g. `Capsule v0.9.1`
    #[must_use]
    pub fn banner(&self) -> String {
        format!("{} v{}", self.name, self.version)
    }
}

impl Default for ProgramInfo {
    fn default() -> Self {
        Self::current()
    }
}
