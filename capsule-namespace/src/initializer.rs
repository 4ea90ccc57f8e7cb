//! In-namespace setup pipeline and teardown

use capsule_core::Result;

use crate::config::ResolvedConfig;
use crate::steps::{default_steps, NamespaceStep};
use crate::system::{HostSystem, LinuxSystem};

/// Runs the namespace steps in order inside the cloned child
///
/// Setup stops at the first fatal outcome. Nothing applied so far is rolled
/// back: the namespaces die with the process.
pub struct NamespaceInitializer<S = LinuxSystem> {
    system: S,
    steps: Vec<Box<dyn NamespaceStep>>,
}

impl NamespaceInitializer<LinuxSystem> {
    /// Create an initializer that performs real system calls
    #[must_use]
    pub fn new() -> Self {
        Self::with_system(LinuxSystem)
    }
}

impl Default for NamespaceInitializer<LinuxSystem> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: HostSystem> NamespaceInitializer<S> {
    /// Create an initializer on top of a custom backend
    #[must_use]
    pub fn with_system(system: S) -> Self {
        Self {
            system,
            steps: default_steps(),
        }
    }

    /// Get the backend
    #[must_use]
    pub const fn system(&self) -> &S {
        &self.system
    }

    /// Run every setup step in order
    ///
    /// # Errors
    /// Returns the first fatal step error; later steps do not run
    pub fn setup(&self, config: &ResolvedConfig) -> Result<()> {
        tracing::info!("Setting up namespaces");

        for step in &self.steps {
            let namespace = step.namespace();
            let outcome = step.setup(config, &self.system);

            outcome.into_result().map_err(|e| {
                tracing::error!(namespace = %namespace, error = %e, "Namespace setup failed");
                e
            })?;

            tracing::debug!(namespace = %namespace, "Namespace step done");
        }

        tracing::info!("Namespace setup complete");
        Ok(())
    }

    /// Undo setup leftovers, last step first
    ///
    /// Only the proc mount needs explicit teardown; everything else goes
    /// away with the process.
    ///
    /// # Errors
    /// Returns the first fatal teardown error
    pub fn teardown(&self, config: &ResolvedConfig) -> Result<()> {
        for step in self.steps.iter().rev() {
            let namespace = step.namespace();

            step.teardown(config, &self.system)
                .into_result()
                .map_err(|e| {
                    tracing::error!(namespace = %namespace, error = %e, "Namespace teardown failed");
                    e
                })?;
        }

        tracing::debug!("Namespace teardown complete");
        Ok(())
    }
}

impl<S: std::fmt::Debug> std::fmt::Debug for NamespaceInitializer<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NamespaceInitializer")
            .field("system", &self.system)
            .field("steps", &self.steps.len())
            .finish()
    }
}
