//! Phase 1: compute the namespaces and re-exec into them

use std::ffi::OsString;

use anyhow::{Context, Result};
use capsule_core::ProgramInfo;
use capsule_namespace::{ConfigResolver, IdentityMapping, LaunchPlan, Launcher, Namespace};

use crate::cli::Cli;

pub fn execute(cli: &Cli, original_args: &[OsString], program: &ProgramInfo) -> Result<i32> {
    let request = cli.to_request();

    // Reject bad combinations before any namespace exists
    let config = ConfigResolver::new(program.clone())
        .resolve(request)
        .context("Invalid namespace configuration")?;

    let plan = LaunchPlan::new(
        config.request(),
        IdentityMapping::for_current_user(),
        original_args,
    );

    if config.mount_root().is_some() && !plan.flags().contains(Namespace::Mount) {
        tracing::debug!("Mount root is not a directory, mount namespace omitted");
    }

    tracing::info!(
        namespaces = ?plan.flags().enabled_namespaces(),
        args = ?plan.args(),
        "Starting namespaced shell"
    );

    Launcher::new()
        .launch(&plan)
        .context("Failed to launch namespaced child")
}
