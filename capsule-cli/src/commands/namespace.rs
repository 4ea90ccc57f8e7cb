//! Phase 2: running inside the new namespaces

use anyhow::{Context, Result};
use capsule_core::ProgramInfo;
use capsule_namespace::{ConfigResolver, NamespaceInitializer, SessionRunner};

use crate::cli::Cli;

pub fn execute(cli: &Cli, program: &ProgramInfo) -> Result<i32> {
    let config = ConfigResolver::new(program.clone())
        .resolve(cli.to_request())
        .context("Invalid namespace configuration")?;

    tracing::debug!("{config}");

    let initializer = NamespaceInitializer::new();
    initializer
        .setup(&config)
        .context("Namespace setup failed")?;

    let exit_code = SessionRunner::new(program).run();

    initializer
        .teardown(&config)
        .context("Namespace teardown failed")?;

    Ok(exit_code)
}
