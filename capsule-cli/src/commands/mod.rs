use std::ffi::OsString;

use anyhow::Result;
use capsule_core::ProgramInfo;

use crate::cli::{Cli, Mode};

pub mod namespace;
pub mod run;

/// Dispatch to the handler of the selected mode and return the exit code
///
/// `-v` wins over everything else, including a conflicting mode.
pub fn dispatch(cli: &Cli, original_args: &[OsString], program: &ProgramInfo) -> Result<i32> {
    if cli.version {
        println!("{}", program.banner());
        return Ok(0);
    }

    match cli.mode()? {
        Mode::Run => run::execute(cli, original_args, program),
        Mode::Namespace => namespace::execute(cli, program),
    }
}
