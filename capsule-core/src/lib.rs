//! Capsule Core - Foundation types shared by the namespace pipeline and the CLI
//!
//! This crate provides the error type and the immutable program identity.

#![warn(missing_docs, clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod program;

pub use error::{Error, Result};
pub use program::ProgramInfo;
