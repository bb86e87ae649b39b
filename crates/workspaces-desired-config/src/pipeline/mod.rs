//! Desired-configuration pipeline stages
//!
//! Each stage reads what earlier stages recorded in the
//! [`DesiredConfigContext`] and records its own output. The compiler runs
//! them in a fixed order and stops at the first failure.

pub mod auxiliary;
pub mod harden;
pub mod parse;
pub mod poststart;
pub mod scripts_volume;
pub mod translate;
pub mod values;

use crate::context::DesiredConfigContext;
use crate::error::{Error, Stage};

/// A step of the compilation pipeline
pub(crate) trait CompilerStage {
    /// Which stage this is, for error reporting and logging
    fn stage(&self) -> Stage;

    /// Run the stage against the shared context
    fn run(&self, ctx: &mut DesiredConfigContext<'_>) -> Result<(), Error>;
}
