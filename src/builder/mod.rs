//! Materialization of a proposed parameter vector into what the engine reads.
//!
//! The engine picks its parameters up from a single shared location at startup, so a
//! [`Builder`] must have finished writing (and rebuilding, when the engine has to be
//! recompiled) before the match starts. Any failure here is fatal to the search: a broken
//! build means the harness is broken, not the candidate.

use crate::{error::TunerError, parameter_space::ParameterSpace};

mod command;
mod define_file;

pub use command::CommandBuilder;
pub use define_file::{render_best_header, DefineFileBuilder};
pub(crate) use define_file::write_synced;

/// Turns a parameter vector into the artifact the engine reads.
pub trait Builder {
    /// Removes whatever a previous trial left behind. Absence is success.
    fn clean(&mut self) -> Result<(), TunerError>;

    /// Writes the artifact for `vector`, ordered as `space`. Must be complete, including
    /// anything forcing the engine to reload it, when this returns.
    fn build(&mut self, space: &ParameterSpace, vector: &[f64]) -> Result<(), TunerError>;
}

impl<B: Builder + ?Sized> Builder for Box<B> {
    fn clean(&mut self) -> Result<(), TunerError> {
        (**self).clean()
    }

    fn build(&mut self, space: &ParameterSpace, vector: &[f64]) -> Result<(), TunerError> {
        (**self).build(space, vector)
    }
}
