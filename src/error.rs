//! Error kinds shared by the tuner components.
//!
//! Variants map onto the three failure classes of a tuning run:
//! - fatal: [`TunerError::Build`], [`TunerError::Evaluate`], [`TunerError::MatchExit`],
//!   [`TunerError::CorruptState`], [`TunerError::Strategy`]
//! - recoverable per trial: [`TunerError::Parse`] coming out of match output parsing
//! - everything else ([`TunerError::Io`]) is decided by the caller

use thiserror::Error;

/// Main error type of the tuner.
#[derive(Error, Debug)]
pub enum TunerError {
    /// Malformed parameter definition or match summary.
    #[error("parse error: {0}")]
    Parse(String),

    /// A checkpoint could not be read back. Never recovered from.
    #[error("checkpoint-load: corrupt search state: {0}")]
    CorruptState(String),

    /// The parameter artifact could not be produced.
    #[error("build: {0}")]
    Build(String),

    /// The match program could not be launched or awaited.
    #[error("evaluate: {0}")]
    Evaluate(String),

    /// The match program ran but reported failure.
    #[error("evaluate: match program exited with {0}")]
    MatchExit(String),

    /// The optimizer strategy produced something unusable.
    #[error("strategy: {0}")]
    Strategy(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl TunerError {
    /// True for errors that must stop the whole search.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, TunerError::Parse(_))
    }
}
