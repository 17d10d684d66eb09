//! # Engine Tuner
//!
//! Resumable black-box tuning of a game engine's integer search parameters.
//!
//! Each trial of a search:
//! - takes a parameter vector proposed by a [`SearchStrategy`](crate::strategy::SearchStrategy),
//! - materializes it with a [`Builder`](crate::builder::Builder) (a generated header file,
//!   optionally followed by a rebuild of the engine),
//! - plays a match between the candidate and a reference engine through a
//!   [`MatchRunner`](crate::match_runner::MatchRunner),
//! - reduces the win/draw/loss result to a score in `[0, 1]` and appends it to the
//!   [`SearchState`](crate::history::SearchState).
//!
//! The search state is checkpointed to JSON as it grows, so a run killed at any point can be
//! resumed with only the trial in flight lost.
//!
//! # Documentation Overview
//!
//! - For the trial cycle and its failure handling, see the [`search_loop`] module.
//! - For the tunable dimensions and their file formats, see [`parameter_space`].
//! - For configuring the run and the matches, see
//!   [`Configuration`](crate::configuration::Configuration) and
//!   [`MatchConfig`](crate::configuration::MatchConfig).
//!
//! # Usage Example
//!
//! ```no_run
//! use std::path::Path;
//! use engine_tuner::prelude::*;
//!
//! fn main() -> anyhow::Result<()> {
//!     let space = ParameterSpace::load(Path::new("parameters.csv"))?;
//!     let config = Configuration::from_env().with_startup_trials(10);
//!     let match_config = MatchConfig::from_env().with_games(200);
//!
//!     let builder = DefineFileBuilder::new("param/parameters_slave.h");
//!     let runner = CommandRunner::new("TanukiColiseum").with_args(vec![
//!         "--num-games".into(),
//!         "{games}".into(),
//!         "--num-threads".into(),
//!         "{threads}".into(),
//!     ]);
//!
//!     let state = SearchState::new(&space);
//!     let mut search = SearchLoop::new(
//!         space,
//!         state,
//!         Box::new(builder),
//!         Box::new(runner),
//!         StrategyKind::Perturb.create(config.seed().wrapping_add(1)),
//!         config,
//!         match_config,
//!     )?
//!     .with_kill_list(vec!["tanuki-modified".into(), "tanuki-master".into()]);
//!
//!     let summary = search.run(100)?;
//!     println!("{} trials recorded", summary.total);
//!     Ok(())
//! }
//! ```

pub use anyhow;
pub mod builder;
pub mod checkpoint;
pub mod configuration;
pub mod error;
pub mod history;
pub mod logger;
pub mod match_runner;
pub mod objective;
pub mod parameter_space;
pub mod progress;
pub mod search_loop;
pub mod strategy;

/// Commonly used types and traits for quick access.
///
/// ```rust
/// use engine_tuner::prelude::*;
/// ```
pub mod prelude {
    pub use crate::builder::{Builder, CommandBuilder, DefineFileBuilder};
    pub use crate::checkpoint::Checkpointer;
    pub use crate::configuration::{Configuration, MatchConfig};
    pub use crate::error::TunerError;
    pub use crate::history::{SearchState, TrialRecord};
    pub use crate::match_runner::{CommandRunner, MatchRunner, RawMatch, SummaryFormat};
    pub use crate::objective::MatchOutcome;
    pub use crate::parameter_space::{ParameterSpace, ParameterSpec};
    pub use crate::search_loop::{RunSummary, SearchLoop};
    pub use crate::strategy::{PerturbationSearch, RandomSearch, SearchStrategy, StrategyKind};
}
