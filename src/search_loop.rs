//! The sequential propose → build → evaluate → score → record cycle.
//!
//! A [`SearchLoop`] owns every collaborator of a run and executes exactly one trial at a
//! time. Each trial walks through the [`LoopState`]s in order:
//!
//! - `Idle`: a vector is proposed, by the seeded startup sampler while fewer than
//!   `startup_trials` trials are recorded and by the configured strategy afterwards.
//! - `Building`: the previous artifact is cleaned and the new one built.
//! - `Evaluating`: the match program runs, then leftover engine processes are killed.
//! - `Scoring`: the output is reduced to an outcome and a reward.
//! - `Recording`: the trial is appended to the history and a checkpoint is written when due.
//!
//! Build failures and match programs exiting unsuccessfully abort the run before anything
//! is recorded. A match output without a summary only produces an empty outcome, which is
//! recorded with the sentinel reward.

use serde_json::json;
use tracing::{error, info, instrument, warn};

use crate::{
    builder::Builder,
    checkpoint::Checkpointer,
    configuration::{Configuration, MatchConfig},
    error::TunerError,
    history::{SearchState, TrialRecord},
    match_runner::{kill_processes, MatchRunner, SummaryFormat},
    objective::{reward, MatchOutcome},
    parameter_space::{ParameterSpace, ParameterVector},
    progress::ProgressReporter,
    strategy::{RandomSearch, SearchStrategy},
};

/// Where the loop currently is within a trial.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    Building,
    Evaluating,
    Scoring,
    Recording,
    Terminated,
}

/// What a call to [`SearchLoop::run`] did.
#[derive(Debug, Clone)]
pub struct RunSummary {
    /// Trials executed by this run.
    pub executed: usize,
    /// Trials in the history, including resumed ones.
    pub total: usize,
    /// Index and record of the best trial of the whole history.
    pub best: Option<(usize, TrialRecord)>,
}

pub struct SearchLoop {
    space: ParameterSpace,
    state: SearchState,
    builder: Box<dyn Builder>,
    runner: Box<dyn MatchRunner>,
    summary_format: SummaryFormat,
    kill_list: Vec<String>,
    startup: Box<dyn SearchStrategy>,
    strategy: Box<dyn SearchStrategy>,
    checkpointer: Option<Checkpointer>,
    match_config: MatchConfig,
    config: Configuration,
    loop_state: LoopState,
}

impl SearchLoop {
    /// Sets up a run over `state`, which is either fresh or loaded from a checkpoint.
    ///
    /// Fails if `state` was recorded over a different parameter space, or if the strategy
    /// state it carries cannot be restored.
    pub fn new(
        space: ParameterSpace,
        state: SearchState,
        builder: Box<dyn Builder>,
        runner: Box<dyn MatchRunner>,
        strategy: Box<dyn SearchStrategy>,
        config: Configuration,
        match_config: MatchConfig,
    ) -> Result<Self, TunerError> {
        state.check_space(&space)?;
        let checkpointer = (config.checkpoint_interval() > 0)
            .then(|| Checkpointer::new(config.checkpoint_dir(), state.created_at()));
        let mut search = SearchLoop {
            space,
            state,
            builder,
            runner,
            summary_format: SummaryFormat::default(),
            kill_list: Vec::new(),
            startup: Box::new(RandomSearch::new(config.seed())),
            strategy,
            checkpointer,
            match_config,
            config,
            loop_state: LoopState::Idle,
        };
        search.restore_strategies()?;
        Ok(search)
    }

    pub fn with_summary_format(mut self, format: SummaryFormat) -> Self {
        self.summary_format = format;
        self
    }

    /// Process names killed after every match.
    pub fn with_kill_list(mut self, names: Vec<String>) -> Self {
        self.kill_list = names;
        self
    }

    /// Replaces the seeded random sampler used for the startup trials.
    pub fn with_startup_sampler(
        mut self,
        sampler: Box<dyn SearchStrategy>,
    ) -> Result<Self, TunerError> {
        self.startup = sampler;
        self.restore_strategies()?;
        Ok(self)
    }

    /// Writes checkpoints to `checkpointer` instead of the configured directory.
    pub fn with_checkpointer(mut self, checkpointer: Checkpointer) -> Self {
        if self.config.checkpoint_interval() > 0 {
            self.checkpointer = Some(checkpointer);
        }
        self
    }

    pub fn state(&self) -> &SearchState {
        &self.state
    }

    pub fn into_state(self) -> SearchState {
        self.state
    }

    pub fn space(&self) -> &ParameterSpace {
        &self.space
    }

    pub fn loop_state(&self) -> LoopState {
        self.loop_state
    }

    pub fn checkpointer(&self) -> Option<&Checkpointer> {
        self.checkpointer.as_ref()
    }

    /// Runs `additional` more trials on top of the recorded ones.
    #[instrument(skip(self))]
    pub fn run(&mut self, additional: usize) -> Result<RunSummary, TunerError> {
        let baseline = self.state.iteration_count();
        let target = self.state.calc_remaining_budget(additional);
        let mut progress = ProgressReporter::new(
            &self.state,
            target,
            self.config.report_interval(),
            self.config.verbose(),
        );
        info!(
            baseline,
            target,
            strategy = self.strategy.name(),
            startup_trials = self.config.startup_trials(),
            "search started"
        );

        while self.state.iteration_count() < target {
            if let Err(e) = self.step(&mut progress) {
                error!("search aborted at trial {}: {e}", self.state.iteration_count() + 1);
                self.loop_state = LoopState::Terminated;
                return Err(e);
            }
        }
        self.loop_state = LoopState::Terminated;

        progress.print_best(&self.space, &self.state);
        let best = self
            .state
            .best_trial()
            .map(|(index, record)| (index, record.clone()));
        if let Some((index, record)) = &best {
            info!(trial = index + 1, score = record.score, vector = ?record.vector, "best trial");
        }
        Ok(RunSummary {
            executed: self.state.iteration_count() - baseline,
            total: self.state.iteration_count(),
            best,
        })
    }

    /// Executes a single trial.
    fn step(&mut self, progress: &mut ProgressReporter) -> Result<(), TunerError> {
        self.loop_state = LoopState::Idle;
        let vector = self.propose()?;

        self.loop_state = LoopState::Building;
        self.builder.clean()?;
        self.builder.build(&self.space, &vector)?;

        self.loop_state = LoopState::Evaluating;
        let raw = self.runner.invoke(&self.match_config);
        kill_processes(&self.kill_list);
        let raw = raw?;
        if !raw.success() {
            return Err(TunerError::MatchExit(raw.describe_exit()));
        }

        self.loop_state = LoopState::Scoring;
        let outcome = match self.summary_format.parse(&raw.output) {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!("{e}, recording an empty outcome");
                MatchOutcome::default()
            }
        };
        let reward = reward(&outcome);
        if reward.sentinel {
            warn!(
                %outcome,
                "no game decided, recording sentinel reward {}",
                reward.value
            );
        }

        self.loop_state = LoopState::Recording;
        self.state.set_strategy_state(json!({
            "startup": self.startup.snapshot(),
            "model": self.strategy.snapshot(),
        }));
        self.state.add_trial(vector, outcome, reward, raw.output)?;
        info!(
            trial = self.state.iteration_count(),
            %outcome,
            score = reward.value,
            objective = reward.objective(),
            "trial recorded"
        );
        self.checkpoint_if_due();
        progress.on_trial(&self.space, &self.state);
        Ok(())
    }

    fn propose(&mut self) -> Result<ParameterVector, TunerError> {
        let history = self.state.trials();
        let proposal = if self.state.iteration_count() < self.config.startup_trials() {
            self.startup.propose(&self.space, history)?
        } else {
            self.strategy.propose(&self.space, history)?
        };
        self.space.validate(&proposal)?;
        Ok(self.space.quantize(&proposal))
    }

    fn checkpoint_if_due(&mut self) {
        let interval = self.config.checkpoint_interval();
        if interval == 0 || self.state.iteration_count() % interval != 0 {
            return;
        }
        if let Some(checkpointer) = &mut self.checkpointer {
            checkpointer.save(&self.state);
        }
    }

    fn restore_strategies(&mut self) -> Result<(), TunerError> {
        let saved = self.state.strategy_state();
        if saved.is_null() {
            return Ok(());
        }
        if let Some(startup) = saved.get("startup") {
            self.startup.restore(startup)?;
        }
        if let Some(model) = saved.get("model") {
            self.strategy.restore(model)?;
        }
        Ok(())
    }
}
