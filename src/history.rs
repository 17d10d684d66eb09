//! Append-only trial history and the resumable search state built on it.

use std::io::Write;

use serde::{Deserialize, Serialize};
use time::{format_description, OffsetDateTime};

use crate::{
    error::TunerError,
    objective::{MatchOutcome, Reward},
    parameter_space::{ParameterSpace, ParameterVector},
};

/// One completed trial. Never modified once appended to a [`SearchState`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialRecord {
    /// Proposed values, in parameter space order.
    pub vector: ParameterVector,
    pub outcome: MatchOutcome,
    pub score: f64,
    /// `score` is the sentinel reward of an empty outcome.
    pub sentinel: bool,
    /// Raw output of the match program, replayed by `dump_log`.
    #[serde(default)]
    pub output: String,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

/// Everything needed to resume a search: the ordered trial history plus whatever the
/// optimizer strategy wants to carry across restarts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchState {
    parameter_names: Vec<String>,
    trials: Vec<TrialRecord>,
    #[serde(default)]
    strategy_state: serde_json::Value,
    #[serde(with = "time::serde::rfc3339")]
    created_at: OffsetDateTime,
}

impl SearchState {
    pub fn new(space: &ParameterSpace) -> Self {
        SearchState {
            parameter_names: space.names(),
            trials: Vec::new(),
            strategy_state: serde_json::Value::Null,
            created_at: OffsetDateTime::now_utc(),
        }
    }

    /// Appends a trial. The vector must match the recorded parameter order.
    pub fn add_trial(
        &mut self,
        vector: ParameterVector,
        outcome: MatchOutcome,
        reward: Reward,
        output: String,
    ) -> Result<&TrialRecord, TunerError> {
        if vector.len() != self.parameter_names.len() {
            return Err(TunerError::Strategy(format!(
                "refusing to record a {}-value vector in a {}-dimension history",
                vector.len(),
                self.parameter_names.len()
            )));
        }
        self.trials.push(TrialRecord {
            vector,
            outcome,
            score: reward.value,
            sentinel: reward.sentinel,
            output,
            timestamp: OffsetDateTime::now_utc(),
        });
        Ok(&self.trials[self.trials.len() - 1])
    }

    /// Number of committed trials.
    pub fn iteration_count(&self) -> usize {
        self.trials.len()
    }

    /// Absolute trial count to reach after running `additional` more trials.
    pub fn calc_remaining_budget(&self, additional: usize) -> usize {
        self.iteration_count() + additional
    }

    pub fn trials(&self) -> &[TrialRecord] {
        &self.trials
    }

    pub fn parameter_names(&self) -> &[String] {
        &self.parameter_names
    }

    pub fn created_at(&self) -> OffsetDateTime {
        self.created_at
    }

    pub fn strategy_state(&self) -> &serde_json::Value {
        &self.strategy_state
    }

    pub fn set_strategy_state(&mut self, value: serde_json::Value) {
        self.strategy_state = value;
    }

    /// Highest non-sentinel score; the earliest trial wins ties.
    pub fn best_trial(&self) -> Option<(usize, &TrialRecord)> {
        let mut best: Option<(usize, &TrialRecord)> = None;
        for (i, trial) in self.trials.iter().enumerate() {
            if trial.sentinel {
                continue;
            }
            match best {
                Some((_, b)) if b.score >= trial.score => {}
                _ => best = Some((i, trial)),
            }
        }
        best
    }

    /// Fails if this history was recorded with a different parameter order.
    pub fn check_space(&self, space: &ParameterSpace) -> Result<(), TunerError> {
        let names = space.names();
        if names != self.parameter_names {
            return Err(TunerError::CorruptState(format!(
                "state was recorded with parameters {:?}, current parameter space is {:?}",
                self.parameter_names, names
            )));
        }
        Ok(())
    }

    pub fn serialize(&self) -> Result<Vec<u8>, TunerError> {
        serde_json::to_vec(self).map_err(|e| TunerError::Io(e.into()))
    }

    /// Reads a snapshot back. Any malformed or inconsistent input is a
    /// [`TunerError::CorruptState`].
    pub fn deserialize(bytes: &[u8]) -> Result<Self, TunerError> {
        let state: SearchState = serde_json::from_slice(bytes)
            .map_err(|e| TunerError::CorruptState(e.to_string()))?;

        let dims = state.parameter_names.len();
        for (i, trial) in state.trials.iter().enumerate() {
            if trial.vector.len() != dims {
                return Err(TunerError::CorruptState(format!(
                    "trial {} has {} values, expected {dims}",
                    i + 1,
                    trial.vector.len()
                )));
            }
            if !(0.0..=1.0).contains(&trial.score) {
                return Err(TunerError::CorruptState(format!(
                    "trial {} has score {} outside [0, 1]",
                    i + 1,
                    trial.score
                )));
            }
        }
        Ok(state)
    }

    /// Replays the per-trial report of every recorded trial.
    pub fn dump_log(&self, out: &mut impl Write) -> std::io::Result<()> {
        let total = self.iteration_count();
        for (index, trial) in self.trials.iter().enumerate() {
            writeln!(out, "{}", "-".repeat(78))?;
            writeln!(out, "{}", format_timestamp(trial.timestamp))?;
            writeln!(out, "{} / {}", index + 1, total)?;
            let values = self
                .parameter_names
                .iter()
                .zip(&trial.vector)
                .map(|(name, v)| format!("{name}={v}"))
                .collect::<Vec<_>>()
                .join(", ");
            writeln!(out, "[{values}]")?;
            if !trial.output.is_empty() {
                writeln!(out, "{}", trial.output.trim_end())?;
            }
            writeln!(out, "{}", trial.outcome)?;
            if trial.sentinel {
                writeln!(out, "{} (no game decided)", trial.score)?;
            } else {
                writeln!(out, "{}", trial.score)?;
            }
        }
        Ok(())
    }
}

/// `YYYY-MM-DD HH:MM:SS` in local time when available.
pub(crate) fn format_timestamp(t: OffsetDateTime) -> String {
    let t = time::UtcOffset::current_local_offset()
        .map(|offset| t.to_offset(offset))
        .unwrap_or(t);
    format_description::parse("[year]-[month]-[day] [hour]:[minute]:[second]")
        .ok()
        .and_then(|format| t.format(&format).ok())
        .unwrap_or_else(|| t.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::objective::reward;

    fn space() -> ParameterSpace {
        ParameterSpace::from_csv("A,5,0,10\nB,1,0,2\n").unwrap()
    }

    fn record(state: &mut SearchState, a: f64, outcome: MatchOutcome) {
        state
            .add_trial(vec![a, 1.0], outcome, reward(&outcome), String::new())
            .unwrap();
    }

    #[test]
    fn remaining_budget_is_relative_to_recorded_trials() {
        let mut state = SearchState::new(&space());
        assert_eq!(state.calc_remaining_budget(5), 5);
        record(&mut state, 1.0, MatchOutcome::new(1, 0, 0));
        record(&mut state, 2.0, MatchOutcome::new(0, 0, 1));
        assert_eq!(state.iteration_count(), 2);
        assert_eq!(state.calc_remaining_budget(5), 7);
    }

    #[test]
    fn round_trip_keeps_order() {
        let mut state = SearchState::new(&space());
        for i in 0..5 {
            record(&mut state, i as f64, MatchOutcome::new(i, 1, 2));
        }
        state.set_strategy_state(serde_json::json!({"seed": 7}));
        let bytes = state.serialize().unwrap();
        let back = SearchState::deserialize(&bytes).unwrap();
        assert_eq!(back.iteration_count(), 5);
        assert_eq!(back, state);
        let order: Vec<f64> = back.trials().iter().map(|t| t.vector[0]).collect();
        assert_eq!(order, vec![0.0, 1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn fractional_scores_survive_reload_bit_for_bit() {
        let mut state = SearchState::new(&space());
        record(&mut state, 1.0 / 3.0, MatchOutcome::new(2, 0, 1));
        record(&mut state, 0.1 + 0.2, MatchOutcome::new(1, 5, 3));
        let back = SearchState::deserialize(&state.serialize().unwrap()).unwrap();
        for (before, after) in state.trials().iter().zip(back.trials()) {
            assert_eq!(before.score.to_bits(), after.score.to_bits());
            assert_eq!(before.vector[0].to_bits(), after.vector[0].to_bits());
        }
    }

    #[test]
    fn corrupt_input_is_rejected() {
        let mut state = SearchState::new(&space());
        record(&mut state, 1.0, MatchOutcome::new(1, 0, 0));
        let bytes = state.serialize().unwrap();

        let truncated = &bytes[..bytes.len() / 2];
        assert!(matches!(
            SearchState::deserialize(truncated),
            Err(TunerError::CorruptState(_))
        ));
        assert!(matches!(
            SearchState::deserialize(b"not json"),
            Err(TunerError::CorruptState(_))
        ));

        let tampered = String::from_utf8(bytes)
            .unwrap()
            .replace("\"vector\":[1.0,1.0]", "\"vector\":[1.0]");
        assert!(matches!(
            SearchState::deserialize(tampered.as_bytes()),
            Err(TunerError::CorruptState(_))
        ));
    }

    #[test]
    fn add_trial_rejects_wrong_length() {
        let mut state = SearchState::new(&space());
        let o = MatchOutcome::new(1, 0, 0);
        assert!(state.add_trial(vec![1.0], o, reward(&o), String::new()).is_err());
        assert_eq!(state.iteration_count(), 0);
    }

    #[test]
    fn best_trial_skips_sentinels_and_prefers_earliest() {
        let mut state = SearchState::new(&space());
        assert!(state.best_trial().is_none());
        record(&mut state, 1.0, MatchOutcome::default());
        assert!(state.best_trial().is_none());
        record(&mut state, 2.0, MatchOutcome::new(3, 0, 1));
        record(&mut state, 3.0, MatchOutcome::new(6, 0, 2));
        record(&mut state, 4.0, MatchOutcome::new(1, 0, 3));
        let (index, best) = state.best_trial().unwrap();
        assert_eq!(index, 1);
        assert_eq!(best.vector[0], 2.0);
    }

    #[test]
    fn space_mismatch_is_detected() {
        let state = SearchState::new(&space());
        assert!(state.check_space(&space()).is_ok());
        let reordered = ParameterSpace::from_csv("B,1,0,2\nA,5,0,10\n").unwrap();
        assert!(matches!(
            state.check_space(&reordered),
            Err(TunerError::CorruptState(_))
        ));
    }

    #[test]
    fn dump_log_replays_each_trial() {
        let mut state = SearchState::new(&space());
        record(&mut state, 3.0, MatchOutcome::new(7, 1, 2));
        record(&mut state, 4.0, MatchOutcome::default());
        let mut out = Vec::new();
        state.dump_log(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("1 / 2"));
        assert!(text.contains("[A=3, B=1]"));
        assert!(text.contains("win: 7, draw: 1, lose: 2"));
        assert!(text.contains("0.75"));
        assert!(text.contains("no game decided"));
    }
}
