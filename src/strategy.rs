//! Proposal strategies driving the search.
//!
//! The search loop calls [`SearchStrategy::propose`] once per trial with the whole
//! recorded history. Strategies keep whatever they need to continue after a restart in
//! the opaque value returned by [`SearchStrategy::snapshot`], which is stored in the
//! checkpoint and handed back through [`SearchStrategy::restore`].
//!
//! # Provided Strategies
//! - [`RandomSearch`]: independent uniform samples. Also used for the startup trials.
//! - [`PerturbationSearch`]: mostly perturbs the best trial so far, sometimes explores.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde_json::{json, Value};

use crate::{
    error::TunerError,
    history::TrialRecord,
    parameter_space::{ParameterSpace, ParameterVector},
};

/// A sequential optimizer.
///
/// Proposed vectors follow the parameter space order. They need not be quantized; the
/// search loop snaps them to each parameter's grid before building.
pub trait SearchStrategy {
    fn propose(
        &mut self,
        space: &ParameterSpace,
        history: &[TrialRecord],
    ) -> Result<ParameterVector, TunerError>;

    /// Serializable internal state, `Value::Null` when there is none.
    fn snapshot(&self) -> Value;

    /// Restores a state previously produced by [`SearchStrategy::snapshot`].
    fn restore(&mut self, state: &Value) -> Result<(), TunerError>;

    fn name(&self) -> &str;
}

impl<S: SearchStrategy + ?Sized> SearchStrategy for Box<S> {
    fn propose(
        &mut self,
        space: &ParameterSpace,
        history: &[TrialRecord],
    ) -> Result<ParameterVector, TunerError> {
        (**self).propose(space, history)
    }

    fn snapshot(&self) -> Value {
        (**self).snapshot()
    }

    fn restore(&mut self, state: &Value) -> Result<(), TunerError> {
        (**self).restore(state)
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

/// Strategies selectable from the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StrategyKind {
    Random,
    #[default]
    Perturb,
}

impl StrategyKind {
    pub fn create(&self, seed: u64) -> Box<dyn SearchStrategy> {
        match self {
            StrategyKind::Random => Box::new(RandomSearch::new(seed)),
            StrategyKind::Perturb => Box::new(PerturbationSearch::new(seed, 0.2)),
        }
    }
}

impl std::str::FromStr for StrategyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "random" => Ok(StrategyKind::Random),
            "perturb" | "perturbation" => Ok(StrategyKind::Perturb),
            _ => Err(format!("unknown strategy '{s}'")),
        }
    }
}

/// Seeded generator whose position can be saved and restored.
#[derive(Debug, Clone)]
struct ResumableRng {
    seed: u64,
    rng: ChaCha8Rng,
}

impl ResumableRng {
    fn new(seed: u64) -> Self {
        ResumableRng {
            seed,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    fn snapshot(&self) -> Value {
        // u128 does not fit a JSON number
        json!({
            "seed": self.seed,
            "word_pos": self.rng.get_word_pos().to_string(),
        })
    }

    fn restore(state: &Value) -> Result<Self, TunerError> {
        let seed = state
            .get("seed")
            .and_then(Value::as_u64)
            .ok_or_else(|| TunerError::CorruptState("rng state without a seed".into()))?;
        let word_pos: u128 = state
            .get("word_pos")
            .and_then(Value::as_str)
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| TunerError::CorruptState("rng state without a position".into()))?;
        let mut restored = ResumableRng::new(seed);
        restored.rng.set_word_pos(word_pos);
        Ok(restored)
    }

    fn sample(&mut self, space: &ParameterSpace) -> ParameterVector {
        space
            .iter()
            .map(|spec| self.rng.gen_range(spec.min..=spec.max))
            .collect()
    }
}

// ---- Random search ----

/// Independent uniform sampling over every parameter range.
#[derive(Debug, Clone)]
pub struct RandomSearch {
    rng: ResumableRng,
}

impl RandomSearch {
    pub fn new(seed: u64) -> Self {
        RandomSearch {
            rng: ResumableRng::new(seed),
        }
    }
}

impl SearchStrategy for RandomSearch {
    fn propose(
        &mut self,
        space: &ParameterSpace,
        _history: &[TrialRecord],
    ) -> Result<ParameterVector, TunerError> {
        Ok(self.rng.sample(space))
    }

    fn snapshot(&self) -> Value {
        self.rng.snapshot()
    }

    fn restore(&mut self, state: &Value) -> Result<(), TunerError> {
        if !state.is_null() {
            self.rng = ResumableRng::restore(state)?;
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "random"
    }
}

// ---- Perturbation search ----

/// Explore/exploit search around the best recorded trial.
///
/// With probability `exploration_weight` (or while no trial has a defined score) a uniform
/// sample is proposed. Otherwise every dimension of the best trial is moved by up to 10%
/// of its range.
#[derive(Debug, Clone)]
pub struct PerturbationSearch {
    rng: ResumableRng,
    exploration_weight: f64,
}

impl PerturbationSearch {
    pub fn new(seed: u64, exploration_weight: f64) -> Self {
        PerturbationSearch {
            rng: ResumableRng::new(seed),
            exploration_weight: exploration_weight.clamp(0.0, 1.0),
        }
    }

    fn best(history: &[TrialRecord]) -> Option<&TrialRecord> {
        history
            .iter()
            .filter(|t| !t.sentinel)
            .fold(None, |best: Option<&TrialRecord>, t| match best {
                Some(b) if b.score >= t.score => Some(b),
                _ => Some(t),
            })
    }
}

impl SearchStrategy for PerturbationSearch {
    fn propose(
        &mut self,
        space: &ParameterSpace,
        history: &[TrialRecord],
    ) -> Result<ParameterVector, TunerError> {
        let explore = self.rng.rng.gen::<f64>() < self.exploration_weight;
        let base = match Self::best(history) {
            Some(best) if !explore => best,
            _ => return Ok(self.rng.sample(space)),
        };
        if base.vector.len() != space.len() {
            return Err(TunerError::Strategy(format!(
                "best trial has {} values, parameter space has {}",
                base.vector.len(),
                space.len()
            )));
        }

        let rng = &mut self.rng.rng;
        Ok(space
            .iter()
            .zip(&base.vector)
            .map(|(spec, &v)| {
                let noise = rng.gen_range(-0.1..=0.1) * spec.width();
                (v + noise).clamp(spec.min, spec.max)
            })
            .collect())
    }

    fn snapshot(&self) -> Value {
        json!({
            "rng": self.rng.snapshot(),
            "exploration_weight": self.exploration_weight,
        })
    }

    fn restore(&mut self, state: &Value) -> Result<(), TunerError> {
        if state.is_null() {
            return Ok(());
        }
        let rng = state
            .get("rng")
            .ok_or_else(|| TunerError::CorruptState("perturbation state without rng".into()))?;
        self.rng = ResumableRng::restore(rng)?;
        if let Some(weight) = state.get("exploration_weight").and_then(Value::as_f64) {
            self.exploration_weight = weight.clamp(0.0, 1.0);
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "perturb"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        history::SearchState,
        objective::{reward, MatchOutcome},
    };

    fn space() -> ParameterSpace {
        ParameterSpace::from_csv("A,5,0,10\nB,100,50,150\nC,0,-20,20\n").unwrap()
    }

    fn in_bounds(space: &ParameterSpace, v: &[f64]) -> bool {
        v.len() == space.len()
            && space
                .iter()
                .zip(v)
                .all(|(spec, x)| *x >= spec.min && *x <= spec.max)
    }

    #[test]
    fn random_search_respects_bounds() {
        let space = space();
        let mut rs = RandomSearch::new(3);
        for _ in 0..200 {
            let v = rs.propose(&space, &[]).unwrap();
            assert!(in_bounds(&space, &v), "{v:?}");
        }
    }

    #[test]
    fn same_seed_same_proposals() {
        let space = space();
        let mut a = RandomSearch::new(11);
        let mut b = RandomSearch::new(11);
        for _ in 0..10 {
            assert_eq!(a.propose(&space, &[]).unwrap(), b.propose(&space, &[]).unwrap());
        }
    }

    #[test]
    fn restored_random_search_continues_the_sequence() {
        let space = space();
        let mut original = RandomSearch::new(5);
        for _ in 0..7 {
            original.propose(&space, &[]).unwrap();
        }
        let snapshot = original.snapshot();
        let expected: Vec<_> = (0..5).map(|_| original.propose(&space, &[]).unwrap()).collect();

        let mut resumed = RandomSearch::new(999);
        resumed.restore(&snapshot).unwrap();
        let actual: Vec<_> = (0..5).map(|_| resumed.propose(&space, &[]).unwrap()).collect();
        assert_eq!(actual, expected);
    }

    #[test]
    fn bad_snapshot_is_rejected() {
        let mut rs = RandomSearch::new(0);
        assert!(matches!(
            rs.restore(&json!({"seed": "x"})),
            Err(TunerError::CorruptState(_))
        ));
        assert!(rs.restore(&Value::Null).is_ok());
    }

    #[test]
    fn perturbation_stays_near_the_best_trial() {
        let space = space();
        let mut state = SearchState::new(&space);
        for (a, outcome) in [
            (1.0, MatchOutcome::new(1, 0, 9)),
            (8.0, MatchOutcome::new(9, 0, 1)),
            (4.0, MatchOutcome::new(0, 0, 0)),
        ] {
            state
                .add_trial(vec![a, 100.0, 0.0], outcome, reward(&outcome), String::new())
                .unwrap();
        }

        let mut ps = PerturbationSearch::new(1, 0.0);
        for _ in 0..100 {
            let v = ps.propose(&space, state.trials()).unwrap();
            assert!(in_bounds(&space, &v));
            assert!((v[0] - 8.0).abs() <= 1.0 + 1e-9, "{v:?}");
            assert!((v[1] - 100.0).abs() <= 10.0 + 1e-9, "{v:?}");
        }
    }

    #[test]
    fn perturbation_explores_without_scored_trials() {
        let space = space();
        let mut state = SearchState::new(&space);
        let empty = MatchOutcome::default();
        state
            .add_trial(vec![5.0, 100.0, 0.0], empty, reward(&empty), String::new())
            .unwrap();
        let mut ps = PerturbationSearch::new(2, 0.0);
        let v = ps.propose(&space, state.trials()).unwrap();
        assert!(in_bounds(&space, &v));
    }

    #[test]
    fn strategy_names() {
        assert_eq!("random".parse::<StrategyKind>(), Ok(StrategyKind::Random));
        assert_eq!("Perturb".parse::<StrategyKind>(), Ok(StrategyKind::Perturb));
        assert!("bayes".parse::<StrategyKind>().is_err());
        assert_eq!(StrategyKind::Random.create(0).name(), "random");
    }
}
