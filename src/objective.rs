//! Match outcomes and their reduction to a scalar reward.

use serde::{Deserialize, Serialize};

/// Reward given to an outcome that carries no information (no game was decided).
pub const SENTINEL_REWARD: f64 = 0.0;

/// Result of a candidate vs. reference tournament, seen from the candidate.
#[derive(PartialEq, Eq, Default, Debug, Clone, Copy, Hash, Serialize, Deserialize)]
pub struct MatchOutcome {
    pub wins: u32,
    pub draws: u32,
    pub losses: u32,
}

impl MatchOutcome {
    pub fn new(wins: u32, draws: u32, losses: u32) -> Self {
        MatchOutcome {
            wins,
            draws,
            losses,
        }
    }

    pub fn games(&self) -> u64 {
        self.wins as u64 + self.draws as u64 + self.losses as u64
    }

    /// An outcome is only meaningful if at least one game was played.
    pub fn is_valid(&self) -> bool {
        self.games() > 0
    }
}

impl std::fmt::Display for MatchOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "win: {}, draw: {}, lose: {}",
            self.wins, self.draws, self.losses
        )
    }
}

/// Scalar reward of a trial, with a flag telling whether it is the sentinel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reward {
    pub value: f64,
    pub sentinel: bool,
}

impl Reward {
    /// What the minimizing optimizer sees.
    pub fn objective(&self) -> f64 {
        -self.value
    }
}

/// Win ratio counting draws as half a win. `None` when no game was played.
pub fn score(outcome: &MatchOutcome) -> Option<f64> {
    let games = outcome.games();
    if games == 0 {
        return None;
    }
    let points =
        outcome.wins as f64 * 1.0 + outcome.draws as f64 * 0.5 + outcome.losses as f64 * 0.0;
    Some(points / games as f64)
}

/// Like [`score`], substituting [`SENTINEL_REWARD`] for an empty outcome and flagging it.
pub fn reward(outcome: &MatchOutcome) -> Reward {
    match score(outcome) {
        Some(value) => Reward {
            value,
            sentinel: false,
        },
        None => Reward {
            value: SENTINEL_REWARD,
            sentinel: true,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn draws_count_half() {
        assert_eq!(score(&MatchOutcome::new(7, 1, 2)), Some(0.75));
        assert_eq!(score(&MatchOutcome::new(0, 4, 0)), Some(0.5));
        assert_eq!(score(&MatchOutcome::new(0, 0, 3)), Some(0.0));
        assert_eq!(score(&MatchOutcome::new(3, 0, 0)), Some(1.0));
    }

    #[test]
    fn empty_outcome_yields_flagged_sentinel() {
        assert_eq!(score(&MatchOutcome::default()), None);
        let r = reward(&MatchOutcome::default());
        assert_eq!(r.value, SENTINEL_REWARD);
        assert!(r.sentinel);
        assert!(!MatchOutcome::default().is_valid());
    }

    #[test]
    fn objective_is_negated_score() {
        let r = reward(&MatchOutcome::new(7, 1, 2));
        assert!(!r.sentinel);
        assert_eq!(r.objective(), -0.75);
    }

    #[test]
    fn score_is_bounded() {
        for wins in 0..6u32 {
            for draws in 0..6u32 {
                for losses in 0..6u32 {
                    if let Some(s) = score(&MatchOutcome::new(wins, draws, losses)) {
                        assert!((0.0..=1.0).contains(&s));
                    }
                }
            }
        }
    }

    #[test]
    fn score_never_drops_with_an_extra_win() {
        for draws in 0..6u32 {
            for losses in 0..6u32 {
                for wins in 0..6u32 {
                    let before = score(&MatchOutcome::new(wins, draws, losses));
                    let after = score(&MatchOutcome::new(wins + 1, draws, losses)).unwrap();
                    if let Some(before) = before {
                        assert!(after >= before);
                    }
                }
            }
        }
    }

    #[test]
    fn score_never_drops_when_a_game_improves() {
        // same number of games: loss -> draw, draw -> win
        for wins in 0..6u32 {
            for draws in 0..6u32 {
                for losses in 1..6u32 {
                    let base = score(&MatchOutcome::new(wins, draws, losses)).unwrap();
                    let drawn = score(&MatchOutcome::new(wins, draws + 1, losses - 1)).unwrap();
                    assert!(drawn >= base);
                    let won = score(&MatchOutcome::new(wins + 1, draws, losses - 1)).unwrap();
                    assert!(won >= drawn);
                }
            }
        }
    }

    #[test]
    fn no_overflow_on_large_counts() {
        let o = MatchOutcome::new(u32::MAX, u32::MAX, u32::MAX);
        assert_eq!(o.games(), 3 * u32::MAX as u64);
        assert_eq!(score(&o), Some(0.5));
    }
}
