//! Human facing progress output of a search.
//!
//! Everything here is formatting: the reporter reads the [`SearchState`] after each
//! recorded trial and prints to stdout when verbose. The strings are built by separate
//! functions so the output can be checked without a terminal.

use std::{
    collections::BTreeMap,
    time::{Duration, Instant},
};

use crate::{
    history::{SearchState, TrialRecord},
    parameter_space::{ParameterSpace, ParameterSpec},
};

/// Per-run counters and the win histogram.
#[derive(Debug, Clone)]
pub struct ProgressReporter {
    start: Instant,
    /// Trials already recorded when this run started.
    baseline: usize,
    /// Absolute trial count at which the run stops.
    target: usize,
    report_interval: usize,
    verbose: bool,
    win_histogram: BTreeMap<u32, usize>,
}

impl ProgressReporter {
    /// The histogram is seeded with the trials `state` already holds.
    pub fn new(state: &SearchState, target: usize, report_interval: usize, verbose: bool) -> Self {
        let mut win_histogram = BTreeMap::new();
        for trial in state.trials() {
            *win_histogram.entry(trial.outcome.wins).or_insert(0) += 1;
        }
        ProgressReporter {
            start: Instant::now(),
            baseline: state.iteration_count(),
            target,
            report_interval,
            verbose,
            win_histogram,
        }
    }

    pub fn completed_this_run(&self, state: &SearchState) -> usize {
        state.iteration_count().saturating_sub(self.baseline)
    }

    pub fn remaining(&self, state: &SearchState) -> usize {
        self.target.saturating_sub(state.iteration_count())
    }

    pub fn win_histogram(&self) -> &BTreeMap<u32, usize> {
        &self.win_histogram
    }

    /// Prints the trial just recorded, and the best-so-far report when it is due.
    pub fn on_trial(&mut self, space: &ParameterSpace, state: &SearchState) {
        let Some(trial) = state.trials().last() else {
            return;
        };
        *self.win_histogram.entry(trial.outcome.wins).or_insert(0) += 1;
        if !self.verbose {
            return;
        }

        let done = self.completed_this_run(state);
        let eta = estimate_remaining(self.start.elapsed(), done, self.remaining(state));
        println!(
            "{}",
            format_trial(space, trial, state.iteration_count(), self.target, eta)
        );
        println!("{}", format_histogram(&self.win_histogram));

        if self.report_interval > 0 && done % self.report_interval == 0 {
            self.print_best(space, state);
        }
    }

    pub fn print_best(&self, space: &ParameterSpace, state: &SearchState) {
        if !self.verbose {
            return;
        }
        match format_best(space, state) {
            Some(report) => println!("{report}"),
            // yellow
            None => println!("\x1b[33mno trial with a decided game yet\x1b[39m"),
        }
    }
}

/// `elapsed / done * remaining`. Zero until a trial of this run completed.
pub fn estimate_remaining(elapsed: Duration, done: usize, remaining: usize) -> Duration {
    if done == 0 {
        return Duration::ZERO;
    }
    let per_trial = elapsed.as_secs_f64() / done as f64;
    Duration::from_secs_f64(per_trial * remaining as f64)
}

/// `H:MM:SS`, hours are not wrapped.
pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    format!("{}:{:02}:{:02}", secs / 3600, secs / 60 % 60, secs % 60)
}

/// `|---+---@----|` with `n_chars` characters in total. `+` marks the default, `@` the
/// value, which wins when both fall on the same cell.
pub fn bounds_bar(value: f64, spec: &ParameterSpec, n_chars: usize) -> String {
    let n = n_chars.saturating_sub(2).max(1);
    let cell = |v: f64| -> usize {
        let width = spec.max - spec.min;
        if width <= 0.0 {
            return 0;
        }
        let position = ((n - 1) as f64 * (v - spec.min) / width).floor();
        position.clamp(0.0, (n - 1) as f64) as usize
    };
    let mut cells = vec!['-'; n];
    cells[cell(spec.default)] = '+';
    cells[cell(value)] = '@';
    format!("|{}|", cells.into_iter().collect::<String>())
}

pub fn format_trial(
    space: &ParameterSpace,
    trial: &TrialRecord,
    index: usize,
    target: usize,
    eta: Duration,
) -> String {
    let values = space
        .iter()
        .zip(&trial.vector)
        .map(|(spec, v)| format!("{}={}", spec.name, ParameterSpec::rounded(*v)))
        .collect::<Vec<_>>()
        .join(", ");
    let ratio = if trial.sentinel {
        // red
        "\x1b[31mno game decided\x1b[39m".to_string()
    } else {
        format!("{:.4}", trial.score)
    };
    // green header, default colour for the rest
    format!(
        "\x1b[32m{index} / {target}\x1b[39m (ETA {})\n[{values}]\n{} -> {ratio}",
        format_duration(eta),
        trial.outcome
    )
}

/// One `wins: count` line per observed win count, ascending.
pub fn format_histogram(histogram: &BTreeMap<u32, usize>) -> String {
    histogram
        .iter()
        .map(|(wins, count)| format!("{wins:>4}: {count}"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Best trial so far with each parameter's raw value, rounded value and position in its
/// bounds. `None` while no trial has a defined score.
pub fn format_best(space: &ParameterSpace, state: &SearchState) -> Option<String> {
    let (index, best) = state.best_trial()?;
    let width = space.iter().map(|s| s.name.len()).max().unwrap_or(0);
    let mut lines = vec![format!(
        "\x1b[32mBest so far: trial {} / {}, {} -> {:.4}\x1b[39m",
        index + 1,
        state.iteration_count(),
        best.outcome,
        best.score
    )];
    for (spec, raw) in space.iter().zip(&best.vector) {
        let rounded = ParameterSpec::rounded(*raw);
        lines.push(format!(
            "{:<width$} {} {:>8} (raw={raw}, min={}, max={}, default={})",
            spec.name,
            bounds_bar(rounded as f64, spec, 20),
            rounded,
            spec.min,
            spec.max,
            spec.default
        ));
    }
    Some(lines.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::objective::{reward, MatchOutcome};

    fn spec(min: f64, max: f64, default: f64) -> ParameterSpec {
        ParameterSpec::new("P", min, max, default).unwrap()
    }

    #[test]
    fn bar_marks_default_and_value() {
        assert_eq!(bounds_bar(0.0, &spec(0.0, 10.0, 10.0), 12), "|@--------+|");
        assert_eq!(bounds_bar(5.0, &spec(0.0, 10.0, 0.0), 12), "|+---@-----|");
        // the value hides the default on the same cell
        assert_eq!(bounds_bar(10.0, &spec(0.0, 10.0, 10.0), 12), "|---------@|");
        assert_eq!(bounds_bar(3.0, &spec(0.0, 10.0, 5.0), 20).chars().count(), 20);
    }

    #[test]
    fn bar_survives_degenerate_ranges() {
        assert_eq!(bounds_bar(4.0, &spec(4.0, 4.0, 4.0), 8), "|@-----|");
        assert_eq!(bounds_bar(1.0, &spec(0.0, 2.0, 1.0), 0), "|@|");
        // out of range values are pinned to the edges
        assert_eq!(bounds_bar(-50.0, &spec(0.0, 10.0, 10.0), 6), "|@--+|");
    }

    #[test]
    fn eta_scales_with_remaining_trials() {
        let eta = estimate_remaining(Duration::from_secs(60), 3, 6);
        assert_eq!(eta, Duration::from_secs(120));
        assert_eq!(estimate_remaining(Duration::from_secs(60), 0, 6), Duration::ZERO);
        assert_eq!(format_duration(Duration::from_secs(3 * 3600 + 7 * 60 + 5)), "3:07:05");
        assert_eq!(format_duration(Duration::ZERO), "0:00:00");
    }

    #[test]
    fn histogram_counts_raw_win_values() {
        let space = ParameterSpace::from_csv("A,5,0,10\n").unwrap();
        let mut state = SearchState::new(&space);
        let add = |state: &mut SearchState, w| {
            let outcome = MatchOutcome::new(w, 0, 10 - w);
            state
                .add_trial(vec![1.0], outcome, reward(&outcome), String::new())
                .unwrap();
        };
        add(&mut state, 4);
        let mut reporter = ProgressReporter::new(&state, 10, 0, false);
        add(&mut state, 6);
        reporter.on_trial(&space, &state);
        add(&mut state, 4);
        reporter.on_trial(&space, &state);

        assert_eq!(reporter.completed_this_run(&state), 2);
        assert_eq!(reporter.remaining(&state), 7);
        let expected: BTreeMap<u32, usize> = [(4, 2), (6, 1)].into_iter().collect();
        assert_eq!(reporter.win_histogram(), &expected);
        assert_eq!(format_histogram(&expected), "   4: 2\n   6: 1");
    }

    #[test]
    fn best_report_lists_every_parameter() {
        let space = ParameterSpace::from_csv("A,5,0,10\nLONG_NAME,0,-4,4\n").unwrap();
        let mut state = SearchState::new(&space);
        assert!(format_best(&space, &state).is_none());
        let outcome = MatchOutcome::new(7, 1, 2);
        state
            .add_trial(vec![3.0, -1.4], outcome, reward(&outcome), String::new())
            .unwrap();

        let report = format_best(&space, &state).unwrap();
        assert!(report.contains("trial 1 / 1"));
        assert!(report.contains("0.7500"));
        assert!(report.contains("A         |"));
        assert!(report.contains("raw=-1.4"));
        assert_eq!(report.lines().count(), 3);
    }
}
