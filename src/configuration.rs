//! Config for the tuner behaviors
//!
//! Two values are configured here: [`Configuration`] drives the search loop itself, and
//! [`MatchConfig`] sizes each match handed to the external tournament program.
//!
//! Both can be created programmatically (`new()` plus `with_*` methods) or read from
//! environment variables with `from_env()`; the command line applies its flags on top.
//!
//! # Environment Variables
//!
//! All values are optional. Flags are enabled by the (case-insensitive) value `"true"`.
//!
//! - `TUNER_VERBOSE`: Print per-trial progress to stdout (default: `true`)
//! - `TUNER_LOG`: Write a tracing log file (default: `false`)
//! - `TUNER_CHECKPOINT_INTERVAL`: Trials between checkpoints, `0` disables (default: `1`)
//! - `TUNER_CHECKPOINT_DIR`: Where checkpoints are written (default: `.`)
//! - `TUNER_STARTUP_TRIALS`: Random proposals before the strategy takes over (default: `20`)
//! - `TUNER_REPORT_INTERVAL`: Trials between best-so-far reports, `0` disables (default: `10`)
//! - `TUNER_SEED`: Seed of the random proposals (default: `0`)
//! - `TUNER_THREADS`: Concurrent games inside one match (default: physical CPU count)
//! - `TUNER_HASH_MB`: Hash size per engine in MB (default: `256`)
//! - `TUNER_TIME_MS`: Thinking time per move in ms (default: `1000`)
//! - `TUNER_NODES`: Node budget per move, `0` means unlimited (default: `0`)
//! - `TUNER_GAMES`: Games per match (default: `100`)

use std::{path::PathBuf, str::FromStr};

fn get_env_flag(var: &str, default: bool) -> bool {
    match std::env::var(var) {
        Ok(val) => val.eq_ignore_ascii_case("true"),
        Err(_) => default,
    }
}

fn get_env_value<T: FromStr>(var: &str, default: T) -> T {
    std::env::var(var)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

/// Configuration of the search loop.
#[derive(Debug, Clone)]
pub struct Configuration {
    pub(crate) verbose: bool,
    pub(crate) log: bool,
    pub(crate) checkpoint_interval: usize,
    pub(crate) checkpoint_dir: PathBuf,
    pub(crate) startup_trials: usize,
    pub(crate) report_interval: usize,
    pub(crate) seed: u64,
}

impl Configuration {
    /// Create a new configuration with default parameters.
    ///
    /// By default:
    /// - Progress is printed to stdout.
    /// - Logging to file is disabled.
    /// - The search state is checkpointed after every trial, in the current directory.
    /// - The first 20 proposals are random.
    /// - The best-so-far report is printed every 10 trials.
    pub fn new() -> Self {
        Self {
            verbose: true,
            log: false,
            checkpoint_interval: 1,
            checkpoint_dir: PathBuf::from("."),
            startup_trials: 20,
            report_interval: 10,
            seed: 0,
        }
    }

    /// Create configuration from environment variables (see module documentation).
    ///
    /// Unset or unparsable variables keep their default value.
    pub fn from_env() -> Self {
        let default = Self::new();
        Self {
            verbose: get_env_flag("TUNER_VERBOSE", default.verbose),
            log: get_env_flag("TUNER_LOG", default.log),
            checkpoint_interval: get_env_value(
                "TUNER_CHECKPOINT_INTERVAL",
                default.checkpoint_interval,
            ),
            checkpoint_dir: std::env::var_os("TUNER_CHECKPOINT_DIR")
                .map(PathBuf::from)
                .unwrap_or(default.checkpoint_dir),
            startup_trials: get_env_value("TUNER_STARTUP_TRIALS", default.startup_trials),
            report_interval: get_env_value("TUNER_REPORT_INTERVAL", default.report_interval),
            seed: get_env_value("TUNER_SEED", default.seed),
        }
    }

    /// Enable or disable per-trial output.
    pub fn with_verbose(mut self, value: bool) -> Self {
        self.verbose = value;
        self
    }

    /// Enable or disable logging to file.
    pub fn with_log(mut self, value: bool) -> Self {
        self.log = value;
        self
    }

    /// Checkpoint every `value` trials. `0` disables checkpointing.
    pub fn with_checkpoint_interval(mut self, value: usize) -> Self {
        self.checkpoint_interval = value;
        self
    }

    pub fn with_checkpoint_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.checkpoint_dir = dir.into();
        self
    }

    /// Number of random proposals before the strategy's model is consulted.
    pub fn with_startup_trials(mut self, value: usize) -> Self {
        self.startup_trials = value;
        self
    }

    /// Print the best-so-far report every `value` trials. `0` only reports at the end.
    pub fn with_report_interval(mut self, value: usize) -> Self {
        self.report_interval = value;
        self
    }

    pub fn with_seed(mut self, value: u64) -> Self {
        self.seed = value;
        self
    }

    pub fn checkpoint_interval(&self) -> usize {
        self.checkpoint_interval
    }

    pub fn checkpoint_dir(&self) -> &PathBuf {
        &self.checkpoint_dir
    }

    pub fn startup_trials(&self) -> usize {
        self.startup_trials
    }

    pub fn report_interval(&self) -> usize {
        self.report_interval
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn verbose(&self) -> bool {
        self.verbose
    }

    pub fn log(&self) -> bool {
        self.log
    }
}

impl Default for Configuration {
    fn default() -> Self {
        Self::new()
    }
}

/// Resource sizing of one match between the candidate and the reference engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchConfig {
    /// Games played concurrently by the tournament program.
    pub threads: usize,
    /// Hash table size per engine, in MB.
    pub hash_mb: usize,
    /// Thinking time per move, in milliseconds.
    pub time_ms: u64,
    /// Node budget per move. `0` means no node limit.
    pub nodes: u64,
    /// Number of games in the match.
    pub games: usize,
}

impl MatchConfig {
    /// Defaults to one concurrent game per physical CPU.
    pub fn new() -> Self {
        Self {
            threads: num_cpus::get_physical().max(1),
            hash_mb: 256,
            time_ms: 1000,
            nodes: 0,
            games: 100,
        }
    }

    pub fn from_env() -> Self {
        let default = Self::new();
        Self {
            threads: get_env_value("TUNER_THREADS", default.threads),
            hash_mb: get_env_value("TUNER_HASH_MB", default.hash_mb),
            time_ms: get_env_value("TUNER_TIME_MS", default.time_ms),
            nodes: get_env_value("TUNER_NODES", default.nodes),
            games: get_env_value("TUNER_GAMES", default.games),
        }
    }

    pub fn with_threads(mut self, value: usize) -> Self {
        self.threads = value;
        self
    }

    pub fn with_hash_mb(mut self, value: usize) -> Self {
        self.hash_mb = value;
        self
    }

    pub fn with_time_ms(mut self, value: u64) -> Self {
        self.time_ms = value;
        self
    }

    pub fn with_nodes(mut self, value: u64) -> Self {
        self.nodes = value;
        self
    }

    pub fn with_games(mut self, value: usize) -> Self {
        self.games = value;
        self
    }

    /// Replaces `{threads}`, `{hash}`, `{time}`, `{nodes}` and `{games}` in `arg`.
    pub fn substitute(&self, arg: &str) -> String {
        arg.replace("{threads}", &self.threads.to_string())
            .replace("{hash}", &self.hash_mb.to_string())
            .replace("{time}", &self.time_ms.to_string())
            .replace("{nodes}", &self.nodes.to_string())
            .replace("{games}", &self.games.to_string())
    }
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = Configuration::new();
        assert!(config.verbose);
        assert!(!config.log);
        assert_eq!(config.checkpoint_interval, 1);
        assert_eq!(config.startup_trials, 20);

        let m = MatchConfig::new();
        assert!(m.threads >= 1);
        assert_eq!(m.nodes, 0);
    }

    #[test]
    fn builder_overrides() {
        let config = Configuration::new()
            .with_checkpoint_interval(0)
            .with_startup_trials(1)
            .with_seed(42)
            .with_verbose(false);
        assert_eq!(config.checkpoint_interval(), 0);
        assert_eq!(config.startup_trials(), 1);
        assert_eq!(config.seed(), 42);
        assert!(!config.verbose());
    }

    #[test]
    fn placeholders_are_substituted() {
        let m = MatchConfig::new()
            .with_threads(4)
            .with_hash_mb(128)
            .with_time_ms(200)
            .with_nodes(50_000)
            .with_games(500);
        assert_eq!(
            m.substitute("--threads={threads} --hash {hash} t{time} n{nodes} g{games} {other}"),
            "--threads=4 --hash 128 t200 n50000 g500 {other}"
        );
    }
}
