//! Command line front end of the tuner.
//!
//! Usage:
//!   engine-tuner --space parameters.csv --runner-program TanukiColiseum \
//!       --runner-arg=--num-games --runner-arg={games} --max-evals 200
//!   engine-tuner --space parameters.csv --resume engine-tuner.state.20240101_120000.json ...
//!   engine-tuner --dump-log engine-tuner.state.20240101_120000.json

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{bail, Context};
use clap::{Parser, ValueEnum};
use tracing::{info, warn};

use engine_tuner::{
    builder::{render_best_header, Builder, CommandBuilder, DefineFileBuilder},
    checkpoint::Checkpointer,
    configuration::{Configuration, MatchConfig},
    history::SearchState,
    logger,
    match_runner::{CommandRunner, SummaryFormat},
    parameter_space::ParameterSpace,
    search_loop::SearchLoop,
    strategy::StrategyKind,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum BuilderKind {
    /// Only write the parameter header; the engine reads it at startup.
    Define,
    /// Write the parameter header, then run `--build-command`.
    Command,
}

#[derive(Parser, Debug)]
#[command(name = "engine-tuner", version)]
#[command(about = "Tune a game engine's search parameters with candidate vs. reference matches")]
struct Args {
    /// Parameter definitions, `name,default,min,max[,quantum]` CSV or an annotated header
    #[arg(long)]
    space: Option<PathBuf>,

    /// Continue the search recorded in this checkpoint
    #[arg(long)]
    resume: Option<PathBuf>,

    /// Print every trial recorded in this checkpoint and exit
    #[arg(long)]
    dump_log: Option<PathBuf>,

    /// Trials to run on top of the recorded ones
    #[arg(long, default_value_t = 100)]
    max_evals: usize,

    /// Games played concurrently by the match program
    #[arg(long)]
    threads: Option<usize>,

    /// Hash size per engine, in MB
    #[arg(long)]
    hash: Option<usize>,

    /// Thinking time per move, in ms
    #[arg(long)]
    time: Option<u64>,

    /// Node budget per move, 0 for none
    #[arg(long)]
    nodes: Option<u64>,

    /// Games per match
    #[arg(long)]
    games: Option<usize>,

    /// Trials between checkpoints, 0 disables checkpointing
    #[arg(long)]
    checkpoint_interval: Option<usize>,

    #[arg(long)]
    checkpoint_dir: Option<PathBuf>,

    /// Random proposals before the strategy takes over
    #[arg(long)]
    startup_trials: Option<usize>,

    /// `random` or `perturb`
    #[arg(long, default_value = "perturb")]
    strategy: StrategyKind,

    #[arg(long)]
    seed: Option<u64>,

    #[arg(long, value_enum, default_value_t = BuilderKind::Define)]
    builder: BuilderKind,

    /// Parameter header read by the engine
    #[arg(long, default_value = "param/parameters_slave.h")]
    artifact: PathBuf,

    /// Build command run after writing the artifact, e.g. "make -j8 native"
    #[arg(long)]
    build_command: Option<String>,

    /// Command run before writing the artifact, e.g. "make clean"
    #[arg(long)]
    clean_command: Option<String>,

    /// Binary produced by `--build-command`, copied to `--engine-path` after each build
    #[arg(long, requires = "engine_path")]
    build_output: Option<PathBuf>,

    /// Where the match program expects the candidate engine
    #[arg(long, requires = "build_output")]
    engine_path: Option<PathBuf>,

    /// Empty the artifact again once the engine is built
    #[arg(long)]
    reset_header: bool,

    /// Match program, e.g. TanukiColiseum
    #[arg(long)]
    runner_program: Option<String>,

    /// Argument of the match program; `{threads}`, `{hash}`, `{time}`, `{nodes}` and
    /// `{games}` are replaced by the match settings
    #[arg(long = "runner-arg", allow_hyphen_values = true)]
    runner_args: Vec<String>,

    /// File fed to the match program's standard input
    #[arg(long)]
    runner_stdin: Option<PathBuf>,

    /// `coliseum` or `game-server`
    #[arg(long, default_value = "coliseum")]
    summary: SummaryFormat,

    /// Process name killed after every match
    #[arg(long = "kill")]
    kill: Vec<String>,

    /// Trials between best-so-far reports
    #[arg(long)]
    report_interval: Option<usize>,

    /// Write the best parameters found as an annotated header
    #[arg(long)]
    export_best: Option<PathBuf>,

    /// Write a log file in the current directory
    #[arg(long)]
    log: bool,

    /// No per-trial output
    #[arg(long)]
    quiet: bool,
}

impl Args {
    fn configuration(&self) -> Configuration {
        let mut config = Configuration::from_env();
        if let Some(v) = self.checkpoint_interval {
            config = config.with_checkpoint_interval(v);
        }
        if let Some(dir) = &self.checkpoint_dir {
            config = config.with_checkpoint_dir(dir);
        }
        if let Some(v) = self.startup_trials {
            config = config.with_startup_trials(v);
        }
        if let Some(v) = self.report_interval {
            config = config.with_report_interval(v);
        }
        if let Some(v) = self.seed {
            config = config.with_seed(v);
        }
        let verbose = config.verbose() && !self.quiet;
        let log = config.log() || self.log;
        config.with_verbose(verbose).with_log(log)
    }

    fn match_config(&self) -> MatchConfig {
        let mut config = MatchConfig::from_env();
        if let Some(v) = self.threads {
            config = config.with_threads(v);
        }
        if let Some(v) = self.hash {
            config = config.with_hash_mb(v);
        }
        if let Some(v) = self.time {
            config = config.with_time_ms(v);
        }
        if let Some(v) = self.nodes {
            config = config.with_nodes(v);
        }
        if let Some(v) = self.games {
            config = config.with_games(v);
        }
        config
    }

    fn builder(&self) -> anyhow::Result<Box<dyn Builder>> {
        let params = DefineFileBuilder::new(&self.artifact);
        Ok(match self.builder {
            BuilderKind::Define => Box::new(params),
            BuilderKind::Command => {
                let build = split_command(
                    self.build_command
                        .as_deref()
                        .context("--builder command needs --build-command")?,
                );
                if build.is_empty() {
                    bail!("--build-command is empty");
                }
                let mut builder = CommandBuilder::new(params, build);
                if let Some(clean) = &self.clean_command {
                    builder = builder.with_clean_command(split_command(clean));
                }
                if let (Some(from), Some(to)) = (&self.build_output, &self.engine_path) {
                    builder = builder.with_copy(from, to);
                }
                builder = builder.with_header_reset(self.reset_header);
                Box::new(builder)
            }
        })
    }

    fn runner(&self) -> anyhow::Result<CommandRunner> {
        let program = self
            .runner_program
            .as_deref()
            .context("--runner-program is required")?;
        let mut runner = CommandRunner::new(program).with_args(self.runner_args.clone());
        if let Some(stdin) = &self.runner_stdin {
            runner = runner.with_stdin_file(stdin);
        }
        Ok(runner)
    }
}

fn split_command(command: &str) -> Vec<String> {
    command.split_whitespace().map(str::to_string).collect()
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = args.configuration();
    if config.log() {
        let path = logger::init_logger(Path::new("."))?;
        println!("Logging to {}", path.display());
    }

    if let Some(path) = &args.dump_log {
        let state = Checkpointer::load(path)?;
        let stdout = std::io::stdout();
        state.dump_log(&mut stdout.lock())?;
        return Ok(());
    }

    let space_path = args.space.as_deref().context("--space is required")?;
    let space = ParameterSpace::load(space_path)?;
    let state = match &args.resume {
        Some(path) => {
            let state = Checkpointer::load(path)?;
            info!(trials = state.iteration_count(), "resuming");
            println!(
                "Resuming from {} with {} recorded trials",
                path.display(),
                state.iteration_count()
            );
            state
        }
        None => SearchState::new(&space),
    };

    let builder = args.builder()?;
    let runner = args.runner()?;
    let strategy = args.strategy.create(config.seed().wrapping_add(1));
    let mut search = SearchLoop::new(
        space,
        state,
        builder,
        Box::new(runner),
        strategy,
        config,
        args.match_config(),
    )?
    .with_summary_format(args.summary)
    .with_kill_list(args.kill.clone());
    if let Some(path) = &args.resume {
        search = search.with_checkpointer(Checkpointer::at(path));
    }

    let summary = search.run(args.max_evals)?;
    println!(
        "Finished: {} trials this run, {} recorded",
        summary.executed, summary.total
    );

    if let Some(export) = &args.export_best {
        let Some((index, best)) = &summary.best else {
            warn!("no trial with a decided game, nothing exported");
            println!("No trial with a decided game, nothing exported");
            return Ok(());
        };
        let checkpoint = search
            .checkpointer()
            .map(|c| c.path().display().to_string())
            .unwrap_or_else(|| "-".to_string());
        let provenance = [
            ("Log".to_string(), checkpoint),
            ("Parameters".to_string(), space_path.display().to_string()),
            (
                "Trial".to_string(),
                format!("{} / {}", index + 1, summary.total),
            ),
            ("Score".to_string(), format!("{:.4} ({})", best.score, best.outcome)),
        ];
        let header = render_best_header(search.space(), &best.vector, export, &provenance);
        fs::write(export, header)
            .with_context(|| format!("could not write '{}'", export.display()))?;
        println!("Wrote best parameters to {}", export.display());
    }
    Ok(())
}
