use std::{
    fs::File,
    path::PathBuf,
    process::{Command, Stdio},
};

use tracing::{info, instrument, trace};

use crate::{configuration::MatchConfig, error::TunerError};

use super::{MatchRunner, RawMatch};

/// Runs an external tournament program, e.g.
/// `TanukiColiseum --engine1 tanuki-modified --engine2 tanuki-master --num-threads {threads}`
/// or a local game server reading its setup from stdin.
///
/// Arguments go through [`MatchConfig::substitute`] before every invocation.
#[derive(Debug, Clone)]
pub struct CommandRunner {
    program: String,
    args: Vec<String>,
    stdin_file: Option<PathBuf>,
    working_dir: Option<PathBuf>,
    allow_stderr: bool,
}

impl CommandRunner {
    pub fn new(program: impl Into<String>) -> Self {
        CommandRunner {
            program: program.into(),
            args: Vec::new(),
            stdin_file: None,
            working_dir: None,
            allow_stderr: false,
        }
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    /// Feed this file to the program's standard input.
    pub fn with_stdin_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.stdin_file = Some(path.into());
        self
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Let the program's stderr through to the terminal (debug purposes only).
    pub fn with_allow_stderr(mut self, value: bool) -> Self {
        self.allow_stderr = value;
        self
    }

    pub fn command_line(&self, config: &MatchConfig) -> Vec<String> {
        std::iter::once(self.program.clone())
            .chain(self.args.iter().map(|a| config.substitute(a)))
            .collect()
    }
}

impl MatchRunner for CommandRunner {
    #[instrument(skip(self))]
    fn invoke(&mut self, config: &MatchConfig) -> Result<RawMatch, TunerError> {
        let command_line = self.command_line(config);
        info!(?command_line, "starting match");

        let mut cmd = Command::new(&self.program);
        cmd.args(&command_line[1..]).stdout(Stdio::piped());
        if !self.allow_stderr {
            cmd.stderr(Stdio::null());
        }
        match &self.stdin_file {
            Some(path) => {
                let file = File::open(path).map_err(|e| {
                    TunerError::Evaluate(format!("cannot open '{}': {e}", path.display()))
                })?;
                cmd.stdin(file);
            }
            None => {
                cmd.stdin(Stdio::null());
            }
        }
        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }

        let child = cmd.spawn().map_err(|e| {
            TunerError::Evaluate(format!("command '{}' could not be started: {e}", self.program))
        })?;
        let output = child
            .wait_with_output()
            .map_err(|e| TunerError::Evaluate(format!("failed to wait for the match: {e}")))?;

        let raw = RawMatch {
            output: String::from_utf8_lossy(&output.stdout).into_owned(),
            exit_code: output.status.code(),
        };
        trace!(output = %raw.output);
        Ok(raw)
    }
}
