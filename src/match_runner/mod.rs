//! Evaluation of a built candidate against the reference engine.
//!
//! A [`MatchRunner`] launches the external tournament program and waits for it; whatever
//! concurrency the program uses internally stays inside it. The search loop then:
//!
//! - parses the output with a [`SummaryFormat`] (a missing summary is not fatal),
//! - calls [`kill_processes`] so no engine survives into the next trial,
//! - aborts the whole search if the program exited unsuccessfully.

use std::{ffi::OsStr, path::Path};

use sysinfo::{Process, ProcessRefreshKind, ProcessesToUpdate, System, UpdateKind};
use tracing::{debug, instrument, warn};

use crate::{configuration::MatchConfig, error::TunerError};

mod command;
mod summary;

pub use command::CommandRunner;
pub use summary::SummaryFormat;

/// Captured result of one invocation of the tournament program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMatch {
    /// Standard output of the program.
    pub output: String,
    /// `None` when the program was terminated by a signal.
    pub exit_code: Option<i32>,
}

impl RawMatch {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Human readable exit status, for error messages.
    pub fn describe_exit(&self) -> String {
        match self.exit_code {
            Some(code) => format!("exit code {code}"),
            None => "termination by signal".to_string(),
        }
    }
}

/// Launches one candidate vs. reference match and blocks until it is over.
pub trait MatchRunner {
    /// An `Err` means the program could not be run at all.
    fn invoke(&mut self, config: &MatchConfig) -> Result<RawMatch, TunerError>;
}

impl<R: MatchRunner + ?Sized> MatchRunner for Box<R> {
    fn invoke(&mut self, config: &MatchConfig) -> Result<RawMatch, TunerError> {
        (**self).invoke(config)
    }
}

/// Kills every running process named like one of `process_names`.
///
/// A process matches on its kernel name, its executable's file name or the file name of
/// its first argument. The last two catch names longer than the 15 characters Linux keeps
/// in the kernel name.
///
/// Best effort: failures are logged and the number of processes actually killed is
/// returned.
#[instrument]
pub fn kill_processes(process_names: &[String]) -> usize {
    if process_names.is_empty() {
        return 0;
    }
    let mut sys = System::new();
    sys.refresh_processes_specifics(
        ProcessesToUpdate::All,
        true,
        ProcessRefreshKind::nothing()
            .with_exe(UpdateKind::OnlyIfNotSet)
            .with_cmd(UpdateKind::OnlyIfNotSet),
    );

    let mut killed = 0;
    for name in process_names {
        let name_os = OsStr::new(name);
        let mut matched = false;
        for process in sys.processes().values() {
            if !process_is_named(process, name_os) {
                continue;
            }
            matched = true;
            if process.kill() {
                debug!(pid = %process.pid(), %name, "killed leftover process");
                killed += 1;
            } else {
                warn!(pid = %process.pid(), %name, "could not kill leftover process");
            }
        }
        if !matched {
            warn!(%name, "no running process matches this kill name");
        }
    }
    killed
}

fn process_is_named(process: &Process, name: &OsStr) -> bool {
    process.name() == name
        || process.exe().and_then(Path::file_name) == Some(name)
        || process
            .cmd()
            .first()
            .and_then(|arg0| Path::new(arg0).file_name())
            == Some(name)
}
