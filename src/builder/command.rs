use std::{
    fs,
    path::{Path, PathBuf},
    process::{Command, Stdio},
};

use tracing::{error, info, instrument};

use crate::{error::TunerError, parameter_space::ParameterSpace};

use super::{define_file::write_synced, Builder, DefineFileBuilder};

/// Writes the parameter file, then runs a build command (e.g. `make -j4 native`) so the
/// engine binary picks the new values up. The command's combined output is kept in a log
/// file next to the parameter file.
///
/// IDE builds leave the binary in their own output directory: [`CommandBuilder::with_copy`]
/// copies it to where the match program expects the candidate engine, and
/// [`CommandBuilder::with_header_reset`] empties the parameter file once the binary is built
/// so the source tree is left with the default values.
#[derive(Debug, Clone)]
pub struct CommandBuilder {
    params: DefineFileBuilder,
    build_command: Vec<String>,
    clean_command: Option<Vec<String>>,
    working_dir: Option<PathBuf>,
    log_path: PathBuf,
    copy: Option<(PathBuf, PathBuf)>,
    reset_header: bool,
}

impl CommandBuilder {
    /// `build_command` is the program followed by its arguments.
    pub fn new(params: DefineFileBuilder, build_command: Vec<String>) -> Self {
        let log_path = params.path().with_file_name("make-native.txt");
        CommandBuilder {
            params,
            build_command,
            clean_command: None,
            working_dir: None,
            log_path,
            copy: None,
            reset_header: false,
        }
    }

    /// Copy the built binary `from` to `to` after every successful build.
    pub fn with_copy(mut self, from: impl Into<PathBuf>, to: impl Into<PathBuf>) -> Self {
        self.copy = Some((from.into(), to.into()));
        self
    }

    /// Rewrite the parameter file without any define once the build is done.
    pub fn with_header_reset(mut self, value: bool) -> Self {
        self.reset_header = value;
        self
    }

    pub fn with_clean_command(mut self, command: Vec<String>) -> Self {
        self.clean_command = Some(command);
        self
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn with_log_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_path = path.into();
        self
    }

    fn run(&self, command: &[String], log_path: &Path) -> Result<(), TunerError> {
        let Some((program, args)) = command.split_first() else {
            return Err(TunerError::Build("empty build command".into()));
        };

        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }

        let output = cmd
            .output()
            .map_err(|e| TunerError::Build(format!("could not launch command '{program}': {e}")))?;
        let result = String::from_utf8_lossy(&output.stdout).into_owned()
            + "\n"
            + &String::from_utf8_lossy(&output.stderr);

        if let Err(e) = write_synced(log_path, result.as_bytes()) {
            // the log is informative only
            error!("could not write build log '{}': {e}", log_path.display());
        }

        if output.status.success() {
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stderr = stderr.trim();
            error!("build error: {stderr}");
            Err(TunerError::Build(format!(
                "'{}' exited with {}: {}",
                command.join(" "),
                output.status,
                stderr.lines().next().unwrap_or_default()
            )))
        }
    }
}

impl Builder for CommandBuilder {
    #[instrument(skip(self))]
    fn clean(&mut self) -> Result<(), TunerError> {
        self.params.clean()?;
        if let Some(command) = &self.clean_command {
            let log_path = self.log_path.with_file_name("make-clean.txt");
            self.run(command, &log_path)?;
        }
        Ok(())
    }

    #[instrument(skip_all)]
    fn build(&mut self, space: &ParameterSpace, vector: &[f64]) -> Result<(), TunerError> {
        self.params.build(space, vector)?;
        info!(command = ?self.build_command, "building engine");
        self.run(&self.build_command, &self.log_path)?;

        if let Some((from, to)) = &self.copy {
            copy_binary(from, to)?;
            info!(from = %from.display(), to = %to.display(), "engine binary copied");
        }
        if self.reset_header {
            self.params.reset()?;
        }
        Ok(())
    }
}

fn copy_binary(from: &Path, to: &Path) -> Result<(), TunerError> {
    if let Some(parent) = to.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| {
            TunerError::Build(format!("cannot create '{}': {e}", parent.display()))
        })?;
    }
    fs::copy(from, to).map_err(|e| {
        TunerError::Build(format!(
            "cannot copy '{}' to '{}': {e}",
            from.display(),
            to.display()
        ))
    })?;
    Ok(())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> Vec<String> {
        vec!["sh".into(), "-c".into(), script.into()]
    }

    #[test]
    fn build_runs_after_parameter_file_is_written() {
        let dir = tempfile::tempdir().unwrap();
        let params = DefineFileBuilder::new(dir.path().join("parameters_slave.h"));
        let mut builder = CommandBuilder::new(params, sh("cat parameters_slave.h > copied.h"))
            .with_working_dir(dir.path());
        let space = ParameterSpace::from_csv("A,5,0,10\n").unwrap();

        builder.clean().unwrap();
        builder.build(&space, &[4.0]).unwrap();

        let copied = std::fs::read_to_string(dir.path().join("copied.h")).unwrap();
        assert!(copied.contains("PARAM_DEFINE A = 4;"));
        assert!(dir.path().join("make-native.txt").exists());
    }

    #[test]
    fn failing_build_command_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let params = DefineFileBuilder::new(dir.path().join("parameters_slave.h"));
        let mut builder = CommandBuilder::new(params, sh("echo broken >&2; exit 2"))
            .with_working_dir(dir.path());
        let space = ParameterSpace::from_csv("A,5,0,10\n").unwrap();

        let err = builder.build(&space, &[4.0]).unwrap_err();
        assert!(matches!(err, TunerError::Build(_)));
        assert!(err.to_string().contains("broken"));
    }

    #[test]
    fn built_binary_is_copied_and_header_reset() {
        let dir = tempfile::tempdir().unwrap();
        let header = dir.path().join("builder_generated.hpp");
        let params = DefineFileBuilder::new(&header);
        let mut builder = CommandBuilder::new(
            params,
            sh("mkdir -p x64/Release && cp builder_generated.hpp x64/Release/engine.exe"),
        )
        .with_working_dir(dir.path())
        .with_copy(
            dir.path().join("x64/Release/engine.exe"),
            dir.path().join("bin/engine-modified.exe"),
        )
        .with_header_reset(true);
        let space = ParameterSpace::from_csv("A,5,0,10\n").unwrap();

        builder.build(&space, &[7.0]).unwrap();

        let copied =
            std::fs::read_to_string(dir.path().join("bin/engine-modified.exe")).unwrap();
        assert!(copied.contains("PARAM_DEFINE A = 7;"));
        let reset = std::fs::read_to_string(&header).unwrap();
        assert!(reset.contains("// this file was automatically generated."));
        assert!(!reset.contains("PARAM_DEFINE"));
    }

    #[test]
    fn missing_build_output_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let params = DefineFileBuilder::new(dir.path().join("parameters_slave.h"));
        let mut builder = CommandBuilder::new(params, sh("true"))
            .with_working_dir(dir.path())
            .with_copy(dir.path().join("never-built"), dir.path().join("engine"));
        let space = ParameterSpace::from_csv("A,5,0,10\n").unwrap();

        let err = builder.build(&space, &[1.0]).unwrap_err();
        assert!(matches!(err, TunerError::Build(_)));
        assert!(err.to_string().contains("never-built"));
    }

    #[test]
    fn clean_command_runs_on_clean() {
        let dir = tempfile::tempdir().unwrap();
        let params = DefineFileBuilder::new(dir.path().join("parameters_slave.h"));
        let mut builder = CommandBuilder::new(params, sh("true"))
            .with_clean_command(sh("touch cleaned"))
            .with_working_dir(dir.path());
        builder.clean().unwrap();
        assert!(dir.path().join("cleaned").exists());
        assert!(dir.path().join("make-clean.txt").exists());
    }
}
