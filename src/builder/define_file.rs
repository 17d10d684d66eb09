use std::{
    fs::{self, File},
    io::{ErrorKind, Write},
    path::{Path, PathBuf},
};

use time::OffsetDateTime;
use tracing::{debug, instrument};

use crate::{
    error::TunerError,
    history::format_timestamp,
    parameter_space::{ParameterSpace, ParameterSpec},
    progress::bounds_bar,
};

use super::Builder;

/// Keyword the engine's parameter header uses for tunable values.
pub const DEFAULT_KEYWORD: &str = "PARAM_DEFINE";

/// Writes a flat definition file:
///
/// ```text
/// #ifndef __PARAMETERS_SLAVE_H__
/// #define __PARAMETERS_SLAVE_H__
/// // this file was automatically generated.
/// PARAM_DEFINE PARAM_FUTILITY_MARGIN_ALPHA_OPENING = 143;
/// ...
/// #endif // __PARAMETERS_SLAVE_H__
/// ```
///
/// The output only depends on the parameter order and the vector.
#[derive(Debug, Clone)]
pub struct DefineFileBuilder {
    path: PathBuf,
    keyword: String,
}

impl DefineFileBuilder {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        DefineFileBuilder {
            path: path.into(),
            keyword: DEFAULT_KEYWORD.to_string(),
        }
    }

    pub fn with_keyword(mut self, keyword: impl Into<String>) -> Self {
        self.keyword = keyword.into();
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn render(&self, space: &ParameterSpace, vector: &[f64]) -> String {
        let guard = include_guard(&self.path);
        let mut text = format!(
            "#ifndef {guard}\n#define {guard}\n// this file was automatically generated.\n"
        );
        for (spec, value) in space.iter().zip(vector) {
            text.push_str(&format!(
                "{} {} = {};\n",
                self.keyword,
                spec.name,
                ParameterSpec::rounded(*value)
            ));
        }
        text.push_str(&format!("#endif // {guard}\n"));
        text
    }

    /// Rewrites the file with the generated marker only, so the engine falls back to its
    /// default values.
    pub fn reset(&self) -> Result<(), TunerError> {
        let text = self.render(&ParameterSpace::default(), &[]);
        write_synced(&self.path, text.as_bytes()).map_err(|e| {
            TunerError::Build(format!("cannot reset '{}': {e}", self.path.display()))
        })
    }
}

impl Builder for DefineFileBuilder {
    #[instrument(skip(self), fields(path = %self.path.display()))]
    fn clean(&mut self) -> Result<(), TunerError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(TunerError::Build(format!(
                "cannot remove '{}': {e}",
                self.path.display()
            ))),
        }
    }

    #[instrument(skip_all, fields(path = %self.path.display()))]
    fn build(&mut self, space: &ParameterSpace, vector: &[f64]) -> Result<(), TunerError> {
        space.validate(vector)?;
        let text = self.render(space, vector);
        write_synced(&self.path, text.as_bytes()).map_err(|e| {
            TunerError::Build(format!("cannot write '{}': {e}", self.path.display()))
        })?;
        debug!(bytes = text.len(), "parameter file written");
        Ok(())
    }
}

/// Renders the best vector as an annotated engine header, one bounds bar per parameter.
pub fn render_best_header(
    space: &ParameterSpace,
    vector: &[f64],
    guard_source: &Path,
    provenance: &[(String, String)],
) -> String {
    let guard = include_guard(guard_source);
    let mut text = format!("#ifndef {guard}\n#define {guard}\n");
    text.push_str(&format!(
        "// Created at: {}\n",
        format_timestamp(OffsetDateTime::now_utc())
    ));
    for (key, value) in provenance {
        text.push_str(&format!("// {key}: {value}\n"));
    }
    text.push('\n');
    for (spec, raw) in space.iter().zip(vector) {
        let rounded = ParameterSpec::rounded(*raw);
        text.push_str(&format!(
            "// {} raw={}, min={}, max={} default={}\n",
            bounds_bar(rounded as f64, spec, 20),
            raw,
            spec.min,
            spec.max,
            spec.default
        ));
        text.push_str(&format!("{DEFAULT_KEYWORD} {} = {};\n\n", spec.name, rounded));
    }
    text.push_str(&format!("#endif // {guard}\n"));
    text
}

pub(crate) fn write_synced(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let mut file = File::create(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}

fn include_guard(path: &Path) -> String {
    let base = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "parameters".to_string());
    let upper = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect::<String>();
    format!("__{upper}__")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn space() -> ParameterSpace {
        ParameterSpace::from_csv("B,5,0,10\nA,2,-5,5\n").unwrap()
    }

    #[test]
    fn render_follows_space_order_and_rounds() {
        let builder = DefineFileBuilder::new("param/parameters_slave.h");
        let text = builder.render(&space(), &[2.5, -2.5]);
        assert_eq!(
            text,
            "#ifndef __PARAMETERS_SLAVE_H__\n\
             #define __PARAMETERS_SLAVE_H__\n\
             // this file was automatically generated.\n\
             PARAM_DEFINE B = 3;\n\
             PARAM_DEFINE A = -3;\n\
             #endif // __PARAMETERS_SLAVE_H__\n"
        );
    }

    #[test]
    fn build_is_deterministic_and_clean_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("param").join("parameters_slave.h");
        let mut builder = DefineFileBuilder::new(&path).with_keyword("DEFINE");

        builder.clean().unwrap();
        builder.build(&space(), &[7.0, 1.0]).unwrap();
        let first = fs::read_to_string(&path).unwrap();
        assert!(first.contains("DEFINE B = 7;\nDEFINE A = 1;\n"));

        builder.clean().unwrap();
        assert!(!path.exists());
        builder.clean().unwrap();

        builder.build(&space(), &[7.0, 1.0]).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), first);
    }

    #[test]
    fn build_rejects_wrong_length() {
        let dir = tempfile::tempdir().unwrap();
        let mut builder = DefineFileBuilder::new(dir.path().join("p.h"));
        assert!(builder.build(&space(), &[1.0]).is_err());
    }

    #[test]
    fn unwritable_target_is_a_build_error() {
        let dir = tempfile::tempdir().unwrap();
        // a directory where the file should be
        let path = dir.path().join("taken");
        fs::create_dir(&path).unwrap();
        let mut builder = DefineFileBuilder::new(&path);
        assert!(matches!(
            builder.build(&space(), &[1.0, 1.0]),
            Err(TunerError::Build(_))
        ));
    }

    #[test]
    fn best_header_carries_bounds_and_provenance() {
        let text = render_best_header(
            &space(),
            &[6.999999995, 2.0],
            Path::new("parameters_generated.hpp"),
            &[("Log".to_string(), "engine-tuner.state.json".to_string())],
        );
        assert!(text.starts_with("#ifndef __PARAMETERS_GENERATED_HPP__\n"));
        assert!(text.contains("// Log: engine-tuner.state.json\n"));
        assert!(text.contains("raw=6.999999995, min=0, max=10 default=5\nPARAM_DEFINE B = 7;\n"));
        assert!(text.contains("PARAM_DEFINE A = 2;"));
    }
}
