//! Tunable dimensions and their bounds.
//!
//! A [`ParameterSpace`] is an ordered list of [`ParameterSpec`]. That order is the single
//! ordering used everywhere a parameter vector travels: proposals, the built artifact, the
//! recorded trials and the final report.
//!
//! Two sources are understood, selected by file extension in [`ParameterSpace::load`]:
//!
//! - CSV without header (`name,default,min,max[,quantum]`):
//!
//! ```text
//! PARAM_FUTILITY_MARGIN_ALPHA_OPENING,150,100,240
//! PARAM_NULL_MOVE_DYNAMIC_BETA_OPENING,67,50,100,1
//! ```
//!
//! - an annotated engine header, where a `[PARAM]` comment gives the bounds of the
//!   `PARAM_DEFINE` lines following it:
//!
//! ```text
//! // [PARAM] min:100,max:240,step:1,interval:1,time_rate:1,fixed
//! PARAM_DEFINE PARAM_FUTILITY_MARGIN_ALPHA_OPENING = 143;
//! PARAM_DEFINE PARAM_FUTILITY_MARGIN_ALPHA_ENDING = 143;
//! ```

use std::{collections::HashSet, path::Path};

use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::error::TunerError;

/// An ordered parameter vector, one value per dimension of a [`ParameterSpace`].
pub type ParameterVector = Vec<f64>;

/// A single tunable dimension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSpec {
    pub name: String,
    pub min: f64,
    pub max: f64,
    pub default: f64,
    /// Proposals are snapped to multiples of `quantum`. `1.0` for integer parameters,
    /// `0.0` for continuous ones.
    pub quantum: f64,
}

impl ParameterSpec {
    /// Creates an integer parameter, checking `min <= default <= max`.
    pub fn new(
        name: impl Into<String>,
        min: f64,
        max: f64,
        default: f64,
    ) -> Result<Self, TunerError> {
        Self::with_quantum(name, min, max, default, 1.0)
    }

    pub fn with_quantum(
        name: impl Into<String>,
        min: f64,
        max: f64,
        default: f64,
        quantum: f64,
    ) -> Result<Self, TunerError> {
        let name = name.into();
        if name.is_empty() {
            return Err(TunerError::Parse("empty parameter name".into()));
        }
        if !(min.is_finite() && max.is_finite() && default.is_finite()) {
            return Err(TunerError::Parse(format!("'{name}': bounds must be finite")));
        }
        if min > max {
            return Err(TunerError::Parse(format!(
                "'{name}': min ({min}) is greater than max ({max})"
            )));
        }
        if default < min || default > max {
            return Err(TunerError::Parse(format!(
                "'{name}': default ({default}) is outside [{min}, {max}]"
            )));
        }
        if !(quantum.is_finite() && quantum >= 0.0) {
            return Err(TunerError::Parse(format!(
                "'{name}': quantum must be a non-negative number"
            )));
        }
        Ok(ParameterSpec {
            name,
            min,
            max,
            default,
            quantum,
        })
    }

    /// Snaps `value` to the quantum grid and clamps it into `[min, max]`.
    pub fn quantize(&self, value: f64) -> f64 {
        let snapped = if self.quantum > 0.0 {
            (value / self.quantum).round() * self.quantum
        } else {
            value
        };
        snapped.clamp(self.min, self.max)
    }

    /// Value written to the engine artifact (half away from zero).
    pub fn rounded(value: f64) -> i64 {
        value.round() as i64
    }

    pub fn width(&self) -> f64 {
        self.max - self.min
    }
}

/// The ordered set of tunable dimensions.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ParameterSpace {
    specs: Vec<ParameterSpec>,
}

impl ParameterSpace {
    /// Builds a space from already-validated specs, rejecting duplicate names.
    pub fn new(specs: Vec<ParameterSpec>) -> Result<Self, TunerError> {
        let mut seen = HashSet::with_capacity(specs.len());
        for spec in &specs {
            if !seen.insert(spec.name.as_str()) {
                return Err(TunerError::Parse(format!(
                    "duplicate parameter name '{}'",
                    spec.name
                )));
            }
        }
        Ok(ParameterSpace { specs })
    }

    /// Loads a space from a file. `.h`/`.hpp` files are read as annotated engine headers,
    /// anything else as CSV.
    #[instrument]
    pub fn load(path: &Path) -> Result<Self, TunerError> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            TunerError::Parse(format!("cannot read '{}': {e}", path.display()))
        })?;
        let space = match path.extension().and_then(|e| e.to_str()) {
            Some("h") | Some("hpp") => Self::from_annotated_header(&text)?,
            _ => Self::from_csv(&text)?,
        };
        info!(dimensions = space.len(), "parameter space loaded");
        Ok(space)
    }

    /// Parses `name,default,min,max[,quantum]` rows. Blank lines and `#` comments are
    /// ignored.
    pub fn from_csv(text: &str) -> Result<Self, TunerError> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .trim(csv::Trim::All)
            .comment(Some(b'#'))
            .from_reader(text.as_bytes());

        let mut specs = Vec::new();
        for (i, record) in reader.records().enumerate() {
            let record = record.map_err(|e| TunerError::Parse(format!("row {}: {e}", i + 1)))?;
            if record.len() != 4 && record.len() != 5 {
                return Err(TunerError::Parse(format!(
                    "row {}: expected 4 or 5 fields, got {}",
                    i + 1,
                    record.len()
                )));
            }
            let number = |idx: usize, what: &str| -> Result<f64, TunerError> {
                record[idx].parse::<f64>().map_err(|_| {
                    TunerError::Parse(format!(
                        "row {}: {what} '{}' is not a number",
                        i + 1,
                        &record[idx]
                    ))
                })
            };
            let default = number(1, "default")?;
            let min = number(2, "min")?;
            let max = number(3, "max")?;
            let quantum = if record.len() == 5 {
                number(4, "quantum")?
            } else {
                1.0
            };
            specs.push(ParameterSpec::with_quantum(
                &record[0], min, max, default, quantum,
            )?);
        }
        Self::new(specs)
    }

    /// Parses `// [PARAM] min:..,max:..` annotations and the `PARAM_DEFINE` lines that
    /// follow them. Defines without a preceding annotation are not tunable and skipped.
    pub fn from_annotated_header(text: &str) -> Result<Self, TunerError> {
        let mut specs = Vec::new();
        let mut bounds: Option<(f64, f64)> = None;

        for (i, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if let Some(comment) = line.strip_prefix("//") {
                if let Some(annotation) = comment.trim().strip_prefix("[PARAM]") {
                    bounds = Some(parse_annotation(annotation).map_err(|e| {
                        TunerError::Parse(format!("line {}: {e}", i + 1))
                    })?);
                } else {
                    // a plain comment ends the group of defines sharing the annotation
                    bounds = None;
                }
                continue;
            }
            let Some(define) = line.strip_prefix("PARAM_DEFINE") else {
                continue;
            };
            let Some((min, max)) = bounds else {
                continue;
            };
            let (name, value) = parse_define(define)
                .ok_or_else(|| TunerError::Parse(format!("line {}: malformed define", i + 1)))?;
            specs.push(ParameterSpec::new(name, min, max, value)?);
        }

        Self::new(specs)
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    pub fn specs(&self) -> &[ParameterSpec] {
        &self.specs
    }

    pub fn iter(&self) -> impl Iterator<Item = &ParameterSpec> {
        self.specs.iter()
    }

    pub fn names(&self) -> Vec<String> {
        self.specs.iter().map(|s| s.name.clone()).collect()
    }

    pub fn defaults(&self) -> ParameterVector {
        self.specs.iter().map(|s| s.default).collect()
    }

    pub fn position_of(&self, name: &str) -> Option<usize> {
        self.specs.iter().position(|s| s.name == name)
    }

    /// Checks that `vector` has exactly one value per dimension.
    pub fn validate(&self, vector: &[f64]) -> Result<(), TunerError> {
        if vector.len() != self.specs.len() {
            return Err(TunerError::Strategy(format!(
                "vector has {} values, parameter space has {} dimensions",
                vector.len(),
                self.specs.len()
            )));
        }
        if let Some(pos) = vector.iter().position(|v| !v.is_finite()) {
            return Err(TunerError::Strategy(format!(
                "value for '{}' is not finite",
                self.specs[pos].name
            )));
        }
        Ok(())
    }

    /// Snaps and clamps every value of `vector` to its dimension.
    pub fn quantize(&self, vector: &[f64]) -> ParameterVector {
        self.specs
            .iter()
            .zip(vector)
            .map(|(spec, v)| spec.quantize(*v))
            .collect()
    }
}

fn parse_annotation(annotation: &str) -> Result<(f64, f64), String> {
    let mut min = None;
    let mut max = None;
    for item in annotation.split(',') {
        let Some((key, value)) = item.trim().split_once(':') else {
            continue; // flags like `fixed`
        };
        match key.trim() {
            "min" => min = value.trim().parse::<f64>().ok(),
            "max" => max = value.trim().parse::<f64>().ok(),
            _ => {}
        }
    }
    match (min, max) {
        (Some(min), Some(max)) => Ok((min, max)),
        _ => Err("[PARAM] annotation without numeric min and max".to_string()),
    }
}

fn parse_define(define: &str) -> Option<(&str, f64)> {
    let (name, value) = define.split_once('=')?;
    let name = name.trim();
    let value = value.trim().trim_end_matches(';').trim();
    if name.is_empty() || name.contains(char::is_whitespace) {
        return None;
    }
    Some((name, value.parse().ok()?))
}
