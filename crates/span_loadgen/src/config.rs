//! Scenario configuration files.
//!
//! A scenario file is JSON and lists scenarios either as an array of named
//! entries:
//!
//! ```json
//! { "scenarios": [
//!     { "name": "Baseline", "spans_per_second": 100, "duration_seconds": 60 },
//!     { "name": "Spike", "phases": [
//!         { "spans_per_second": 100, "duration_seconds": 30 },
//!         { "spans_per_second": 2000, "duration_seconds": 10, "batch_size": 50 }
//!     ] }
//! ] }
//! ```
//!
//! or as a map keyed by scenario name. `batch_size` and `concurrency` may be
//! omitted per phase; they are then taken from [`PhaseOverrides`] or the
//! defaults.

use crate::error::{LoadError, PhaseError};
use crate::phase::{Phase, Scenario};
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::path::Path;

/// Batch size used when neither the phase nor the command line sets one.
pub const DEFAULT_BATCH_SIZE: usize = 1;
/// Worker count used when neither the phase nor the command line sets one.
pub const DEFAULT_CONCURRENCY: usize = 10;

/// Raw phase fields as written in the file.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct PhaseSpec {
    #[serde(default)]
    pub spans_per_second: Option<f64>,
    #[serde(default)]
    pub duration_seconds: Option<f64>,
    #[serde(default)]
    pub batch_size: Option<i64>,
    #[serde(default)]
    pub concurrency: Option<i64>,
}

/// Body of one scenario: either inline phase fields or a `phases` list.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ScenarioBody {
    #[serde(default)]
    pub phases: Option<Vec<PhaseSpec>>,
    #[serde(flatten)]
    pub single: PhaseSpec,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NamedScenario {
    pub name: String,
    #[serde(flatten)]
    pub body: ScenarioBody,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ScenarioList {
    List(Vec<NamedScenario>),
    Map(BTreeMap<String, ScenarioBody>),
}

#[derive(Debug, Deserialize)]
struct ScenarioFile {
    scenarios: ScenarioList,
}

/// Values that take precedence over the file's `batch_size`/`concurrency`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PhaseOverrides {
    pub batch_size: Option<usize>,
    pub concurrency: Option<usize>,
}

/// All scenarios loaded from a file, in file order.
#[derive(Debug, Clone, PartialEq)]
pub struct ScenarioCatalog {
    scenarios: Vec<NamedScenario>,
}

impl ScenarioCatalog {
    /// Reads and parses a scenario file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, LoadError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text).map_err(|e| match e {
            LoadError::Parse { source, .. } => LoadError::Parse {
                path: path.to_path_buf(),
                source,
            },
            other => other,
        })
    }

    /// Parses scenario JSON. Parse errors carry an empty path.
    pub fn from_json(text: &str) -> Result<Self, LoadError> {
        let file: ScenarioFile = serde_json::from_str(text).map_err(|source| LoadError::Parse {
            path: Default::default(),
            source,
        })?;

        let scenarios = match file.scenarios {
            ScenarioList::List(list) => list,
            ScenarioList::Map(map) => map
                .into_iter()
                .map(|(name, body)| NamedScenario { name, body })
                .collect(),
        };

        let mut seen = HashSet::new();
        for scenario in &scenarios {
            if !seen.insert(scenario.name.as_str()) {
                return Err(LoadError::DuplicateScenario(scenario.name.clone()));
            }
        }

        Ok(Self { scenarios })
    }

    /// Scenario names, in file order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.scenarios.iter().map(|s| s.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.scenarios.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scenarios.is_empty()
    }

    /// Resolves `name` into a runnable scenario.
    ///
    /// Per field, `overrides` win over the file, which wins over the
    /// defaults. Rate and duration have no default.
    pub fn scenario(&self, name: &str, overrides: &PhaseOverrides) -> Result<Scenario, LoadError> {
        let entry = self
            .scenarios
            .iter()
            .find(|s| s.name == name)
            .ok_or_else(|| LoadError::ScenarioNotFound(name.to_string()))?;

        let specs: Vec<&PhaseSpec> = match &entry.body.phases {
            Some(phases) => phases.iter().collect(),
            None => vec![&entry.body.single],
        };
        if specs.is_empty() {
            return Err(LoadError::InvalidPhaseConfig {
                phase: 0,
                source: PhaseError::NoPhases,
            });
        }

        let phases = specs
            .into_iter()
            .enumerate()
            .map(|(phase, spec)| {
                resolve_phase(spec, overrides).map_err(|source| LoadError::InvalidPhaseConfig { phase, source })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Scenario::new(name, phases))
    }
}

fn resolve_phase(spec: &PhaseSpec, overrides: &PhaseOverrides) -> Result<Phase, PhaseError> {
    let rate = spec
        .spans_per_second
        .ok_or(PhaseError::MissingField("spans_per_second"))?;
    let duration = spec
        .duration_seconds
        .ok_or(PhaseError::MissingField("duration_seconds"))?;

    let batch_size = match overrides.batch_size {
        Some(size) => size,
        None => positive(spec.batch_size, DEFAULT_BATCH_SIZE, PhaseError::NonPositiveBatchSize)?,
    };
    let concurrency = match overrides.concurrency {
        Some(workers) => workers,
        None => positive(spec.concurrency, DEFAULT_CONCURRENCY, PhaseError::NonPositiveConcurrency)?,
    };

    let phase = Phase::new(rate, duration, batch_size, concurrency);
    phase.validate()?;
    Ok(phase)
}

fn positive(value: Option<i64>, default: usize, err: fn(i64) -> PhaseError) -> Result<usize, PhaseError> {
    match value {
        None => Ok(default),
        Some(v) if v > 0 => usize::try_from(v).map_err(|_| err(v)),
        Some(v) => Err(err(v)),
    }
}
