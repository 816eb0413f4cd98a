pub mod arborescence;
pub mod codec;
pub mod error;
pub mod features;
pub mod graph;
pub mod guide;
pub mod paths;
pub mod select;

pub use arborescence::{simplify, Simplified};
pub use codec::{Condition, Operator, Rule, CONJUNCTION};
pub use error::{CodecError, Error, Result};
pub use features::FeatureIndex;
pub use graph::{Edge, GraphExport, WeightedDiGraph};
pub use paths::{DecisionPath, DecisionTree, Forest};
pub use select::{select, SelectionConfig, SelectionResult, SolverStatus, Strategy};

use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

// --- Documents ---

/// A rule that was left out of a graph, with the reason.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SkippedRule {
    pub rule: String,
    pub kind: String,
    pub reason: String,
}

impl From<&CodecError> for SkippedRule {
    fn from(e: &CodecError) -> Self {
        Self {
            rule: e.rule().to_string(),
            kind: e.error_kind().to_string(),
            reason: e.to_string(),
        }
    }
}

/// A compiled graph together with everything needed to reproduce it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GraphDocument {
    /// Fitted feature names in index order.
    pub features: Vec<String>,
    #[serde(default)]
    pub encoded_rules: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skipped: Vec<SkippedRule>,
    pub graph: WeightedDiGraph,
}

impl GraphDocument {
    /// Encode `rules` and build their transition graph.
    ///
    /// Malformed rules are recorded in `skipped` unless `fail_fast` is set.
    /// Feature mapping errors always abort.
    pub fn compile<S: AsRef<str>>(rules: &[S], features: &[String], fail_fast: bool) -> Result<Self> {
        let index = FeatureIndex::fit(features.iter().cloned());
        let mut encoded_rules = Vec::with_capacity(rules.len());
        let mut skipped = Vec::new();

        for result in codec::encode(rules, &index) {
            match result {
                Ok(encoded) => encoded_rules.push(encoded),
                Err(e) if e.is_fatal() || fail_fast => return Err(e.into()),
                Err(e) => {
                    tracing::warn!(kind = e.error_kind(), rule = e.rule(), "skipping rule");
                    skipped.push(SkippedRule::from(&e));
                }
            }
        }

        let graph = graph::build(&encoded_rules, &index)?;
        Ok(Self {
            features: index.names().to_vec(),
            encoded_rules,
            skipped,
            graph,
        })
    }
}

// --- Storage ---

/// Overrides the data directory when set and non-empty.
pub const HOME_ENV: &str = "SIGRAPH_HOME";

/// Resolve the data directory: `$SIGRAPH_HOME`, else ~/.sigraph/.
pub fn data_dir() -> PathBuf {
    resolve_data_dir(std::env::var_os(HOME_ENV))
}

fn resolve_data_dir(home: Option<OsString>) -> PathBuf {
    match home.filter(|h| !h.is_empty()) {
        Some(dir) => PathBuf::from(dir),
        None => dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".sigraph"),
    }
}

/// Create `dir` and seed default settings unless a settings file exists.
/// Returns whether settings were written.
pub fn init_data_dir_in(dir: &Path) -> Result<bool> {
    fs::create_dir_all(dir)?;
    if dir.join("settings.json").exists() {
        return Ok(false);
    }
    write_settings_in(dir, &Settings::default())?;
    tracing::info!(dir = %dir.display(), "seeded default settings");
    Ok(true)
}

/// Graph names become file names, so they may not contain path syntax.
fn validate_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if valid {
        Ok(())
    } else {
        Err(Error::InvalidName(name.to_string()))
    }
}

fn graph_path(dir: &Path, name: &str) -> Result<PathBuf> {
    validate_name(name)?;
    Ok(dir.join(format!("{}.sig", name)))
}

/// List all graph names (without .sig extension), sorted.
pub fn list_graphs() -> Result<Vec<String>> {
    list_graphs_in(&data_dir())
}

pub fn list_graphs_in(dir: &Path) -> Result<Vec<String>> {
    if !dir.exists() {
        return Ok(vec![]);
    }
    let mut names: Vec<String> = fs::read_dir(dir)?
        .filter_map(|entry| {
            let entry = entry.ok()?;
            let name = entry.file_name().to_string_lossy().to_string();
            name.strip_suffix(".sig").map(|n| n.to_string())
        })
        .collect();
    names.sort();
    Ok(names)
}

pub fn read_graph(name: &str) -> Result<GraphDocument> {
    read_graph_in(&data_dir(), name)
}

pub fn read_graph_in(dir: &Path, name: &str) -> Result<GraphDocument> {
    let path = graph_path(dir, name)?;
    let raw = match fs::read_to_string(&path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(Error::GraphNotFound(name.to_string()))
        }
        Err(e) => return Err(e.into()),
    };
    Ok(serde_json::from_str(&raw)?)
}

/// Write a graph document.
///
/// Uses atomic write (temp file + rename) so readers never observe a
/// half-written document.
pub fn write_graph(name: &str, doc: &GraphDocument) -> Result<()> {
    write_graph_in(&data_dir(), name, doc)
}

pub fn write_graph_in(dir: &Path, name: &str, doc: &GraphDocument) -> Result<()> {
    let path = graph_path(dir, name)?;
    fs::create_dir_all(dir)?;
    let json = serde_json::to_string_pretty(doc)?;
    let tmp = dir.join(format!(".{}.sig.tmp", name));
    fs::write(&tmp, json)?;
    fs::rename(&tmp, &path)?;
    tracing::debug!(path = %path.display(), "wrote graph document");
    Ok(())
}

/// Delete a graph by name. Deleting a missing graph is not an error.
pub fn delete_graph(name: &str) -> Result<()> {
    delete_graph_in(&data_dir(), name)
}

pub fn delete_graph_in(dir: &Path, name: &str) -> Result<()> {
    let path = graph_path(dir, name)?;
    if path.exists() {
        fs::remove_file(&path)?;
    }
    Ok(())
}

/// Read rules from every file matching `pattern`, one rule per line.
/// Blank lines and lines starting with `#` are ignored. Files are read in
/// sorted path order.
pub fn read_rule_files(pattern: &str) -> Result<Vec<String>> {
    let mut paths: Vec<PathBuf> = glob::glob(pattern)?.filter_map(|p| p.ok()).collect();
    paths.sort();

    let mut rules = Vec::new();
    for path in &paths {
        let contents = fs::read_to_string(path)?;
        rules.extend(
            contents
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty() && !l.starts_with('#'))
                .map(str::to_string),
        );
    }
    tracing::debug!(files = paths.len(), rules = rules.len(), pattern, "read rule files");
    Ok(rules)
}

// --- Settings ---

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    /// Edge bound for `select_edges` when none is given.
    pub max_edges: usize,
    pub strategy: Strategy,
    /// Largest integer program the solver will attempt.
    pub max_solver_variables: Option<usize>,
    pub cluster_count: usize,
    /// "count" or "tfidf"
    pub vectorizer: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            max_edges: select::DEFAULT_MAX_EDGES,
            strategy: Strategy::TopK,
            max_solver_variables: Some(select::DEFAULT_MAX_VARIABLES),
            cluster_count: 5,
            vectorizer: "count".to_string(),
        }
    }
}

impl Settings {
    pub fn selection(&self) -> SelectionConfig {
        SelectionConfig {
            max_edges: self.max_edges,
            strategy: self.strategy,
            max_variables: self.max_solver_variables,
        }
    }
}

pub fn read_settings() -> Settings {
    read_settings_in(&data_dir())
}

pub fn read_settings_in(dir: &Path) -> Settings {
    let path = dir.join("settings.json");
    if !path.exists() {
        return Settings::default();
    }
    fs::read_to_string(&path)
        .ok()
        .and_then(|s| serde_json::from_str(&s).ok())
        .unwrap_or_default()
}

pub fn write_settings(settings: &Settings) -> Result<()> {
    write_settings_in(&data_dir(), settings)
}

pub fn write_settings_in(dir: &Path, settings: &Settings) -> Result<()> {
    fs::create_dir_all(dir)?;
    let json = serde_json::to_string_pretty(settings)?;
    fs::write(dir.join("settings.json"), json)?;
    Ok(())
}
