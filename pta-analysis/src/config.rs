//! Analysis configuration, read from an optional `pta.toml`.
//!
//! ```toml
//! [points_to]
//! allocators = ["malloc", "calloc", "realloc", "xmalloc"]
//! ignored_callees = ["printf"]
//!
//! [report]
//! include_unlocated = true
//! ```

use std::path::{Path, PathBuf};

use pta_tracing::println_yellow_err;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub const CONFIG_FILE_NAME: &str = "pta.toml";

/// Functions whose calls mint a fresh heap location unless configured otherwise.
pub const DEFAULT_ALLOCATORS: [&str; 3] = ["malloc", "calloc", "realloc"];

/// A finalized analysis config.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct AnalysisConfig {
    pub points_to: PointsTo,
    pub report: Report,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PointsTo {
    /// Callees which return a pointer to fresh heap memory.
    pub allocators: Vec<String>,
    /// Callees never recorded in the call graph.  Intrinsics are always ignored.
    pub ignored_callees: Vec<String>,
}

impl Default for PointsTo {
    fn default() -> Self {
        Self {
            allocators: DEFAULT_ALLOCATORS.iter().map(|s| s.to_string()).collect(),
            ignored_callees: Vec::new(),
        }
    }
}

impl PointsTo {
    pub fn from_opts(opts: &PointsToOptions) -> Self {
        let default = Self::default();
        Self {
            allocators: opts.allocators.clone().unwrap_or(default.allocators),
            ignored_callees: opts
                .ignored_callees
                .clone()
                .unwrap_or(default.ignored_callees),
        }
    }

    pub fn is_allocator(&self, name: &str) -> bool {
        self.allocators.iter().any(|alloc| alloc == name)
    }

    pub fn is_ignored(&self, name: &str) -> bool {
        self.ignored_callees.iter().any(|ignored| ignored == name)
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Report {
    /// Report call sites without a source line under line 0.
    pub include_unlocated: bool,
}

impl Report {
    pub fn from_opts(opts: &ReportOptions) -> Self {
        Self {
            include_unlocated: opts
                .include_unlocated
                .unwrap_or(Self::default().include_unlocated),
        }
    }
}

/// A direct mapping to an optional `pta.toml`.
#[derive(Serialize, Deserialize, Debug, Default, Clone)]
#[serde(rename_all = "snake_case")]
pub struct ConfigOptions {
    pub points_to: Option<PointsToOptions>,
    pub report: Option<ReportOptions>,
}

#[derive(Serialize, Deserialize, Debug, Default, Clone)]
#[serde(rename_all = "snake_case")]
pub struct PointsToOptions {
    pub allocators: Option<Vec<String>>,
    pub ignored_callees: Option<Vec<String>>,
}

#[derive(Serialize, Deserialize, Debug, Default, Clone)]
#[serde(rename_all = "snake_case")]
pub struct ReportOptions {
    pub include_unlocated: Option<bool>,
}

impl AnalysisConfig {
    /// Construct the set of configuration to be used from the given set of options.
    pub fn from_opts(opts: ConfigOptions) -> Self {
        Self {
            points_to: opts
                .points_to
                .as_ref()
                .map(PointsTo::from_opts)
                .unwrap_or_default(),
            report: opts
                .report
                .as_ref()
                .map(Report::from_opts)
                .unwrap_or_default(),
        }
    }

    /// Read the config from the `pta.toml` closest to `dir`, falling back to the defaults when
    /// there is none.
    pub fn from_dir(dir: &Path) -> Result<Self, ConfigError> {
        match ConfigOptions::from_dir(dir) {
            Ok(config_opts) => Ok(Self::from_opts(config_opts)),
            Err(ConfigError::NotFound) => Ok(Self::default()),
            Err(e) => Err(e),
        }
    }

    pub fn from_file(config_path: PathBuf) -> Result<Self, ConfigError> {
        ConfigOptions::from_file(config_path).map(Self::from_opts)
    }
}

impl ConfigOptions {
    /// Parse `ConfigOptions` from the contents of a `pta.toml`.
    ///
    /// Unknown fields are reported and otherwise ignored.
    pub fn from_toml_str(config_str: &str) -> Result<Self, ConfigError> {
        let toml_de = toml::de::Deserializer::new(config_str);
        let config_opts: Self = serde_ignored::deserialize(toml_de, |field| {
            let warning = format!("  WARNING! found unusable configuration: {field}");
            println_yellow_err(&warning);
        })
        .map_err(|e| ConfigError::Deserialize { err: (e) })?;
        Ok(config_opts)
    }

    /// Given a path to a `pta.toml`, read and construct the `ConfigOptions`.
    pub fn from_file(config_path: PathBuf) -> Result<Self, ConfigError> {
        let config_str =
            std::fs::read_to_string(&config_path).map_err(|e| ConfigError::ReadConfig {
                path: config_path,
                err: e,
            })?;
        Self::from_toml_str(&config_str)
    }

    /// Given a directory, search it and its parents for a `pta.toml` and read it.
    pub fn from_dir(dir: &Path) -> Result<Self, ConfigError> {
        let config_dir =
            find_parent_dir_with_file(dir, CONFIG_FILE_NAME).ok_or(ConfigError::NotFound)?;
        Self::from_file(config_dir.join(CONFIG_FILE_NAME))
    }
}

/// Continually go up in the file tree until a specified file is found.
fn find_parent_dir_with_file(starter_path: &Path, file_name: &str) -> Option<PathBuf> {
    let mut path = std::fs::canonicalize(starter_path).ok()?;
    loop {
        path.push(file_name);
        if path.exists() {
            path.pop();
            return Some(path);
        }
        path.pop();
        if !path.pop() {
            return None;
        }
    }
}
