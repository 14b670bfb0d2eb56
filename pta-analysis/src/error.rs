use std::{io, path::PathBuf};
use thiserror::Error;

use pta_ir::IrError;

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error(transparent)]
    Ir(#[from] IrError),
    #[error("The module does not contain a function named `{0}`.")]
    MissingFunction(String),
    #[error("The context does not contain any module to analyse.")]
    NoModule,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to parse config: {}", err)]
    Deserialize { err: toml::de::Error },
    #[error("failed to read config at {:?}: {}", path, err)]
    ReadConfig { path: PathBuf, err: io::Error },
    #[error("could not find a `pta.toml` in the given directory or its parents")]
    NotFound,
}
