//! Engine package lookup.

use std::collections::BTreeMap;
use std::path::PathBuf;

use async_trait::async_trait;

use crate::error::{OrchestratorError, Result};

/// A compute-engine package clusters are built from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Engine {
    pub name: String,
    /// Path of the package passed to the submission command.
    pub binary_path: PathBuf,
}

/// Resolves engine names to packages.
#[async_trait]
pub trait EngineRegistry: Send + Sync {
    /// Look up `name`. Unknown engines are a validation error.
    async fn get_engine(&self, name: &str) -> Result<Engine>;
}

/// Registry backed by the `[engines]` table of the configuration.
#[derive(Debug, Clone, Default)]
pub struct StaticEngineRegistry {
    engines: BTreeMap<String, PathBuf>,
}

impl StaticEngineRegistry {
    #[must_use]
    pub fn new(engines: BTreeMap<String, PathBuf>) -> Self {
        Self { engines }
    }

    /// Add or replace an engine.
    #[must_use]
    pub fn with_engine(mut self, name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        self.engines.insert(name.into(), path.into());
        self
    }
}

#[async_trait]
impl EngineRegistry for StaticEngineRegistry {
    async fn get_engine(&self, name: &str) -> Result<Engine> {
        self.engines
            .get(name)
            .map(|path| Engine {
                name: name.to_string(),
                binary_path: path.clone(),
            })
            .ok_or_else(|| OrchestratorError::Validation(format!("cannot locate engine {name}")))
    }
}
