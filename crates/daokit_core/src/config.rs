//! Entity manager configuration and connection parameters.
//!
//! # Responsibility
//! - Carry the mapping driver, repository class registry and custom
//!   hydration modes into the facade and engine.
//! - Parse connection parameters from JSON.
//!
//! # Invariants
//! - The default repository class is always registered.
//! - A configuration without a mapping driver is representable, but the
//!   facade refuses to build over it.

use crate::hydration::Hydrator;
use crate::model::entity::canonical_type_name;
use crate::model::metadata::MappingDriver;
use crate::repo::factory::{RepositoryContext, RepositoryFactory};
use crate::repo::repository::Repository;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Debug, Display, Formatter};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Repository class used when metadata names no override.
pub const DEFAULT_REPOSITORY_CLASS: &str = "daokit::EntityDao";

const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// Builds a fresh hydrator for one custom hydration mode.
pub type HydratorConstructor = Arc<dyn Fn() -> Box<dyn Hydrator> + Send + Sync>;

/// Facade and engine configuration.
#[derive(Clone)]
pub struct Configuration {
    metadata_driver: Option<Arc<dyn MappingDriver>>,
    default_repository_class: String,
    repository_factory: RepositoryFactory,
    hydration_modes: BTreeMap<String, HydratorConstructor>,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            metadata_driver: None,
            default_repository_class: DEFAULT_REPOSITORY_CLASS.to_string(),
            repository_factory: RepositoryFactory::default(),
            hydration_modes: BTreeMap::new(),
        }
    }
}

impl Configuration {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_metadata_driver(self, driver: impl MappingDriver + 'static) -> Self {
        self.with_shared_metadata_driver(Arc::new(driver))
    }

    pub fn with_shared_metadata_driver(mut self, driver: Arc<dyn MappingDriver>) -> Self {
        self.metadata_driver = Some(driver);
        self
    }

    pub fn metadata_driver(&self) -> Option<&Arc<dyn MappingDriver>> {
        self.metadata_driver.as_ref()
    }

    pub fn with_default_repository_class(mut self, class_name: impl AsRef<str>) -> Self {
        self.default_repository_class = canonical_type_name(class_name.as_ref()).to_string();
        self
    }

    pub fn default_repository_class(&self) -> &str {
        &self.default_repository_class
    }

    /// Registers a repository class that metadata or the default may name.
    pub fn register_repository_class(
        mut self,
        class_name: impl AsRef<str>,
        constructor: impl Fn(RepositoryContext) -> Arc<dyn Repository> + Send + Sync + 'static,
    ) -> Self {
        self.repository_factory
            .register(class_name.as_ref(), Arc::new(constructor));
        self
    }

    pub fn repository_factory(&self) -> &RepositoryFactory {
        &self.repository_factory
    }

    /// Registers a hydrator for `HydrationMode::Custom(name)`.
    pub fn register_hydration_mode(
        mut self,
        name: impl Into<String>,
        constructor: impl Fn() -> Box<dyn Hydrator> + Send + Sync + 'static,
    ) -> Self {
        self.hydration_modes
            .insert(name.into(), Arc::new(constructor));
        self
    }

    /// Builds the custom hydrator registered under `name`, if any.
    pub fn custom_hydrator(&self, name: &str) -> Option<Box<dyn Hydrator>> {
        self.hydration_modes.get(name).map(|constructor| constructor())
    }
}

impl Debug for Configuration {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Configuration")
            .field("has_metadata_driver", &self.metadata_driver.is_some())
            .field("default_repository_class", &self.default_repository_class)
            .field("repository_classes", &self.repository_factory.class_names())
            .field(
                "hydration_modes",
                &self.hydration_modes.keys().collect::<Vec<_>>(),
            )
            .finish()
    }
}

/// Parameters for opening a connection.
///
/// All fields are optional in JSON input; a missing `path` selects an
/// in-memory database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionParams {
    pub path: Option<PathBuf>,
    pub busy_timeout_ms: u64,
    pub foreign_keys: bool,
}

impl Default for ConnectionParams {
    fn default() -> Self {
        Self {
            path: None,
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            foreign_keys: true,
        }
    }
}

impl ConnectionParams {
    /// Parameters for a database file at `path`.
    pub fn file(path: impl AsRef<Path>) -> Self {
        Self {
            path: Some(path.as_ref().to_path_buf()),
            ..Self::default()
        }
    }

    pub fn from_json_str(input: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(input).map_err(ConfigError::Parse)
    }

    /// Storage mode label used in log events.
    pub fn mode(&self) -> &'static str {
        if self.path.is_some() {
            "file"
        } else {
            "memory"
        }
    }
}

/// Configuration input errors.
#[derive(Debug)]
pub enum ConfigError {
    Parse(serde_json::Error),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Parse(err) => write!(f, "invalid connection parameters: {err}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Parse(err) => Some(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Configuration, ConnectionParams, DEFAULT_REPOSITORY_CLASS};
    use std::path::PathBuf;

    #[test]
    fn connection_params_fill_defaults_from_partial_json() {
        let params = ConnectionParams::from_json_str(r#"{"path": "/tmp/daokit.db"}"#)
            .expect("partial params should parse");
        assert_eq!(params.path, Some(PathBuf::from("/tmp/daokit.db")));
        assert_eq!(params.busy_timeout_ms, 5_000);
        assert!(params.foreign_keys);
        assert_eq!(params.mode(), "file");

        let memory = ConnectionParams::from_json_str("{}").expect("empty params should parse");
        assert_eq!(memory, ConnectionParams::default());
        assert_eq!(memory.mode(), "memory");
    }

    #[test]
    fn connection_params_reject_malformed_json() {
        let err = ConnectionParams::from_json_str(r#"{"busy_timeout_ms": "soon"}"#)
            .expect_err("string timeout must fail");
        assert!(err.to_string().contains("invalid connection parameters"));
    }

    #[test]
    fn default_configuration_registers_default_repository_class() {
        let config = Configuration::new();
        assert!(config.metadata_driver().is_none());
        assert_eq!(config.default_repository_class(), DEFAULT_REPOSITORY_CLASS);
        assert!(config.repository_factory().contains(DEFAULT_REPOSITORY_CLASS));
        assert!(config.custom_hydrator("missing").is_none());
    }
}
