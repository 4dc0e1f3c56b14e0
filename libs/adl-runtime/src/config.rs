use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::RegistryError;

/// Declaration registry configuration — parsed from TOML.
///
/// ```toml
/// base_dir = "adl/ast"
/// modules = ["sys.types.json", "demo.sensors.json"]
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RegistryConfig {
    /// Directory that relative module paths are resolved against.
    #[serde(default)]
    pub base_dir: Option<PathBuf>,

    /// ADL JSON AST files, one module each.
    #[serde(default)]
    pub modules: Vec<PathBuf>,
}

impl RegistryConfig {
    /// Load configuration from a TOML file.
    ///
    /// A missing `base_dir` defaults to the file's own directory.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, RegistryError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| RegistryError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config =
            Self::parse(&content).map_err(|e| e.with_context(path.display()))?;
        if config.base_dir.is_none() {
            config.base_dir = path.parent().map(Path::to_path_buf);
        }
        Ok(config)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(toml_str: &str) -> Result<Self, RegistryError> {
        toml::from_str(toml_str).map_err(|e| RegistryError::Config(e.to_string()))
    }

    /// Module paths with `base_dir` applied to the relative ones.
    pub fn module_paths(&self) -> Vec<PathBuf> {
        self.modules
            .iter()
            .map(|m| match &self.base_dir {
                Some(base) if m.is_relative() => base.join(m),
                _ => m.clone(),
            })
            .collect()
    }
}
