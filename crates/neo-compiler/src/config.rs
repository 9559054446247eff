//! Compiler configuration, loadable from TOML

use std::path::Path;

use neo_bytecode::Version;
use serde::{Deserialize, Serialize};

use crate::error::{CompileError, CompileResult};

/// Compiler settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilerConfig {
    /// Name written into the container's compiler field
    pub compiler_name: String,

    /// Version written into the container, `major.minor.patch[.build]`
    pub version: String,

    /// Entry function when the program does not declare one
    pub entry: Option<String>,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            compiler_name: env!("CARGO_PKG_NAME").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            entry: None,
        }
    }
}

impl CompilerConfig {
    /// Parse configuration from TOML text
    pub fn from_toml(text: &str) -> CompileResult<Self> {
        toml::from_str(text).map_err(|e| CompileError::Config(e.to_string()))
    }

    /// Load configuration from a file, falling back to defaults if it is absent
    pub fn load(path: &Path) -> CompileResult<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .map_err(|e| CompileError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml(&content)
            .map_err(|e| CompileError::Config(format!("Failed to parse {}: {e}", path.display())))
    }

    /// Parsed container version
    pub fn container_version(&self) -> Version {
        Version::parse(&self.version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CompilerConfig::default();
        assert_eq!(config.compiler_name, "neo-compiler");
        assert_eq!(config.container_version(), Version::new(0, 1, 0, 0));
        assert!(config.entry.is_none());
    }

    #[test]
    fn test_parse_config() {
        let toml = r#"
compiler_name = "contracts"
version = "3.6.2.1"
entry = "main"
"#;
        let config = CompilerConfig::from_toml(toml).unwrap();
        assert_eq!(config.compiler_name, "contracts");
        assert_eq!(config.container_version(), Version::new(3, 6, 2, 1));
        assert_eq!(config.entry.as_deref(), Some("main"));
    }

    #[test]
    fn test_partial_config_keeps_defaults() {
        let config = CompilerConfig::from_toml("version = \"2.0\"").unwrap();
        assert_eq!(config.compiler_name, "neo-compiler");
        assert_eq!(config.container_version(), Version::new(2, 0, 0, 0));
    }

    #[test]
    fn test_invalid_config() {
        assert!(matches!(
            CompilerConfig::from_toml("compiler_name = 3"),
            Err(CompileError::Config(_))
        ));
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let config = CompilerConfig::load(Path::new("/nonexistent/neo-compiler.toml")).unwrap();
        assert_eq!(config, CompilerConfig::default());
    }
}
