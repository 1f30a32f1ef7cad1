use crate::template::DEFAULT_REFERENCE_MARKER;
use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const APP_NAME: &str = "claude-template";

/// File index settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Directory names skipped while scanning for templates
    pub ignore: Vec<String>,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            ignore: vec![".git".to_string()],
        }
    }
}

/// The process the rendered prompt is handed to
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HandoffConfig {
    pub command: String,
    /// Arguments placed before the prompt
    pub args: Vec<String>,
}

impl Default for HandoffConfig {
    fn default() -> Self {
        Self {
            command: "claude".to_string(),
            args: Vec::new(),
        }
    }
}

/// Main configuration struct
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Prefix substituted in front of paths produced by `reference()`
    pub reference_marker: String,
    /// Line introducing extra instructions appended after the prompt
    pub instructions_heading: String,
    pub index: IndexConfig,
    pub handoff: HandoffConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            reference_marker: DEFAULT_REFERENCE_MARKER.to_string(),
            instructions_heading: "Additionally:".to_string(),
            index: IndexConfig::default(),
            handoff: HandoffConfig::default(),
        }
    }
}

impl Config {
    /// Get the global config file path (~/.config/claude-template/claude-template.yml)
    pub fn global_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join(APP_NAME).join(format!("{}.yml", APP_NAME)))
    }

    /// Get the local config file path (relative to work_dir)
    pub fn local_config_path(work_dir: &Path) -> PathBuf {
        work_dir.join(format!(".{}.yml", APP_NAME))
    }

    /// Load configuration with the cascade: explicit -> local -> global -> defaults
    pub fn load(config_path: Option<&PathBuf>, work_dir: &Path) -> Result<Self> {
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        let local_config = Self::local_config_path(work_dir);
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    log::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        if let Some(global_config) = Self::global_config_path()
            && global_config.exists()
        {
            match Self::load_from_file(&global_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    log::warn!("Failed to load config from {}: {}", global_config.display(), e);
                }
            }
        }

        log::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Load configuration from a file
    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;
        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;
        log::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.reference_marker, "@");
        assert_eq!(config.instructions_heading, "Additionally:");
        assert_eq!(config.index.ignore, vec![".git"]);
        assert_eq!(config.handoff.command, "claude");
        assert!(config.handoff.args.is_empty());
    }

    #[test]
    fn test_load_from_yaml() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("test-config.yml");

        let yaml = r#"
reference_marker: "file://"
instructions_heading: "Also:"

index:
  ignore: [".git", "target", "node_modules"]

handoff:
  command: "claude"
  args: ["--model", "opus"]
"#;

        let mut file = fs::File::create(&config_path).unwrap();
        file.write_all(yaml.as_bytes()).unwrap();

        let config = Config::load_from_file(&config_path).unwrap();
        assert_eq!(config.reference_marker, "file://");
        assert_eq!(config.instructions_heading, "Also:");
        assert_eq!(config.index.ignore.len(), 3);
        assert_eq!(config.handoff.args, vec!["--model", "opus"]);
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("partial.yml");
        fs::write(&config_path, "handoff:\n  args: [\"--verbose\"]\n").unwrap();

        let config = Config::load_from_file(&config_path).unwrap();
        assert_eq!(config.reference_marker, "@");
        assert_eq!(config.handoff.command, "claude");
        assert_eq!(config.handoff.args, vec!["--verbose"]);
    }

    #[test]
    fn test_local_config_is_preferred() {
        let dir = tempdir().unwrap();
        fs::write(Config::local_config_path(dir.path()), "reference_marker: \"#\"\n").unwrap();

        let config = Config::load(None, dir.path()).unwrap();
        assert_eq!(config.reference_marker, "#");
    }

    #[test]
    fn test_explicit_missing_config_is_error() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("nope.yml");
        assert!(Config::load(Some(&missing), dir.path()).is_err());
    }
}
