//! Settings parser for loading provider settings.
//!
//! Settings come from a YAML file, then environment variables override
//! individual values. A `.env` file can seed the environment first.

use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::{ConfigError, Result};
use crate::tags::Tags;

use super::settings::ProviderSettings;

/// Overrides the region.
pub const ENV_REGION: &str = "LATTICE_REGION";

/// Overrides the local state file path.
pub const ENV_STATE_PATH: &str = "LATTICE_STATE_PATH";

/// Replaces the default tags, formatted as `key=value,key=value`.
pub const ENV_DEFAULT_TAGS: &str = "LATTICE_DEFAULT_TAGS";

/// Parser for provider settings.
#[derive(Debug, Default)]
pub struct SettingsParser {
    /// Base path for resolving the `.env` file.
    base_path: Option<PathBuf>,
}

impl SettingsParser {
    /// Creates a new settings parser.
    #[must_use]
    pub const fn new() -> Self {
        Self { base_path: None }
    }

    /// Sets the base path for resolving the `.env` file.
    #[must_use]
    pub fn with_base_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.base_path = Some(path.into());
        self
    }

    /// Loads settings from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn load_file(&self, path: impl AsRef<Path>) -> Result<ProviderSettings> {
        let path = path.as_ref();
        info!("Loading settings from: {}", path.display());

        if !path.exists() {
            return Err(ConfigError::FileNotFound {
                path: path.to_path_buf(),
            }
            .into());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ParseError {
            message: format!("Failed to read file: {e}"),
            location: Some(path.display().to_string()),
        })?;

        self.parse_yaml(&content, Some(path))
    }

    /// Parses settings from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML is invalid or the settings fail validation.
    pub fn parse_yaml(&self, content: &str, source: Option<&Path>) -> Result<ProviderSettings> {
        debug!("Parsing YAML settings");

        // An empty document means all defaults.
        if content.trim().is_empty() {
            return Ok(ProviderSettings::default());
        }

        let settings: ProviderSettings =
            serde_yaml::from_str(content).map_err(|e| ConfigError::ParseError {
                message: format!("YAML parse error: {e}"),
                location: source.map(|p| p.display().to_string()),
            })?;

        settings.validate()?;
        Ok(settings)
    }

    /// Loads settings with environment variable overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be loaded or an override is malformed.
    pub fn load_with_env(&self, path: impl AsRef<Path>) -> Result<ProviderSettings> {
        let mut settings = self.load_file(path)?;
        Self::apply_env_overrides(&mut settings, |name| std::env::var(name).ok())?;
        settings.validate()?;
        Ok(settings)
    }

    /// Applies overrides looked up through `lookup`.
    fn apply_env_overrides(
        settings: &mut ProviderSettings,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<()> {
        if let Some(region) = lookup(ENV_REGION) {
            debug!("Overriding region from environment");
            settings.region = Some(region);
        }

        if let Some(path) = lookup(ENV_STATE_PATH) {
            debug!("Overriding state.path from environment");
            settings.state.path = Some(PathBuf::from(path));
        }

        if let Some(raw) = lookup(ENV_DEFAULT_TAGS) {
            debug!("Overriding default_tags from environment");
            settings.default_tags = parse_tag_list(ENV_DEFAULT_TAGS, &raw)?;
        }

        Ok(())
    }

    /// Loads the .env file if present.
    ///
    /// # Errors
    ///
    /// Returns an error if the .env file exists but cannot be loaded.
    pub fn load_dotenv(&self) -> Result<()> {
        let env_path = self
            .base_path
            .as_ref()
            .map_or_else(|| PathBuf::from(".env"), |p| p.join(".env"));

        if env_path.exists() {
            info!("Loading environment from: {}", env_path.display());
            dotenvy::from_path(&env_path).map_err(|e| ConfigError::ParseError {
                message: format!("Failed to load .env file: {e}"),
                location: Some(env_path.display().to_string()),
            })?;
        } else {
            debug!(".env file not found at: {}", env_path.display());
        }

        Ok(())
    }
}

/// Parses `key=value,key=value`. Blank entries are skipped.
fn parse_tag_list(name: &str, raw: &str) -> Result<Tags> {
    let mut tags = Tags::new();

    for entry in raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let Some((key, value)) = entry.split_once('=') else {
            return Err(ConfigError::InvalidEnvVar {
                name: name.to_string(),
                message: format!("expected key=value, got '{entry}'"),
            }
            .into());
        };

        let key = key.trim();
        if key.is_empty() {
            return Err(ConfigError::InvalidEnvVar {
                name: name.to_string(),
                message: format!("empty tag key in '{entry}'"),
            }
            .into());
        }

        tags.insert(key.to_string(), value.trim().to_string());
    }

    Ok(tags)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderError;
    use std::collections::HashMap;
    use std::time::Duration;
    use tempfile::TempDir;

    #[test]
    fn test_parse_minimal_settings() {
        let parser = SettingsParser::new();
        let settings = parser.parse_yaml("region: us-west-2\n", None).expect("valid");

        assert_eq!(settings.region.as_deref(), Some("us-west-2"));
        assert!(settings.default_tags.is_empty());
        assert_eq!(settings.timeouts.update(), Duration::from_secs(1200));
        assert!((settings.wait.jitter - 0.25).abs() < f64::EPSILON);
    }

    #[test]
    fn test_parse_full_settings() {
        let yaml = r#"
region: eu-west-1
default_tags:
  team: networking
  env: prod
ignore_tags:
  keys: [owner]
  key_prefixes: ["kubernetes.io/"]
timeouts:
  create_secs: 600
  delete_secs: 300
wait:
  initial_delay_ms: 250
  max_delay_ms: 5000
  jitter: 0.1
state:
  path: /var/lib/lattice/state.json
"#;
        let settings = SettingsParser::new()
            .parse_yaml(yaml, None)
            .expect("valid settings");

        assert_eq!(settings.default_tags.len(), 2);
        assert!(settings.ignore_tags.keys.contains("owner"));
        assert_eq!(settings.timeouts.create_secs, 600);
        assert_eq!(settings.timeouts.update_secs, 1200);
        assert_eq!(settings.wait_config().initial_delay, Duration::from_millis(250));
        assert_eq!(
            settings.state.path,
            Some(PathBuf::from("/var/lib/lattice/state.json"))
        );
    }

    #[test]
    fn test_parse_empty_is_default() {
        let settings = SettingsParser::new().parse_yaml("  \n", None).expect("defaults");
        assert_eq!(settings, ProviderSettings::default());
    }

    #[test]
    fn test_parse_rejects_invalid_values() {
        let err = SettingsParser::new()
            .parse_yaml("wait:\n  jitter: 2.0\n", None)
            .expect_err("jitter out of range");
        assert!(matches!(err, ProviderError::Config(ConfigError::ValidationError { .. })));

        let err = SettingsParser::new()
            .parse_yaml("timeouts: soon\n", Some(Path::new("settings.yaml")))
            .expect_err("wrong shape");
        assert!(matches!(
            err,
            ProviderError::Config(ConfigError::ParseError { location: Some(_), .. })
        ));
    }

    #[test]
    fn test_load_file_missing() {
        let err = SettingsParser::new()
            .load_file("/nonexistent/settings.yaml")
            .expect_err("missing");
        assert!(matches!(err, ProviderError::Config(ConfigError::FileNotFound { .. })));
    }

    #[test]
    fn test_load_file() {
        let temp = TempDir::new().expect("temp dir");
        let path = temp.path().join("settings.yaml");
        std::fs::write(&path, "region: ap-south-1\n").expect("write");

        let settings = SettingsParser::new().load_file(&path).expect("loads");
        assert_eq!(settings.region.as_deref(), Some("ap-south-1"));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            (ENV_REGION, "us-east-2"),
            (ENV_STATE_PATH, "/tmp/state.json"),
            (ENV_DEFAULT_TAGS, "team=net, env = prod ,"),
        ]);

        let mut settings = ProviderSettings::default();
        SettingsParser::apply_env_overrides(&mut settings, |name| {
            env.get(name).map(|v| (*v).to_string())
        })
        .expect("valid overrides");

        assert_eq!(settings.region.as_deref(), Some("us-east-2"));
        assert_eq!(settings.state.path, Some(PathBuf::from("/tmp/state.json")));
        assert_eq!(settings.default_tags.get("env").map(String::as_str), Some("prod"));
        assert_eq!(settings.default_tags.len(), 2);
    }

    #[test]
    fn test_malformed_tag_override() {
        let mut settings = ProviderSettings::default();
        let err = SettingsParser::apply_env_overrides(&mut settings, |name| {
            (name == ENV_DEFAULT_TAGS).then(|| String::from("team"))
        })
        .expect_err("missing =");
        assert!(matches!(err, ProviderError::Config(ConfigError::InvalidEnvVar { .. })));
    }

    #[test]
    fn test_load_dotenv_missing_is_ok() {
        let temp = TempDir::new().expect("temp dir");
        let parser = SettingsParser::new().with_base_path(temp.path());
        assert!(parser.load_dotenv().is_ok());
    }
}
