//! Configuration management for lienscan using the prefer crate.
//!
//! Config files are discovered with `prefer::load("lienscan")` and parsed
//! with serde by extension (`.toml` or `.json`). Environment variables
//! override file values.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::document::MIN_IMAGE_SIDE;
use crate::llm::LlmConfig;
use crate::ocr::OcrConfig;
use crate::preprocess::PreprocessConfig;
use crate::profile::{Profile, ProfileError};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse TOML config: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Failed to parse JSON config: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unsupported config format: .{0} (use .toml or .json)")]
    UnsupportedFormat(String),

    #[error(transparent)]
    Profile(#[from] ProfileError),
}

/// `[extract]` section.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractConfig {
    /// Jurisdiction profile (TOML). The built-in NH/GA profile when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile: Option<String>,
}

/// `[diagnostics]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiagnosticsConfig {
    /// Write artifacts to the default data directory when no `dir` is set.
    pub enabled: bool,
    /// Artifact directory; setting it enables diagnostics.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dir: Option<String>,
    /// Save the original and preprocessed images next to the text file.
    pub save_images: bool,
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            dir: None,
            save_images: true,
        }
    }
}

/// Configuration file structure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Captures smaller than this on either side are rejected.
    pub min_image_side: u32,
    pub preprocess: PreprocessConfig,
    pub ocr: OcrConfig,
    pub extract: ExtractConfig,
    pub diagnostics: DiagnosticsConfig,
    pub llm: LlmConfig,
    /// Path to the config file this was loaded from (not serialized).
    #[serde(skip)]
    pub source_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            min_image_side: MIN_IMAGE_SIDE,
            preprocess: PreprocessConfig::default(),
            ocr: OcrConfig::default(),
            extract: ExtractConfig::default(),
            diagnostics: DiagnosticsConfig::default(),
            llm: LlmConfig::default(),
            source_path: None,
        }
    }
}

impl Config {
    /// Load configuration using prefer crate for discovery.
    /// Automatically discovers lienscan config files in standard locations.
    pub async fn load() -> Self {
        match prefer::load("lienscan").await {
            Ok(pref_config) => {
                if let Some(path) = pref_config.source_path() {
                    match Self::load_from_path(path).await {
                        Ok(config) => config,
                        Err(e) => {
                            warn!("Ignoring config file {}: {}", path.display(), e);
                            Self::default_with_env()
                        }
                    }
                } else {
                    Self::default_with_env()
                }
            }
            Err(_) => {
                debug!("No lienscan config file found, using defaults");
                Self::default_with_env()
            }
        }
    }

    /// Create a default config with environment variable overrides applied.
    pub fn default_with_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Load configuration from a specific file path.
    pub async fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;

        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");
        let mut config = Self::parse(&contents, ext)?;
        config.source_path = Some(path.to_path_buf());
        Ok(config.with_env_overrides())
    }

    /// Parse config text in the format named by `ext`.
    pub fn parse(contents: &str, ext: &str) -> Result<Self, ConfigError> {
        match ext.to_lowercase().as_str() {
            "toml" => Ok(toml::from_str(contents)?),
            "json" => Ok(serde_json::from_str(contents)?),
            other => Err(ConfigError::UnsupportedFormat(other.to_string())),
        }
    }

    /// Apply environment variable overrides.
    ///
    /// - `LIENSCAN_TESSERACT`: tesseract binary
    /// - `LIENSCAN_DEBUG_DIR`: diagnostics directory
    /// - `LIENSCAN_PROFILE`: jurisdiction profile file
    /// - `LLM_*`: see [`LlmConfig::with_env_overrides`]
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(binary) = std::env::var("LIENSCAN_TESSERACT") {
            self.ocr.tesseract.binary = PathBuf::from(binary);
        }
        if let Ok(dir) = std::env::var("LIENSCAN_DEBUG_DIR") {
            self.diagnostics.dir = Some(dir);
        }
        if let Ok(profile) = std::env::var("LIENSCAN_PROFILE") {
            self.extract.profile = Some(profile);
        }
        self.llm = self.llm.with_env_overrides();
        self
    }

    /// Get the base directory for resolving relative paths: the config
    /// file's directory, or the working directory.
    pub fn base_dir(&self) -> PathBuf {
        self.source_path
            .as_ref()
            .and_then(|p| p.parent().map(|p| p.to_path_buf()))
            .or_else(|| std::env::current_dir().ok())
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// Resolve a path that may be relative to the config file.
    /// - Absolute paths are returned as-is
    /// - Paths starting with ~ or containing $VARS are expanded
    /// - Relative paths are resolved relative to `base_dir`
    pub fn resolve_path(&self, path_str: &str, base_dir: &Path) -> PathBuf {
        let expanded = shellexpand::full(path_str)
            .map(|s| s.into_owned())
            .unwrap_or_else(|_| shellexpand::tilde(path_str).into_owned());
        let path = Path::new(&expanded);

        if path.is_absolute() {
            path.to_path_buf()
        } else {
            base_dir.join(path)
        }
    }

    /// Directory for diagnostic artifacts, if diagnostics are on.
    pub fn debug_dir(&self) -> Option<PathBuf> {
        match &self.diagnostics.dir {
            Some(dir) => Some(self.resolve_path(dir, &self.base_dir())),
            None if self.diagnostics.enabled => Some(default_diagnostics_dir()),
            None => None,
        }
    }

    /// The configured jurisdiction profile, or the built-in one.
    pub fn load_profile(&self) -> Result<Profile, ConfigError> {
        match &self.extract.profile {
            Some(path) => {
                let path = self.resolve_path(path, &self.base_dir());
                debug!("Loading profile from {}", path.display());
                Ok(Profile::load(&path)?)
            }
            None => Ok(Profile::builtin()),
        }
    }
}

/// `<data dir>/lienscan/diagnostics`, falling back to the working directory.
pub fn default_diagnostics_dir() -> PathBuf {
    dirs::data_local_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join("lienscan")
        .join("diagnostics")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ocr::SelectionRule;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.min_image_side, 100);
        assert!(!config.llm.enabled);
        assert!(config.debug_dir().is_none());
        assert_eq!(config.load_profile().unwrap().name, "nh-ga");
    }

    #[test]
    fn test_parse_toml_sections() {
        let config = Config::parse(
            r#"
min_image_side = 150

[ocr]
binary = "/opt/tesseract/bin/tesseract"
selection = "first_non_empty"

[preprocess]
deskew = false

[diagnostics]
dir = "/var/lib/lienscan/debug"
save_images = false

[llm]
enabled = true
model = "qwen2.5:7b"
"#,
            "toml",
        )
        .unwrap();

        assert_eq!(config.min_image_side, 150);
        assert_eq!(
            config.ocr.tesseract.binary,
            PathBuf::from("/opt/tesseract/bin/tesseract")
        );
        assert_eq!(config.ocr.tesseract.language, "eng");
        assert_eq!(config.ocr.selection, SelectionRule::FirstNonEmpty);
        assert!(!config.preprocess.deskew);
        assert_eq!(config.preprocess.denoise_radius, 1);
        assert!(!config.diagnostics.save_images);
        assert_eq!(
            config.debug_dir(),
            Some(PathBuf::from("/var/lib/lienscan/debug"))
        );
        assert!(config.llm.enabled);
        assert_eq!(config.llm.model, "qwen2.5:7b");
    }

    #[test]
    fn test_parse_json() {
        let config =
            Config::parse(r#"{"diagnostics": {"enabled": true}}"#, "json").unwrap();
        assert_eq!(config.debug_dir(), Some(default_diagnostics_dir()));
    }

    #[test]
    fn test_unsupported_format() {
        assert!(matches!(
            Config::parse("a: 1", "yaml"),
            Err(ConfigError::UnsupportedFormat(ext)) if ext == "yaml"
        ));
    }

    #[test]
    fn test_bad_toml() {
        assert!(matches!(
            Config::parse("min_image_side = \"big\"", "toml"),
            Err(ConfigError::Toml(_))
        ));
    }

    #[test]
    fn test_relative_paths_follow_config_file() {
        let config = Config {
            source_path: Some(PathBuf::from("/etc/lienscan/config.toml")),
            ..Config::default()
        };
        assert_eq!(
            config.resolve_path("profiles/ga.toml", &config.base_dir()),
            PathBuf::from("/etc/lienscan/profiles/ga.toml")
        );
        assert_eq!(
            config.resolve_path("/abs/p.toml", &config.base_dir()),
            PathBuf::from("/abs/p.toml")
        );
    }

    #[tokio::test]
    async fn test_load_from_path_with_profile() {
        let dir = TempDir::new().unwrap();
        let mut profile = Profile::builtin();
        profile.name = "test-county".to_string();
        std::fs::write(
            dir.path().join("county.toml"),
            profile.to_toml_string().unwrap(),
        )
        .unwrap();
        let config_path = dir.path().join("lienscan.toml");
        std::fs::write(&config_path, "[extract]\nprofile = \"county.toml\"\n").unwrap();

        let config = Config::load_from_path(&config_path).await.unwrap();
        assert_eq!(config.source_path.as_deref(), Some(config_path.as_path()));
        assert_eq!(config.load_profile().unwrap().name, "test-county");
    }

    #[tokio::test]
    async fn test_missing_file() {
        let result = Config::load_from_path(Path::new("/nonexistent/lienscan.toml")).await;
        assert!(matches!(result, Err(ConfigError::Read { .. })));
    }

    #[test]
    fn test_missing_profile_is_error() {
        let config = Config {
            extract: ExtractConfig {
                profile: Some("/nonexistent/profile.toml".to_string()),
            },
            ..Config::default()
        };
        assert!(matches!(
            config.load_profile(),
            Err(ConfigError::Profile(ProfileError::Io { .. }))
        ));
    }
}
