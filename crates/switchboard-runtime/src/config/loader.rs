//! Layered configuration loading with figment.
//!
//! From lowest to highest precedence:
//!
//! 1. [`SwitchboardConfig::default`]
//! 2. values passed to [`ConfigLoader::merge`]
//! 3. the profile file, e.g. `switchboard.production.toml`
//! 4. the main file, `switchboard.{toml,yaml,yml}` or `config.{toml,yaml,yml}`
//! 5. `SWITCHBOARD_*` environment variables
//!
//! Which file formats are searched depends on the `toml-config` and
//! `yaml-config` features. With both enabled, one file of each format may
//! be loaded, TOML first.
//!
//! Nested keys are separated by a double underscore in the environment:
//!
//! ```text
//! SWITCHBOARD_LOGGING__LEVEL=debug          logging.level
//! SWITCHBOARD_DISPATCH__WORKER_LIMIT=16     dispatch.worker_limit
//! SWITCHBOARD_ADAPTERS__REST__TOKEN=secret  adapters.rest.token
//! ```

use std::fmt;
use std::path::{Path, PathBuf};

use figment::Figment;
use figment::providers::{Env, Serialized};
#[cfg(any(feature = "toml-config", feature = "yaml-config"))]
use figment::providers::Format;
use tracing::{debug, info, warn};

use super::error::{ConfigError, ConfigResult};
use super::schema::SwitchboardConfig;
use super::validation::validate_config;

/// Prefix of environment overrides.
pub const ENV_PREFIX: &str = "SWITCHBOARD_";

/// Variable selecting the profile.
pub const PROFILE_ENV: &str = "SWITCHBOARD_PROFILE";

/// File stems searched in every directory, in order.
const FILE_STEMS: [&str; 2] = ["switchboard", "config"];

/// Configuration profile.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Profile {
    #[default]
    Development,
    Production,
    Custom(String),
}

impl Profile {
    /// Accepts the short forms `dev` and `prod`.
    pub fn parse(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "development" | "dev" => Self::Development,
            "production" | "prod" => Self::Production,
            other => Self::Custom(other.to_string()),
        }
    }

    /// Reads [`PROFILE_ENV`], defaulting to development.
    pub fn from_env() -> Self {
        std::env::var(PROFILE_ENV)
            .map(|name| Self::parse(&name))
            .unwrap_or_default()
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
            Self::Custom(name) => name,
        }
    }
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A configuration file format enabled at compile time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileFormat {
    #[cfg(feature = "toml-config")]
    Toml,
    #[cfg(feature = "yaml-config")]
    Yaml,
}

impl FileFormat {
    const ENABLED: &'static [FileFormat] = &[
        #[cfg(feature = "toml-config")]
        FileFormat::Toml,
        #[cfg(feature = "yaml-config")]
        FileFormat::Yaml,
    ];

    fn extensions(self) -> &'static [&'static str] {
        match self {
            #[cfg(feature = "toml-config")]
            Self::Toml => &["toml"],
            #[cfg(feature = "yaml-config")]
            Self::Yaml => &["yaml", "yml"],
        }
    }

    fn of(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?;
        Self::ENABLED
            .iter()
            .copied()
            .find(|format| format.extensions().contains(&ext))
    }

    fn merge(self, figment: Figment, path: &Path) -> Figment {
        match self {
            #[cfg(feature = "toml-config")]
            Self::Toml => figment.merge(figment::providers::Toml::file(path)),
            #[cfg(feature = "yaml-config")]
            Self::Yaml => figment.merge(figment::providers::Yaml::file(path)),
        }
    }
}

/// Collects configuration sources and extracts a validated
/// [`SwitchboardConfig`].
///
/// ```rust,ignore
/// let config = ConfigLoader::new()
///     .profile("production")
///     .search_path("/etc/switchboard")
///     .load()?;
/// ```
pub struct ConfigLoader {
    overrides: Figment,
    profile: Profile,
    search_paths: Vec<PathBuf>,
    file: Option<PathBuf>,
    env: bool,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Searches the working directory and the user config directory, with
    /// environment overrides and the profile from [`PROFILE_ENV`].
    pub fn new() -> Self {
        Self {
            overrides: Figment::new(),
            profile: Profile::from_env(),
            search_paths: Vec::new(),
            file: None,
            env: true,
        }
    }

    pub fn profile(mut self, profile: impl Into<String>) -> Self {
        self.profile = Profile::parse(&profile.into());
        self
    }

    /// Adds a directory to search. Once any is added, the default
    /// directories are no longer searched.
    pub fn search_path(mut self, dir: impl AsRef<Path>) -> Self {
        self.search_paths.push(dir.as_ref().to_path_buf());
        self
    }

    pub fn with_current_dir(self) -> Self {
        match std::env::current_dir() {
            Ok(cwd) => self.search_path(cwd),
            Err(_) => self,
        }
    }

    pub fn with_user_config_dir(self) -> Self {
        match dirs::config_dir() {
            Some(dir) => self.search_path(dir.join("switchboard")),
            None => self,
        }
    }

    /// Loads exactly this file instead of searching. It must exist.
    pub fn file(mut self, path: impl AsRef<Path>) -> Self {
        self.file = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn with_env(mut self) -> Self {
        self.env = true;
        self
    }

    pub fn without_env(mut self) -> Self {
        self.env = false;
        self
    }

    /// Layers `config` over the defaults. Files and the environment still
    /// take precedence.
    pub fn merge(mut self, config: SwitchboardConfig) -> Self {
        self.overrides = self.overrides.merge(Serialized::defaults(config));
        self
    }

    /// Extracts and validates the configuration.
    pub fn load(self) -> ConfigResult<SwitchboardConfig> {
        let files = self.files()?;
        if files.is_empty() {
            warn!("No configuration file found, using defaults");
        }

        let mut figment =
            Figment::from(Serialized::defaults(SwitchboardConfig::default())).merge(self.overrides);
        for (format, path) in &files {
            info!(path = %path.display(), "Loading configuration file");
            figment = format.merge(figment, path);
        }
        if self.env {
            figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));
        }

        let config: SwitchboardConfig = figment
            .extract()
            .map_err(|e| ConfigError::ParseError(e.to_string()))?;
        validate_config(&config)?;

        debug!(
            profile = %self.profile,
            files = files.len(),
            adapters = config.adapters.len(),
            "Configuration loaded"
        );
        Ok(config)
    }

    /// The files to merge, lowest precedence first.
    fn files(&self) -> ConfigResult<Vec<(FileFormat, PathBuf)>> {
        if let Some(path) = &self.file {
            if !path.exists() {
                return Err(ConfigError::FileNotFound(path.clone()));
            }
            let format = FileFormat::of(path).ok_or_else(|| {
                ConfigError::ParseError(format!(
                    "unsupported or disabled configuration format: {}",
                    path.display()
                ))
            })?;
            return Ok(vec![(format, path.clone())]);
        }

        let dirs = self.directories();
        Ok(FileFormat::ENABLED
            .iter()
            .filter_map(|&format| self.discover(format, &dirs))
            .flatten()
            .collect())
    }

    fn directories(&self) -> Vec<PathBuf> {
        if !self.search_paths.is_empty() {
            return self.search_paths.clone();
        }
        std::env::current_dir()
            .ok()
            .into_iter()
            .chain(dirs::config_dir().map(|dir| dir.join("switchboard")))
            .collect()
    }

    /// Finds the first main file of `format`, preceded by its profile
    /// variant when one sits next to it.
    fn discover(&self, format: FileFormat, dirs: &[PathBuf]) -> Option<Vec<(FileFormat, PathBuf)>> {
        for dir in dirs {
            for stem in FILE_STEMS {
                for ext in format.extensions() {
                    let main = dir.join(format!("{stem}.{ext}"));
                    if !main.exists() {
                        continue;
                    }
                    let mut found = Vec::with_capacity(2);
                    let variant = dir.join(format!("{stem}.{}.{ext}", self.profile));
                    if variant.exists() {
                        found.push((format, variant));
                    }
                    found.push((format, main));
                    return Some(found);
                }
            }
        }
        None
    }
}

/// Loads configuration from the default locations.
pub fn load_config() -> ConfigResult<SwitchboardConfig> {
    ConfigLoader::new().load()
}

/// Loads configuration from `path`, with environment overrides.
pub fn load_config_from_file(path: impl AsRef<Path>) -> ConfigResult<SwitchboardConfig> {
    ConfigLoader::new().file(path).load()
}
