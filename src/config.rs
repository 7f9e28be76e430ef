use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level configuration loaded from a2rps.toml.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct A2rpsConfig {
    pub input: InputConfig,
    pub follow: FollowConfig,
    pub plot: PlotConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    /// Log file read when none is given on the command line.
    pub log_file: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct FollowConfig {
    pub poll_interval_ms: u64,
    /// Count lines already in the file before tailing new ones.
    pub replay_existing: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct PlotConfig {
    /// Used when `--plot` is given without a path.
    pub output: PathBuf,
    pub width: u32,
    pub height: u32,
    pub title: String,
}

// --- Default implementations ---

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            log_file: "/var/log/apache2/access.log".to_string(),
        }
    }
}

impl Default for FollowConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 500,
            replay_existing: true,
        }
    }
}

impl Default for PlotConfig {
    fn default() -> Self {
        Self {
            output: PathBuf::from("a2rps.svg"),
            width: 1200,
            height: 600,
            title: "Apache Requests Per Second".to_string(),
        }
    }
}

impl FollowConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

/// Errors from loading the config file.
#[derive(Debug)]
pub enum ConfigError {
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Read { path, source } => {
                write!(f, "failed to read config {}: {}", path.display(), source)
            }
            ConfigError::Parse { path, source } => {
                write!(f, "invalid config {}: {}", path.display(), source)
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Read { source, .. } => Some(source),
            ConfigError::Parse { source, .. } => Some(source),
        }
    }
}

/// Command-line values that take precedence over the config file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub log_file: Option<String>,
    pub poll_interval_ms: Option<u64>,
    /// `Some(None)` means `--plot` without a path.
    pub plot: Option<Option<PathBuf>>,
}

impl A2rpsConfig {
    /// Load from `path`. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no config file, using defaults");
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source: e,
                })
            }
        };
        Self::from_toml(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_toml(contents: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }

    /// Apply CLI overrides. Returns the plot path if plotting was requested.
    pub fn apply(&mut self, overrides: &Overrides) -> Option<PathBuf> {
        if let Some(log_file) = &overrides.log_file {
            self.input.log_file = log_file.clone();
        }
        if let Some(ms) = overrides.poll_interval_ms {
            self.follow.poll_interval_ms = ms;
        }
        overrides
            .plot
            .as_ref()
            .map(|path| path.clone().unwrap_or_else(|| self.plot.output.clone()))
    }
}
