use std::time::Duration;

use serde::Deserialize;

use crate::codec::Compression;

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_TOKEN: &str = "secret";
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(30 * 60);
pub const DEFAULT_STATS_INTERVAL: Duration = Duration::from_secs(60);
pub const DEFAULT_MAX_VIEWERS: usize = 64;

/// Process-wide relay configuration, resolved once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP/WebSocket listen port.
    pub port: u16,
    /// Shared secret required on both `/runner` and `/ws`.
    pub token: String,
    /// Binary frame codec announced to runners and viewers.
    pub compression: Compression,
    /// How long an exited, viewerless session lingers before deletion.
    pub session_ttl: Duration,
    /// Cadence of the periodic stats log line.
    pub stats_interval: Duration,
    /// Viewer cap per session.
    pub max_viewers: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            token: DEFAULT_TOKEN.to_string(),
            compression: Compression::default(),
            session_ttl: DEFAULT_SESSION_TTL,
            stats_interval: DEFAULT_STATS_INTERVAL,
            max_viewers: DEFAULT_MAX_VIEWERS,
        }
    }
}

impl Config {
    /// Overlay values from a config file onto the defaults.
    pub fn apply_file(&mut self, file: &ConfigFile) {
        if let Some(port) = file.port {
            self.port = port;
        }
        if let Some(token) = &file.token {
            self.token = token.clone();
        }
        if let Some(compression) = file.compression {
            self.compression = compression;
        }
        if let Some(secs) = file.session_ttl_secs {
            self.session_ttl = Duration::from_secs(secs);
        }
        if let Some(secs) = file.stats_interval_secs {
            self.stats_interval = Duration::from_secs(secs);
        }
        if let Some(max) = file.max_viewers {
            self.max_viewers = max;
        }
    }

    /// Reject values no server can run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 {
            return Err(ConfigError::InvalidPort);
        }
        if self.token.is_empty() {
            return Err(ConfigError::EmptyToken);
        }
        if self.max_viewers == 0 {
            return Err(ConfigError::NoViewersAllowed);
        }
        Ok(())
    }
}

/// Optional TOML config file; every field falls back to the default.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    pub port: Option<u16>,
    pub token: Option<String>,
    pub compression: Option<Compression>,
    pub session_ttl_secs: Option<u64>,
    pub stats_interval_secs: Option<u64>,
    pub max_viewers: Option<usize>,
}

impl ConfigFile {
    /// Load a TOML config file. The file was named explicitly, so a
    /// missing file is an error rather than an empty config.
    ///
    /// Warns if the file is world-readable; it may contain the token.
    pub fn load(path: &std::path::Path) -> Result<Self, ConfigError> {
        check_config_permissions(path);
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadFailed(path.to_path_buf(), e))?;
        toml::from_str(&contents).map_err(|e| ConfigError::ParseFailed(path.to_path_buf(), e))
    }
}

/// Errors from loading or validating configuration. All fatal at startup.
#[derive(Debug)]
pub enum ConfigError {
    ReadFailed(std::path::PathBuf, std::io::Error),
    ParseFailed(std::path::PathBuf, toml::de::Error),
    InvalidPort,
    EmptyToken,
    NoViewersAllowed,
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ReadFailed(path, e) => {
                write!(f, "failed to read config {}: {}", path.display(), e)
            }
            Self::ParseFailed(path, e) => {
                write!(f, "failed to parse config {}: {}", path.display(), e)
            }
            Self::InvalidPort => write!(f, "port must be between 1 and 65535"),
            Self::EmptyToken => write!(f, "token must not be empty"),
            Self::NoViewersAllowed => write!(f, "max_viewers must be at least 1"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Warn when a config file is world-readable.
///
/// On Unix, checks `st_mode & 0o004`. The file may contain the shared
/// token, so 600 is the sensible mode.
#[cfg(unix)]
pub fn check_config_permissions(path: &std::path::Path) {
    use std::os::unix::fs::PermissionsExt;

    let metadata = match std::fs::metadata(path) {
        Ok(m) => m,
        Err(_) => return,
    };

    let mode = metadata.permissions().mode();
    if mode & 0o004 != 0 {
        tracing::warn!(
            "config file {} is world-readable (mode {:o}); it may contain the \
             token -- consider chmod 600",
            path.display(),
            mode & 0o7777,
        );
    }
}

#[cfg(not(unix))]
pub fn check_config_permissions(_path: &std::path::Path) {}
