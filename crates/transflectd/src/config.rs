//! transflect.toml configuration.

use std::io;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use transflect_core::DEFAULT_CHUNK_SIZE;
use transflect_fs::FsOptions;

/// Config file looked up in the working directory when none is given.
pub const DEFAULT_CONFIG_FILE: &str = "transflect.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaemonConfig {
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address.
    pub bind: SocketAddr,
    /// Directory served.
    pub root: PathBuf,
    /// Read size when streaming files out.
    pub chunk_size: usize,
    /// Emissions buffered per response before the handler waits.
    pub channel_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], 3000)),
            root: PathBuf::from("."),
            chunk_size: DEFAULT_CHUNK_SIZE,
            channel_capacity: 16,
        }
    }
}

impl ServerConfig {
    pub fn fs_options(&self) -> FsOptions {
        FsOptions::new(&self.root).with_chunk_size(self.chunk_size)
    }
}

impl DaemonConfig {
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load `path`, or [`DEFAULT_CONFIG_FILE`] if it exists, or defaults.
    pub fn load(path: Option<&Path>) -> ConfigResult<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None if Path::new(DEFAULT_CONFIG_FILE).is_file() => {
                Self::from_file(Path::new(DEFAULT_CONFIG_FILE))
            }
            None => Ok(Self::default()),
        }
    }

    pub fn to_toml_string(&self) -> ConfigResult<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Apply command-line overrides.
    pub fn with_overrides(
        mut self,
        port: Option<u16>,
        root: Option<PathBuf>,
        chunk_size: Option<usize>,
    ) -> Self {
        if let Some(port) = port {
            self.server.bind.set_port(port);
        }
        if let Some(root) = root {
            self.server.root = root;
        }
        if let Some(chunk_size) = chunk_size {
            self.server.chunk_size = chunk_size;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_full() {
        let toml_str = r#"
[server]
bind = "0.0.0.0:8080"
root = "/srv/www"
chunk_size = 4096
channel_capacity = 4
"#;
        let config: DaemonConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.bind, "0.0.0.0:8080".parse().unwrap());
        assert_eq!(config.server.root, PathBuf::from("/srv/www"));
        assert_eq!(config.server.chunk_size, 4096);
        assert_eq!(config.server.channel_capacity, 4);
    }

    #[test]
    fn missing_fields_take_defaults() {
        let config: DaemonConfig = toml::from_str("[server]\nroot = \"public\"\n").unwrap();
        assert_eq!(config.server.root, PathBuf::from("public"));
        assert_eq!(config.server.bind, ServerConfig::default().bind);
        assert_eq!(config.server.chunk_size, DEFAULT_CHUNK_SIZE);

        let empty: DaemonConfig = toml::from_str("").unwrap();
        assert_eq!(empty, DaemonConfig::default());
    }

    #[test]
    fn overrides_win() {
        let config = DaemonConfig::default().with_overrides(
            Some(9000),
            Some(PathBuf::from("/data")),
            None,
        );
        assert_eq!(config.server.bind.port(), 9000);
        assert_eq!(config.server.root, PathBuf::from("/data"));
        assert_eq!(config.server.chunk_size, DEFAULT_CHUNK_SIZE);
    }

    #[test]
    fn from_file_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("transflect.toml");
        std::fs::write(&path, "[server]\nchunk_size = \"big\"\n").unwrap();

        let err = DaemonConfig::from_file(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("transflect.toml"));

        let err = DaemonConfig::from_file(&dir.path().join("missing.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn serializes_back() {
        let config = DaemonConfig::default();
        let toml_str = config.to_toml_string().unwrap();
        let parsed: DaemonConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed, config);
    }
}
