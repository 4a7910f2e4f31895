use std::fs;
use std::io::ErrorKind;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use rand::Rng;
use serde::Deserialize;

use crate::engine::{DEFAULT_MERGE_CONCURRENCY, DEFAULT_SIGNED_URL_TTL, EngineConfig};
use crate::error::{Error, Result};

pub const CONFIG_FILE_NAME: &str = "config.toml";
const SIGNING_SECRET_FILE: &str = ".url_signing_secret";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub data_dir: PathBuf,
    /// Public base URL for external access (e.g., "https://data.example.com").
    /// Used as the prefix of signed object URLs. Defaults to `http://host:port`.
    pub public_base_url: Option<String>,
    /// Maximum concurrent object copies during a merge.
    pub merge_concurrency: usize,
    pub signed_url_ttl_secs: u64,
    /// Secret for signing object URLs. Generated and kept in the data
    /// directory when unset.
    pub url_signing_secret: Option<String>,
}

impl ServerConfig {
    /// Reads `<data_dir>/config.toml` if it exists, falling back to defaults.
    /// The file's own `data_dir` is ignored in favor of the directory it lives in.
    pub fn load(data_dir: &Path) -> Result<Self> {
        let path = data_dir.join(CONFIG_FILE_NAME);
        let mut config = match fs::read_to_string(&path) {
            Ok(content) => toml::from_str::<ServerConfig>(&content)
                .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?,
            Err(e) if e.kind() == ErrorKind::NotFound => ServerConfig::default(),
            Err(e) => return Err(e.into()),
        };
        config.data_dir = data_dir.to_path_buf();
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.merge_concurrency == 0 {
            return Err(Error::Config("merge_concurrency must be at least 1".to_string()));
        }
        if self.signed_url_ttl_secs == 0 {
            return Err(Error::Config("signed_url_ttl_secs must be at least 1".to_string()));
        }
        Ok(())
    }

    pub fn socket_addr(&self) -> std::result::Result<SocketAddr, std::net::AddrParseError> {
        format!("{}:{}", self.host, self.port).parse()
    }

    #[must_use]
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("datacollab.db")
    }

    #[must_use]
    pub fn base_url(&self) -> String {
        self.public_base_url
            .clone()
            .unwrap_or_else(|| format!("http://{}:{}", self.host, self.port))
    }

    #[must_use]
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            merge_concurrency: self.merge_concurrency,
            signed_url_ttl: Duration::from_secs(self.signed_url_ttl_secs),
        }
    }

    /// Returns the configured signing secret, or the one stored in the data
    /// directory, creating it on first use.
    pub fn signing_secret(&self) -> Result<String> {
        if let Some(secret) = &self.url_signing_secret {
            return Ok(secret.clone());
        }

        let path = self.data_dir.join(SIGNING_SECRET_FILE);
        match fs::read_to_string(&path) {
            Ok(secret) if !secret.trim().is_empty() => return Ok(secret.trim().to_string()),
            Ok(_) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        let mut bytes = [0u8; 32];
        rand::thread_rng().fill(&mut bytes);
        let secret = hex::encode(bytes);

        fs::create_dir_all(&self.data_dir)?;
        fs::write(&path, &secret)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&path, fs::Permissions::from_mode(0o600))?;
        }
        Ok(secret)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            data_dir: PathBuf::from("./data"),
            public_base_url: None,
            merge_concurrency: DEFAULT_MERGE_CONCURRENCY,
            signed_url_ttl_secs: DEFAULT_SIGNED_URL_TTL.as_secs(),
            url_signing_secret: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_without_file_uses_defaults() {
        let temp = TempDir::new().unwrap();
        let config = ServerConfig::load(temp.path()).unwrap();

        assert_eq!(config.port, 8080);
        assert_eq!(config.merge_concurrency, DEFAULT_MERGE_CONCURRENCY);
        assert_eq!(config.db_path(), temp.path().join("datacollab.db"));
    }

    #[test]
    fn test_load_reads_toml() {
        let temp = TempDir::new().unwrap();
        fs::write(
            temp.path().join(CONFIG_FILE_NAME),
            "port = 9090\nmerge_concurrency = 2\npublic_base_url = \"https://data.example.com\"\n",
        )
        .unwrap();

        let config = ServerConfig::load(temp.path()).unwrap();
        assert_eq!(config.port, 9090);
        assert_eq!(config.merge_concurrency, 2);
        assert_eq!(config.base_url(), "https://data.example.com");
        assert_eq!(config.host, "127.0.0.1");
    }

    #[test]
    fn test_load_rejects_zero_concurrency() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join(CONFIG_FILE_NAME), "merge_concurrency = 0\n").unwrap();

        assert!(matches!(
            ServerConfig::load(temp.path()),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_signing_secret_is_stable() {
        let temp = TempDir::new().unwrap();
        let config = ServerConfig::load(temp.path()).unwrap();

        let first = config.signing_secret().unwrap();
        let second = config.signing_secret().unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), 64);
    }
}
