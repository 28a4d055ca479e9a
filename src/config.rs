use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Default lifetime requested for a login ticket, in seconds.
pub const DEFAULT_TICKET_TTL_SECS: i64 = 24 * 3600;

/// Margin subtracted from the server's expiration before a ticket counts as expired.
pub const DEFAULT_EXPIRATION_OFFSET_SECS: i64 = 600;

const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
const DATA_DIR_ENV: &str = "AFIP_DATA_DIR";

const LOGIN_URL_TESTING: &str = "https://wsaahomo.afip.gov.ar/ws/services/LoginCms";
const LOGIN_URL_PRODUCTION: &str = "https://wsaa.afip.gov.ar/ws/services/LoginCms";
const DESTINATION_TESTING: &str = "cn=wsaahomo,o=afip,c=ar,serialNumber=CUIT 33693450239";
const DESTINATION_PRODUCTION: &str = "cn=wsaa,o=afip,c=ar,serialNumber=CUIT 33693450239";

/// Remote environment a profile authenticates against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Testing,
    Production,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Testing => "testing",
            Environment::Production => "production",
        }
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Login endpoint plus the realm string signed requests must address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginEndpoint {
    pub url: String,
    pub destination: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginEndpoints {
    pub testing: LoginEndpoint,
    pub production: LoginEndpoint,
}

impl LoginEndpoints {
    pub fn for_environment(&self, environment: Environment) -> &LoginEndpoint {
        match environment {
            Environment::Testing => &self.testing,
            Environment::Production => &self.production,
        }
    }
}

impl Default for LoginEndpoints {
    fn default() -> Self {
        Self {
            testing: LoginEndpoint {
                url: LOGIN_URL_TESTING.to_string(),
                destination: DESTINATION_TESTING.to_string(),
            },
            production: LoginEndpoint {
                url: LOGIN_URL_PRODUCTION.to_string(),
                destination: DESTINATION_PRODUCTION.to_string(),
            },
        }
    }
}

/// Process-wide context: storage locations, ticket timing and endpoints.
///
/// Built once and passed by reference to every component that touches disk
/// or the network.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub data_dir: PathBuf,
    /// When set, every SOAP exchange is recorded here.
    pub log_dir: Option<PathBuf>,
    pub ticket_ttl_secs: i64,
    pub expiration_offset_secs: i64,
    pub request_timeout_secs: u64,
    pub login: LoginEndpoints,
}

fn default_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var(DATA_DIR_ENV) {
        return PathBuf::from(dir);
    }
    directories::ProjectDirs::from("ar", "afip", "afip").map_or_else(
        || PathBuf::from(".afip"),
        |dirs| dirs.data_dir().to_path_buf(),
    )
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            log_dir: None,
            ticket_ttl_secs: DEFAULT_TICKET_TTL_SECS,
            expiration_offset_secs: DEFAULT_EXPIRATION_OFFSET_SECS,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            login: LoginEndpoints::default(),
        }
    }
}

impl Config {
    /// Config rooted at `data_dir` with every other setting at its default.
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Self::default()
        }
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|e| Error::store(path, e))?;
        let cfg: Config = serde_json::from_str(&raw).map_err(|e| {
            Error::InvalidArgument(format!("parsing config {}: {}", path.display(), e))
        })?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.ticket_ttl_secs <= 0 {
            return Err(Error::InvalidArgument(format!(
                "ticket_ttl_secs must be positive, got {}",
                self.ticket_ttl_secs
            )));
        }
        if self.expiration_offset_secs <= 0 {
            return Err(Error::InvalidArgument(format!(
                "expiration_offset_secs must be positive, got {}",
                self.expiration_offset_secs
            )));
        }
        Ok(())
    }

    pub fn credentials_dir(&self) -> PathBuf {
        self.data_dir.join("credentials")
    }

    pub fn tickets_dir(&self) -> PathBuf {
        self.data_dir.join("tickets")
    }

    pub fn expiration_offset(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.expiration_offset_secs)
    }

    /// Create the credential and ticket directories if missing.
    pub fn ensure_dirs(&self) -> Result<()> {
        for dir in [self.credentials_dir(), self.tickets_dir()] {
            fs::create_dir_all(&dir).map_err(|e| Error::store(&dir, e))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_config_parsing() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"{{
                "data_dir": "/var/lib/afip",
                "log_dir": "/var/log/afip",
                "expiration_offset_secs": 300
            }}"#
        )
        .unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/var/lib/afip"));
        assert_eq!(config.log_dir, Some(PathBuf::from("/var/log/afip")));
        assert_eq!(config.expiration_offset_secs, 300);
        assert_eq!(config.ticket_ttl_secs, DEFAULT_TICKET_TTL_SECS);
        assert_eq!(config.tickets_dir(), PathBuf::from("/var/lib/afip/tickets"));
        assert_eq!(
            config.credentials_dir(),
            PathBuf::from("/var/lib/afip/credentials")
        );
    }

    #[test]
    fn test_config_missing_file() {
        let result = Config::from_file("/nonexistent/path/config.json");
        assert!(matches!(result, Err(Error::Store { .. })));
    }

    #[test]
    fn test_config_invalid_json() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "{{invalid json").unwrap();

        let result = Config::from_file(file.path());
        assert!(matches!(result, Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn test_config_rejects_non_positive_offset() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"expiration_offset_secs": 0}}"#).unwrap();

        let result = Config::from_file(file.path());
        assert!(matches!(result, Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn test_login_endpoints_by_environment() {
        let endpoints = LoginEndpoints::default();
        let testing = endpoints.for_environment(Environment::Testing);
        let production = endpoints.for_environment(Environment::Production);

        assert!(testing.url.contains("wsaahomo"));
        assert!(testing.destination.starts_with("cn=wsaahomo"));
        assert!(production.url.starts_with("https://wsaa.afip.gov.ar"));
        assert!(production.destination.starts_with("cn=wsaa,"));
    }

    #[test]
    fn test_ensure_dirs_creates_layout() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::with_data_dir(dir.path().join("data"));
        config.ensure_dirs().unwrap();

        assert!(config.credentials_dir().is_dir());
        assert!(config.tickets_dir().is_dir());
    }

    #[test]
    fn test_environment_serde() {
        let env: Environment = serde_json::from_str(r#""production""#).unwrap();
        assert_eq!(env, Environment::Production);
        assert_eq!(serde_json::to_string(&Environment::Testing).unwrap(), r#""testing""#);
    }
}
