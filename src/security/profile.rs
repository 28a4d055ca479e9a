use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::debug;

use crate::config::{Config, Environment};
use crate::error::{Error, Result};

fn name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[a-zA-Z_\-0-9]+$").expect("static regex is valid"))
}

/// Reject names that could escape the store directory or collide with the
/// `<profile>.<service>.xml` ticket naming.
pub fn validate_name(kind: &str, name: &str) -> Result<()> {
    if name_pattern().is_match(name) {
        Ok(())
    } else {
        Err(Error::InvalidArgument(format!(
            "{} name {:?} must match ^[a-zA-Z_\\-0-9]+$",
            kind, name
        )))
    }
}

/// Signing material and target environment of one identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    #[serde(skip)]
    pub name: String,
    pub crt_path: PathBuf,
    pub key_path: PathBuf,
    pub environment: Environment,
    /// Taxpayer id (CUIT) the profile acts on behalf of.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tax_id: Option<String>,
}

impl Profile {
    pub fn new(
        name: impl Into<String>,
        crt_path: impl Into<PathBuf>,
        key_path: impl Into<PathBuf>,
        environment: Environment,
    ) -> Self {
        Self {
            name: name.into(),
            crt_path: crt_path.into(),
            key_path: key_path.into(),
            environment,
            tax_id: None,
        }
    }

    pub fn with_tax_id(mut self, tax_id: impl Into<String>) -> Self {
        self.tax_id = Some(tax_id.into());
        self
    }
}

/// Read-only view over the credential descriptors kept under
/// `credentials_dir/<name>.json`.
#[derive(Debug, Clone)]
pub struct ProfileStore {
    dir: PathBuf,
}

impl ProfileStore {
    pub fn new(config: &Config) -> Self {
        Self::at(config.credentials_dir())
    }

    pub fn at(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}.json", name))
    }

    pub fn load(&self, name: &str) -> Result<Profile> {
        validate_name("profile", name)?;
        let path = self.path_for(name);
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::ProfileNotFound(name.to_string()));
            }
            Err(e) => return Err(Error::store(&path, e)),
        };
        let mut profile: Profile = serde_json::from_str(&raw).map_err(|e| {
            Error::InvalidArgument(format!("profile {} is not valid: {}", name, e))
        })?;
        profile.name = name.to_string();
        // Relative key material lives next to the descriptor.
        for file in [&mut profile.crt_path, &mut profile.key_path] {
            if file.is_relative() {
                *file = self.dir.join(&*file);
            }
        }
        debug!(profile = %name, environment = %profile.environment, "loaded profile");
        Ok(profile)
    }

    /// All profiles with their environment, sorted by name.
    pub fn list(&self) -> Result<Vec<(String, Environment)>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(Error::store(&self.dir, e)),
        };

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| Error::store(&self.dir, e))?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                if name_pattern().is_match(stem) {
                    names.push(stem.to_string());
                }
            }
        }
        names.sort();

        names
            .into_iter()
            .map(|name| {
                let env = self.load(&name)?.environment;
                Ok((name, env))
            })
            .collect()
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}
