use chrono::Utc;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::Result;
use crate::security::request_signer::SignedArtifact;
use crate::transport::{ServiceEndpoint, Transport};

/// Wraps a transport and writes every exchange to `log_dir` as
/// `<name>.<timestamp>.<uuid>.<operation>.{request,response}` files.
///
/// Recording is best effort: a failed write is logged and the call proceeds.
#[derive(Debug, Clone)]
pub struct TapeRecorder<T> {
    inner: T,
    name: String,
    log_dir: Option<PathBuf>,
}

impl<T: Transport> TapeRecorder<T> {
    pub fn new(inner: T, name: impl Into<String>, log_dir: Option<PathBuf>) -> Self {
        Self {
            inner,
            name: name.into(),
            log_dir,
        }
    }

    pub fn inner(&self) -> &T {
        &self.inner
    }

    fn tape_prefix(&self, dir: &Path, operation: &str) -> PathBuf {
        dir.join(format!(
            "{}.{}.{}.{}",
            self.name,
            Utc::now().format("%Y%m%dT%H%M%S%.3fZ"),
            Uuid::new_v4(),
            operation
        ))
    }

    fn record(&self, prefix: &Path, kind: &str, contents: &str) {
        let mut path = prefix.as_os_str().to_owned();
        path.push(".");
        path.push(kind);
        let path = PathBuf::from(path);

        let written = fs::create_dir_all(prefix.parent().unwrap_or(Path::new(".")))
            .and_then(|_| fs::write(&path, contents));
        match written {
            Ok(()) => debug!(path = %path.display(), "recorded exchange"),
            Err(e) => warn!(path = %path.display(), error = %e, "failed to record exchange"),
        }
    }
}

impl<T: Transport> Transport for TapeRecorder<T> {
    fn submit_login(&self, url: &str, artifact: &SignedArtifact) -> Result<String> {
        let Some(dir) = &self.log_dir else {
            return self.inner.submit_login(url, artifact);
        };
        let prefix = self.tape_prefix(dir, "loginCms");
        self.record(&prefix, "request", artifact.as_str());

        let result = self.inner.submit_login(url, artifact);
        match &result {
            Ok(ticket) => self.record(&prefix, "response", ticket),
            Err(e) => self.record(&prefix, "error", &e.to_string()),
        }
        result
    }

    fn invoke(
        &self,
        endpoint: &ServiceEndpoint,
        url: &str,
        operation: &str,
        args: &Value,
    ) -> Result<Value> {
        let Some(dir) = &self.log_dir else {
            return self.inner.invoke(endpoint, url, operation, args);
        };
        let prefix = self.tape_prefix(dir, operation);
        self.record(&prefix, "request", &pretty(args));

        let result = self.inner.invoke(endpoint, url, operation, args);
        match &result {
            Ok(value) => self.record(&prefix, "response", &pretty(value)),
            Err(e) => self.record(&prefix, "error", &e.to_string()),
        }
        result
    }
}

fn pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}
