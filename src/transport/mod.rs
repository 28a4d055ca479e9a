pub mod recorder;
pub mod soap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::Environment;
use crate::error::Result;
use crate::security::request_signer::SignedArtifact;

pub use recorder::TapeRecorder;
pub use soap::SoapTransport;

/// Where a service's operations live, per environment, and the XML namespace
/// its operations are declared in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceEndpoint {
    pub name: String,
    pub namespace: String,
    pub testing_url: String,
    pub production_url: String,
}

impl ServiceEndpoint {
    pub fn new(
        name: impl Into<String>,
        namespace: impl Into<String>,
        testing_url: impl Into<String>,
        production_url: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            testing_url: testing_url.into(),
            production_url: production_url.into(),
        }
    }

    pub fn url(&self, environment: Environment) -> &str {
        match environment {
            Environment::Testing => &self.testing_url,
            Environment::Production => &self.production_url,
        }
    }
}

/// Remote calls the ticket lifecycle depends on.
///
/// Implementations block until the exchange completes and apply their own
/// timeouts; callers never retry.
pub trait Transport {
    /// Submit a signed login request and return the raw ticket document.
    fn submit_login(&self, url: &str, artifact: &SignedArtifact) -> Result<String>;

    /// Invoke `operation` with `args` (a JSON object) and return the response
    /// as a nested JSON tree.
    fn invoke(
        &self,
        endpoint: &ServiceEndpoint,
        url: &str,
        operation: &str,
        args: &Value,
    ) -> Result<Value>;
}

impl<T: Transport + ?Sized> Transport for &T {
    fn submit_login(&self, url: &str, artifact: &SignedArtifact) -> Result<String> {
        (**self).submit_login(url, artifact)
    }

    fn invoke(
        &self,
        endpoint: &ServiceEndpoint,
        url: &str,
        operation: &str,
        args: &Value,
    ) -> Result<Value> {
        (**self).invoke(endpoint, url, operation, args)
    }
}
