//! WSAA login: build, sign and submit a login ticket request.

use chrono::Duration;
use tracing::{debug, info};

use crate::config::{Config, LoginEndpoints, DEFAULT_EXPIRATION_OFFSET_SECS};
use crate::error::{Error, Result};
use crate::security::audit_log::AuditLogger;
use crate::security::login_request::RequestBuilder;
use crate::security::profile::Profile;
use crate::security::request_signer::{RequestSigner, SigningBackend};
use crate::security::ticket::Ticket;
use crate::transport::Transport;

/// Obtains tickets from the login endpoint of a profile's environment.
///
/// Each call performs exactly one login attempt; retry policy belongs to the
/// caller. The login endpoint refuses to issue a second ticket for a service
/// while one is still valid, so callers should consult the
/// [`TicketStore`](crate::security::ticket_store::TicketStore) first.
pub struct AuthenticationClient<T, B> {
    transport: T,
    signer: RequestSigner<B>,
    endpoints: LoginEndpoints,
    expiration_offset: Duration,
    audit: AuditLogger,
}

impl<T: Transport, B: SigningBackend> AuthenticationClient<T, B> {
    pub fn new(transport: T, backend: B) -> Self {
        Self {
            transport,
            signer: RequestSigner::new(backend),
            endpoints: LoginEndpoints::default(),
            expiration_offset: Duration::seconds(DEFAULT_EXPIRATION_OFFSET_SECS),
            audit: AuditLogger::new(),
        }
    }

    pub fn from_config(config: &Config, transport: T, backend: B) -> Self {
        Self {
            endpoints: config.login.clone(),
            expiration_offset: config.expiration_offset(),
            ..Self::new(transport, backend)
        }
    }

    pub fn with_endpoints(mut self, endpoints: LoginEndpoints) -> Self {
        self.endpoints = endpoints;
        self
    }

    /// Request a ticket for `service` valid for `ttl_secs`.
    pub fn authenticate(&self, profile: &Profile, service: &str, ttl_secs: i64) -> Result<Ticket> {
        let endpoint = self.endpoints.for_environment(profile.environment);
        let request = RequestBuilder::new()
            .destination(endpoint.destination.as_str())
            .build(service, ttl_secs)?;
        debug!(
            profile = %profile.name,
            service = %service,
            unique_id = request.unique_id,
            environment = %profile.environment,
            "built login ticket request"
        );

        let artifact = self
            .signer
            .sign(&request.to_xml(), &profile.crt_path, &profile.key_path)?;

        let raw = match self.transport.submit_login(&endpoint.url, &artifact) {
            Ok(raw) => raw,
            Err(Error::AuthenticationFault { code, message }) => {
                self.audit
                    .login_fault(&profile.name, service, &code, &message);
                return Err(Error::AuthenticationFault { code, message });
            }
            Err(e) => return Err(e),
        };

        let ticket = Ticket::parse_with_offset(raw, self.expiration_offset)?.with_service(service);
        info!(
            profile = %profile.name,
            service = %service,
            expires = %ticket.expires_str(),
            "obtained login ticket"
        );
        self.audit
            .ticket_issued(&profile.name, service, ticket.expires_str());
        Ok(ticket)
    }
}
