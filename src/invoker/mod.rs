//! Authenticated invocation shared by every service client.
//!
//! A service client owns an [`AuthenticatedInvoker`] configured with its
//! endpoint and credential placement, obtains a valid [`Ticket`] from the
//! [`TicketStore`](crate::security::ticket_store::TicketStore) (or a fresh
//! login), and calls operations passing its own [`ErrorSpec`]. The invoker
//! never refreshes tickets.

pub mod error_spec;

use serde_json::{Map, Value};
use tracing::debug;

use crate::config::Environment;
use crate::error::{Error, Result};
use crate::security::audit_log::AuditLogger;
use crate::security::profile::Profile;
use crate::security::ticket::Ticket;
use crate::transport::{ServiceEndpoint, Transport};

pub use error_spec::{EnvelopeError, ErrorSpec, ErrorTest};

/// How the token/sign/tax-id triple is attached to an operation's arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthPlacement {
    /// A record named `name` inserted as the first argument,
    /// e.g. `Auth{Token, Sign, Cuit}`.
    LeadingArgument {
        name: String,
        token: String,
        sign: String,
        tax_id: String,
    },
    /// Fields merged into the top level of the arguments,
    /// e.g. `token`, `sign`, `cuitRepresentada`.
    Merged {
        token: String,
        sign: String,
        tax_id: String,
    },
}

impl AuthPlacement {
    pub fn leading(name: &str, token: &str, sign: &str, tax_id: &str) -> Self {
        AuthPlacement::LeadingArgument {
            name: name.into(),
            token: token.into(),
            sign: sign.into(),
            tax_id: tax_id.into(),
        }
    }

    pub fn merged(token: &str, sign: &str, tax_id: &str) -> Self {
        AuthPlacement::Merged {
            token: token.into(),
            sign: sign.into(),
            tax_id: tax_id.into(),
        }
    }

    fn apply(&self, ticket: &Ticket, tax_id: &str, args: Map<String, Value>) -> Map<String, Value> {
        match self {
            AuthPlacement::LeadingArgument {
                name,
                token,
                sign,
                tax_id: tax_key,
            } => {
                let mut auth = Map::new();
                auth.insert(token.clone(), Value::from(ticket.token()));
                auth.insert(sign.clone(), Value::from(ticket.signature()));
                auth.insert(tax_key.clone(), Value::from(tax_id));

                let mut merged = Map::with_capacity(args.len() + 1);
                merged.insert(name.clone(), Value::Object(auth));
                merged.extend(args);
                merged
            }
            AuthPlacement::Merged {
                token,
                sign,
                tax_id: tax_key,
            } => {
                let mut merged = Map::with_capacity(args.len() + 3);
                merged.insert(token.clone(), Value::from(ticket.token()));
                merged.insert(sign.clone(), Value::from(ticket.signature()));
                merged.insert(tax_key.clone(), Value::from(tax_id));
                merged.extend(args);
                merged
            }
        }
    }
}

pub struct AuthenticatedInvoker<T> {
    transport: T,
    endpoint: ServiceEndpoint,
    placement: AuthPlacement,
    audit: AuditLogger,
}

impl<T: Transport> AuthenticatedInvoker<T> {
    pub fn new(transport: T, endpoint: ServiceEndpoint, placement: AuthPlacement) -> Self {
        Self {
            transport,
            endpoint,
            placement,
            audit: AuditLogger::new(),
        }
    }

    pub fn endpoint(&self) -> &ServiceEndpoint {
        &self.endpoint
    }

    /// Call `operation` with the ticket's credentials attached.
    ///
    /// The ticket is re-checked against the wall clock first; an expired one
    /// is refused with [`Error::TicketExpired`], and one tagged for another
    /// service with [`Error::InvalidArgument`]. Returns the value under
    /// `result_key` (null when the response omits it), or the whole response
    /// when `result_key` is `None`.
    pub fn call(
        &self,
        ticket: &Ticket,
        profile: &Profile,
        operation: &str,
        args: Value,
        error_spec: &ErrorSpec,
        result_key: Option<&str>,
    ) -> Result<Value> {
        if ticket.is_expired() {
            self.audit
                .expired_ticket_rejected(&profile.name, &self.endpoint.name);
            return Err(Error::TicketExpired {
                service: ticket
                    .service()
                    .unwrap_or(self.endpoint.name.as_str())
                    .to_string(),
                expired_at: ticket.effective_expiration(),
            });
        }
        if let Some(service) = ticket.service() {
            if service != self.endpoint.name {
                return Err(Error::InvalidArgument(format!(
                    "ticket was issued for {}, not {}",
                    service, self.endpoint.name
                )));
            }
        }
        let tax_id = profile.tax_id.as_deref().ok_or_else(|| {
            Error::InvalidArgument(format!("profile {} has no tax_id", profile.name))
        })?;

        let args = self.placement.apply(ticket, tax_id, into_object(operation, args)?);
        self.dispatch(
            &profile.name,
            profile.environment,
            operation,
            Value::Object(args),
            error_spec,
            result_key,
        )
    }

    /// Call an operation that needs no credentials (health checks).
    pub fn call_unauthenticated(
        &self,
        environment: Environment,
        operation: &str,
        args: Value,
        error_spec: &ErrorSpec,
        result_key: Option<&str>,
    ) -> Result<Value> {
        let args = into_object(operation, args)?;
        self.dispatch("", environment, operation, Value::Object(args), error_spec, result_key)
    }

    fn dispatch(
        &self,
        profile: &str,
        environment: Environment,
        operation: &str,
        args: Value,
        error_spec: &ErrorSpec,
        result_key: Option<&str>,
    ) -> Result<Value> {
        let url = self.endpoint.url(environment);
        debug!(
            service = %self.endpoint.name,
            operation = %operation,
            environment = %environment,
            "invoking operation"
        );
        let response = self
            .transport
            .invoke(&self.endpoint, url, operation, &args)?;

        if let Some(EnvelopeError { code, message }) = error_spec.check(&response) {
            self.audit.service_fault(profile, operation, &code, &message);
            return Err(Error::ServiceFault { code, message });
        }

        let Some(key) = result_key else {
            return Ok(response);
        };
        match response {
            // Servers omit empty optional elements; absent means null.
            Value::Object(mut fields) => Ok(fields
                .get_mut(key)
                .map(Value::take)
                .unwrap_or(Value::Null)),
            _ => Err(Error::transport(format!(
                "{} response has no {} element",
                operation, key
            ))),
        }
    }
}

fn into_object(operation: &str, args: Value) -> Result<Map<String, Value>> {
    match args {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(Map::new()),
        _ => Err(Error::InvalidArgument(format!(
            "arguments for {} must be an object",
            operation
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::request_signer::SignedArtifact;
    use crate::security::ticket::tests::ticket_xml;
    use chrono::{Duration, Utc};
    use serde_json::json;
    use std::sync::Mutex;

    struct CannedService {
        response: Value,
        seen: Mutex<Vec<(String, String, Value)>>,
    }

    impl CannedService {
        fn new(response: Value) -> Self {
            Self {
                response,
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    impl Transport for CannedService {
        fn submit_login(&self, _: &str, _: &SignedArtifact) -> Result<String> {
            unreachable!("invoker never logs in")
        }

        fn invoke(&self, _: &ServiceEndpoint, url: &str, op: &str, args: &Value) -> Result<Value> {
            self.seen
                .lock()
                .unwrap()
                .push((url.to_string(), op.to_string(), args.clone()));
            Ok(self.response.clone())
        }
    }

    fn endpoint() -> ServiceEndpoint {
        ServiceEndpoint::new(
            "wsfe",
            "http://ar.gov.afip.dif.FEV1/",
            "https://homo/wsfe",
            "https://prod/wsfe",
        )
    }

    fn valid_ticket() -> Ticket {
        let expires = (Utc::now() + Duration::hours(6)).to_rfc3339();
        Ticket::parse(ticket_xml("TOKEN", "SIGN", &expires))
            .unwrap()
            .with_service("wsfe")
    }

    fn profile() -> Profile {
        Profile::new("p", "p.crt", "p.key", Environment::Testing).with_tax_id("20111111112")
    }

    fn wsfe_spec() -> ErrorSpec {
        ErrorSpec::record_list("Errors", "Err", "Code", "Msg")
    }

    #[test]
    fn test_service_fault_from_error_list() {
        let service = CannedService::new(json!({"Errors": {"Err": [{"Code": 10016, "Msg": "x"}]}}));
        let invoker = AuthenticatedInvoker::new(
            &service,
            endpoint(),
            AuthPlacement::leading("Auth", "Token", "Sign", "Cuit"),
        );

        let err = invoker
            .call(&valid_ticket(), &profile(), "FECompConsultar", json!({}), &wsfe_spec(), Some("ResultGet"))
            .unwrap_err();
        assert!(matches!(err, Error::ServiceFault { ref code, ref message } if code == "10016" && message == "x"));
    }

    #[test]
    fn test_returns_result_key_when_no_error() {
        let service = CannedService::new(json!({"Errors": null, "ResultGet": {"PtoVta": "1"}}));
        let invoker = AuthenticatedInvoker::new(
            &service,
            endpoint(),
            AuthPlacement::leading("Auth", "Token", "Sign", "Cuit"),
        );

        let result = invoker
            .call(&valid_ticket(), &profile(), "FEParamGetPtosVenta", Value::Null, &wsfe_spec(), Some("ResultGet"))
            .unwrap();
        assert_eq!(result, json!({"PtoVta": "1"}));
    }

    #[test]
    fn test_leading_auth_argument_comes_first() {
        let service = CannedService::new(json!({"ResultGet": 1}));
        let invoker = AuthenticatedInvoker::new(
            &service,
            endpoint(),
            AuthPlacement::leading("Auth", "Token", "Sign", "Cuit"),
        );
        invoker
            .call(
                &valid_ticket(),
                &profile(),
                "FECompUltimoAutorizado",
                json!({"PtoVta": 1, "CbteTipo": 6}),
                &wsfe_spec(),
                None,
            )
            .unwrap();

        let seen = service.seen.lock().unwrap();
        let (url, op, args) = &seen[0];
        assert_eq!(url, "https://homo/wsfe");
        assert_eq!(op, "FECompUltimoAutorizado");
        let keys: Vec<&String> = args.as_object().unwrap().keys().collect();
        assert_eq!(keys, ["Auth", "PtoVta", "CbteTipo"]);
        assert_eq!(
            args["Auth"],
            json!({"Token": "TOKEN", "Sign": "SIGN", "Cuit": "20111111112"})
        );
    }

    #[test]
    fn test_merged_auth_fields() {
        let service = CannedService::new(json!({"persona": {"idPersona": "20"}}));
        let invoker = AuthenticatedInvoker::new(
            &service,
            ServiceEndpoint::new("ws_sr_padron_a5", "http://a5.soap.ws.server.puc.sr/", "https://homo/a5", "https://prod/a5"),
            AuthPlacement::merged("token", "sign", "cuitRepresentada"),
        );
        let spec = ErrorSpec::coded_record("errorConstancia", "codigo", "error");
        let padron_ticket = valid_ticket().with_service("ws_sr_padron_a5");

        let result = invoker
            .call(&padron_ticket, &profile(), "getPersona", json!({"idPersona": "20"}), &spec, Some("persona"))
            .unwrap();
        assert_eq!(result, json!({"idPersona": "20"}));

        let seen = service.seen.lock().unwrap();
        assert_eq!(
            seen[0].2,
            json!({"token": "TOKEN", "sign": "SIGN", "cuitRepresentada": "20111111112", "idPersona": "20"})
        );
    }

    #[test]
    fn test_refuses_expired_ticket() {
        let service = CannedService::new(json!({}));
        let invoker = AuthenticatedInvoker::new(&service, endpoint(), AuthPlacement::leading("Auth", "Token", "Sign", "Cuit"));
        let expires = (Utc::now() + Duration::seconds(60)).to_rfc3339();
        let ticket = Ticket::parse(ticket_xml("T", "S", &expires)).unwrap();

        let err = invoker
            .call(&ticket, &profile(), "FEDummy", json!({}), &wsfe_spec(), None)
            .unwrap_err();
        assert!(matches!(err, Error::TicketExpired { ref service, .. } if service == "wsfe"));
        assert!(service.seen.lock().unwrap().is_empty());
    }

    #[test]
    fn test_requires_tax_id() {
        let service = CannedService::new(json!({}));
        let invoker = AuthenticatedInvoker::new(&service, endpoint(), AuthPlacement::leading("Auth", "Token", "Sign", "Cuit"));
        let profile = Profile::new("p", "p.crt", "p.key", Environment::Testing);

        let err = invoker
            .call(&valid_ticket(), &profile, "FEDummy", json!({}), &wsfe_spec(), None)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn test_unauthenticated_call_and_missing_result_key() {
        let service = CannedService::new(json!({"AppServer": "OK", "DbServer": "OK", "AuthServer": "OK"}));
        let invoker = AuthenticatedInvoker::new(&service, endpoint(), AuthPlacement::leading("Auth", "Token", "Sign", "Cuit"));

        let status = invoker
            .call_unauthenticated(Environment::Production, "FEDummy", Value::Null, &wsfe_spec(), None)
            .unwrap();
        assert_eq!(status["AppServer"], "OK");
        assert_eq!(service.seen.lock().unwrap()[0].0, "https://prod/wsfe");
        assert_eq!(service.seen.lock().unwrap()[0].2, json!({}));

        let absent = invoker
            .call_unauthenticated(Environment::Testing, "FEDummy", json!({}), &wsfe_spec(), Some("ResultGet"))
            .unwrap();
        assert_eq!(absent, Value::Null);
    }

    #[test]
    fn test_omitted_result_element_is_null() {
        let service = CannedService::new(json!({"Events": null}));
        let invoker = AuthenticatedInvoker::new(&service, endpoint(), AuthPlacement::leading("Auth", "Token", "Sign", "Cuit"));

        let points = invoker
            .call(&valid_ticket(), &profile(), "FEParamGetPtosVenta", json!({}), &wsfe_spec(), Some("ResultGet"))
            .unwrap();
        assert_eq!(points, Value::Null);
    }

    #[test]
    fn test_non_object_response_without_result_key_fails() {
        let service = CannedService::new(json!("OK"));
        let invoker = AuthenticatedInvoker::new(&service, endpoint(), AuthPlacement::leading("Auth", "Token", "Sign", "Cuit"));

        let err = invoker
            .call(&valid_ticket(), &profile(), "FEParamGetPtosVenta", json!({}), &wsfe_spec(), Some("ResultGet"))
            .unwrap_err();
        assert!(matches!(err, Error::Transport { .. }));
    }

    #[test]
    fn test_rejects_ticket_of_other_service() {
        let service = CannedService::new(json!({}));
        let invoker = AuthenticatedInvoker::new(&service, endpoint(), AuthPlacement::leading("Auth", "Token", "Sign", "Cuit"));
        let expires = (Utc::now() + Duration::hours(6)).to_rfc3339();
        let wsfex = Ticket::parse(ticket_xml("T", "S", &expires)).unwrap().with_service("wsfex");

        let err = invoker
            .call(&wsfex, &profile(), "FEDummy", json!({}), &wsfe_spec(), None)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(ref m) if m.contains("wsfex")));
        assert!(service.seen.lock().unwrap().is_empty());

        let untagged = Ticket::parse(ticket_xml("T", "S", &expires)).unwrap();
        invoker
            .call(&untagged, &profile(), "FEDummy", json!({}), &wsfe_spec(), None)
            .unwrap();
    }

    #[test]
    fn test_rejects_non_object_args() {
        let service = CannedService::new(json!({}));
        let invoker = AuthenticatedInvoker::new(&service, endpoint(), AuthPlacement::leading("Auth", "Token", "Sign", "Cuit"));
        let err = invoker
            .call_unauthenticated(Environment::Testing, "FEDummy", json!([1, 2]), &wsfe_spec(), None)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }
}
