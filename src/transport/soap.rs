use reqwest::blocking::Client;
use reqwest::header::CONTENT_TYPE;
use serde_json::{Map, Value};
use std::time::Duration;
use tracing::{debug, trace};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::security::login_request::escape_text;
use crate::security::request_signer::SignedArtifact;
use crate::transport::{ServiceEndpoint, Transport};

const SOAP_ENV_NS: &str = "http://schemas.xmlsoap.org/soap/envelope/";
const WSAA_NS: &str = "http://wsaa.view.sua.dvadac.desein.afip.gov";
const LOGIN_RETURN: &str = "loginCmsReturn";

/// Blocking SOAP 1.1 binding of [`Transport`].
#[derive(Debug, Clone)]
pub struct SoapTransport {
    http_client: Client,
}

impl SoapTransport {
    pub fn new(timeout: Duration) -> Result<Self> {
        let http_client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::transport_with("creating HTTP client", e))?;
        Ok(Self { http_client })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(Duration::from_secs(config.request_timeout_secs))
    }

    fn post(&self, url: &str, soap_action: &str, envelope: String) -> Result<(u16, String)> {
        trace!(url = %url, soap_action = %soap_action, "sending SOAP request");

        let response = self
            .http_client
            .post(url)
            .header(CONTENT_TYPE, "text/xml; charset=utf-8")
            .header("SOAPAction", format!("\"{}\"", soap_action))
            .body(envelope)
            .send()?;

        let status = response.status().as_u16();
        let body = response.text()?;
        debug!(url = %url, status_code = %status, body_len = body.len(), "received SOAP response");
        Ok((status, body))
    }
}

impl Transport for SoapTransport {
    fn submit_login(&self, url: &str, artifact: &SignedArtifact) -> Result<String> {
        let envelope = format!(
            r#"<?xml version="1.0" encoding="UTF-8"?><soapenv:Envelope xmlns:soapenv="{}" xmlns:wsaa="{}"><soapenv:Header/><soapenv:Body><wsaa:loginCms><wsaa:in0>{}</wsaa:in0></wsaa:loginCms></soapenv:Body></soapenv:Envelope>"#,
            SOAP_ENV_NS,
            WSAA_NS,
            escape_text(artifact.as_str())
        );
        let (status, body) = self.post(url, "", envelope)?;

        let doc = parse_envelope(status, &body)?;
        if let Some((code, message)) = fault(&doc) {
            return Err(Error::AuthenticationFault { code, message });
        }
        let ticket = doc
            .descendants()
            .find(|n| n.is_element() && n.tag_name().name() == LOGIN_RETURN)
            .and_then(|n| n.text())
            .map(str::to_string);

        match ticket {
            Some(ticket) if (200..300).contains(&status) => Ok(ticket),
            _ => Err(Error::transport(format!(
                "login response (HTTP {}) carries no {}",
                status, LOGIN_RETURN
            ))),
        }
    }

    fn invoke(
        &self,
        endpoint: &ServiceEndpoint,
        url: &str,
        operation: &str,
        args: &Value,
    ) -> Result<Value> {
        let Value::Object(fields) = args else {
            return Err(Error::InvalidArgument(format!(
                "arguments for {} must be an object",
                operation
            )));
        };

        let mut inner = String::new();
        for (name, value) in fields {
            write_element(&mut inner, name, value);
        }
        let envelope = format!(
            r#"<?xml version="1.0" encoding="UTF-8"?><soap:Envelope xmlns:soap="{}"><soap:Body><{op} xmlns="{ns}">{inner}</{op}></soap:Body></soap:Envelope>"#,
            SOAP_ENV_NS,
            op = operation,
            ns = escape_text(&endpoint.namespace),
            inner = inner
        );
        let soap_action = format!("{}{}", endpoint.namespace, operation);
        let (status, body) = self.post(url, &soap_action, envelope)?;

        let doc = parse_envelope(status, &body)?;
        if let Some((code, message)) = fault(&doc) {
            return Err(Error::ServiceFault { code, message });
        }
        if !(200..300).contains(&status) {
            return Err(Error::transport(format!(
                "{} on {} returned HTTP {}",
                operation, endpoint.name, status
            )));
        }

        let response = soap_body(&doc)
            .and_then(|b| b.first_element_child())
            .ok_or_else(|| Error::transport(format!("{} response has an empty body", operation)))?;

        Ok(match element_to_value(response) {
            Value::Object(map) if map.len() == 1 => {
                map.into_iter().next().map(|(_, v)| v).unwrap_or(Value::Null)
            }
            other => other,
        })
    }
}

fn parse_envelope(status: u16, body: &str) -> Result<roxmltree::Document<'_>> {
    roxmltree::Document::parse(body).map_err(|e| {
        Error::transport_with(format!("unparsable SOAP response (HTTP {})", status), e)
    })
}

fn soap_body<'a, 'input>(doc: &'a roxmltree::Document<'input>) -> Option<roxmltree::Node<'a, 'input>> {
    doc.descendants()
        .find(|n| n.is_element() && n.tag_name().name() == "Body")
}

/// `(faultcode, faultstring)` of a SOAP 1.1 fault, if the body carries one.
fn fault(doc: &roxmltree::Document<'_>) -> Option<(String, String)> {
    let fault = soap_body(doc)?
        .children()
        .find(|n| n.is_element() && n.tag_name().name() == "Fault")?;
    let text = |name: &str| {
        fault
            .children()
            .find(|n| n.is_element() && n.tag_name().name() == name)
            .and_then(|n| n.text())
            .map(|t| t.trim().to_string())
            .unwrap_or_default()
    };
    Some((text("faultcode"), text("faultstring")))
}

fn write_element(out: &mut String, name: &str, value: &Value) {
    match value {
        Value::Null => {}
        Value::Array(items) => {
            for item in items {
                write_element(out, name, item);
            }
        }
        Value::Object(fields) => {
            out.push_str(&format!("<{}>", name));
            for (child, value) in fields {
                write_element(out, child, value);
            }
            out.push_str(&format!("</{}>", name));
        }
        Value::String(s) => out.push_str(&format!("<{0}>{1}</{0}>", name, escape_text(s))),
        Value::Number(n) => out.push_str(&format!("<{0}>{1}</{0}>", name, n)),
        Value::Bool(b) => out.push_str(&format!("<{0}>{1}</{0}>", name, b)),
    }
}

/// Leaves become strings (empty ones null), repeated names become arrays.
pub(crate) fn element_to_value(node: roxmltree::Node<'_, '_>) -> Value {
    let children: Vec<_> = node.children().filter(|n| n.is_element()).collect();
    if children.is_empty() {
        return match node.text().map(str::trim) {
            Some(text) if !text.is_empty() => Value::String(text.to_string()),
            _ => Value::Null,
        };
    }

    let mut map = Map::new();
    for child in children {
        let key = child.tag_name().name().to_string();
        let value = element_to_value(child);
        match map.get_mut(&key) {
            Some(Value::Array(items)) => items.push(value),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, value]);
            }
            None => {
                map.insert(key, value);
            }
        }
    }
    Value::Object(map)
}
