//! Login ticket request (TRA) documents.

use chrono::{DateTime, Duration, FixedOffset, Local, SecondsFormat, Timelike};

use crate::config::DEFAULT_TICKET_TTL_SECS;
use crate::error::{Error, Result};

/// A login ticket request, ready to be rendered and signed.
///
/// `unique_id` is the generation time in whole seconds; two requests built in
/// the same second share it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginTicketRequest {
    pub source: Option<String>,
    pub destination: Option<String>,
    pub unique_id: i64,
    pub generation_time: DateTime<FixedOffset>,
    pub expiration_time: DateTime<FixedOffset>,
    pub service: String,
}

impl LoginTicketRequest {
    /// Render the canonical XML document that gets signed.
    pub fn to_xml(&self) -> String {
        let mut header = String::new();
        if let Some(source) = &self.source {
            header.push_str(&element("source", source));
        }
        if let Some(destination) = self.destination.as_deref().filter(|d| !d.is_empty()) {
            header.push_str(&element("destination", destination));
        }
        header.push_str(&element("uniqueId", &self.unique_id.to_string()));
        header.push_str(&element("generationTime", &format_timestamp(&self.generation_time)));
        header.push_str(&element("expirationTime", &format_timestamp(&self.expiration_time)));

        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?><loginTicketRequest version="1.0"><header>{}</header>{}</loginTicketRequest>"#,
            header,
            element("service", &self.service)
        )
    }
}

/// Builds login ticket requests stamped with the current local time.
#[derive(Debug, Clone, Default)]
pub struct RequestBuilder {
    source: Option<String>,
    destination: Option<String>,
}

impl RequestBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn destination(mut self, destination: impl Into<String>) -> Self {
        self.destination = Some(destination.into());
        self
    }

    /// Build a request for `service` valid for `ttl_secs` from now.
    pub fn build(&self, service: &str, ttl_secs: i64) -> Result<LoginTicketRequest> {
        self.build_at(service, ttl_secs, Local::now().fixed_offset())
    }

    /// Build a request as if generated at `now`. Sub-second precision is dropped.
    pub fn build_at(
        &self,
        service: &str,
        ttl_secs: i64,
        now: DateTime<FixedOffset>,
    ) -> Result<LoginTicketRequest> {
        if ttl_secs <= 0 {
            return Err(Error::InvalidArgument(format!(
                "ttl must be positive, got {}",
                ttl_secs
            )));
        }
        if service.trim().is_empty() {
            return Err(Error::InvalidArgument("service name is required".into()));
        }

        let generation_time = now.with_nanosecond(0).unwrap_or(now);
        let expiration_time = generation_time + Duration::seconds(ttl_secs);

        Ok(LoginTicketRequest {
            source: self.source.clone(),
            destination: self.destination.clone(),
            unique_id: generation_time.timestamp(),
            generation_time,
            expiration_time,
            service: service.to_string(),
        })
    }

    /// Convenience for the default one-day ttl.
    pub fn build_default(&self, service: &str) -> Result<LoginTicketRequest> {
        self.build(service, DEFAULT_TICKET_TTL_SECS)
    }
}

fn format_timestamp(ts: &DateTime<FixedOffset>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, false)
}

fn element(name: &str, text: &str) -> String {
    format!("<{0}>{1}</{0}>", name, escape_text(text))
}

pub(crate) fn escape_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}
