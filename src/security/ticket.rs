use chrono::{DateTime, Duration, FixedOffset, Local, NaiveDateTime, TimeZone, Utc};
use std::fmt;

use crate::config::DEFAULT_EXPIRATION_OFFSET_SECS;
use crate::error::{Error, Result};

const EXPIRATION_PATH: [&str; 2] = ["header", "expirationTime"];
const TOKEN_PATH: [&str; 2] = ["credentials", "token"];
const SIGN_PATH: [&str; 2] = ["credentials", "sign"];

/// A login ticket: token/sign pair plus its expiration.
///
/// Immutable once parsed. The raw document is kept byte for byte so that
/// persisting and reparsing yields an identical ticket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ticket {
    service: Option<String>,
    token: String,
    signature: String,
    expires_str: String,
    declared_expiration: DateTime<FixedOffset>,
    effective_expiration: DateTime<FixedOffset>,
    xml: String,
}

impl Ticket {
    /// Parse a ticket document with the default safety offset.
    pub fn parse(xml: impl Into<String>) -> Result<Self> {
        Self::parse_with_offset(xml, Duration::seconds(DEFAULT_EXPIRATION_OFFSET_SECS))
    }

    /// Parse a ticket document; `offset` must be positive so the effective
    /// expiration lands strictly before the declared one.
    pub fn parse_with_offset(xml: impl Into<String>, offset: Duration) -> Result<Self> {
        if offset <= Duration::zero() {
            return Err(Error::InvalidArgument(format!(
                "expiration offset must be positive, got {}s",
                offset.num_seconds()
            )));
        }

        let xml = xml.into();
        let (expires_str, token, signature) = {
            let doc = roxmltree::Document::parse(&xml)
                .map_err(|e| Error::MalformedTicket(format!("invalid XML: {}", e)))?;
            let root = doc.root_element();
            (
                required_text(root, &EXPIRATION_PATH)?,
                required_text(root, &TOKEN_PATH)?,
                required_text(root, &SIGN_PATH)?,
            )
        };
        let declared_expiration = parse_timestamp(&expires_str)?;

        Ok(Self {
            service: None,
            token,
            signature,
            expires_str,
            declared_expiration,
            effective_expiration: declared_expiration - offset,
            xml,
        })
    }

    /// Tag the ticket with the service it was issued for.
    pub fn with_service(mut self, service: impl Into<String>) -> Self {
        self.service = Some(service.into());
        self
    }

    pub fn service(&self) -> Option<&str> {
        self.service.as_deref()
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn signature(&self) -> &str {
        &self.signature
    }

    /// Expiration exactly as the login endpoint wrote it.
    pub fn expires_str(&self) -> &str {
        &self.expires_str
    }

    pub fn declared_expiration(&self) -> DateTime<FixedOffset> {
        self.declared_expiration
    }

    pub fn effective_expiration(&self) -> DateTime<FixedOffset> {
        self.effective_expiration
    }

    /// Raw document as received.
    pub fn xml(&self) -> &str {
        &self.xml
    }

    /// Checks the wall clock on every call; never cached.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    pub fn is_expired_at<Tz: TimeZone>(&self, now: DateTime<Tz>) -> bool {
        now.with_timezone(&Utc) >= self.effective_expiration.with_timezone(&Utc)
    }
}

impl fmt::Display for Ticket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.xml)
    }
}

fn required_text(root: roxmltree::Node<'_, '_>, path: &[&str]) -> Result<String> {
    let mut node = root;
    for name in path {
        node = node
            .children()
            .find(|n| n.is_element() && n.tag_name().name() == *name)
            .ok_or_else(|| Error::MalformedTicket(format!("missing {}", path.join("/"))))?;
    }
    node.text()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .ok_or_else(|| Error::MalformedTicket(format!("empty {}", path.join("/"))))
}

fn parse_timestamp(text: &str) -> Result<DateTime<FixedOffset>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(text) {
        return Ok(ts);
    }
    // No offset given: read it as local time.
    NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .and_then(|naive| Local.from_local_datetime(&naive).earliest())
        .map(|local| local.fixed_offset())
        .ok_or_else(|| Error::MalformedTicket(format!("unparsable expirationTime {:?}", text)))
}
