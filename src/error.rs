//! Error types for ticket acquisition, storage and authenticated calls.

use std::path::PathBuf;

use chrono::{DateTime, FixedOffset};
use thiserror::Error;

/// Errors raised while obtaining, storing or using a login ticket.
///
/// New variants may be added without a semver-breaking change, so matches
/// must include a wildcard arm.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// A caller supplied a malformed value (ttl, profile name, missing input).
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Certificate/key could not be loaded, did not match, or signing failed.
    #[error("Signing error: {0}")]
    Signing(String),

    /// Network failure or a response the transport could not make sense of.
    #[error("Transport error: {message}")]
    Transport {
        /// What went wrong.
        message: String,
        /// Underlying cause, when there is one.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The login endpoint rejected the signed request.
    #[error("Authentication fault {code}: {message}")]
    AuthenticationFault {
        /// Fault code reported by the login endpoint.
        code: String,
        /// Human readable fault description.
        message: String,
    },

    /// A ticket document lacks a required field or has an unparsable timestamp.
    #[error("Malformed ticket: {0}")]
    MalformedTicket(String),

    /// A service operation reported a business-level error in its envelope.
    #[error("Service fault {code}: {message}")]
    ServiceFault {
        /// Error code taken from the response envelope.
        code: String,
        /// Message paired with the code.
        message: String,
    },

    /// A ticket was presented after its effective expiration.
    #[error("Ticket for {service} expired at {expired_at}")]
    TicketExpired {
        /// Service the ticket was issued for.
        service: String,
        /// Effective expiration of the rejected ticket.
        expired_at: DateTime<FixedOffset>,
    },

    /// No credential descriptor exists for the named profile.
    #[error("Profile not found: {0}")]
    ProfileNotFound(String),

    /// I/O failure reading or writing a ticket or profile record.
    #[error("Store error at {}: {source}", .path.display())]
    Store {
        /// Record the operation touched.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    pub(crate) fn transport(message: impl Into<String>) -> Self {
        Error::Transport {
            message: message.into(),
            source: None,
        }
    }

    pub(crate) fn transport_with<E>(message: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Error::Transport {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub(crate) fn store(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Store {
            path: path.into(),
            source,
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::transport_with(format!("HTTP request failed: {}", err), err)
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
