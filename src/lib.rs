//! Login tickets for AFIP web services.
//!
//! A profile's certificate signs a login ticket request, the WSAA login
//! endpoint answers with a ticket, the ticket is cached on disk per
//! (profile, service), and [`invoker::AuthenticatedInvoker`] attaches it to
//! every call a service client makes.
//!
//! ```no_run
//! use afip_wsaa::config::Config;
//! use afip_wsaa::security::{profile::ProfileStore, ticket_store::TicketStore};
//!
//! # fn example() -> afip_wsaa::Result<()> {
//! let config = Config::default();
//! let profile = ProfileStore::new(&config).load("martin_testing")?;
//! let tickets = TicketStore::new(&config);
//! if let Some(ticket) = tickets.load(&profile.name, "wsfe")? {
//!     println!("wsfe ticket valid until {}", ticket.effective_expiration());
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod invoker;
pub mod security;
pub mod transport;
pub mod utils;

pub use config::{Config, Environment};
pub use error::{Error, Result};
pub use invoker::{AuthPlacement, AuthenticatedInvoker, ErrorSpec, ErrorTest};
pub use security::profile::{Profile, ProfileStore};
pub use security::ticket::Ticket;
pub use security::ticket_store::TicketStore;
pub use security::wsaa::AuthenticationClient;

// Crate version exposed for runtime queries
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
