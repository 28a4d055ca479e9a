use chrono::{DateTime, Duration, Utc};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::security::audit_log::AuditLogger;
use crate::security::profile::validate_name;
use crate::security::ticket::Ticket;

const TICKET_EXTENSION: &str = "xml";

/// On-disk ticket cache keyed by (profile, service).
///
/// Every read goes to disk, so the store always reflects the latest committed
/// record. Expired tickets are deleted when they are next read. Writes are
/// last-writer-wins and never leave a partial record behind.
#[derive(Debug, Clone)]
pub struct TicketStore {
    dir: PathBuf,
    expiration_offset: Duration,
    audit: AuditLogger,
}

impl TicketStore {
    pub fn new(config: &Config) -> Self {
        Self::at(config.tickets_dir(), config.expiration_offset())
    }

    pub fn at(dir: impl Into<PathBuf>, expiration_offset: Duration) -> Self {
        Self {
            dir: dir.into(),
            expiration_offset,
            audit: AuditLogger::new(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Location of the record for (profile, service).
    pub fn path_for(&self, profile: &str, service: &str) -> Result<PathBuf> {
        validate_name("profile", profile)?;
        validate_name("service", service)?;
        Ok(self
            .dir
            .join(format!("{}.{}.{}", profile, service, TICKET_EXTENSION)))
    }

    /// Persist the ticket's raw document, replacing any previous record.
    pub fn save(&self, profile: &str, service: &str, ticket: &Ticket) -> Result<()> {
        let path = self.path_for(profile, service)?;
        fs::create_dir_all(&self.dir).map_err(|e| Error::store(&self.dir, e))?;

        let mut tmp =
            tempfile::NamedTempFile::new_in(&self.dir).map_err(|e| Error::store(&self.dir, e))?;
        tmp.write_all(ticket.xml().as_bytes())
            .map_err(|e| Error::store(tmp.path(), e))?;
        tmp.persist(&path).map_err(|e| Error::store(&path, e.error))?;

        debug!(profile = %profile, service = %service, path = %path.display(), "ticket saved");
        self.audit.ticket_saved(profile, service);
        Ok(())
    }

    /// Load a still-valid ticket; an expired record is deleted and reported as absent.
    pub fn load(&self, profile: &str, service: &str) -> Result<Option<Ticket>> {
        self.load_at(profile, service, Utc::now())
    }

    /// [`load`](Self::load) with an explicit notion of "now".
    pub fn load_at(
        &self,
        profile: &str,
        service: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Ticket>> {
        let path = self.path_for(profile, service)?;
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(profile = %profile, service = %service, "no stored ticket");
                return Ok(None);
            }
            Err(e) => return Err(Error::store(&path, e)),
        };

        let ticket = Ticket::parse_with_offset(raw, self.expiration_offset)?.with_service(service);
        if ticket.is_expired_at(now) {
            remove_if_present(&path)?;
            self.audit
                .ticket_invalidated(profile, service, ticket.expires_str());
            return Ok(None);
        }
        Ok(Some(ticket))
    }

    /// Every still-valid ticket of `profile`, sorted by service. Expired
    /// records found along the way are deleted.
    pub fn list(&self, profile: &str) -> Result<Vec<(String, Ticket)>> {
        self.list_at(profile, Utc::now())
    }

    pub fn list_at(&self, profile: &str, now: DateTime<Utc>) -> Result<Vec<(String, Ticket)>> {
        validate_name("profile", profile)?;
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(Error::store(&self.dir, e)),
        };

        let prefix = format!("{}.", profile);
        let suffix = format!(".{}", TICKET_EXTENSION);
        let mut services = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| Error::store(&self.dir, e))?;
            let file_name = entry.file_name();
            let Some(name) = file_name.to_str() else {
                continue;
            };
            let service = name
                .strip_prefix(&prefix)
                .and_then(|rest| rest.strip_suffix(&suffix));
            match service {
                Some(service) if validate_name("service", service).is_ok() => {
                    services.push(service.to_string());
                }
                _ => continue,
            }
        }
        services.sort();

        let mut tickets = Vec::with_capacity(services.len());
        for service in services {
            if let Some(ticket) = self.load_at(profile, &service, now)? {
                tickets.push((service, ticket));
            }
        }
        Ok(tickets)
    }

    /// Delete the record for (profile, service). Absent records are fine.
    pub fn remove(&self, profile: &str, service: &str) -> Result<()> {
        let path = self.path_for(profile, service)?;
        remove_if_present(&path)
    }

    pub fn exists(&self, profile: &str, service: &str) -> Result<bool> {
        Ok(self.path_for(profile, service)?.is_file())
    }
}

fn remove_if_present(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "ticket already removed");
            Ok(())
        }
        Err(e) => Err(Error::store(path, e)),
    }
}
