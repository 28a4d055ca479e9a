use tracing::{info, warn};

#[derive(Debug, Clone, Default)]
pub struct AuditLogger;

impl AuditLogger {
    pub fn new() -> Self {
        Self
    }

    pub fn ticket_issued(&self, profile: &str, service: &str, expires: &str) {
        info!(target: "audit", event = "ticket_issued", profile, service, expires);
    }

    pub fn login_fault(&self, profile: &str, service: &str, code: &str, message: &str) {
        warn!(target: "audit", event = "login_fault", profile, service, code, message);
    }

    pub fn ticket_saved(&self, profile: &str, service: &str) {
        info!(target: "audit", event = "ticket_saved", profile, service);
    }

    pub fn ticket_invalidated(&self, profile: &str, service: &str, expired_at: &str) {
        info!(target: "audit", event = "ticket_invalidated", profile, service, expired_at);
    }

    pub fn expired_ticket_rejected(&self, profile: &str, service: &str) {
        warn!(target: "audit", event = "expired_ticket_rejected", profile, service);
    }

    pub fn service_fault(&self, profile: &str, operation: &str, code: &str, message: &str) {
        warn!(target: "audit", event = "service_fault", profile, operation, code, message);
    }
}
