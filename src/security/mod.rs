pub mod audit_log;
pub mod login_request;
pub mod profile;
pub mod request_signer;
pub mod ticket;
pub mod ticket_store;
pub mod wsaa;
