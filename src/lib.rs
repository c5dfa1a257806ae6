pub mod config;
pub mod db;
pub mod domain;
pub mod error;
pub mod extractor;
pub mod lifecycle;
pub mod repository;
pub mod service;
pub mod test_utils;

pub use config::AuditConfig;
pub use error::{AuditError, Result};
pub use service::{AuditCancel, AuditRequest, AuditService};
