pub mod aggregator;
pub mod checks;
pub mod http;
pub mod inspector;
pub mod orchestrator;
pub mod page_auditor;
pub mod reporter;

pub use aggregator::AuditAggregator;
pub use checks::CheckSuite;
pub use http::{HttpResourceFetcher, ResourceFetcher};
pub use inspector::{BrowserDriver, PageInspector, PageSession};
pub use orchestrator::{AuditCancel, AuditRequest, AuditService};
pub use page_auditor::PageAuditor;
pub use reporter::{LogProgress, ProgressReporter};
