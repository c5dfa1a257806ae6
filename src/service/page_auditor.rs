//! Runs the requested checks for one page.

use futures::future::join_all;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::domain::models::{CheckCategory, PageAuditResult, ViewportProfiles};
use crate::error::{AuditError, Result};
use crate::service::checks::CheckSuite;
use crate::service::inspector::{PageInspector, PageSession};

pub struct PageAuditor {
    inspector: Arc<PageInspector>,
    checks: Arc<CheckSuite>,
}

impl PageAuditor {
    pub fn new(inspector: Arc<PageInspector>, checks: Arc<CheckSuite>) -> Self {
        Self { inspector, checks }
    }

    /// Audit `url` for `categories`.
    ///
    /// The shared inspection under the default profile runs first and doubles
    /// as the reachability probe: a `Navigation` error there fails the whole
    /// page. Check failures after that are contained in their results.
    pub async fn audit_page(
        &self,
        url: &str,
        categories: &[CheckCategory],
        profiles: ViewportProfiles,
        cancel: &CancellationToken,
    ) -> Result<PageAuditResult> {
        let shared_profile = profiles
            .default_profile()
            .ok_or_else(|| AuditError::invalid("at least one viewport profile is required"))?;

        let session = PageSession::new(&self.inspector, url, cancel);
        match session.inspect(shared_profile).await {
            Ok(_) => {}
            Err(e) if matches!(e, AuditError::Navigation { .. }) || e.is_fatal() => return Err(e),
            Err(e) => log::warn!("[AUDIT] Shared inspection failed for {}: {}", url, e),
        }

        let runnable: Vec<CheckCategory> = categories
            .iter()
            .copied()
            .filter(|c| *c != CheckCategory::Mobile || profiles.mobile)
            .collect();

        let checks = join_all(
            runnable
                .iter()
                .map(|category| self.checks.run(*category, &session, profiles, shared_profile)),
        )
        .await;

        if cancel.is_cancelled() {
            return Err(AuditError::Cancelled);
        }

        let result = PageAuditResult::from_checks(url, checks);
        match result.composite_score {
            Some(score) => log::info!("[AUDIT] {} composite {}", url, score),
            None => log::warn!("[AUDIT] {} unauditable: no check scored", url),
        }
        Ok(result)
    }
}
