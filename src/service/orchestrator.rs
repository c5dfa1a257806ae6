//! Audit orchestration: validate, audit pages under a concurrency ceiling,
//! aggregate, persist.

use futures::stream::{FuturesUnordered, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{info_span, Instrument};
use url::Url;

use crate::config::AuditConfig;
use crate::domain::models::{
    AuditType, CheckCategory, ClinicAuditRecord, PageAuditResult, RecordId, ViewportProfiles,
};
use crate::error::{AuditError, Result};
use crate::repository::AuditStore;
use crate::service::aggregator::AuditAggregator;
use crate::service::checks::CheckSuite;
use crate::service::http::ResourceFetcher;
use crate::service::inspector::{BrowserDriver, PageInspector};
use crate::service::page_auditor::PageAuditor;
use crate::service::reporter::{LogProgress, ProgressReporter};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRequest {
    pub clinic_id: String,
    pub urls: Vec<String>,
    pub audit_type: AuditType,
    pub viewport_profiles: ViewportProfiles,
}

/// Cancellation signal for a run.
///
/// A soft cancel stops outstanding pages and returns a partial record built
/// from the pages that finished; a hard cancel discards everything.
#[derive(Debug, Clone, Default)]
pub struct AuditCancel {
    token: CancellationToken,
    hard: Arc<AtomicBool>,
}

impl AuditCancel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn cancel_and_discard(&self) {
        self.hard.store(true, Ordering::SeqCst);
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn is_hard(&self) -> bool {
        self.hard.load(Ordering::SeqCst)
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}

pub struct AuditService {
    config: AuditConfig,
    auditor: PageAuditor,
    aggregator: AuditAggregator,
    store: Arc<dyn AuditStore>,
    progress: Arc<dyn ProgressReporter>,
}

impl AuditService {
    pub fn new(
        config: AuditConfig,
        driver: Arc<dyn BrowserDriver>,
        fetcher: Arc<dyn ResourceFetcher>,
        store: Arc<dyn AuditStore>,
    ) -> Result<Self> {
        config.validate()?;

        let inspector = Arc::new(
            PageInspector::new(driver, config.navigation_timeout())
                .with_min_tap_target(config.scoring.mobile.min_tap_target_px),
        );
        let checks = Arc::new(CheckSuite::new(
            config.scoring.clone(),
            fetcher,
            config.resource_timeout(),
        ));

        Ok(Self {
            aggregator: AuditAggregator::new(config.scoring.issue_thresholds),
            auditor: PageAuditor::new(inspector, checks),
            config,
            store,
            progress: Arc::new(LogProgress),
        })
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressReporter>) -> Self {
        self.progress = progress;
        self
    }

    pub fn config(&self) -> &AuditConfig {
        &self.config
    }

    /// Audit every requested page and persist the clinic-level record.
    ///
    /// Single pages that fail become unauditable entries; the run itself
    /// fails only on invalid input, browser loss, persistence failure, hard
    /// cancellation, or when no page could be audited.
    pub async fn run_audit(
        &self,
        request: AuditRequest,
        cancel: &AuditCancel,
    ) -> Result<ClinicAuditRecord> {
        let span = info_span!(
            "run_audit",
            clinic_id = %request.clinic_id,
            audit_type = %request.audit_type
        );
        self.execute(request, cancel).instrument(span).await
    }

    async fn execute(
        &self,
        request: AuditRequest,
        cancel: &AuditCancel,
    ) -> Result<ClinicAuditRecord> {
        let urls = validate_request(&request)?;
        let categories = request.audit_type.categories();
        let profiles = request.viewport_profiles;
        let total = urls.len();

        log::info!(
            "[RUN] {} audit for {}: {} pages, profiles {:?}, concurrency {}",
            request.audit_type,
            request.clinic_id,
            total,
            profiles.iter().map(|p| p.as_str()).collect::<Vec<_>>(),
            self.config.concurrency
        );

        // Tokio's semaphore is fair: queued pages start in submission order
        let semaphore = Semaphore::new(self.config.concurrency);
        let semaphore = &semaphore;
        let mut pending: FuturesUnordered<_> = urls
            .iter()
            .enumerate()
            .map(|(index, url)| async move {
                let outcome = self
                    .audit_slot(semaphore, url, categories, profiles, cancel)
                    .instrument(info_span!("audit_page", %url))
                    .await;
                (index, url.as_str(), outcome)
            })
            .collect();

        let mut slots: Vec<Option<PageAuditResult>> = vec![None; total];
        let mut done = 0;
        let mut abandoned = 0;
        while let Some((index, url, outcome)) = pending.next().await {
            match outcome {
                Ok(page) => slots[index] = Some(page),
                Err(AuditError::Cancelled) => {
                    abandoned += 1;
                    log::debug!("[RUN] {} abandoned after cancellation", url);
                }
                Err(e) if e.is_fatal() => {
                    log::error!("[RUN] Aborting {}: {}", request.clinic_id, e);
                    return Err(e);
                }
                Err(e) => {
                    log::warn!("[RUN] {} unauditable: {}", url, e);
                    slots[index] = Some(PageAuditResult::unauditable(url, &e));
                }
            }
            done += 1;
            self.progress
                .page_finished(&request.clinic_id, url, done, total);
        }
        drop(pending);

        let pages: Vec<PageAuditResult> = slots.into_iter().flatten().collect();
        // Partial only when cancellation actually left pages out
        let partial = abandoned > 0;
        if cancel.is_cancelled() && cancel.is_hard() {
            log::info!("[RUN] {} cancelled; results discarded", request.clinic_id);
            return Err(AuditError::Cancelled);
        }

        let summary = self.aggregator.aggregate(&pages)?;
        let Some(score) = summary.score else {
            self.progress.run_finished(&request.clinic_id, None);
            if partial {
                return Err(AuditError::Cancelled);
            }
            return Err(AuditError::NoAuditablePages {
                clinic_id: request.clinic_id,
            });
        };

        let record = ClinicAuditRecord {
            id: RecordId::generate(),
            clinic_id: request.clinic_id,
            audit_type: request.audit_type,
            score,
            issues: summary.issues,
            recommendations: summary.recommendations,
            pages,
            requested_pages: total,
            partial,
            created_at: chrono::Utc::now(),
        };

        self.store
            .save(&record)
            .await
            .map_err(|e| AuditError::persistence(format!("{e:#}")))?;

        log::info!(
            "[RUN] {} scored {} over {}/{} auditable pages ({} issues){}",
            record.clinic_id,
            record.score,
            record.auditable_pages(),
            total,
            record.issues.len(),
            if partial { " [partial]" } else { "" }
        );
        self.progress.run_finished(&record.clinic_id, Some(record.score));
        Ok(record)
    }

    async fn audit_slot(
        &self,
        semaphore: &Semaphore,
        url: &str,
        categories: &[CheckCategory],
        profiles: ViewportProfiles,
        cancel: &AuditCancel,
    ) -> Result<PageAuditResult> {
        let _permit = tokio::select! {
            biased;
            _ = cancel.token().cancelled() => return Err(AuditError::Cancelled),
            permit = semaphore.acquire() => permit
                .map_err(|e| AuditError::Other(anyhow::anyhow!("page queue closed: {e}")))?,
        };

        match self
            .auditor
            .audit_page(url, categories, profiles, cancel.token())
            .await
        {
            Err(e) if e.is_transient() && self.config.retry_transient && !cancel.is_cancelled() => {
                log::info!("[RUN] Retrying {} after transient failure: {}", url, e);
                self.auditor
                    .audit_page(url, categories, profiles, cancel.token())
                    .await
            }
            outcome => outcome,
        }
    }
}

/// Checks the request and returns its URLs normalized, fragment-free and
/// deduplicated in first-seen order.
pub fn validate_request(request: &AuditRequest) -> Result<Vec<String>> {
    if request.clinic_id.trim().is_empty() {
        return Err(AuditError::invalid("clinic id must not be empty"));
    }
    if request.urls.is_empty() {
        return Err(AuditError::invalid("at least one url is required"));
    }
    if request.viewport_profiles.is_empty() {
        return Err(AuditError::invalid("at least one viewport profile is required"));
    }

    let mut seen = HashSet::new();
    let mut urls = Vec::with_capacity(request.urls.len());
    for raw in &request.urls {
        let mut url = Url::parse(raw.trim())
            .map_err(|e| AuditError::invalid(format!("{raw:?} is not an absolute url: {e}")))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(AuditError::invalid(format!("{raw:?} is not an http(s) url")));
        }
        if url.host_str().map_or(true, str::is_empty) {
            return Err(AuditError::invalid(format!("{raw:?} has no host")));
        }
        url.set_fragment(None);

        let normalized = url.to_string();
        if seen.insert(normalized.clone()) {
            urls.push(normalized);
        }
    }
    Ok(urls)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::ViewportProfile;
    use crate::repository::MemoryAuditStore;
    use crate::test_utils::{MockBrowser, PageFixture, StaticFetcher};
    use std::sync::Mutex;
    use std::time::Duration;

    fn request(urls: &[&str]) -> AuditRequest {
        AuditRequest {
            clinic_id: "clinic-1".into(),
            urls: urls.iter().map(|u| u.to_string()).collect(),
            audit_type: AuditType::Comprehensive,
            viewport_profiles: ViewportProfiles::both(),
        }
    }

    fn service(browser: &Arc<MockBrowser>, config: AuditConfig) -> (AuditService, Arc<MemoryAuditStore>) {
        let store = Arc::new(MemoryAuditStore::new());
        let service = AuditService::new(
            config,
            browser.clone(),
            Arc::new(StaticFetcher::healthy_site("https://a.test")),
            store.clone(),
        )
        .unwrap();
        (service, store)
    }

    #[derive(Default)]
    struct RecordingProgress {
        pages: Mutex<Vec<(usize, usize)>>,
    }

    impl ProgressReporter for RecordingProgress {
        fn page_finished(&self, _clinic_id: &str, _url: &str, done: usize, total: usize) {
            self.pages.lock().unwrap().push((done, total));
        }

        fn run_finished(&self, _clinic_id: &str, _score: Option<crate::domain::models::Score>) {}
    }

    #[test]
    fn validation_normalizes_and_deduplicates() {
        let urls = validate_request(&request(&[
            "https://A.test",
            "https://a.test/#team",
            "https://a.test/services",
        ]))
        .unwrap();
        assert_eq!(urls, vec!["https://a.test/", "https://a.test/services"]);
    }

    #[test]
    fn validation_rejects_bad_input() {
        for bad in [
            request(&[]),
            request(&["not-a-url"]),
            request(&["ftp://a.test/"]),
            request(&["/relative/path"]),
            AuditRequest {
                clinic_id: " ".into(),
                ..request(&["https://a.test/"])
            },
            AuditRequest {
                viewport_profiles: ViewportProfiles::default(),
                ..request(&["https://a.test/"])
            },
        ] {
            assert!(matches!(
                validate_request(&bad),
                Err(AuditError::InvalidRequest(_))
            ));
        }
    }

    #[tokio::test]
    async fn concurrency_ceiling_bounds_open_sessions() {
        let browser = Arc::new(MockBrowser::new().with_latency(Duration::from_millis(25)));
        let urls: Vec<String> = (0..5).map(|i| format!("https://a.test/p{i}")).collect();
        for url in &urls {
            browser.serve(url, PageFixture::healthy());
        }
        let config = AuditConfig {
            concurrency: 2,
            ..Default::default()
        };
        let (service, _) = service(&browser, config);
        let refs: Vec<&str> = urls.iter().map(String::as_str).collect();

        let record = service
            .run_audit(request(&refs), &AuditCancel::new())
            .await
            .unwrap();

        assert_eq!(record.pages.len(), 5);
        assert!(browser.max_open() <= 2, "peak {}", browser.max_open());
        assert!(browser.max_open() >= 1);
        assert_eq!(browser.open_now(), 0);
    }

    #[tokio::test]
    async fn timeouts_are_retried_once_then_marked_unauditable() {
        let browser = Arc::new(MockBrowser::new());
        browser.serve("https://a.test/", PageFixture::healthy());
        browser.fail_navigation("https://a.test/slow", true);
        let (service, _) = service(&browser, AuditConfig::default());

        let record = service
            .run_audit(
                request(&["https://a.test/", "https://a.test/slow"]),
                &AuditCancel::new(),
            )
            .await
            .unwrap();

        assert_eq!(browser.navigations("https://a.test/slow"), 2);
        let slow = &record.pages[1];
        assert!(slow.unauditable);
        assert!(slow.failure.as_deref().unwrap().contains("timed out"));
        assert_eq!(record.score, record.pages[0].composite_score.unwrap());
    }

    #[tokio::test]
    async fn unreachable_pages_are_not_retried() {
        let browser = Arc::new(MockBrowser::new());
        browser.serve("https://a.test/", PageFixture::healthy());
        browser.fail_navigation("https://a.test/gone", false);
        let (service, _) = service(&browser, AuditConfig::default());

        service
            .run_audit(
                request(&["https://a.test/", "https://a.test/gone"]),
                &AuditCancel::new(),
            )
            .await
            .unwrap();

        assert_eq!(browser.navigations("https://a.test/gone"), 1);
    }

    #[tokio::test]
    async fn zero_auditable_pages_is_an_error() {
        let browser = Arc::new(MockBrowser::new());
        browser.fail_navigation("https://a.test/", false);
        let (service, store) = service(&browser, AuditConfig::default());

        let err = service
            .run_audit(request(&["https://a.test/"]), &AuditCancel::new())
            .await
            .unwrap_err();

        assert!(matches!(err, AuditError::NoAuditablePages { .. }));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn browser_loss_aborts_the_run() {
        let browser = Arc::new(MockBrowser::new());
        browser.set_unavailable(true);
        let (service, store) = service(&browser, AuditConfig::default());

        let err = service
            .run_audit(request(&["https://a.test/"]), &AuditCancel::new())
            .await
            .unwrap_err();

        assert!(matches!(err, AuditError::BrowserUnavailable(_)));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn soft_cancel_keeps_finished_pages() {
        let browser = Arc::new(MockBrowser::new());
        browser.serve("https://a.test/", PageFixture::healthy());
        browser.hang("https://a.test/hung");
        let config = AuditConfig {
            concurrency: 1,
            ..Default::default()
        };
        let (service, store) = service(&browser, config);
        let cancel = AuditCancel::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            trigger.cancel();
        });

        let record = service
            .run_audit(request(&["https://a.test/", "https://a.test/hung"]), &cancel)
            .await
            .unwrap();

        assert!(record.partial);
        assert_eq!(record.pages.len(), 1);
        assert_eq!(record.requested_pages, 2);
        assert!(store.find_latest("clinic-1").await.unwrap().is_some());
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(browser.open_now(), 0);
    }

    /// Cancels the run as soon as the last page reports in.
    struct CancelOnLastPage(AuditCancel);

    impl ProgressReporter for CancelOnLastPage {
        fn page_finished(&self, _clinic_id: &str, _url: &str, done: usize, total: usize) {
            if done == total {
                self.0.cancel();
            }
        }

        fn run_finished(&self, _clinic_id: &str, _score: Option<crate::domain::models::Score>) {}
    }

    #[tokio::test]
    async fn late_cancel_leaves_a_complete_record() {
        let browser = Arc::new(MockBrowser::new());
        browser.serve("https://a.test/", PageFixture::healthy());
        let cancel = AuditCancel::new();
        let (service, store) = service(&browser, AuditConfig::default());
        let service = service.with_progress(Arc::new(CancelOnLastPage(cancel.clone())));

        let record = service
            .run_audit(request(&["https://a.test/"]), &cancel)
            .await
            .unwrap();

        assert!(cancel.is_cancelled());
        assert!(!record.partial);
        assert_eq!(record.pages.len(), 1);
        assert!(!store.find_latest("clinic-1").await.unwrap().unwrap().partial);
    }

    #[tokio::test]
    async fn hard_cancel_discards_everything() {
        let browser = Arc::new(MockBrowser::new());
        browser.serve("https://a.test/", PageFixture::healthy());
        browser.hang("https://a.test/hung");
        let (service, store) = service(&browser, AuditConfig::default());
        let cancel = AuditCancel::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            trigger.cancel_and_discard();
        });

        let err = service
            .run_audit(request(&["https://a.test/", "https://a.test/hung"]), &cancel)
            .await
            .unwrap_err();

        assert!(matches!(err, AuditError::Cancelled));
        assert!(store.is_empty());
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(browser.open_now(), 0);
    }

    #[tokio::test]
    async fn progress_is_reported_per_page() {
        let browser = Arc::new(MockBrowser::new());
        browser.serve("https://a.test/", PageFixture::healthy());
        browser.serve("https://a.test/services", PageFixture::healthy());
        let progress = Arc::new(RecordingProgress::default());
        let (service, _) = service(&browser, AuditConfig::default());
        let service = service.with_progress(progress.clone());

        service
            .run_audit(
                request(&["https://a.test/", "https://a.test/services"]),
                &AuditCancel::new(),
            )
            .await
            .unwrap();

        assert_eq!(*progress.pages.lock().unwrap(), vec![(1, 2), (2, 2)]);
    }

    #[tokio::test]
    async fn audit_type_selects_categories() {
        let browser = Arc::new(MockBrowser::new());
        browser.serve("https://a.test/", PageFixture::healthy());
        let (service, _) = service(&browser, AuditConfig::default());

        let record = service
            .run_audit(
                AuditRequest {
                    audit_type: AuditType::Seo,
                    viewport_profiles: ViewportProfiles::only(ViewportProfile::Mobile),
                    ..request(&["https://a.test/"])
                },
                &AuditCancel::new(),
            )
            .await
            .unwrap();

        let categories: Vec<CheckCategory> =
            record.pages[0].checks.iter().map(|c| c.category).collect();
        assert_eq!(categories, vec![CheckCategory::Crawlability, CheckCategory::Schema]);
        assert_eq!(browser.navigations("https://a.test/"), 1);
    }
}
