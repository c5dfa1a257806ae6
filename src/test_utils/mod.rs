//! Shared test utilities and fixtures
//!
//! Scriptable stand-ins for the browser and HTTP capabilities, used by unit
//! tests, integration tests and benches.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

use crate::domain::models::ViewportProfile;
use crate::service::http::{FetchedResource, ResourceFetcher};
use crate::service::inspector::scripts::{DOCUMENT_HTML_MARKER, LAYOUT_MARKER, WEB_VITALS_MARKER};
use crate::service::inspector::{BrowserContext, BrowserDriver, NavigationTimeout, PageHandle};

// ============================================================================
// PAGE FIXTURES
// ============================================================================

/// What the mock page answers to each inspector script.
#[derive(Debug, Clone)]
pub struct PageFixture {
    pub vitals: Value,
    pub layout: Value,
    pub html: String,
}

pub const DENTIST_SCHEMA: &str =
    r#"{"@context": "https://schema.org", "@type": "Dentist", "name": "Smile Dental"}"#;

impl PageFixture {
    /// LCP 2.0s, FCP 1.0s, CLS 0.05, 50ms delay; mobile-friendly; one Dentist block.
    pub fn healthy() -> Self {
        Self {
            vitals: json!({ "fcp": 1000.0, "lcp": 2000.0, "cls": 0.05, "interactionDelayMs": 50.0 }),
            layout: json!({
                "documentWidth": 412.0,
                "viewportWidth": 412.0,
                "tapTargets": 20,
                "smallTapTargets": 1,
                "baseFontPx": 16.0
            }),
            html: page_html(&[DENTIST_SCHEMA]),
        }
    }

    /// Healthy page without any ld+json block.
    pub fn without_schema() -> Self {
        Self {
            html: page_html(&[]),
            ..Self::healthy()
        }
    }

    pub fn with_schema(blocks: &[&str]) -> Self {
        Self {
            html: page_html(blocks),
            ..Self::healthy()
        }
    }

    pub fn with_vitals(mut self, fcp: f64, lcp: f64, cls: f64, delay: f64) -> Self {
        self.vitals = json!({ "fcp": fcp, "lcp": lcp, "cls": cls, "interactionDelayMs": delay });
        self
    }

    pub fn with_html(mut self, html: impl Into<String>) -> Self {
        self.html = html.into();
        self
    }

    pub fn with_layout(mut self, layout: Value) -> Self {
        self.layout = layout;
        self
    }
}

/// Minimal clinic page carrying the given ld+json blocks.
pub fn page_html(schema_blocks: &[&str]) -> String {
    let scripts: String = schema_blocks
        .iter()
        .map(|b| format!(r#"<script type="application/ld+json">{b}</script>"#))
        .collect();
    format!(
        r#"<html><head>
<title>Smile Dental</title>
<meta name="viewport" content="width=device-width, initial-scale=1">
<meta name="robots" content="index, follow">
<link rel="canonical" href="https://a.test/">
{scripts}
</head><body><h1>Smile Dental</h1><p>Family dentistry in town.</p>
<a href="/services">Services</a></body></html>"#
    )
}

// ============================================================================
// MOCK BROWSER
// ============================================================================

#[derive(Debug, Clone)]
enum Behavior {
    Serve(PageFixture),
    NavigationTimeout,
    Unreachable,
    RenderFailure,
    Hang,
}

#[derive(Default)]
struct MockState {
    pages: DashMap<String, Behavior>,
    profile_pages: DashMap<(String, ViewportProfile), Behavior>,
    navigations: DashMap<String, usize>,
    stalled_scripts: DashMap<String, ()>,
    unavailable: AtomicBool,
    opened: AtomicUsize,
    open_now: AtomicUsize,
    max_open: AtomicUsize,
    latency_ms: AtomicUsize,
}

impl MockState {
    fn behavior(&self, url: &str, profile: ViewportProfile) -> Option<Behavior> {
        self.profile_pages
            .get(&(url.to_string(), profile))
            .map(|b| b.clone())
            .or_else(|| self.pages.get(url).map(|b| b.clone()))
    }
}

/// Browser double that counts sessions and injects failures per URL/profile.
#[derive(Clone, Default)]
pub struct MockBrowser {
    state: Arc<MockState>,
}

impl MockBrowser {
    pub fn new() -> Self {
        let browser = Self::default();
        browser.state.latency_ms.store(5, Ordering::SeqCst);
        browser
    }

    /// Simulated load time per navigation.
    pub fn with_latency(self, latency: Duration) -> Self {
        self.state
            .latency_ms
            .store(latency.as_millis() as usize, Ordering::SeqCst);
        self
    }

    pub fn serve(&self, url: &str, fixture: PageFixture) {
        self.state.pages.insert(url.to_string(), Behavior::Serve(fixture));
    }

    pub fn serve_profile(&self, url: &str, profile: ViewportProfile, fixture: PageFixture) {
        self.state
            .profile_pages
            .insert((url.to_string(), profile), Behavior::Serve(fixture));
    }

    /// Every navigation to `url` fails; `timeout` picks the transient cause.
    pub fn fail_navigation(&self, url: &str, timeout: bool) {
        let behavior = if timeout {
            Behavior::NavigationTimeout
        } else {
            Behavior::Unreachable
        };
        self.state.pages.insert(url.to_string(), behavior);
    }

    pub fn fail_profile_navigation(&self, url: &str, profile: ViewportProfile) {
        self.state
            .profile_pages
            .insert((url.to_string(), profile), Behavior::NavigationTimeout);
    }

    pub fn fail_render(&self, url: &str, profile: ViewportProfile) {
        self.state
            .profile_pages
            .insert((url.to_string(), profile), Behavior::RenderFailure);
    }

    /// Navigation to `url` never completes.
    pub fn hang(&self, url: &str) {
        self.state.pages.insert(url.to_string(), Behavior::Hang);
    }

    /// `url` loads, but no script evaluated in it ever settles.
    pub fn stall_scripts(&self, url: &str) {
        self.state.stalled_scripts.insert(url.to_string(), ());
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.state.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Contexts opened so far.
    pub fn opened(&self) -> usize {
        self.state.opened.load(Ordering::SeqCst)
    }

    /// Contexts currently open.
    pub fn open_now(&self) -> usize {
        self.state.open_now.load(Ordering::SeqCst)
    }

    /// Peak number of simultaneously open contexts.
    pub fn max_open(&self) -> usize {
        self.state.max_open.load(Ordering::SeqCst)
    }

    /// Navigations attempted against `url`.
    pub fn navigations(&self, url: &str) -> usize {
        self.state.navigations.get(url).map(|n| *n).unwrap_or(0)
    }

    pub fn total_navigations(&self) -> usize {
        self.state.navigations.iter().map(|n| *n.value()).sum()
    }
}

#[async_trait]
impl BrowserDriver for MockBrowser {
    async fn open_context(&self, profile: ViewportProfile) -> Result<Box<dyn BrowserContext>> {
        if self.state.unavailable.load(Ordering::SeqCst) {
            return Err(anyhow!("browser endpoint refused connection"));
        }
        self.state.opened.fetch_add(1, Ordering::SeqCst);
        let now = self.state.open_now.fetch_add(1, Ordering::SeqCst) + 1;
        self.state.max_open.fetch_max(now, Ordering::SeqCst);

        Ok(Box::new(MockContext {
            state: self.state.clone(),
            profile,
        }))
    }
}

struct MockContext {
    state: Arc<MockState>,
    profile: ViewportProfile,
}

#[async_trait]
impl BrowserContext for MockContext {
    async fn navigate(&mut self, url: &str) -> Result<Box<dyn PageHandle>> {
        *self.state.navigations.entry(url.to_string()).or_insert(0) += 1;

        let latency = self.state.latency_ms.load(Ordering::SeqCst) as u64;
        tokio::time::sleep(Duration::from_millis(latency)).await;

        let stalled = self.state.stalled_scripts.contains_key(url);
        match self.state.behavior(url, self.profile) {
            Some(Behavior::Serve(fixture)) => Ok(Box::new(MockPage {
                fixture: Some(fixture),
                stalled,
            })),
            Some(Behavior::RenderFailure) => Ok(Box::new(MockPage {
                fixture: None,
                stalled,
            })),
            Some(Behavior::NavigationTimeout) => Err(NavigationTimeout.into()),
            Some(Behavior::Hang) => {
                futures::future::pending::<()>().await;
                Err(anyhow!("unreachable"))
            }
            Some(Behavior::Unreachable) | None => Err(anyhow!("net::ERR_NAME_NOT_RESOLVED")),
        }
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.state.open_now.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }
}

struct MockPage {
    fixture: Option<PageFixture>,
    stalled: bool,
}

#[async_trait]
impl PageHandle for MockPage {
    async fn evaluate(&mut self, script: &str) -> Result<Value> {
        if self.stalled {
            futures::future::pending::<()>().await;
        }
        let fixture = self
            .fixture
            .as_ref()
            .ok_or_else(|| anyhow!("Uncaught TypeError: document.body is null"))?;

        if script.starts_with(WEB_VITALS_MARKER) {
            Ok(fixture.vitals.clone())
        } else if script.starts_with(LAYOUT_MARKER) {
            Ok(fixture.layout.clone())
        } else if script.starts_with(DOCUMENT_HTML_MARKER) {
            Ok(Value::String(fixture.html.clone()))
        } else {
            Err(anyhow!("unexpected script"))
        }
    }

    async fn close(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}

// ============================================================================
// STATIC FETCHER
// ============================================================================

pub const VALID_SITEMAP: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
  <url><loc>https://a.test/</loc></url>
  <url><loc>https://a.test/services</loc></url>
</urlset>"#;

/// `ResourceFetcher` answering from a fixed table; unknown URLs are 404.
#[derive(Default)]
pub struct StaticFetcher {
    responses: DashMap<String, FetchedResource>,
    failing: DashMap<String, ()>,
    stalled: DashMap<String, ()>,
    requests: AtomicUsize,
}

impl StaticFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// robots.txt and a valid sitemap.xml under `origin` (e.g. `https://a.test`).
    pub fn healthy_site(origin: &str) -> Self {
        let fetcher = Self::new();
        fetcher.respond(&format!("{origin}/robots.txt"), 200, "User-agent: *\nAllow: /\n");
        fetcher.respond(&format!("{origin}/sitemap.xml"), 200, VALID_SITEMAP);
        fetcher
    }

    pub fn respond(&self, url: &str, status: u16, body: &str) {
        self.responses.insert(
            url.to_string(),
            FetchedResource {
                status,
                body: body.to_string(),
            },
        );
    }

    /// Transport failure for `url`.
    pub fn fail(&self, url: &str) {
        self.failing.insert(url.to_string(), ());
    }

    /// Requests for `url` never complete.
    pub fn stall(&self, url: &str) {
        self.stalled.insert(url.to_string(), ());
    }

    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ResourceFetcher for StaticFetcher {
    async fn fetch(&self, url: &Url, _timeout: Duration) -> Result<FetchedResource> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        let key = url.as_str();
        if self.stalled.contains_key(key) {
            futures::future::pending::<()>().await;
        }
        if self.failing.contains_key(key) {
            return Err(anyhow!("connection reset fetching {key}"));
        }
        Ok(self
            .responses
            .get(key)
            .map(|r| r.clone())
            .unwrap_or(FetchedResource {
                status: 404,
                body: String::new(),
            }))
    }
}

// ============================================================================
// RESULT FIXTURES
// ============================================================================

pub mod fixtures {
    use crate::domain::models::*;

    /// A scored result carrying an empty detail for `category`.
    pub fn scored(category: CheckCategory, score: f64) -> CheckResult {
        let detail = match category {
            CheckCategory::Performance => CheckDetail::Performance(PerformanceDetail::default()),
            CheckCategory::Crawlability => CheckDetail::Crawlability(CrawlabilityDetail {
                robots_txt: true,
                sitemap_xml: true,
                ..Default::default()
            }),
            CheckCategory::Schema => CheckDetail::Schema(SchemaDetail::default()),
            CheckCategory::Mobile => CheckDetail::Mobile(MobileDetail::default()),
        };
        CheckResult::scored(Score::new(score), detail)
    }

    /// A page whose checks scored as given.
    pub fn page(url: &str, scores: &[(CheckCategory, f64)]) -> PageAuditResult {
        let checks = scores.iter().map(|(c, s)| scored(*c, *s)).collect();
        PageAuditResult::from_checks(url, checks)
    }

    /// A page with the given composite and one schema check of that score.
    pub fn page_with_composite(url: &str, score: f64) -> PageAuditResult {
        page(url, &[(CheckCategory::Schema, score)])
    }
}
