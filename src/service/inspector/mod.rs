//! Page inspection over a headless browser.
//!
//! The browser itself is an external capability behind three traits:
//! - `BrowserDriver`: opens one isolated context per inspection
//! - `BrowserContext`: navigates to a URL, yielding a page
//! - `PageHandle`: evaluates scripts in the loaded page
//!
//! `PageInspector` owns the lifecycle: one context per call, closed on
//! every exit path.

#[cfg(feature = "chromium")]
pub mod chromium;
pub mod scripts;

use anyhow::Result as AnyResult;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::domain::models::{LayoutMetrics, PageSignals, TimingSamples, ViewportProfile};
use crate::error::{AuditError, NavigationCause, Result};
use crate::extractor::PageExtractor;

#[async_trait]
pub trait BrowserDriver: Send + Sync {
    /// Open a fresh, isolated context emulating `profile`.
    async fn open_context(&self, profile: ViewportProfile) -> AnyResult<Box<dyn BrowserContext>>;
}

#[async_trait]
pub trait BrowserContext: Send {
    /// Navigate and wait for load.
    async fn navigate(&mut self, url: &str) -> AnyResult<Box<dyn PageHandle>>;
    /// Tear down the context and every page in it.
    async fn close(self: Box<Self>) -> AnyResult<()>;
}

#[async_trait]
pub trait PageHandle: Send {
    /// Evaluate `script`, awaiting a returned promise, and return its value.
    async fn evaluate(&mut self, script: &str) -> AnyResult<serde_json::Value>;
    async fn close(self: Box<Self>) -> AnyResult<()>;
}

/// Marker a driver returns from `navigate` when its own load timeout fired.
#[derive(Debug, thiserror::Error)]
#[error("navigation timed out")]
pub struct NavigationTimeout;

pub struct PageInspector {
    driver: Arc<dyn BrowserDriver>,
    navigation_timeout: Duration,
    min_tap_target_px: f64,
}

impl PageInspector {
    pub fn new(driver: Arc<dyn BrowserDriver>, navigation_timeout: Duration) -> Self {
        Self {
            driver,
            navigation_timeout,
            min_tap_target_px: 48.0,
        }
    }

    pub fn with_min_tap_target(mut self, px: f64) -> Self {
        self.min_tap_target_px = px;
        self
    }

    /// Inspect `url` under `profile`.
    ///
    /// Errors: `Navigation` (timeout or unreachable), `Render`,
    /// `BrowserUnavailable`, `Cancelled`.
    pub async fn inspect(
        &self,
        url: &str,
        profile: ViewportProfile,
        cancel: &CancellationToken,
    ) -> Result<PageSignals> {
        if cancel.is_cancelled() {
            return Err(AuditError::Cancelled);
        }

        log::debug!("[INSPECT] Opening {} context for {}", profile, url);
        let context = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(AuditError::Cancelled),
            opened = self.driver.open_context(profile) => opened
                .map_err(|e| AuditError::BrowserUnavailable(format!("{e:#}")))?,
        };

        let mut guard = ContextGuard::new(context);
        let outcome = match guard.context_mut() {
            Some(context) => tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(AuditError::Cancelled),
                signals = self.collect(context.as_mut(), url, profile) => signals,
            },
            None => Err(AuditError::BrowserUnavailable("context already closed".into())),
        };
        guard.close().await;

        match &outcome {
            Ok(_) => log::debug!("[INSPECT] {} ({}) inspected", url, profile),
            Err(e) => log::warn!("[INSPECT] {} ({}) failed: {}", url, profile, e),
        }
        outcome
    }

    async fn collect(
        &self,
        context: &mut dyn BrowserContext,
        url: &str,
        profile: ViewportProfile,
    ) -> Result<PageSignals> {
        let mut page = match tokio::time::timeout(self.navigation_timeout, context.navigate(url)).await
        {
            Err(_) => return Err(AuditError::navigation_timeout(url)),
            Ok(Err(e)) if e.downcast_ref::<NavigationTimeout>().is_some() => {
                return Err(AuditError::navigation_timeout(url))
            }
            Ok(Err(e)) => return Err(AuditError::unreachable(url, format!("{e:#}"))),
            Ok(Ok(page)) => page,
        };

        // Script evaluation gets its own budget; a page whose scripts never
        // settle must not hold its context open
        let signals = match tokio::time::timeout(
            self.navigation_timeout,
            self.extract(page.as_mut(), url, profile),
        )
        .await
        {
            Ok(signals) => signals,
            Err(_) => Err(AuditError::render(
                url,
                format!("page scripts timed out after {:?}", self.navigation_timeout),
            )),
        };
        if let Err(e) = page.close().await {
            log::debug!("[INSPECT] Page close failed for {}: {:#}", url, e);
        }
        signals
    }

    async fn extract(
        &self,
        page: &mut dyn PageHandle,
        url: &str,
        profile: ViewportProfile,
    ) -> Result<PageSignals> {
        let timings: TimingSamples = evaluate_as(page, scripts::WEB_VITALS, url).await?;
        let layout_script = scripts::layout_metrics(self.min_tap_target_px);
        let layout: LayoutMetrics = evaluate_as(page, &layout_script, url).await?;
        let html: String = evaluate_as(page, scripts::DOCUMENT_HTML, url).await?;

        let (dom, structured_data) = PageExtractor::summarize(&html, url);

        Ok(PageSignals {
            url: url.to_string(),
            profile,
            timings,
            dom,
            layout,
            structured_data,
        })
    }
}

async fn evaluate_as<T: DeserializeOwned>(
    page: &mut dyn PageHandle,
    script: &str,
    url: &str,
) -> Result<T> {
    let value = page
        .evaluate(script)
        .await
        .map_err(|e| AuditError::render(url, format!("script failed: {e:#}")))?;
    serde_json::from_value(value)
        .map_err(|e| AuditError::render(url, format!("undecodable payload: {e}")))
}

/// Closes the context on every path; a dropped inspection hands the close
/// to the runtime.
struct ContextGuard {
    context: Option<Box<dyn BrowserContext>>,
}

impl ContextGuard {
    fn new(context: Box<dyn BrowserContext>) -> Self {
        Self {
            context: Some(context),
        }
    }

    fn context_mut(&mut self) -> Option<&mut Box<dyn BrowserContext>> {
        self.context.as_mut()
    }

    async fn close(mut self) {
        if let Some(context) = self.context.take() {
            if let Err(e) = context.close().await {
                log::warn!("[INSPECT] Context close failed: {:#}", e);
            }
        }
    }
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        let Some(context) = self.context.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = context.close().await {
                        log::warn!("[INSPECT] Deferred context close failed: {:#}", e);
                    }
                });
            }
            Err(_) => log::error!("[INSPECT] Context dropped outside a runtime; not closed"),
        }
    }
}

/// One page's view of the inspector.
///
/// Inspections go through a single lane so a page holds at most one browser
/// context at a time, whatever its checks do concurrently. Each profile is
/// inspected once per page; later callers get the remembered outcome.
pub struct PageSession<'a> {
    inspector: &'a PageInspector,
    url: &'a str,
    cancel: &'a CancellationToken,
    lane: Mutex<HashMap<ViewportProfile, Remembered>>,
}

type Remembered = std::result::Result<Arc<PageSignals>, RememberedFailure>;

/// Cloneable form of a per-page inspection failure.
#[derive(Debug, Clone)]
enum RememberedFailure {
    Navigation(NavigationCause),
    Render(String),
}

impl<'a> PageSession<'a> {
    pub fn new(inspector: &'a PageInspector, url: &'a str, cancel: &'a CancellationToken) -> Self {
        Self {
            inspector,
            url,
            cancel,
            lane: Mutex::new(HashMap::new()),
        }
    }

    pub fn url(&self) -> &str {
        self.url
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        self.cancel
    }

    pub async fn inspect(&self, profile: ViewportProfile) -> Result<Arc<PageSignals>> {
        let mut lane = self.lane.lock().await;
        if let Some(remembered) = lane.get(&profile) {
            return remembered.clone().map_err(|f| self.revive(f));
        }

        match self.inspector.inspect(self.url, profile, self.cancel).await {
            Ok(signals) => {
                let signals = Arc::new(signals);
                lane.insert(profile, Ok(signals.clone()));
                Ok(signals)
            }
            Err(e) => {
                let failure = match &e {
                    AuditError::Navigation { cause, .. } => {
                        Some(RememberedFailure::Navigation(cause.clone()))
                    }
                    AuditError::Render { message, .. } => {
                        Some(RememberedFailure::Render(message.clone()))
                    }
                    // Cancellation and browser loss are never remembered
                    _ => None,
                };
                if let Some(failure) = failure {
                    lane.insert(profile, Err(failure));
                }
                Err(e)
            }
        }
    }

    fn revive(&self, failure: RememberedFailure) -> AuditError {
        match failure {
            RememberedFailure::Navigation(cause) => AuditError::Navigation {
                url: self.url.to_string(),
                cause,
            },
            RememberedFailure::Render(message) => AuditError::render(self.url, message),
        }
    }
}
