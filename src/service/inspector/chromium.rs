//! `BrowserDriver` over a locally launched Chromium.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::browser::BrowserContextId;
use chromiumoxide::cdp::browser_protocol::emulation::{
    SetCpuThrottlingRateParams, SetDeviceMetricsOverrideParams,
};
use chromiumoxide::cdp::browser_protocol::network::EmulateNetworkConditionsParams;
use chromiumoxide::cdp::browser_protocol::target::{
    CreateBrowserContextParams, CreateTargetParams,
};
use chromiumoxide::cdp::js_protocol::runtime::EvaluateParams;
use chromiumoxide::Page;
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use super::{BrowserContext, BrowserDriver, PageHandle};
use crate::domain::models::{Viewport, ViewportProfile};

// Slow 4G as emulated by Lighthouse
const THROTTLED_LATENCY_MS: f64 = 150.0;
const THROTTLED_DOWNLOAD_BYTES_PER_SEC: f64 = 1.6 * 1024.0 * 1024.0 / 8.0;
const THROTTLED_UPLOAD_BYTES_PER_SEC: f64 = 750.0 * 1024.0 / 8.0;
const THROTTLED_CPU_RATE: f64 = 4.0;

pub struct ChromiumDriver {
    browser: Arc<Mutex<Browser>>,
    handler: JoinHandle<()>,
    user_agent: String,
}

impl ChromiumDriver {
    /// Launch headless Chromium and spawn its CDP event loop.
    pub async fn launch(user_agent: &str, request_timeout: Duration) -> Result<Self> {
        let config = BrowserConfig::builder()
            .request_timeout(request_timeout)
            .arg("--no-first-run")
            .arg("--no-default-browser-check")
            .arg("--disable-extensions")
            .arg("--disable-background-networking")
            .arg("--hide-scrollbars")
            .arg("--mute-audio")
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to build browser config: {e}"))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .context("Failed to launch browser")?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    log::debug!("[CHROMIUM] Handler error: {:?}", e);
                }
            }
            log::debug!("[CHROMIUM] Event loop finished");
        });

        log::info!("[CHROMIUM] Browser launched");
        Ok(Self {
            browser: Arc::new(Mutex::new(browser)),
            handler,
            user_agent: user_agent.to_string(),
        })
    }

    pub async fn shutdown(self) -> Result<()> {
        {
            let mut browser = self.browser.lock().await;
            browser.close().await.context("Failed to close browser")?;
            let _ = browser.wait().await;
        }
        self.handler.abort();
        Ok(())
    }
}

impl Drop for ChromiumDriver {
    fn drop(&mut self) {
        self.handler.abort();
    }
}

#[async_trait]
impl BrowserDriver for ChromiumDriver {
    async fn open_context(&self, profile: ViewportProfile) -> Result<Box<dyn BrowserContext>> {
        let id = self
            .browser
            .lock()
            .await
            .create_browser_context(CreateBrowserContextParams::default())
            .await
            .context("Failed to create browser context")?;

        Ok(Box::new(ChromiumContext {
            browser: self.browser.clone(),
            id,
            viewport: profile.viewport(),
            user_agent: self.user_agent.clone(),
        }))
    }
}

struct ChromiumContext {
    browser: Arc<Mutex<Browser>>,
    id: BrowserContextId,
    viewport: Viewport,
    user_agent: String,
}

impl ChromiumContext {
    async fn emulate(&self, page: &Page) -> Result<()> {
        page.execute(
            SetDeviceMetricsOverrideParams::builder()
                .width(self.viewport.width as i64)
                .height(self.viewport.height as i64)
                .device_scale_factor(self.viewport.device_scale_factor)
                .mobile(self.viewport.mobile)
                .build()
                .map_err(anyhow::Error::msg)?,
        )
        .await?;
        page.set_user_agent(self.user_agent.as_str()).await?;

        if self.viewport.throttled {
            page.execute(EmulateNetworkConditionsParams::new(
                false,
                THROTTLED_LATENCY_MS,
                THROTTLED_DOWNLOAD_BYTES_PER_SEC,
                THROTTLED_UPLOAD_BYTES_PER_SEC,
            ))
            .await?;
            page.execute(SetCpuThrottlingRateParams::new(THROTTLED_CPU_RATE))
                .await?;
        }
        Ok(())
    }
}

#[async_trait]
impl BrowserContext for ChromiumContext {
    async fn navigate(&mut self, url: &str) -> Result<Box<dyn PageHandle>> {
        let target = CreateTargetParams::builder()
            .url("about:blank")
            .browser_context_id(self.id.clone())
            .build()
            .map_err(anyhow::Error::msg)?;
        let page = self
            .browser
            .lock()
            .await
            .new_page(target)
            .await
            .context("Failed to open page")?;

        self.emulate(&page).await.context("Failed to apply emulation")?;
        page.goto(url)
            .await
            .with_context(|| format!("Failed to load {url}"))?;
        page.wait_for_navigation()
            .await
            .with_context(|| format!("Navigation to {url} did not settle"))?;

        Ok(Box::new(ChromiumPage { page }))
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.browser
            .lock()
            .await
            .dispose_browser_context(self.id.clone())
            .await
            .context("Failed to dispose browser context")?;
        Ok(())
    }
}

struct ChromiumPage {
    page: Page,
}

#[async_trait]
impl PageHandle for ChromiumPage {
    async fn evaluate(&mut self, script: &str) -> Result<serde_json::Value> {
        let params = EvaluateParams::builder()
            .expression(script)
            .await_promise(true)
            .return_by_value(true)
            .build()
            .map_err(anyhow::Error::msg)?;
        let result = self.page.evaluate_expression(params).await?;
        Ok(result.into_value::<serde_json::Value>()?)
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.page.close().await?;
        Ok(())
    }
}
