use std::time::Duration;
use url::Url;

use crate::config::CrawlabilityPoints;
use crate::domain::models::{CheckCategory, CrawlabilityDetail, Score, ViewportProfile};
use crate::error::{AuditError, Result};
use crate::extractor::sitemap::{ROBOTS_PATH, SITE_MAP_PATH};
use crate::extractor::validate_sitemap;
use crate::service::http::ResourceFetcher;
use crate::service::inspector::PageSession;

/// robots.txt and sitemap.xml of the page's origin, fetched outside the
/// browser. Fetch failures count as absent.
pub async fn check(
    points: &CrawlabilityPoints,
    fetcher: &dyn ResourceFetcher,
    timeout: Duration,
    session: &PageSession<'_>,
    shared_profile: ViewportProfile,
) -> Result<(Score, CrawlabilityDetail)> {
    let page_url = Url::parse(session.url()).map_err(|e| AuditError::CheckExecution {
        category: CheckCategory::Crawlability,
        message: format!("invalid page url: {e}"),
    })?;
    let robots_url = origin_resource(&page_url, ROBOTS_PATH)?;
    let sitemap_url = origin_resource(&page_url, SITE_MAP_PATH)?;

    let (robots, sitemap) = tokio::select! {
        biased;
        _ = session.cancel_token().cancelled() => return Err(AuditError::Cancelled),
        fetched = async {
            tokio::join!(
                fetcher.fetch(&robots_url, timeout),
                fetcher.fetch(&sitemap_url, timeout)
            )
        } => fetched,
    };

    let mut detail = CrawlabilityDetail::default();
    match robots {
        Ok(resource) => detail.robots_txt = resource.is_success(),
        Err(e) => log::debug!("[CHECK] robots.txt unavailable for {}: {:#}", page_url, e),
    }
    match sitemap {
        Ok(resource) if resource.is_success() => {
            let validation = validate_sitemap(&resource.body);
            detail.sitemap_xml = validation.well_formed;
            detail.sitemap_urls = validation.url_count;
        }
        Ok(resource) => log::debug!("[CHECK] sitemap.xml -> {} for {}", resource.status, page_url),
        Err(e) => log::debug!("[CHECK] sitemap.xml unavailable for {}: {:#}", page_url, e),
    }

    if let Ok(signals) = session.inspect(shared_profile).await {
        detail.robots_meta = signals.dom.robots_meta.clone();
        detail.canonical_url = signals.dom.canonical_url.clone();
    }

    Ok((score(points, &detail), detail))
}

pub fn score(points: &CrawlabilityPoints, detail: &CrawlabilityDetail) -> Score {
    let mut total = points.base;
    if detail.robots_txt {
        total += points.robots_txt;
    }
    if detail.sitemap_xml {
        total += points.sitemap_xml;
    }
    Score::new(total.min(100.0))
}

fn origin_resource(page_url: &Url, path: &str) -> Result<Url> {
    page_url.join(path).map_err(|e| AuditError::CheckExecution {
        category: CheckCategory::Crawlability,
        message: format!("cannot derive {path}: {e}"),
    })
}
