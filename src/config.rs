//! Engine configuration.
//!
//! Every weight and threshold used in scoring lives here so callers can tune
//! them; the defaults follow the published Core Web Vitals / Lighthouse
//! values and the clinic-oriented schema weighting.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::domain::models::{CheckCategory, ViewportProfile};
use crate::error::{AuditError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    /// Maximum pages audited at once (browser contexts open at once)
    pub concurrency: usize,
    pub navigation_timeout_secs: u64,
    /// Timeout for robots.txt / sitemap.xml fetches
    pub resource_timeout_secs: u64,
    /// Retry a page once after a navigation timeout
    pub retry_transient: bool,
    pub user_agent: String,
    pub database_url: Option<String>,
    pub scoring: ScoringConfig,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            navigation_timeout_secs: 30,
            resource_timeout_secs: 5,
            retry_transient: true,
            user_agent: "Mozilla/5.0 (compatible; ClinicAuditBot/1.0)".to_string(),
            database_url: None,
            scoring: ScoringConfig::default(),
        }
    }
}

impl AuditConfig {
    /// Defaults overlaid with environment variables.
    ///
    /// Optional:
    /// - `AUDIT_CONCURRENCY`
    /// - `AUDIT_NAVIGATION_TIMEOUT_SECS`
    /// - `AUDIT_RESOURCE_TIMEOUT_SECS`
    /// - `AUDIT_USER_AGENT`
    /// - `AUDIT_DATABASE_URL`
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(v) = lookup("AUDIT_CONCURRENCY") {
            config.concurrency = parse_number("AUDIT_CONCURRENCY", &v)?;
        }
        if let Some(v) = lookup("AUDIT_NAVIGATION_TIMEOUT_SECS") {
            config.navigation_timeout_secs = parse_number("AUDIT_NAVIGATION_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = lookup("AUDIT_RESOURCE_TIMEOUT_SECS") {
            config.resource_timeout_secs = parse_number("AUDIT_RESOURCE_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = lookup("AUDIT_USER_AGENT") {
            config.user_agent = v;
        }
        config.database_url = lookup("AUDIT_DATABASE_URL").filter(|v| !v.trim().is_empty());

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.concurrency == 0 {
            return Err(AuditError::invalid("concurrency must be at least 1"));
        }
        if self.navigation_timeout_secs == 0 {
            return Err(AuditError::invalid("navigation timeout must be positive"));
        }
        if self.resource_timeout_secs == 0 {
            return Err(AuditError::invalid("resource timeout must be positive"));
        }
        Ok(())
    }

    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_secs(self.navigation_timeout_secs)
    }

    pub fn resource_timeout(&self) -> Duration {
        Duration::from_secs(self.resource_timeout_secs)
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| AuditError::invalid(format!("{key} must be a number, got {value:?}")))
}

// ============================================================================
// SCORING
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub weights: VitalsWeights,
    pub desktop_thresholds: VitalsThresholds,
    pub mobile_thresholds: VitalsThresholds,
    pub crawlability: CrawlabilityPoints,
    pub schema: SchemaPoints,
    pub mobile: MobileHeuristics,
    pub issue_thresholds: IssueThresholds,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            weights: VitalsWeights::default(),
            desktop_thresholds: VitalsThresholds::desktop(),
            mobile_thresholds: VitalsThresholds::mobile(),
            crawlability: CrawlabilityPoints::default(),
            schema: SchemaPoints::default(),
            mobile: MobileHeuristics::default(),
            issue_thresholds: IssueThresholds::default(),
        }
    }
}

impl ScoringConfig {
    pub fn thresholds(&self, profile: ViewportProfile) -> &VitalsThresholds {
        match profile {
            ViewportProfile::Desktop => &self.desktop_thresholds,
            ViewportProfile::Mobile => &self.mobile_thresholds,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct VitalsWeights {
    pub largest_contentful_paint: f64,
    pub first_contentful_paint: f64,
    pub layout_stability: f64,
    pub interactivity: f64,
}

impl Default for VitalsWeights {
    fn default() -> Self {
        Self {
            largest_contentful_paint: 0.35,
            first_contentful_paint: 0.25,
            layout_stability: 0.20,
            interactivity: 0.20,
        }
    }
}

/// `good` and `poor` boundaries for one metric; lower values are better.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Band {
    pub good: f64,
    pub poor: f64,
}

impl Band {
    pub const fn new(good: f64, poor: f64) -> Self {
        Self { good, poor }
    }

    /// Piecewise-linear normalization: 0 → 100, good → 90, poor → 50,
    /// 2×poor → 0.
    pub fn normalize(&self, value: f64) -> f64 {
        let value = value.max(0.0);
        let score = if value <= self.good {
            100.0 - 10.0 * (value / self.good)
        } else if value <= self.poor {
            90.0 - 40.0 * (value - self.good) / (self.poor - self.good)
        } else if value <= 2.0 * self.poor {
            50.0 - 50.0 * (value - self.poor) / self.poor
        } else {
            0.0
        };
        score.clamp(0.0, 100.0)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct VitalsThresholds {
    pub first_contentful_paint_ms: Band,
    pub largest_contentful_paint_ms: Band,
    pub cumulative_layout_shift: Band,
    pub interaction_delay_ms: Band,
}

impl VitalsThresholds {
    /// Lighthouse desktop scoring curves.
    pub fn desktop() -> Self {
        Self {
            first_contentful_paint_ms: Band::new(900.0, 1600.0),
            largest_contentful_paint_ms: Band::new(1200.0, 2400.0),
            cumulative_layout_shift: Band::new(0.10, 0.25),
            interaction_delay_ms: Band::new(100.0, 300.0),
        }
    }

    /// Core Web Vitals field thresholds.
    pub fn mobile() -> Self {
        Self {
            first_contentful_paint_ms: Band::new(1800.0, 3000.0),
            largest_contentful_paint_ms: Band::new(2500.0, 4000.0),
            cumulative_layout_shift: Band::new(0.10, 0.25),
            interaction_delay_ms: Band::new(100.0, 300.0),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CrawlabilityPoints {
    pub base: f64,
    pub robots_txt: f64,
    pub sitemap_xml: f64,
}

impl Default for CrawlabilityPoints {
    fn default() -> Self {
        Self {
            base: 70.0,
            robots_txt: 20.0,
            sitemap_xml: 10.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SchemaPoints {
    pub local_business: f64,
    pub service_provider: f64,
    pub faq: f64,
    pub review: f64,
    pub organization: f64,
    pub malformed_penalty: f64,
}

impl Default for SchemaPoints {
    fn default() -> Self {
        Self {
            local_business: 30.0,
            service_provider: 25.0,
            faq: 20.0,
            review: 15.0,
            organization: 10.0,
            malformed_penalty: 2.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MobileHeuristics {
    pub points_per_signal: f64,
    /// Share of tap targets allowed under the minimum size
    pub max_small_target_ratio: f64,
    pub min_tap_target_px: f64,
    pub min_font_px: f64,
}

impl Default for MobileHeuristics {
    fn default() -> Self {
        Self {
            points_per_signal: 25.0,
            max_small_target_ratio: 0.10,
            min_tap_target_px: 48.0,
            min_font_px: 12.0,
        }
    }
}

/// Scores below these produce issues.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct IssueThresholds {
    pub performance: f64,
    pub crawlability: f64,
    pub schema: f64,
    pub mobile: f64,
}

impl Default for IssueThresholds {
    fn default() -> Self {
        Self {
            performance: 70.0,
            crawlability: 80.0,
            schema: 60.0,
            mobile: 75.0,
        }
    }
}

impl IssueThresholds {
    pub fn for_category(&self, category: CheckCategory) -> f64 {
        match category {
            CheckCategory::Performance => self.performance,
            CheckCategory::Crawlability => self.crawlability,
            CheckCategory::Schema => self.schema,
            CheckCategory::Mobile => self.mobile,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn band_normalization_hits_anchor_points() {
        let band = Band::new(2500.0, 4000.0);
        assert_eq!(band.normalize(0.0), 100.0);
        assert_eq!(band.normalize(2500.0), 90.0);
        assert_eq!(band.normalize(4000.0), 50.0);
        assert_eq!(band.normalize(8000.0), 0.0);
        assert_eq!(band.normalize(12000.0), 0.0);
        assert!((band.normalize(2000.0) - 92.0).abs() < 1e-9);
    }

    #[test]
    fn weights_sum_to_one() {
        let w = VitalsWeights::default();
        let total = w.largest_contentful_paint
            + w.first_contentful_paint
            + w.layout_stability
            + w.interactivity;
        assert!((total - 1.0).abs() < 1e-9);
    }

    #[test]
    fn env_overlay_parses_and_validates() {
        let vars: HashMap<&str, &str> = [
            ("AUDIT_CONCURRENCY", "2"),
            ("AUDIT_NAVIGATION_TIMEOUT_SECS", "10"),
            ("AUDIT_DATABASE_URL", "sqlite::memory:"),
        ]
        .into_iter()
        .collect();
        let config = AuditConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(config.concurrency, 2);
        assert_eq!(config.navigation_timeout(), Duration::from_secs(10));
        assert_eq!(config.resource_timeout(), Duration::from_secs(5));
        assert_eq!(config.database_url.as_deref(), Some("sqlite::memory:"));
    }

    #[test]
    fn env_overlay_rejects_garbage() {
        let err = AuditConfig::from_lookup(|k| (k == "AUDIT_CONCURRENCY").then(|| "many".into()))
            .unwrap_err();
        assert!(matches!(err, AuditError::InvalidRequest(_)));

        let err = AuditConfig::from_lookup(|k| (k == "AUDIT_CONCURRENCY").then(|| "0".into()))
            .unwrap_err();
        assert!(matches!(err, AuditError::InvalidRequest(_)));

        let err =
            AuditConfig::from_lookup(|k| (k == "AUDIT_RESOURCE_TIMEOUT_SECS").then(|| "0".into()))
                .unwrap_err();
        assert!(matches!(err, AuditError::InvalidRequest(_)));
    }

    #[test]
    fn partial_json_config_keeps_defaults() {
        let config: AuditConfig = serde_json::from_str(r#"{"concurrency": 8}"#).unwrap();
        assert_eq!(config.concurrency, 8);
        assert_eq!(config.navigation_timeout_secs, 30);
        assert_eq!(config.scoring.issue_thresholds.schema, 60.0);
    }
}
