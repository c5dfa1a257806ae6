//! Audit domain entities - behavior lives WITH data

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

// ====== Enums ======

/// Browser viewport a page is rendered under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewportProfile {
    Desktop,
    Mobile,
}

impl ViewportProfile {
    pub fn as_str(&self) -> &'static str {
        match self {
            ViewportProfile::Desktop => "desktop",
            ViewportProfile::Mobile => "mobile",
        }
    }

    /// Emulated device for this profile (Lighthouse defaults).
    pub fn viewport(&self) -> Viewport {
        match self {
            ViewportProfile::Desktop => Viewport {
                width: 1350,
                height: 940,
                device_scale_factor: 1.0,
                mobile: false,
                throttled: false,
            },
            ViewportProfile::Mobile => Viewport {
                width: 412,
                height: 823,
                device_scale_factor: 1.75,
                mobile: true,
                throttled: true,
            },
        }
    }
}

impl fmt::Display for ViewportProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ViewportProfile {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "desktop" => Ok(ViewportProfile::Desktop),
            "mobile" => Ok(ViewportProfile::Mobile),
            other => Err(format!("unknown viewport profile: {other}")),
        }
    }
}

/// Device metrics applied to a browser context.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
    pub device_scale_factor: f64,
    pub mobile: bool,
    /// Slow-4G network and 4x CPU slowdown
    pub throttled: bool,
}

/// Set of profiles requested for an audit run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ViewportProfiles {
    pub desktop: bool,
    pub mobile: bool,
}

impl ViewportProfiles {
    pub fn both() -> Self {
        Self { desktop: true, mobile: true }
    }

    pub fn only(profile: ViewportProfile) -> Self {
        match profile {
            ViewportProfile::Desktop => Self { desktop: true, mobile: false },
            ViewportProfile::Mobile => Self { desktop: false, mobile: true },
        }
    }

    pub fn contains(&self, profile: ViewportProfile) -> bool {
        match profile {
            ViewportProfile::Desktop => self.desktop,
            ViewportProfile::Mobile => self.mobile,
        }
    }

    pub fn is_empty(&self) -> bool {
        !self.desktop && !self.mobile
    }

    /// Requested profiles, desktop first.
    pub fn iter(&self) -> impl Iterator<Item = ViewportProfile> + '_ {
        [ViewportProfile::Desktop, ViewportProfile::Mobile]
            .into_iter()
            .filter(|p| self.contains(*p))
    }

    /// Profile used for the shared page inspection.
    pub fn default_profile(&self) -> Option<ViewportProfile> {
        self.iter().next()
    }
}

impl FromIterator<ViewportProfile> for ViewportProfiles {
    fn from_iter<I: IntoIterator<Item = ViewportProfile>>(iter: I) -> Self {
        let mut profiles = Self::default();
        for profile in iter {
            match profile {
                ViewportProfile::Desktop => profiles.desktop = true,
                ViewportProfile::Mobile => profiles.mobile = true,
            }
        }
        profiles
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditType {
    Basic,
    Comprehensive,
    Performance,
    Seo,
}

impl AuditType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditType::Basic => "basic",
            AuditType::Comprehensive => "comprehensive",
            AuditType::Performance => "performance",
            AuditType::Seo => "seo",
        }
    }

    /// Check categories an audit of this type runs.
    pub fn categories(&self) -> &'static [CheckCategory] {
        match self {
            AuditType::Comprehensive => &CheckCategory::ALL,
            AuditType::Performance => &[CheckCategory::Performance, CheckCategory::Mobile],
            AuditType::Seo => &[CheckCategory::Crawlability, CheckCategory::Schema],
            AuditType::Basic => &[
                CheckCategory::Crawlability,
                CheckCategory::Schema,
                CheckCategory::Mobile,
            ],
        }
    }
}

impl fmt::Display for AuditType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuditType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "basic" => Ok(AuditType::Basic),
            "comprehensive" => Ok(AuditType::Comprehensive),
            "performance" => Ok(AuditType::Performance),
            "seo" => Ok(AuditType::Seo),
            other => Err(format!("unknown audit type: {other}")),
        }
    }
}

/// Closed set of check modules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckCategory {
    Performance,
    Crawlability,
    Schema,
    Mobile,
}

impl CheckCategory {
    pub const ALL: [CheckCategory; 4] = [
        CheckCategory::Performance,
        CheckCategory::Crawlability,
        CheckCategory::Schema,
        CheckCategory::Mobile,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CheckCategory::Performance => "performance",
            CheckCategory::Crawlability => "crawlability",
            CheckCategory::Schema => "schema",
            CheckCategory::Mobile => "mobile",
        }
    }
}

impl fmt::Display for CheckCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Issue severity. Declaration order is priority order: `Critical` sorts first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::High => "high",
            Severity::Medium => "medium",
            Severity::Low => "low",
        }
    }

    /// Severity for a score that fell `shortfall` points below its threshold.
    pub fn from_shortfall(shortfall: f64) -> Option<Severity> {
        if shortfall >= 30.0 {
            Some(Severity::Critical)
        } else if shortfall >= 15.0 {
            Some(Severity::High)
        } else if shortfall > 0.0 {
            Some(Severity::Medium)
        } else {
            None
        }
    }
}

// ====== Score ======

/// A 0-100 score.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, PartialOrd)]
#[serde(transparent)]
pub struct Score(f64);

impl Score {
    pub const ZERO: Score = Score(0.0);
    pub const MAX: Score = Score(100.0);

    /// Clamp into [0, 100]; NaN becomes 0.
    pub fn new(value: f64) -> Self {
        if value.is_nan() {
            return Self::ZERO;
        }
        Self(value.clamp(0.0, 100.0))
    }

    pub fn value(&self) -> f64 {
        self.0
    }

    /// Value with 2-decimal precision
    pub fn rounded(&self) -> f64 {
        (self.0 * 100.0).round() / 100.0
    }

    pub fn is_valid(&self) -> bool {
        self.0.is_finite() && (0.0..=100.0).contains(&self.0)
    }

    /// Arithmetic mean, `None` for an empty input.
    pub fn mean<I: IntoIterator<Item = Score>>(scores: I) -> Option<Score> {
        let (sum, count) = scores
            .into_iter()
            .fold((0.0, 0usize), |(sum, count), s| (sum + s.0, count + 1));
        (count > 0).then(|| Score::new(sum / count as f64))
    }
}

impl From<f64> for Score {
    fn from(v: f64) -> Self {
        Self::new(v)
    }
}

impl fmt::Display for Score {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1}", self.0)
    }
}

// ====== Page Signals ======

/// Raw extraction from one browser inspection of one URL.
#[derive(Debug, Clone, PartialEq)]
pub struct PageSignals {
    pub url: String,
    pub profile: ViewportProfile,
    pub timings: TimingSamples,
    pub dom: DomSummary,
    pub layout: LayoutMetrics,
    /// Raw text of every `application/ld+json` block, unparsed
    pub structured_data: Vec<String>,
}

/// Web-vitals samples reported by the page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimingSamples {
    #[serde(default, rename = "fcp")]
    pub first_contentful_paint_ms: Option<f64>,
    #[serde(default, rename = "lcp")]
    pub largest_contentful_paint_ms: Option<f64>,
    #[serde(default, rename = "cls")]
    pub cumulative_layout_shift: Option<f64>,
    #[serde(default)]
    pub interaction_delay_ms: Option<f64>,
}

/// Structural facts extracted from the rendered document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DomSummary {
    pub title: Option<String>,
    /// Counts for h1 through h6
    pub heading_counts: [u32; 6],
    pub word_count: u32,
    pub image_count: u32,
    pub images_missing_alt: u32,
    pub internal_links: u32,
    pub external_links: u32,
    pub canonical_url: Option<String>,
    pub robots_meta: Option<String>,
    pub viewport_meta: Option<String>,
}

impl DomSummary {
    pub fn h1_count(&self) -> u32 {
        self.heading_counts[0]
    }

    pub fn is_noindex(&self) -> bool {
        self.robots_meta
            .as_deref()
            .is_some_and(|r| r.to_ascii_lowercase().contains("noindex"))
    }
}

/// Rendered layout facts reported by the page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutMetrics {
    pub document_width: f64,
    pub viewport_width: f64,
    #[serde(default)]
    pub tap_targets: u32,
    #[serde(default)]
    pub small_tap_targets: u32,
    #[serde(default = "default_font_px")]
    pub base_font_px: f64,
}

fn default_font_px() -> f64 {
    16.0
}

// ====== Check Results ======

/// One category's finding for one page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckResult {
    pub category: CheckCategory,
    pub outcome: CheckOutcome,
}

/// Either a score with its detail, or the reason the check could not complete.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum CheckOutcome {
    Scored { score: Score, detail: CheckDetail },
    Errored { error: String },
}

impl CheckResult {
    pub fn scored(score: Score, detail: CheckDetail) -> Self {
        Self {
            category: detail.category(),
            outcome: CheckOutcome::Scored { score, detail },
        }
    }

    pub fn errored(category: CheckCategory, error: impl fmt::Display) -> Self {
        Self {
            category,
            outcome: CheckOutcome::Errored {
                error: error.to_string(),
            },
        }
    }

    pub fn score(&self) -> Option<Score> {
        match &self.outcome {
            CheckOutcome::Scored { score, .. } => Some(*score),
            CheckOutcome::Errored { .. } => None,
        }
    }

    pub fn detail(&self) -> Option<&CheckDetail> {
        match &self.outcome {
            CheckOutcome::Scored { detail, .. } => Some(detail),
            CheckOutcome::Errored { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match &self.outcome {
            CheckOutcome::Scored { .. } => None,
            CheckOutcome::Errored { error } => Some(error),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self.outcome, CheckOutcome::Errored { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum CheckDetail {
    Performance(PerformanceDetail),
    Crawlability(CrawlabilityDetail),
    Schema(SchemaDetail),
    Mobile(MobileDetail),
}

impl CheckDetail {
    pub fn category(&self) -> CheckCategory {
        match self {
            CheckDetail::Performance(_) => CheckCategory::Performance,
            CheckDetail::Crawlability(_) => CheckCategory::Crawlability,
            CheckDetail::Schema(_) => CheckCategory::Schema,
            CheckDetail::Mobile(_) => CheckCategory::Mobile,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceDetail {
    pub desktop: Option<ProfilePerformance>,
    pub mobile: Option<ProfilePerformance>,
    /// Profiles whose inspection failed, with the reason
    #[serde(default)]
    pub failed_profiles: Vec<(ViewportProfile, String)>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfilePerformance {
    pub profile: ViewportProfile,
    pub score: Score,
    pub first_contentful_paint: MetricScore,
    pub largest_contentful_paint: MetricScore,
    pub layout_stability: MetricScore,
    pub interactivity: MetricScore,
}

impl ProfilePerformance {
    /// Metric with the lowest normalized score, with its display name.
    pub fn weakest_metric(&self) -> (&'static str, &MetricScore) {
        [
            ("largest_contentful_paint", &self.largest_contentful_paint),
            ("first_contentful_paint", &self.first_contentful_paint),
            ("layout_stability", &self.layout_stability),
            ("interactivity", &self.interactivity),
        ]
        .into_iter()
        .fold(None::<(&'static str, &MetricScore)>, |worst, candidate| match worst {
            Some(w) if w.1.score <= candidate.1.score => Some(w),
            _ => Some(candidate),
        })
        .unwrap_or(("largest_contentful_paint", &self.largest_contentful_paint))
    }
}

/// A raw metric value and its 0-100 normalization.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricScore {
    pub value: f64,
    pub score: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CrawlabilityDetail {
    pub robots_txt: bool,
    pub sitemap_xml: bool,
    pub sitemap_urls: usize,
    pub robots_meta: Option<String>,
    pub canonical_url: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaGroup {
    LocalBusiness,
    ServiceProvider,
    Faq,
    Review,
    Organization,
}

impl SchemaGroup {
    pub const ALL: [SchemaGroup; 5] = [
        SchemaGroup::LocalBusiness,
        SchemaGroup::ServiceProvider,
        SchemaGroup::Faq,
        SchemaGroup::Review,
        SchemaGroup::Organization,
    ];
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchemaDetail {
    pub blocks: usize,
    pub malformed_blocks: usize,
    /// Distinct `@type` values, sorted
    pub types: Vec<String>,
    pub matched_groups: Vec<SchemaGroup>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MobileDetail {
    pub viewport_meta: bool,
    pub responsive_layout: bool,
    pub touch_targets: bool,
    pub mobile_indexing: bool,
    pub document_width: f64,
    pub viewport_width: f64,
    pub tap_targets: u32,
    pub small_tap_targets: u32,
}

// ====== Page Audit ======

/// One page's full audit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageAuditResult {
    pub url: String,
    pub audited_at: DateTime<Utc>,
    pub checks: Vec<CheckResult>,
    pub composite_score: Option<Score>,
    pub unauditable: bool,
    /// Why the whole page failed, when it did
    #[serde(default)]
    pub failure: Option<String>,
}

impl PageAuditResult {
    /// Compose from check results; composite is the mean of scored checks.
    pub fn from_checks(url: impl Into<String>, checks: Vec<CheckResult>) -> Self {
        let composite_score = Score::mean(checks.iter().filter_map(CheckResult::score));
        Self {
            url: url.into(),
            audited_at: Utc::now(),
            unauditable: composite_score.is_none(),
            composite_score,
            checks,
            failure: None,
        }
    }

    /// A page that could not be audited at all.
    pub fn unauditable(url: impl Into<String>, failure: impl fmt::Display) -> Self {
        Self {
            url: url.into(),
            audited_at: Utc::now(),
            checks: Vec::new(),
            composite_score: None,
            unauditable: true,
            failure: Some(failure.to_string()),
        }
    }

    pub fn check(&self, category: CheckCategory) -> Option<&CheckResult> {
        self.checks.iter().find(|c| c.category == category)
    }
}

// ====== Aggregate ======

/// A deduplicated cross-page finding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub severity: Severity,
    pub category: CheckCategory,
    pub title: String,
    pub description: String,
    pub affected_pages: BTreeSet<String>,
    pub recommendation: String,
}

impl Issue {
    pub fn first_affected_page(&self) -> Option<&str> {
        self.affected_pages.iter().next().map(String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub category: CheckCategory,
    pub priority: Severity,
    pub title: String,
    pub text: String,
    pub worst_page: String,
    pub worst_score: Score,
}

/// Output of the aggregator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditSummary {
    pub score: Option<Score>,
    pub issues: Vec<Issue>,
    pub recommendations: Vec<Recommendation>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(pub String);

impl RecordId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Immutable snapshot of one audit run across a clinic's pages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClinicAuditRecord {
    pub id: RecordId,
    pub clinic_id: String,
    pub audit_type: AuditType,
    pub score: Score,
    pub issues: Vec<Issue>,
    pub recommendations: Vec<Recommendation>,
    pub pages: Vec<PageAuditResult>,
    pub requested_pages: usize,
    /// Cancellation stopped the run before every page finished
    pub partial: bool,
    pub created_at: DateTime<Utc>,
}

impl ClinicAuditRecord {
    pub fn auditable_pages(&self) -> usize {
        self.pages.iter().filter(|p| !p.unauditable).count()
    }

    pub fn issues_with_severity(&self, severity: Severity) -> usize {
        self.issues.iter().filter(|i| i.severity == severity).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn score_is_clamped_and_rounded() {
        assert_eq!(Score::new(130.0).value(), 100.0);
        assert_eq!(Score::new(-4.0).value(), 0.0);
        assert_eq!(Score::new(f64::NAN).value(), 0.0);
        assert_eq!(Score::new(87.456).rounded(), 87.46);
    }

    #[test]
    fn severity_follows_shortfall_bands() {
        assert_eq!(Severity::from_shortfall(30.0), Some(Severity::Critical));
        assert_eq!(Severity::from_shortfall(29.9), Some(Severity::High));
        assert_eq!(Severity::from_shortfall(15.0), Some(Severity::High));
        assert_eq!(Severity::from_shortfall(0.5), Some(Severity::Medium));
        assert_eq!(Severity::from_shortfall(0.0), None);
        assert!(Severity::Critical < Severity::Low);
    }

    #[test]
    fn composite_ignores_errored_checks() {
        let checks = vec![
            CheckResult::scored(Score::new(80.0), CheckDetail::Schema(SchemaDetail::default())),
            CheckResult::errored(CheckCategory::Performance, "timeout"),
            CheckResult::scored(
                Score::new(100.0),
                CheckDetail::Crawlability(CrawlabilityDetail::default()),
            ),
        ];
        let page = PageAuditResult::from_checks("https://a.test/", checks);
        assert!(!page.unauditable);
        assert_eq!(page.composite_score, Some(Score::new(90.0)));
    }

    #[test]
    fn all_errored_checks_make_page_unauditable() {
        let checks = CheckCategory::ALL
            .iter()
            .map(|c| CheckResult::errored(*c, "boom"))
            .collect();
        let page = PageAuditResult::from_checks("https://a.test/", checks);
        assert!(page.unauditable);
        assert_eq!(page.composite_score, None);
    }

    #[test]
    fn check_result_serializes_exactly_one_of_detail_or_error() {
        let ok = CheckResult::scored(Score::new(50.0), CheckDetail::Mobile(MobileDetail::default()));
        let json = serde_json::to_value(&ok).unwrap();
        assert_eq!(json["outcome"]["status"], "scored");
        assert!(json["outcome"].get("error").is_none());

        let failed = CheckResult::errored(CheckCategory::Mobile, "render failed");
        let json = serde_json::to_value(&failed).unwrap();
        assert_eq!(json["outcome"]["status"], "errored");
        assert!(json["outcome"].get("detail").is_none());
    }

    #[test]
    fn audit_type_maps_to_categories() {
        assert_eq!(AuditType::Comprehensive.categories().len(), 4);
        assert_eq!(
            AuditType::Seo.categories(),
            &[CheckCategory::Crawlability, CheckCategory::Schema]
        );
        assert_eq!("SEO".parse::<AuditType>(), Ok(AuditType::Seo));
        assert!("deep".parse::<AuditType>().is_err());
    }

    #[test]
    fn viewport_profiles_iterate_desktop_first() {
        let profiles: ViewportProfiles = [ViewportProfile::Mobile, ViewportProfile::Desktop]
            .into_iter()
            .collect();
        assert_eq!(
            profiles.iter().collect::<Vec<_>>(),
            vec![ViewportProfile::Desktop, ViewportProfile::Mobile]
        );
        assert_eq!(
            ViewportProfiles::only(ViewportProfile::Mobile).default_profile(),
            Some(ViewportProfile::Mobile)
        );
        assert!(ViewportProfiles::default().is_empty());
    }
}
