//! Merges page results into the clinic-level score, issues and
//! recommendations.
//!
//! Output depends only on the input list: maps are ordered and every sort has
//! a total tie-break, so repeated calls produce identical summaries.

use std::collections::{BTreeMap, BTreeSet};

use crate::config::IssueThresholds;
use crate::domain::models::{
    AuditSummary, CheckCategory, CheckDetail, CheckResult, CrawlabilityDetail, Issue,
    MobileDetail, PageAuditResult, PerformanceDetail, Recommendation, SchemaDetail, SchemaGroup,
    Score, Severity,
};
use crate::error::{AuditError, Result};

pub struct AuditAggregator {
    thresholds: IssueThresholds,
}

impl AuditAggregator {
    pub fn new(thresholds: IssueThresholds) -> Self {
        Self { thresholds }
    }

    pub fn aggregate(&self, pages: &[PageAuditResult]) -> Result<AuditSummary> {
        for page in pages {
            validate_page(page)?;
        }

        let auditable: Vec<&PageAuditResult> = pages.iter().filter(|p| !p.unauditable).collect();
        let score = Score::mean(auditable.iter().filter_map(|p| p.composite_score));

        let issues = self.derive_issues(&auditable);
        let recommendations = derive_recommendations(&auditable, &issues);

        log::debug!(
            "[AUDIT] Aggregated {} pages ({} auditable): {} issues, {} recommendations",
            pages.len(),
            auditable.len(),
            issues.len(),
            recommendations.len()
        );

        Ok(AuditSummary {
            score,
            issues,
            recommendations,
        })
    }

    fn derive_issues(&self, pages: &[&PageAuditResult]) -> Vec<Issue> {
        let mut merged: BTreeMap<(&'static str, String), Issue> = BTreeMap::new();

        for page in pages {
            for check in &page.checks {
                let Some(candidate) = self.candidate(&page.url, check) else {
                    continue;
                };
                merged
                    .entry((candidate.category.as_str(), candidate.title.clone()))
                    .and_modify(|issue| {
                        issue.severity = issue.severity.min(candidate.severity);
                        issue.affected_pages.extend(candidate.affected_pages.iter().cloned());
                    })
                    .or_insert(candidate);
            }
        }

        let mut issues: Vec<Issue> = merged.into_values().collect();
        issues.sort_by(|a, b| {
            a.severity
                .cmp(&b.severity)
                .then_with(|| b.affected_pages.len().cmp(&a.affected_pages.len()))
                .then_with(|| a.category.as_str().cmp(b.category.as_str()))
                .then_with(|| a.first_affected_page().cmp(&b.first_affected_page()))
                .then_with(|| a.title.cmp(&b.title))
        });
        issues
    }

    fn candidate(&self, url: &str, check: &CheckResult) -> Option<Issue> {
        let score = check.score()?;
        let detail = check.detail()?;
        let threshold = self.thresholds.for_category(check.category);
        let severity = Severity::from_shortfall(threshold - score.value())?;
        let finding = Finding::from_detail(detail);

        Some(Issue {
            severity,
            category: check.category,
            title: finding.title().to_string(),
            description: finding.description().to_string(),
            affected_pages: BTreeSet::from([url.to_string()]),
            recommendation: finding.recommendation().to_string(),
        })
    }
}

fn validate_page(page: &PageAuditResult) -> Result<()> {
    match (page.unauditable, page.composite_score) {
        (false, None) => {
            return Err(AuditError::Aggregation(format!(
                "{} is auditable but has no composite score",
                page.url
            )))
        }
        (true, Some(_)) => {
            return Err(AuditError::Aggregation(format!(
                "{} is unauditable but carries a composite score",
                page.url
            )))
        }
        (false, Some(score)) if !score.is_valid() => {
            return Err(AuditError::Aggregation(format!(
                "{} has composite score {} outside [0, 100]",
                page.url,
                score.value()
            )))
        }
        _ => {}
    }

    for check in &page.checks {
        if let Some(score) = check.score() {
            if !score.is_valid() {
                return Err(AuditError::Aggregation(format!(
                    "{} check on {} scored {}",
                    check.category,
                    page.url,
                    score.value()
                )));
            }
        }
    }
    Ok(())
}

/// One recommendation per category with issues, anchored on the category's
/// worst page (ties go to the smallest URL).
fn derive_recommendations(pages: &[&PageAuditResult], issues: &[Issue]) -> Vec<Recommendation> {
    let mut recommendations: Vec<Recommendation> = CheckCategory::ALL
        .iter()
        .filter_map(|category| {
            // Issues are sorted, so the first one is the category's lead
            let lead = issues.iter().find(|i| i.category == *category)?;
            let (worst_page, worst_score) = pages
                .iter()
                .filter_map(|p| {
                    p.check(*category)
                        .and_then(CheckResult::score)
                        .map(|s| (p.url.as_str(), s))
                })
                .min_by(|a, b| {
                    a.1.value()
                        .total_cmp(&b.1.value())
                        .then_with(|| a.0.cmp(b.0))
                })?;

            Some(Recommendation {
                category: *category,
                priority: lead.severity,
                title: recommendation_title(*category).to_string(),
                text: format!(
                    "{} Start with {}, which scored {:.0}/100 for {}.",
                    lead.recommendation,
                    worst_page,
                    worst_score.value(),
                    category
                ),
                worst_page: worst_page.to_string(),
                worst_score,
            })
        })
        .collect();

    recommendations.sort_by(|a, b| {
        a.priority
            .cmp(&b.priority)
            .then_with(|| a.category.as_str().cmp(b.category.as_str()))
    });
    recommendations
}

fn recommendation_title(category: CheckCategory) -> &'static str {
    match category {
        CheckCategory::Performance => "Improve page speed",
        CheckCategory::Crawlability => "Make the site easier to crawl",
        CheckCategory::Schema => "Add structured data",
        CheckCategory::Mobile => "Optimize for mobile devices",
    }
}

// ============================================================================
// FINDINGS
// ============================================================================

/// Canonical reason a check fell below its threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Finding {
    SlowLargestPaint,
    SlowFirstPaint,
    UnstableLayout,
    PoorInteractivity,
    PoorPerformance,
    MissingCrawlFiles,
    MissingRobots,
    InvalidSitemap,
    CrawlabilityProblems,
    MissingStructuredData,
    MissingLocalBusiness,
    IncompleteStructuredData,
    MissingViewport,
    ContentWiderThanScreen,
    SmallTapTargets,
    NotIndexable,
    PoorMobileExperience,
}

impl Finding {
    fn from_detail(detail: &CheckDetail) -> Self {
        match detail {
            CheckDetail::Performance(d) => Self::from_performance(d),
            CheckDetail::Crawlability(d) => Self::from_crawlability(d),
            CheckDetail::Schema(d) => Self::from_schema(d),
            CheckDetail::Mobile(d) => Self::from_mobile(d),
        }
    }

    fn from_performance(detail: &PerformanceDetail) -> Self {
        let worst_profile = detail
            .desktop
            .iter()
            .chain(detail.mobile.iter())
            .min_by(|a, b| a.score.value().total_cmp(&b.score.value()));

        match worst_profile.map(|p| p.weakest_metric().0) {
            Some("largest_contentful_paint") => Finding::SlowLargestPaint,
            Some("first_contentful_paint") => Finding::SlowFirstPaint,
            Some("layout_stability") => Finding::UnstableLayout,
            Some("interactivity") => Finding::PoorInteractivity,
            _ => Finding::PoorPerformance,
        }
    }

    fn from_crawlability(detail: &CrawlabilityDetail) -> Self {
        match (detail.robots_txt, detail.sitemap_xml) {
            (false, false) => Finding::MissingCrawlFiles,
            (false, true) => Finding::MissingRobots,
            (true, false) => Finding::InvalidSitemap,
            (true, true) => Finding::CrawlabilityProblems,
        }
    }

    fn from_schema(detail: &SchemaDetail) -> Self {
        if detail.matched_groups.is_empty() {
            Finding::MissingStructuredData
        } else if !detail.matched_groups.contains(&SchemaGroup::LocalBusiness) {
            Finding::MissingLocalBusiness
        } else {
            Finding::IncompleteStructuredData
        }
    }

    fn from_mobile(detail: &MobileDetail) -> Self {
        if !detail.viewport_meta {
            Finding::MissingViewport
        } else if !detail.responsive_layout {
            Finding::ContentWiderThanScreen
        } else if !detail.touch_targets {
            Finding::SmallTapTargets
        } else if !detail.mobile_indexing {
            Finding::NotIndexable
        } else {
            Finding::PoorMobileExperience
        }
    }

    fn title(&self) -> &'static str {
        match self {
            Finding::SlowLargestPaint => "Slow largest contentful paint",
            Finding::SlowFirstPaint => "Slow first contentful paint",
            Finding::UnstableLayout => "Unstable layout",
            Finding::PoorInteractivity => "Poor interactivity",
            Finding::PoorPerformance => "Poor page performance",
            Finding::MissingCrawlFiles => "Missing robots.txt and sitemap.xml",
            Finding::MissingRobots => "Missing robots.txt",
            Finding::InvalidSitemap => "Missing or invalid sitemap.xml",
            Finding::CrawlabilityProblems => "Crawlability problems",
            Finding::MissingStructuredData => "Missing structured data",
            Finding::MissingLocalBusiness => "Missing local business schema",
            Finding::IncompleteStructuredData => "Incomplete structured data",
            Finding::MissingViewport => "Missing mobile viewport",
            Finding::ContentWiderThanScreen => "Content wider than screen",
            Finding::SmallTapTargets => "Tap targets too small",
            Finding::NotIndexable => "Not ready for mobile-first indexing",
            Finding::PoorMobileExperience => "Poor mobile experience",
        }
    }

    fn description(&self) -> &'static str {
        match self {
            Finding::SlowLargestPaint => "The main content takes too long to render.",
            Finding::SlowFirstPaint => "Visitors wait too long before anything appears on screen.",
            Finding::UnstableLayout => "Content shifts around while the page loads.",
            Finding::PoorInteractivity => "Long main-thread tasks delay responses to input.",
            Finding::PoorPerformance => "The page loads slowly on the audited devices.",
            Finding::MissingCrawlFiles => {
                "Neither robots.txt nor a valid sitemap.xml is served at the site root."
            }
            Finding::MissingRobots => "No robots.txt is served at the site root.",
            Finding::InvalidSitemap => "sitemap.xml is missing or is not well-formed XML.",
            Finding::CrawlabilityProblems => "Search engines may struggle to crawl this site.",
            Finding::MissingStructuredData => {
                "No recognized schema.org markup was found on the page."
            }
            Finding::MissingLocalBusiness => {
                "Structured data does not describe the clinic as a local medical business."
            }
            Finding::IncompleteStructuredData => {
                "Structured data covers the clinic but not its services, FAQs or reviews."
            }
            Finding::MissingViewport => {
                "The page does not declare a device-width viewport or disables zoom."
            }
            Finding::ContentWiderThanScreen => "Content overflows the mobile screen horizontally.",
            Finding::SmallTapTargets => "Too many links and buttons are smaller than 48x48px.",
            Finding::NotIndexable => {
                "The page is marked noindex or uses text too small to read on mobile."
            }
            Finding::PoorMobileExperience => "The page is hard to use on a phone.",
        }
    }

    fn recommendation(&self) -> &'static str {
        match self {
            Finding::SlowLargestPaint => {
                "Compress and preload the hero image and reduce server response time."
            }
            Finding::SlowFirstPaint => "Inline critical CSS and defer render-blocking scripts.",
            Finding::UnstableLayout => {
                "Set explicit dimensions on images, embeds and ad slots."
            }
            Finding::PoorInteractivity => {
                "Split long JavaScript tasks and defer third-party scripts."
            }
            Finding::PoorPerformance => "Profile the page load and remove the slowest resources.",
            Finding::MissingCrawlFiles => {
                "Publish a robots.txt that references an XML sitemap of all clinic pages."
            }
            Finding::MissingRobots => "Publish a robots.txt at the site root.",
            Finding::InvalidSitemap => "Generate a valid XML sitemap and serve it at /sitemap.xml.",
            Finding::CrawlabilityProblems => "Review robots rules and sitemap coverage.",
            Finding::MissingStructuredData => {
                "Add JSON-LD markup describing the clinic (e.g. MedicalClinic or Dentist)."
            }
            Finding::MissingLocalBusiness => {
                "Add a LocalBusiness subtype such as MedicalClinic with address and hours."
            }
            Finding::IncompleteStructuredData => {
                "Mark up services, FAQs and patient reviews alongside the clinic entity."
            }
            Finding::MissingViewport => {
                "Add <meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">."
            }
            Finding::ContentWiderThanScreen => {
                "Use fluid widths and media queries so content fits narrow screens."
            }
            Finding::SmallTapTargets => "Enlarge and space out links and buttons to at least 48px.",
            Finding::NotIndexable => "Remove noindex and use a base font size of at least 12px.",
            Finding::PoorMobileExperience => "Test the page on a phone and fix layout problems.",
        }
    }
}
