//! Check modules.
//!
//! The set is closed: `CheckSuite::run` dispatches on `CheckCategory` and
//! turns every failure into an errored `CheckResult`, so one check never
//! blocks the others.

pub mod crawlability;
pub mod mobile;
pub mod performance;
pub mod schema;

use std::sync::Arc;
use std::time::Duration;

use crate::config::ScoringConfig;
use crate::domain::models::{
    CheckCategory, CheckDetail, CheckResult, ViewportProfile, ViewportProfiles,
};
use crate::service::http::ResourceFetcher;
use crate::service::inspector::PageSession;

pub struct CheckSuite {
    scoring: ScoringConfig,
    fetcher: Arc<dyn ResourceFetcher>,
    resource_timeout: Duration,
}

impl CheckSuite {
    pub fn new(
        scoring: ScoringConfig,
        fetcher: Arc<dyn ResourceFetcher>,
        resource_timeout: Duration,
    ) -> Self {
        Self {
            scoring,
            fetcher,
            resource_timeout,
        }
    }

    pub fn scoring(&self) -> &ScoringConfig {
        &self.scoring
    }

    /// Run one check against a page. Never fails.
    ///
    /// `shared_profile` is the profile of the page's shared inspection, read
    /// by the crawlability and schema checks.
    pub async fn run(
        &self,
        category: CheckCategory,
        session: &PageSession<'_>,
        profiles: ViewportProfiles,
        shared_profile: ViewportProfile,
    ) -> CheckResult {
        let outcome = match category {
            CheckCategory::Performance => {
                performance::check(&self.scoring, session, profiles)
                    .await
                    .map(|(score, detail)| (score, CheckDetail::Performance(detail)))
            }
            CheckCategory::Crawlability => crawlability::check(
                &self.scoring.crawlability,
                self.fetcher.as_ref(),
                self.resource_timeout,
                session,
                shared_profile,
            )
            .await
            .map(|(score, detail)| (score, CheckDetail::Crawlability(detail))),
            CheckCategory::Schema => schema::check(&self.scoring.schema, session, shared_profile)
                .await
                .map(|(score, detail)| (score, CheckDetail::Schema(detail))),
            CheckCategory::Mobile => mobile::check(&self.scoring.mobile, session)
                .await
                .map(|(score, detail)| (score, CheckDetail::Mobile(detail))),
        };

        match outcome {
            Ok((score, detail)) => {
                log::debug!("[CHECK] {} {} -> {}", category, session.url(), score);
                CheckResult::scored(score, detail)
            }
            Err(e) => {
                log::warn!("[CHECK] {} {} errored: {}", category, session.url(), e);
                CheckResult::errored(category, e)
            }
        }
    }
}
