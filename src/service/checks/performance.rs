//! Lighthouse-style performance scoring from web-vitals samples.

use crate::config::{ScoringConfig, VitalsWeights};
use crate::domain::models::{
    CheckCategory, MetricScore, PerformanceDetail, ProfilePerformance, Score, TimingSamples,
    ViewportProfile, ViewportProfiles,
};
use crate::error::{AuditError, Result};
use crate::service::inspector::PageSession;

/// One inspection per requested profile; the score is the mean of the
/// profiles that produced usable timings.
pub async fn check(
    scoring: &ScoringConfig,
    session: &PageSession<'_>,
    profiles: ViewportProfiles,
) -> Result<(Score, PerformanceDetail)> {
    let mut detail = PerformanceDetail::default();

    for profile in profiles.iter() {
        let outcome = session
            .inspect(profile)
            .await
            .and_then(|signals| score_profile(scoring, profile, &signals.timings, session.url()));

        match outcome {
            Ok(performance) => match profile {
                ViewportProfile::Desktop => detail.desktop = Some(performance),
                ViewportProfile::Mobile => detail.mobile = Some(performance),
            },
            Err(e) => {
                log::debug!("[CHECK] performance/{} failed for {}: {}", profile, session.url(), e);
                detail.failed_profiles.push((profile, e.to_string()));
            }
        }
    }

    let score = Score::mean(
        detail
            .desktop
            .iter()
            .chain(detail.mobile.iter())
            .map(|p| p.score),
    )
    .ok_or_else(|| AuditError::CheckExecution {
        category: CheckCategory::Performance,
        message: describe_failures(&detail.failed_profiles),
    })?;

    Ok((score, detail))
}

/// Normalize and weight one profile's timings.
///
/// Paint timings are required; a missing layout-shift or interaction sample
/// means none was observed.
pub fn score_profile(
    scoring: &ScoringConfig,
    profile: ViewportProfile,
    timings: &TimingSamples,
    url: &str,
) -> Result<ProfilePerformance> {
    let (Some(fcp), Some(lcp)) = (
        timings.first_contentful_paint_ms,
        timings.largest_contentful_paint_ms,
    ) else {
        return Err(AuditError::render(url, "page reported no paint timings"));
    };
    let cls = timings.cumulative_layout_shift.unwrap_or(0.0);
    let delay = timings.interaction_delay_ms.unwrap_or(0.0);

    let thresholds = scoring.thresholds(profile);
    let metric = |value: f64, band: &crate::config::Band| MetricScore {
        value,
        score: band.normalize(value),
    };

    let first_contentful_paint = metric(fcp, &thresholds.first_contentful_paint_ms);
    let largest_contentful_paint = metric(lcp, &thresholds.largest_contentful_paint_ms);
    let layout_stability = metric(cls, &thresholds.cumulative_layout_shift);
    let interactivity = metric(delay, &thresholds.interaction_delay_ms);

    let score = weighted(
        &scoring.weights,
        largest_contentful_paint.score,
        first_contentful_paint.score,
        layout_stability.score,
        interactivity.score,
    );

    Ok(ProfilePerformance {
        profile,
        score: Score::new(score),
        first_contentful_paint,
        largest_contentful_paint,
        layout_stability,
        interactivity,
    })
}

fn weighted(weights: &VitalsWeights, lcp: f64, fcp: f64, cls: f64, delay: f64) -> f64 {
    let total = weights.largest_contentful_paint
        + weights.first_contentful_paint
        + weights.layout_stability
        + weights.interactivity;
    if total <= 0.0 {
        return 0.0;
    }
    (weights.largest_contentful_paint * lcp
        + weights.first_contentful_paint * fcp
        + weights.layout_stability * cls
        + weights.interactivity * delay)
        / total
}

fn describe_failures(failures: &[(ViewportProfile, String)]) -> String {
    if failures.is_empty() {
        return "no viewport profile requested".to_string();
    }
    let reasons: Vec<String> = failures
        .iter()
        .map(|(profile, reason)| format!("{profile}: {reason}"))
        .collect();
    format!("every profile failed ({})", reasons.join("; "))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn samples(fcp: f64, lcp: f64, cls: f64, delay: f64) -> TimingSamples {
        TimingSamples {
            first_contentful_paint_ms: Some(fcp),
            largest_contentful_paint_ms: Some(lcp),
            cumulative_layout_shift: Some(cls),
            interaction_delay_ms: Some(delay),
        }
    }

    #[test]
    fn mobile_profile_scores_against_core_web_vitals() {
        let scoring = ScoringConfig::default();
        let p = score_profile(
            &scoring,
            ViewportProfile::Mobile,
            &samples(1000.0, 2000.0, 0.05, 50.0),
            "https://a.test/",
        )
        .unwrap();

        assert!((p.largest_contentful_paint.score - 92.0).abs() < 1e-9);
        assert!((p.layout_stability.score - 95.0).abs() < 1e-9);
        assert!((p.score.value() - 93.81).abs() < 0.01, "{}", p.score.value());
    }

    #[test]
    fn desktop_thresholds_are_stricter() {
        let scoring = ScoringConfig::default();
        let timings = samples(1000.0, 2000.0, 0.05, 50.0);
        let desktop =
            score_profile(&scoring, ViewportProfile::Desktop, &timings, "https://a.test/").unwrap();
        let mobile =
            score_profile(&scoring, ViewportProfile::Mobile, &timings, "https://a.test/").unwrap();

        assert!((desktop.score.value() - 81.24).abs() < 0.01, "{}", desktop.score.value());
        assert!(desktop.score < mobile.score);
        assert_eq!(desktop.weakest_metric().0, "largest_contentful_paint");
    }

    #[test]
    fn very_slow_page_bottoms_out() {
        let scoring = ScoringConfig::default();
        let p = score_profile(
            &scoring,
            ViewportProfile::Mobile,
            &samples(9000.0, 12000.0, 0.9, 1200.0),
            "https://a.test/",
        )
        .unwrap();
        assert_eq!(p.score, Score::ZERO);
    }

    #[test]
    fn missing_paint_timing_is_a_render_error() {
        let scoring = ScoringConfig::default();
        let timings = TimingSamples {
            first_contentful_paint_ms: None,
            ..samples(0.0, 2000.0, 0.0, 0.0)
        };
        let err = score_profile(&scoring, ViewportProfile::Mobile, &timings, "https://a.test/")
            .unwrap_err();
        assert!(matches!(err, AuditError::Render { .. }));
    }

    #[test]
    fn unobserved_shift_and_delay_count_as_perfect() {
        let scoring = ScoringConfig::default();
        let timings = TimingSamples {
            first_contentful_paint_ms: Some(0.0),
            largest_contentful_paint_ms: Some(0.0),
            cumulative_layout_shift: None,
            interaction_delay_ms: None,
        };
        let p = score_profile(&scoring, ViewportProfile::Desktop, &timings, "https://a.test/")
            .unwrap();
        assert_eq!(p.score, Score::MAX);
    }
}
