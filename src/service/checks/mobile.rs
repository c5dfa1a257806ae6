use crate::config::MobileHeuristics;
use crate::domain::models::{MobileDetail, PageSignals, Score, ViewportProfile};
use crate::error::Result;
use crate::service::inspector::PageSession;

/// Four equally weighted heuristics over the mobile-profile render.
pub async fn check(
    heuristics: &MobileHeuristics,
    session: &PageSession<'_>,
) -> Result<(Score, MobileDetail)> {
    let signals = session.inspect(ViewportProfile::Mobile).await?;
    Ok(score_signals(heuristics, &signals))
}

pub fn score_signals(heuristics: &MobileHeuristics, signals: &PageSignals) -> (Score, MobileDetail) {
    let layout = &signals.layout;

    let viewport_meta = signals
        .dom
        .viewport_meta
        .as_deref()
        .is_some_and(viewport_allows_scaling_to_device);
    let responsive_layout =
        layout.viewport_width > 0.0 && layout.document_width <= layout.viewport_width;
    let touch_targets = layout.tap_targets == 0
        || (layout.small_tap_targets as f64 / layout.tap_targets as f64)
            <= heuristics.max_small_target_ratio;
    let mobile_indexing =
        !signals.dom.is_noindex() && layout.base_font_px >= heuristics.min_font_px;

    let passed = [viewport_meta, responsive_layout, touch_targets, mobile_indexing]
        .into_iter()
        .filter(|p| *p)
        .count();

    let detail = MobileDetail {
        viewport_meta,
        responsive_layout,
        touch_targets,
        mobile_indexing,
        document_width: layout.document_width,
        viewport_width: layout.viewport_width,
        tap_targets: layout.tap_targets,
        small_tap_targets: layout.small_tap_targets,
    };
    (Score::new(heuristics.points_per_signal * passed as f64), detail)
}

/// `width=device-width` present and pinch zoom not disabled.
fn viewport_allows_scaling_to_device(content: &str) -> bool {
    let normalized: String = content
        .to_ascii_lowercase()
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();
    let directives: Vec<&str> = normalized.split([',', ';']).collect();

    let device_width = directives.contains(&"width=device-width");
    let zoom_disabled = directives
        .iter()
        .any(|d| *d == "user-scalable=no" || *d == "user-scalable=0");
    device_width && !zoom_disabled
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{DomSummary, LayoutMetrics, TimingSamples};

    fn signals(viewport: Option<&str>, layout: LayoutMetrics) -> PageSignals {
        PageSignals {
            url: "https://a.test/".into(),
            profile: ViewportProfile::Mobile,
            timings: TimingSamples::default(),
            dom: DomSummary {
                viewport_meta: viewport.map(str::to_string),
                ..Default::default()
            },
            layout,
            structured_data: vec![],
        }
    }

    fn good_layout() -> LayoutMetrics {
        LayoutMetrics {
            document_width: 412.0,
            viewport_width: 412.0,
            tap_targets: 20,
            small_tap_targets: 2,
            base_font_px: 16.0,
        }
    }

    #[test]
    fn mobile_friendly_page_scores_full_marks() {
        let (s, detail) = score_signals(
            &MobileHeuristics::default(),
            &signals(Some("width=device-width, initial-scale=1"), good_layout()),
        );
        assert_eq!(s, Score::MAX);
        assert!(detail.touch_targets);
    }

    #[test]
    fn each_failed_heuristic_costs_twenty_five() {
        let layout = LayoutMetrics {
            document_width: 980.0,
            small_tap_targets: 3,
            ..good_layout()
        };
        let (s, detail) = score_signals(
            &MobileHeuristics::default(),
            &signals(Some("width=device-width, user-scalable=no"), layout),
        );
        assert_eq!(s, Score::new(25.0));
        assert!(!detail.viewport_meta && !detail.responsive_layout && !detail.touch_targets);
        assert!(detail.mobile_indexing);
    }

    #[test]
    fn noindex_or_tiny_font_fails_indexing_readiness() {
        let mut page = signals(Some("width=device-width"), good_layout());
        page.dom.robots_meta = Some("NOINDEX, follow".into());
        let (_, detail) = score_signals(&MobileHeuristics::default(), &page);
        assert!(!detail.mobile_indexing);

        let page = signals(
            Some("width=device-width"),
            LayoutMetrics {
                base_font_px: 10.0,
                ..good_layout()
            },
        );
        let (s, _) = score_signals(&MobileHeuristics::default(), &page);
        assert_eq!(s, Score::new(75.0));
    }

    #[test]
    fn page_without_tap_targets_passes_that_heuristic() {
        let layout = LayoutMetrics {
            tap_targets: 0,
            small_tap_targets: 0,
            ..good_layout()
        };
        let (_, detail) = score_signals(&MobileHeuristics::default(), &signals(None, layout));
        assert!(detail.touch_targets);
        assert!(!detail.viewport_meta);
    }
}
