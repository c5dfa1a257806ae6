use serde_json::Value;
use std::collections::BTreeSet;

use crate::config::SchemaPoints;
use crate::domain::models::{SchemaDetail, SchemaGroup, Score, ViewportProfile};
use crate::error::Result;
use crate::service::inspector::PageSession;

/// Scores the ld+json blocks of the shared inspection.
pub async fn check(
    points: &SchemaPoints,
    session: &PageSession<'_>,
    shared_profile: ViewportProfile,
) -> Result<(Score, SchemaDetail)> {
    let signals = session.inspect(shared_profile).await?;
    Ok(score_blocks(points, &signals.structured_data))
}

pub fn score_blocks(points: &SchemaPoints, blocks: &[String]) -> (Score, SchemaDetail) {
    let mut types = BTreeSet::new();
    let mut malformed_blocks = 0;

    for block in blocks {
        match serde_json::from_str::<Value>(block) {
            Ok(value) => collect_types(&value, &mut types),
            Err(e) => {
                log::debug!("[CHECK] Skipping malformed ld+json block: {}", e);
                malformed_blocks += 1;
            }
        }
    }

    let matched_groups: Vec<SchemaGroup> = SchemaGroup::ALL
        .into_iter()
        .filter(|group| group_types(*group).iter().any(|t| types.contains(*t)))
        .collect();

    let earned: f64 = matched_groups.iter().map(|g| group_points(points, *g)).sum();
    let penalty = points.malformed_penalty * malformed_blocks as f64;
    let score = Score::new((earned.min(100.0) - penalty).max(0.0));

    let detail = SchemaDetail {
        blocks: blocks.len(),
        malformed_blocks,
        types: types.into_iter().collect(),
        matched_groups,
    };
    (score, detail)
}

/// Every `@type` in the document, including `@graph` members and nested
/// entities. IRI prefixes (`schema:`, `https://schema.org/`) are dropped.
fn collect_types(value: &Value, types: &mut BTreeSet<String>) {
    match value {
        Value::Object(map) => {
            match map.get("@type") {
                Some(Value::String(t)) => {
                    types.insert(local_type_name(t));
                }
                Some(Value::Array(list)) => {
                    types.extend(list.iter().filter_map(Value::as_str).map(local_type_name));
                }
                _ => {}
            }
            for (key, child) in map {
                if key != "@type" {
                    collect_types(child, types);
                }
            }
        }
        Value::Array(items) => items.iter().for_each(|item| collect_types(item, types)),
        _ => {}
    }
}

fn local_type_name(raw: &str) -> String {
    raw.trim()
        .rsplit(['/', ':', '#'])
        .next()
        .unwrap_or(raw)
        .to_string()
}

pub fn group_types(group: SchemaGroup) -> &'static [&'static str] {
    match group {
        SchemaGroup::LocalBusiness => &[
            "LocalBusiness",
            "MedicalClinic",
            "MedicalBusiness",
            "Dentist",
            "Physician",
            "Hospital",
            "Optician",
            "Pharmacy",
            "DiagnosticLab",
            "HealthAndBeautyBusiness",
        ],
        SchemaGroup::ServiceProvider => &[
            "Service",
            "MedicalProcedure",
            "MedicalTherapy",
            "OfferCatalog",
        ],
        SchemaGroup::Faq => &["FAQPage"],
        SchemaGroup::Review => &["Review", "AggregateRating"],
        SchemaGroup::Organization => &["Organization", "Corporation", "MedicalOrganization"],
    }
}

fn group_points(points: &SchemaPoints, group: SchemaGroup) -> f64 {
    match group {
        SchemaGroup::LocalBusiness => points.local_business,
        SchemaGroup::ServiceProvider => points.service_provider,
        SchemaGroup::Faq => points.faq,
        SchemaGroup::Review => points.review,
        SchemaGroup::Organization => points.organization,
    }
}
