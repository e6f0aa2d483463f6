use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::predicate::{Field, FieldComparison, FilterValue, Operator, Predicate, PredicateError};
use crate::lifecycle::{DonorTier, Entity, EntityId, EntityKind, Status, TransitionRules};

/// Engagement at or below this value puts an entity in the at-risk segment.
pub const AT_RISK_ENGAGEMENT_CEILING: f64 = 39.0;
/// Days without qualifying activity after which a donor counts as lapsing.
pub const LAPSING_AFTER_DAYS: f64 = 181.0;

const UNKNOWN_GROUP: &str = "unknown";

/// Worklists shared by the console filters and the dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NamedSegment {
    AtRisk,
    NeedsReview,
    Lapsing,
}

impl NamedSegment {
    pub const fn ordered() -> [Self; 3] {
        [Self::AtRisk, Self::NeedsReview, Self::Lapsing]
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::AtRisk => "At risk",
            Self::NeedsReview => "Needs review",
            Self::Lapsing => "Lapsing",
        }
    }

    pub fn predicate(self) -> Predicate {
        match self {
            Self::AtRisk => {
                let open: Vec<Status> = EntityKind::ordered()
                    .into_iter()
                    .flat_map(EntityKind::statuses)
                    .filter(|status| !TransitionRules::is_terminal(*status))
                    .collect();
                Predicate::all()
                    .and(FieldComparison::fixed(
                        Field::EngagementScore,
                        Operator::AtMost,
                        FilterValue::Number(AT_RISK_ENGAGEMENT_CEILING),
                    ))
                    .and(status_in(&open))
            }
            Self::NeedsReview => Predicate::all().and(FieldComparison::fixed(
                Field::Status,
                Operator::InSet,
                FilterValue::Set(vec!["flagged".to_string(), "warned".to_string()]),
            )),
            Self::Lapsing => {
                let active_tiers: Vec<Status> = EntityKind::Donor
                    .statuses()
                    .into_iter()
                    .filter(|status| *status != Status::Donor(DonorTier::Lapsed))
                    .collect();
                Predicate::all()
                    .and(FieldComparison::fixed(
                        Field::Kind,
                        Operator::Equals,
                        FilterValue::Text(EntityKind::Donor.label().to_string()),
                    ))
                    .and(FieldComparison::fixed(
                        Field::DaysSinceLastActivity,
                        Operator::AtLeast,
                        FilterValue::Number(LAPSING_AFTER_DAYS),
                    ))
                    .and(status_in(&active_tiers))
            }
        }
    }
}

fn status_in(statuses: &[Status]) -> FieldComparison {
    let labels: BTreeSet<String> = statuses
        .iter()
        .map(|status| status.label().to_string())
        .collect();
    FieldComparison::fixed(
        Field::Status,
        Operator::InSet,
        FilterValue::Set(labels.into_iter().collect()),
    )
}

/// Counts entities per value of `group_by`.
///
/// Tags contribute one count per tag; a missing location is grouped as
/// `unknown`.
pub fn summarize(
    entities: &[Entity],
    group_by: Field,
) -> Result<BTreeMap<String, usize>, PredicateError> {
    let mut counts = BTreeMap::new();

    for entity in entities {
        let keys: Vec<String> = match group_by {
            Field::Kind => vec![entity.kind().label().to_string()],
            Field::Status => vec![entity.current_status().label().to_string()],
            Field::Location => vec![entity.location().unwrap_or(UNKNOWN_GROUP).to_string()],
            Field::Tags => entity.tags().iter().map(|tag| tag.to_lowercase()).collect(),
            field => return Err(PredicateError::NotGroupable { field }),
        };
        for key in keys {
            *counts.entry(key).or_insert(0) += 1;
        }
    }

    Ok(counts)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SegmentSummary {
    pub segment: NamedSegment,
    pub label: &'static str,
    pub count: usize,
    pub entity_ids: Vec<EntityId>,
}

/// Dashboard payload built from the named segments.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardSummary {
    pub as_of: DateTime<Utc>,
    pub total: usize,
    pub by_kind: BTreeMap<String, usize>,
    /// Status counts nested under kind so `active` users and content stay apart.
    pub by_status: BTreeMap<String, BTreeMap<String, usize>>,
    pub segments: Vec<SegmentSummary>,
    /// Entities whose activity could not be scored.
    pub skipped: BTreeSet<EntityId>,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SegmentationReport;

impl SegmentationReport {
    pub fn build(entities: &[Entity], as_of: DateTime<Utc>) -> DashboardSummary {
        let by_kind = summarize(entities, Field::Kind).unwrap_or_default();

        let mut by_status: BTreeMap<String, BTreeMap<String, usize>> = BTreeMap::new();
        for entity in entities {
            *by_status
                .entry(entity.kind().label().to_string())
                .or_default()
                .entry(entity.current_status().label().to_string())
                .or_insert(0) += 1;
        }

        let mut skipped = BTreeSet::new();
        let segments = NamedSegment::ordered()
            .into_iter()
            .map(|segment| {
                let outcome = segment.predicate().evaluate(entities, as_of);
                skipped.extend(outcome.skipped.iter().map(|(id, _)| id.clone()));
                let entity_ids = outcome.ids();
                SegmentSummary {
                    segment,
                    label: segment.label(),
                    count: entity_ids.len(),
                    entity_ids,
                }
            })
            .collect();

        DashboardSummary {
            as_of,
            total: entities.len(),
            by_kind,
            by_status,
            segments,
            skipped,
        }
    }
}

impl DashboardSummary {
    pub fn segment(&self, segment: NamedSegment) -> Option<&SegmentSummary> {
        self.segments.iter().find(|entry| entry.segment == segment)
    }
}
