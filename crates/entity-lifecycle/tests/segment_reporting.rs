//! Segment predicates and dashboard reporting over a mixed roster.

use chrono::{DateTime, Duration, TimeZone, Utc};

use entity_lifecycle::lifecycle::{
    ActivityEvent, ActivityKind, ContentStatus, DonorTier, Entity, EntityId, Status, UserStatus,
};
use entity_lifecycle::segments::{
    summarize, DateRange, Field, FieldComparison, FieldComparisonSpec, FilterValue, NamedSegment,
    Operator, Predicate, PredicateError, SegmentationReport,
};

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 9, 1, 12, 0, 0).unwrap()
}

fn days_ago(days: i64) -> DateTime<Utc> {
    now() - Duration::days(days)
}

fn roster() -> Vec<Entity> {
    vec![
        Entity::new("donor-a", "Rowan", Status::Donor(DonorTier::Regular), days_ago(700))
            .with_location("Portland")
            .with_tags(["Gala"])
            .with_events([
                ActivityEvent::donation(days_ago(20), 120.0),
                ActivityEvent::donation(days_ago(5), 80.0),
            ]),
        Entity::new("donor-b", "Emerson", Status::Donor(DonorTier::Major), days_ago(2000))
            .with_location("Seattle")
            .with_event(ActivityEvent::donation(days_ago(300), 25_000.0)),
        Entity::new("donor-c", "Blake", Status::Donor(DonorTier::Lapsed), days_ago(900)),
        Entity::new(
            "user-d",
            "river_t",
            Status::PlatformUser(UserStatus::Warned),
            days_ago(50),
        )
        .with_event(ActivityEvent::new(ActivityKind::Post, days_ago(2))),
        Entity::new(
            "user-e",
            "throwaway",
            Status::PlatformUser(UserStatus::Banned),
            days_ago(40),
        ),
        Entity::new(
            "post-f",
            "Volunteer shifts",
            Status::ContentItem(ContentStatus::Flagged),
            days_ago(3),
        )
        .with_event(ActivityEvent::new(ActivityKind::Interaction, days_ago(1))),
        Entity::new(
            "post-g",
            "Broken import",
            Status::ContentItem(ContentStatus::Active),
            days_ago(10),
        )
        .with_event(ActivityEvent::new(ActivityKind::Interaction, days_ago(4)).with_magnitude(-1.0)),
    ]
}

fn ids(entities: &[&Entity]) -> Vec<String> {
    entities.iter().map(|entity| entity.id().0.clone()).collect()
}

#[test]
fn empty_predicate_returns_the_input_unchanged() {
    let entities = roster();
    let outcome = Predicate::all().evaluate(&entities, now());

    assert_eq!(outcome.matched.len(), entities.len());
    for (matched, original) in outcome.matched.iter().zip(&entities) {
        assert_eq!(*matched, original);
    }
    assert!(outcome.skipped.is_empty());
}

#[test]
fn unknown_fields_fail_at_construction() {
    let specs = vec![
        FieldComparisonSpec {
            field: "kind".to_string(),
            operator: Operator::Equals,
            value: FilterValue::Text("donor".to_string()),
        },
        FieldComparisonSpec {
            field: "favoriteColor".to_string(),
            operator: Operator::Equals,
            value: FilterValue::Text("teal".to_string()),
        },
    ];

    let err = Predicate::from_specs(&specs).expect_err("unknown field");
    assert_eq!(
        err,
        PredicateError::UnknownField {
            name: "favoriteColor".to_string()
        }
    );
}

#[test]
fn operators_are_checked_against_field_types() {
    let err = FieldComparison::new("tags", Operator::AtLeast, FilterValue::Number(2.0))
        .expect_err("tags are not numeric");
    assert!(matches!(err, PredicateError::UnsupportedOperator { .. }));

    let err = FieldComparison::new("riskScore", Operator::AtMost, FilterValue::Text("low".into()))
        .expect_err("numeric field needs a number");
    assert!(matches!(err, PredicateError::InvalidValue { .. }));
}

#[test]
fn conjunction_combines_stored_and_computed_fields() {
    let entities = roster();
    let specs = vec![
        FieldComparisonSpec {
            field: "kind".to_string(),
            operator: Operator::Equals,
            value: FilterValue::Text("donor".to_string()),
        },
        FieldComparisonSpec {
            field: "tags".to_string(),
            operator: Operator::Contains,
            value: FilterValue::Text("gala".to_string()),
        },
        FieldComparisonSpec {
            field: "engagementScore".to_string(),
            operator: Operator::AtLeast,
            value: FilterValue::Number(50.0),
        },
    ];

    let predicate = Predicate::from_specs(&specs).expect("valid predicate");
    assert!(predicate.references_computed_fields());
    let outcome = predicate.evaluate(&entities, now());
    assert_eq!(ids(&outcome.matched), vec!["donor-a"]);
}

#[test]
fn malformed_history_is_skipped_only_when_scores_are_needed() {
    let entities = roster();

    let recent = Predicate::all().and(
        FieldComparison::typed(
            Field::LastActivityAt,
            Operator::WithinDates,
            FilterValue::Range(DateRange {
                start: days_ago(10),
                end: now(),
            }),
        )
        .expect("valid comparison"),
    );
    let outcome = recent.evaluate(&entities, now());
    assert_eq!(ids(&outcome.matched), vec!["donor-a", "user-d", "post-f"]);
    assert_eq!(outcome.skipped.len(), 1);
    assert_eq!(outcome.skipped[0].0, EntityId::from("post-g"));

    let active = Predicate::all().and(
        FieldComparison::typed(
            Field::Status,
            Operator::Equals,
            FilterValue::Text("active".to_string()),
        )
        .expect("valid comparison"),
    );
    let outcome = active.evaluate(&entities, now());
    assert_eq!(ids(&outcome.matched), vec!["post-g"]);
    assert!(outcome.skipped.is_empty());
}

#[test]
fn dashboard_reports_named_segments() {
    let entities = roster();
    let summary = SegmentationReport::build(&entities, now());

    assert_eq!(summary.total, 7);
    assert_eq!(summary.by_kind.get("donor"), Some(&3));
    assert_eq!(
        summary
            .by_status
            .get("platform-user")
            .and_then(|statuses| statuses.get("banned")),
        Some(&1)
    );

    let members = |segment: NamedSegment| -> Vec<EntityId> {
        summary
            .segment(segment)
            .map(|summary| summary.entity_ids.clone())
            .unwrap_or_default()
    };
    assert_eq!(
        members(NamedSegment::AtRisk),
        vec![EntityId::from("donor-b"), EntityId::from("donor-c")]
    );
    assert_eq!(
        members(NamedSegment::NeedsReview),
        vec![EntityId::from("user-d"), EntityId::from("post-f")]
    );
    assert_eq!(members(NamedSegment::Lapsing), vec![EntityId::from("donor-b")]);
    assert!(summary.skipped.contains(&EntityId::from("post-g")));
}

#[test]
fn summarize_groups_by_categorical_fields() {
    let entities = roster();

    let by_location = summarize(&entities, Field::Location).expect("groupable");
    assert_eq!(by_location.get("Portland"), Some(&1));
    assert_eq!(by_location.get("unknown"), Some(&5));

    let by_tag = summarize(&entities, Field::Tags).expect("groupable");
    assert_eq!(by_tag.get("gala"), Some(&1));

    let err = summarize(&entities, Field::EngagementScore).expect_err("numeric");
    assert_eq!(
        err,
        PredicateError::NotGroupable {
            field: Field::EngagementScore
        }
    );
}
