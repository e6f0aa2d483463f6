//! Declarative predicates over entities and the dashboard segments built from them.

pub mod predicate;
pub mod report;

pub use predicate::{
    DateRange, Field, FieldComparison, FieldComparisonSpec, FilterValue, Operator, Predicate,
    PredicateError, SegmentOutcome,
};
pub use report::{
    summarize, DashboardSummary, NamedSegment, SegmentSummary, SegmentationReport,
    AT_RISK_ENGAGEMENT_CEILING, LAPSING_AFTER_DAYS,
};
