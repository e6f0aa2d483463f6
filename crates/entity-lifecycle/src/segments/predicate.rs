use std::cell::OnceCell;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::lifecycle::scoring::{score_entity, EntityScores, InvalidEventError};
use crate::lifecycle::{Entity, EntityId};

/// Attributes a predicate can compare against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Field {
    Id,
    Name,
    Kind,
    Status,
    Tags,
    Location,
    CreatedAt,
    EngagementScore,
    RiskScore,
    DaysSinceLastActivity,
    LastActivityAt,
    LifetimeGiving,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FieldType {
    Text,
    TextList,
    Number,
    Date,
}

impl Field {
    pub const fn all() -> [Self; 12] {
        [
            Self::Id,
            Self::Name,
            Self::Kind,
            Self::Status,
            Self::Tags,
            Self::Location,
            Self::CreatedAt,
            Self::EngagementScore,
            Self::RiskScore,
            Self::DaysSinceLastActivity,
            Self::LastActivityAt,
            Self::LifetimeGiving,
        ]
    }

    pub const fn key(self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::Name => "name",
            Self::Kind => "kind",
            Self::Status => "status",
            Self::Tags => "tags",
            Self::Location => "location",
            Self::CreatedAt => "createdAt",
            Self::EngagementScore => "engagementScore",
            Self::RiskScore => "riskScore",
            Self::DaysSinceLastActivity => "daysSinceLastActivity",
            Self::LastActivityAt => "lastActivityAt",
            Self::LifetimeGiving => "lifetimeGiving",
        }
    }

    pub fn parse(name: &str) -> Result<Self, PredicateError> {
        Self::all()
            .into_iter()
            .find(|field| field.key() == name)
            .ok_or_else(|| PredicateError::UnknownField {
                name: name.to_string(),
            })
    }

    /// Fields derived from activity history rather than stored on the entity.
    pub const fn is_computed(self) -> bool {
        matches!(
            self,
            Self::EngagementScore
                | Self::RiskScore
                | Self::DaysSinceLastActivity
                | Self::LastActivityAt
                | Self::LifetimeGiving
        )
    }

    const fn value_type(self) -> FieldType {
        match self {
            Self::Id | Self::Name | Self::Kind | Self::Status | Self::Location => FieldType::Text,
            Self::Tags => FieldType::TextList,
            Self::CreatedAt | Self::LastActivityAt => FieldType::Date,
            Self::EngagementScore
            | Self::RiskScore
            | Self::DaysSinceLastActivity
            | Self::LifetimeGiving => FieldType::Number,
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    Equals,
    InSet,
    AtLeast,
    AtMost,
    Contains,
    WithinDates,
}

impl Operator {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Equals => "equals",
            Self::InSet => "in_set",
            Self::AtLeast => "at_least",
            Self::AtMost => "at_most",
            Self::Contains => "contains",
            Self::WithinDates => "within_dates",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Inclusive timestamp range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl DateRange {
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start <= at && at <= self.end
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    Number(f64),
    Text(String),
    Set(Vec<String>),
    Range(DateRange),
}

/// Unvalidated comparison as received from a caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldComparisonSpec {
    pub field: String,
    pub operator: Operator,
    pub value: FilterValue,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PredicateError {
    #[error("unknown field `{name}`")]
    UnknownField { name: String },
    #[error("operator `{operator}` is not supported for field `{field}`")]
    UnsupportedOperator { field: Field, operator: Operator },
    #[error("`{field} {operator}` expects {expected}")]
    InvalidValue {
        field: Field,
        operator: Operator,
        expected: &'static str,
    },
    #[error("cannot group by field `{field}`")]
    NotGroupable { field: Field },
}

/// A single validated `field operator value` term.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldComparison {
    field: Field,
    operator: Operator,
    value: FilterValue,
}

impl FieldComparison {
    pub fn new(field: &str, operator: Operator, value: FilterValue) -> Result<Self, PredicateError> {
        Self::typed(Field::parse(field)?, operator, value)
    }

    pub fn typed(
        field: Field,
        operator: Operator,
        value: FilterValue,
    ) -> Result<Self, PredicateError> {
        let field_type = field.value_type();
        let operator_supported = match field_type {
            FieldType::Text | FieldType::TextList => matches!(
                operator,
                Operator::Equals | Operator::InSet | Operator::Contains
            ),
            FieldType::Number => matches!(
                operator,
                Operator::Equals | Operator::AtLeast | Operator::AtMost
            ),
            FieldType::Date => operator == Operator::WithinDates,
        };
        if !operator_supported {
            return Err(PredicateError::UnsupportedOperator { field, operator });
        }

        let invalid = |expected| PredicateError::InvalidValue {
            field,
            operator,
            expected,
        };

        let value = match (operator, value) {
            (Operator::InSet, FilterValue::Set(values)) => {
                FilterValue::Set(values.iter().map(|value| normalize(value)).collect())
            }
            (Operator::InSet, _) => return Err(invalid("a list of strings")),
            (Operator::WithinDates, FilterValue::Range(range)) => {
                if range.start > range.end {
                    return Err(invalid("a range whose start precedes its end"));
                }
                FilterValue::Range(range)
            }
            (Operator::WithinDates, _) => return Err(invalid("a {start, end} range")),
            (_, FilterValue::Number(number)) if field_type == FieldType::Number => {
                if !number.is_finite() {
                    return Err(invalid("a finite number"));
                }
                FilterValue::Number(number)
            }
            (_, _) if field_type == FieldType::Number => return Err(invalid("a number")),
            (_, FilterValue::Text(text)) => FilterValue::Text(normalize(&text)),
            (_, _) => return Err(invalid("a string")),
        };

        Ok(Self {
            field,
            operator,
            value,
        })
    }

    /// Constructor for terms whose shape is fixed in code.
    pub(crate) fn fixed(field: Field, operator: Operator, value: FilterValue) -> Self {
        Self {
            field,
            operator,
            value,
        }
    }

    pub fn field(&self) -> Field {
        self.field
    }

    pub fn operator(&self) -> Operator {
        self.operator
    }

    pub fn value(&self) -> &FilterValue {
        &self.value
    }

    fn matches(&self, view: &EntityView<'_>) -> Result<bool, InvalidEventError> {
        let matched = match self.field.value_type() {
            FieldType::Text => view
                .text(self.field)
                .is_some_and(|text| self.matches_text(&text)),
            FieldType::TextList => view
                .entity
                .tags()
                .iter()
                .any(|tag| self.matches_text(&normalize(tag))),
            FieldType::Number => {
                let number = view.number(self.field)?;
                match (self.operator, &self.value) {
                    (Operator::Equals, FilterValue::Number(value)) => {
                        (number - value).abs() < f64::EPSILON
                    }
                    (Operator::AtLeast, FilterValue::Number(value)) => number >= *value,
                    (Operator::AtMost, FilterValue::Number(value)) => number <= *value,
                    _ => false,
                }
            }
            FieldType::Date => match (&self.value, view.date(self.field)?) {
                (FilterValue::Range(range), Some(at)) => range.contains(at),
                _ => false,
            },
        };
        Ok(matched)
    }

    fn matches_text(&self, text: &str) -> bool {
        match (self.operator, &self.value) {
            (Operator::Equals, FilterValue::Text(value)) => text == value,
            (Operator::Contains, FilterValue::Text(value)) => text.contains(value.as_str()),
            (Operator::InSet, FilterValue::Set(values)) => values.iter().any(|value| value == text),
            _ => false,
        }
    }
}

impl TryFrom<&FieldComparisonSpec> for FieldComparison {
    type Error = PredicateError;

    fn try_from(spec: &FieldComparisonSpec) -> Result<Self, Self::Error> {
        Self::new(&spec.field, spec.operator, spec.value.clone())
    }
}

fn normalize(text: &str) -> String {
    text.trim().to_lowercase()
}

/// Conjunction of field comparisons. An empty predicate matches everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Predicate {
    terms: Vec<FieldComparison>,
}

/// Result of evaluating a predicate over a collection.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentOutcome<'a> {
    pub matched: Vec<&'a Entity>,
    /// Entities whose activity history could not be scored.
    pub skipped: Vec<(EntityId, InvalidEventError)>,
}

impl SegmentOutcome<'_> {
    pub fn ids(&self) -> Vec<EntityId> {
        self.matched.iter().map(|entity| entity.id().clone()).collect()
    }
}

impl Predicate {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn new(terms: Vec<FieldComparison>) -> Self {
        Self { terms }
    }

    pub fn from_specs(specs: &[FieldComparisonSpec]) -> Result<Self, PredicateError> {
        let terms = specs
            .iter()
            .map(FieldComparison::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { terms })
    }

    pub fn and(mut self, term: FieldComparison) -> Self {
        self.terms.push(term);
        self
    }

    pub fn terms(&self) -> &[FieldComparison] {
        &self.terms
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn references_computed_fields(&self) -> bool {
        self.terms.iter().any(|term| term.field.is_computed())
    }

    /// Selects matching entities in input order.
    ///
    /// Computed fields are scored lazily, at most once per entity, and the
    /// cache is dropped when the call returns.
    pub fn evaluate<'a>(&self, entities: &'a [Entity], as_of: DateTime<Utc>) -> SegmentOutcome<'a> {
        let mut outcome = SegmentOutcome {
            matched: Vec::new(),
            skipped: Vec::new(),
        };

        for entity in entities {
            let view = EntityView::new(entity, as_of);
            match self.matches(&view) {
                Ok(true) => outcome.matched.push(entity),
                Ok(false) => {}
                Err(error) => outcome.skipped.push((entity.id().clone(), error)),
            }
        }

        outcome
    }

    pub fn matches_entity(
        &self,
        entity: &Entity,
        as_of: DateTime<Utc>,
    ) -> Result<bool, InvalidEventError> {
        self.matches(&EntityView::new(entity, as_of))
    }

    fn matches(&self, view: &EntityView<'_>) -> Result<bool, InvalidEventError> {
        for term in &self.terms {
            if !term.matches(view)? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

/// Per-entity, per-call view that resolves field values.
struct EntityView<'a> {
    entity: &'a Entity,
    as_of: DateTime<Utc>,
    scores: OnceCell<Result<EntityScores, InvalidEventError>>,
}

impl<'a> EntityView<'a> {
    fn new(entity: &'a Entity, as_of: DateTime<Utc>) -> Self {
        Self {
            entity,
            as_of,
            scores: OnceCell::new(),
        }
    }

    fn scores(&self) -> Result<&EntityScores, InvalidEventError> {
        self.scores
            .get_or_init(|| score_entity(self.entity, self.as_of))
            .as_ref()
            .map_err(Clone::clone)
    }

    fn text(&self, field: Field) -> Option<String> {
        let raw = match field {
            Field::Id => self.entity.id().0.as_str(),
            Field::Name => self.entity.name(),
            Field::Kind => self.entity.kind().label(),
            Field::Status => self.entity.current_status().label(),
            Field::Location => self.entity.location()?,
            _ => return None,
        };
        Some(normalize(raw))
    }

    fn number(&self, field: Field) -> Result<f64, InvalidEventError> {
        let scores = self.scores()?;
        Ok(match field {
            Field::EngagementScore => f64::from(scores.engagement.value()),
            Field::RiskScore => f64::from(scores.risk.value()),
            Field::DaysSinceLastActivity => scores.days_since_last_activity as f64,
            Field::LifetimeGiving => scores.lifetime_giving,
            _ => f64::NAN,
        })
    }

    fn date(&self, field: Field) -> Result<Option<DateTime<Utc>>, InvalidEventError> {
        match field {
            Field::CreatedAt => Ok(Some(self.entity.created_at())),
            Field::LastActivityAt => Ok(self.scores()?.last_activity_at),
            _ => Ok(None),
        }
    }
}
