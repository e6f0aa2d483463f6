use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::domain::{Entity, EntityId, Status, TransitionDetails, TransitionRecord};
use super::rules::{FieldName, TransitionRules, SUSPENSION_DAYS};

/// A caller's request to move one entity to a new status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionRequest {
    pub entity_id: EntityId,
    /// Status the caller believes the entity is in.
    pub from: Status,
    pub to: Status,
    pub reason: String,
    pub actor: String,
    /// Transition-specific fields keyed by [`FieldName::key`].
    #[serde(default)]
    pub extra: BTreeMap<String, Value>,
}

impl TransitionRequest {
    pub fn new(
        entity_id: EntityId,
        from: Status,
        to: Status,
        reason: impl Into<String>,
        actor: impl Into<String>,
    ) -> Self {
        Self {
            entity_id,
            from,
            to,
            reason: reason.into(),
            actor: actor.into(),
            extra: BTreeMap::new(),
        }
    }

    pub fn with_extra(mut self, field: FieldName, value: impl Into<Value>) -> Self {
        self.extra.insert(field.key().to_string(), value.into());
        self
    }
}

/// Rejected state change. Each variant is recoverable by the caller.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TransitionError {
    #[error("transition {from} -> {to} is not allowed")]
    IllegalTransition { from: Status, to: Status },
    #[error("{status} is terminal; no further transitions are allowed")]
    TerminalState { status: Status },
    #[error("missing required field `{field}`")]
    MissingField { field: FieldName },
    #[error("invalid field `{field}`: {problem}")]
    InvalidField { field: String, problem: String },
    #[error("entity {entity_id} is {actual}, request assumed {expected}")]
    StaleStatus {
        entity_id: EntityId,
        expected: Status,
        actual: Status,
    },
    #[error("request targets {requested} but was applied to {actual}")]
    EntityMismatch {
        requested: EntityId,
        actual: EntityId,
    },
}

impl TransitionError {
    fn invalid(field: impl Into<String>, problem: impl Into<String>) -> Self {
        Self::InvalidField {
            field: field.into(),
            problem: problem.into(),
        }
    }
}

/// Applies transition requests against the fixed rules table.
///
/// The engine holds no state: it validates, appends one audit record to a
/// copy of the entity and hands the copy back. The input is never modified.
#[derive(Debug, Clone, Copy, Default)]
pub struct LifecycleEngine;

impl LifecycleEngine {
    pub fn new() -> Self {
        Self
    }

    pub fn legal_targets(&self, entity: &Entity) -> BTreeSet<Status> {
        TransitionRules::legal_targets(entity.kind(), entity.current_status())
    }

    pub fn apply(
        &self,
        entity: &Entity,
        request: &TransitionRequest,
        now: DateTime<Utc>,
    ) -> Result<Entity, TransitionError> {
        let current = entity.current_status();

        if TransitionRules::is_terminal(current) {
            return Err(TransitionError::TerminalState { status: current });
        }
        if &request.entity_id != entity.id() {
            return Err(TransitionError::EntityMismatch {
                requested: request.entity_id.clone(),
                actual: entity.id().clone(),
            });
        }
        if request.from != current {
            return Err(TransitionError::StaleStatus {
                entity_id: entity.id().clone(),
                expected: request.from,
                actual: current,
            });
        }
        if !self.legal_targets(entity).contains(&request.to) {
            return Err(TransitionError::IllegalTransition {
                from: current,
                to: request.to,
            });
        }

        let (reason, details) = validate_fields(entity, request)?;
        let actor = request.actor.trim();
        if actor.is_empty() {
            return Err(TransitionError::invalid("actor", "must not be empty"));
        }

        Ok(entity.with_record(TransitionRecord {
            from: current,
            to: request.to,
            reason,
            actor: actor.to_string(),
            at: now,
            details,
        }))
    }

    pub fn apply_now(
        &self,
        entity: &Entity,
        request: &TransitionRequest,
    ) -> Result<Entity, TransitionError> {
        self.apply(entity, request, Utc::now())
    }

    /// Applies each request to its entity independently.
    pub fn apply_batch(
        &self,
        items: &[(Entity, TransitionRequest)],
        now: DateTime<Utc>,
    ) -> Vec<(EntityId, Result<Entity, TransitionError>)> {
        items
            .iter()
            .map(|(entity, request)| (entity.id().clone(), self.apply(entity, request, now)))
            .collect()
    }
}

fn validate_fields(
    entity: &Entity,
    request: &TransitionRequest,
) -> Result<(String, TransitionDetails), TransitionError> {
    let kind = entity.kind();
    let required = TransitionRules::required_fields(kind, request.from, request.to);
    let optional = TransitionRules::optional_fields(kind, request.from, request.to);

    let reason = request.reason.trim();
    if reason.is_empty() {
        return Err(TransitionError::MissingField {
            field: FieldName::Reason,
        });
    }

    for key in request.extra.keys() {
        let accepted = FieldName::from_key(key)
            .filter(|field| *field != FieldName::Reason)
            .is_some_and(|field| required.contains(&field) || optional.contains(&field));
        if !accepted {
            return Err(TransitionError::invalid(
                key.as_str(),
                format!("not accepted for {} -> {}", request.from, request.to),
            ));
        }
    }

    let mut details = TransitionDetails::default();

    if required.contains(&FieldName::SuspensionDurationDays) {
        let field = FieldName::SuspensionDurationDays;
        let value = request
            .extra
            .get(field.key())
            .filter(|value| !value.is_null())
            .ok_or(TransitionError::MissingField { field })?;
        details.suspension_duration_days = Some(parse_suspension_days(value)?);
    }

    match request.extra.get(FieldName::Notes.key()) {
        None | Some(Value::Null) => {}
        Some(Value::String(notes)) => {
            let notes = notes.trim();
            if !notes.is_empty() {
                details.notes = Some(notes.to_string());
            }
        }
        Some(_) => {
            return Err(TransitionError::invalid(
                FieldName::Notes.key(),
                "must be a string",
            ))
        }
    }

    Ok((reason.to_string(), details))
}

fn parse_suspension_days(value: &Value) -> Result<u16, TransitionError> {
    let field = FieldName::SuspensionDurationDays.key();
    let days = value
        .as_i64()
        .ok_or_else(|| TransitionError::invalid(field, "must be a whole number of days"))?;

    if !SUSPENSION_DAYS.contains(&days) {
        return Err(TransitionError::invalid(
            field,
            format!(
                "must be between {} and {} days, got {days}",
                SUSPENSION_DAYS.start(),
                SUSPENSION_DAYS.end()
            ),
        ));
    }

    u16::try_from(days).map_err(|_| TransitionError::invalid(field, "out of range"))
}
