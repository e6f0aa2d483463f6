//! Canonical engagement and risk scoring.
//!
//! Scores are projections over an entity's activity history at a point in
//! time. They are never stored on the entity, so every read path recomputes
//! them from the events and the `as_of` instant it is given.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{ActivityEvent, ActivityKind, Entity, EntityId};
use super::rules::TransitionRules;

/// Elapsed days assumed for an entity with no qualifying activity at all.
pub const NEVER_ENGAGED_DAYS: i64 = 365;
/// Engagement points awarded per qualifying event over the whole history.
pub const VOLUME_BONUS: i64 = 5;

/// Bounded integer score in `0..=100`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Score(u8);

impl Score {
    pub const MIN: Score = Score(0);
    pub const MAX: Score = Score(100);

    pub fn clamped(raw: i64) -> Self {
        Self(raw.clamp(0, 100) as u8)
    }

    pub const fn value(self) -> u8 {
        self.0
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum InvalidEventError {
    #[error("event {index} ({kind}) has a non-finite magnitude")]
    NonFiniteMagnitude { index: usize, kind: ActivityKind },
    #[error("event {index} ({kind}) has negative magnitude {magnitude}")]
    NegativeMagnitude {
        index: usize,
        kind: ActivityKind,
        magnitude: f64,
    },
}

pub fn validate_events(events: &[ActivityEvent]) -> Result<(), InvalidEventError> {
    for (index, event) in events.iter().enumerate() {
        if let Some(magnitude) = event.magnitude {
            if !magnitude.is_finite() {
                return Err(InvalidEventError::NonFiniteMagnitude {
                    index,
                    kind: event.kind,
                });
            }
            if magnitude < 0.0 {
                return Err(InvalidEventError::NegativeMagnitude {
                    index,
                    kind: event.kind,
                    magnitude,
                });
            }
        }
    }
    Ok(())
}

/// Recency decay plus lifetime volume reward, clamped to `0..=100`.
///
/// `100 - days_since_last_qualifying_event` (floored at zero) plus
/// [`VOLUME_BONUS`] per qualifying event. With no qualifying event the elapsed
/// days default to [`NEVER_ENGAGED_DAYS`].
pub fn compute_engagement_score(
    events: &[ActivityEvent],
    as_of: DateTime<Utc>,
) -> Result<Score, InvalidEventError> {
    validate_events(events)?;

    let qualifying = events
        .iter()
        .filter(|event| event.kind.is_qualifying())
        .count() as i64;
    let elapsed = elapsed_days(last_qualifying_at(events), as_of);
    let recency = (100 - elapsed).max(0);

    Ok(Score::clamped(
        recency.saturating_add(VOLUME_BONUS.saturating_mul(qualifying)),
    ))
}

/// Weighted count of negative events inside `(window_start, as_of]`.
///
/// The window only opens again through an explicit risk-resetting transition,
/// so the score never falls as time passes.
pub fn compute_risk_score(
    events: &[ActivityEvent],
    window_start: Option<DateTime<Utc>>,
    as_of: DateTime<Utc>,
) -> Result<Score, InvalidEventError> {
    validate_events(events)?;

    let total: i64 = events
        .iter()
        .filter(|event| event.kind.is_negative())
        .filter(|event| event.at <= as_of)
        .filter(|event| window_start.map_or(true, |start| event.at > start))
        .map(|event| risk_weight(event.kind))
        .sum();

    Ok(Score::clamped(total))
}

pub const fn risk_weight(kind: ActivityKind) -> i64 {
    match kind {
        ActivityKind::Warning => 25,
        ActivityKind::Flag => 20,
        ActivityKind::Report => 10,
        ActivityKind::Donation | ActivityKind::Interaction | ActivityKind::Post => 0,
    }
}

pub fn days_since_last_activity(
    events: &[ActivityEvent],
    as_of: DateTime<Utc>,
) -> Result<i64, InvalidEventError> {
    validate_events(events)?;
    Ok(elapsed_days(last_qualifying_at(events), as_of))
}

pub fn lifetime_giving(events: &[ActivityEvent]) -> Result<f64, InvalidEventError> {
    validate_events(events)?;
    Ok(events
        .iter()
        .filter(|event| event.kind == ActivityKind::Donation)
        .filter_map(|event| event.magnitude)
        .sum())
}

pub fn last_qualifying_at(events: &[ActivityEvent]) -> Option<DateTime<Utc>> {
    events
        .iter()
        .filter(|event| event.kind.is_qualifying())
        .map(|event| event.at)
        .max()
}

fn elapsed_days(last: Option<DateTime<Utc>>, as_of: DateTime<Utc>) -> i64 {
    match last {
        Some(at) => (as_of - at).num_days().max(0),
        None => NEVER_ENGAGED_DAYS,
    }
}

/// Start of the current risk window: the most recent reactivate/approve.
pub fn risk_window_start(entity: &Entity) -> Option<DateTime<Utc>> {
    entity
        .audit_log()
        .iter()
        .rev()
        .find(|record| TransitionRules::resets_risk(record.from, record.to))
        .map(|record| record.at)
}

/// All derived metrics for one entity at one instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityScores {
    pub engagement: Score,
    pub risk: Score,
    pub days_since_last_activity: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_activity_at: Option<DateTime<Utc>>,
    pub lifetime_giving: f64,
}

pub fn score_entity(
    entity: &Entity,
    as_of: DateTime<Utc>,
) -> Result<EntityScores, InvalidEventError> {
    let events = entity.events();
    validate_events(events)?;

    Ok(EntityScores {
        engagement: compute_engagement_score(events, as_of)?,
        risk: compute_risk_score(events, risk_window_start(entity), as_of)?,
        days_since_last_activity: days_since_last_activity(events, as_of)?,
        last_activity_at: last_qualifying_at(events),
        lifetime_giving: lifetime_giving(events)?,
    })
}

/// Scores every entity independently; one malformed history does not affect the rest.
pub fn score_all(
    entities: &[Entity],
    as_of: DateTime<Utc>,
) -> Vec<(EntityId, Result<EntityScores, InvalidEventError>)> {
    entities
        .iter()
        .map(|entity| (entity.id().clone(), score_entity(entity, as_of)))
        .collect()
}
