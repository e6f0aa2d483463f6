//! Entity model, scoring, transition rules and the lifecycle engine.
//!
//! Nothing in this module performs I/O or logs; every failure is returned to
//! the caller as a typed error.

pub mod domain;
pub mod engine;
pub mod rules;
pub mod scoring;
pub mod tiers;

pub use domain::{
    ActivityEvent, ActivityKind, ContentStatus, DonorTier, Entity, EntityId, EntityKind,
    EntitySnapshot, SnapshotError, Status, TransitionDetails, TransitionRecord, UserStatus,
};
pub use engine::{LifecycleEngine, TransitionError, TransitionRequest};
pub use rules::{FieldName, TransitionRules, SUSPENSION_DAYS};
pub use scoring::{
    compute_engagement_score, compute_risk_score, days_since_last_activity, score_all,
    score_entity, EntityScores, InvalidEventError, Score, NEVER_ENGAGED_DAYS,
};
pub use tiers::{TierPolicy, TierSuggestion};
