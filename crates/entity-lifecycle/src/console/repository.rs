use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::lifecycle::scoring::EntityScores;
use crate::lifecycle::{Entity, EntityId, EntityKind, Status};

/// Storage abstraction supplied by the host.
pub trait EntityRepository: Send + Sync {
    fn insert(&self, entity: Entity) -> Result<Entity, RepositoryError>;
    fn fetch(&self, id: &EntityId) -> Result<Option<Entity>, RepositoryError>;
    fn list(&self) -> Result<Vec<Entity>, RepositoryError>;
    /// Compare-and-swap: store `updated` only if the stored entity still has
    /// the same audit log length as `expected`, otherwise `Conflict`.
    fn replace(&self, expected: &Entity, updated: Entity) -> Result<(), RepositoryError>;
}

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("entity changed concurrently")]
    Conflict,
    #[error("entity not found")]
    NotFound,
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

/// Outbound hook fired after a transition is stored (e-mail, chat, etc.).
pub trait NotificationPublisher: Send + Sync {
    fn publish(&self, notice: TransitionNotice) -> Result<(), NotifyError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionNotice {
    pub template: String,
    pub entity_id: EntityId,
    pub kind: EntityKind,
    pub from: Status,
    pub to: Status,
    pub actor: String,
    pub details: BTreeMap<String, String>,
}

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("notification transport unavailable: {0}")]
    Transport(String),
}

/// Sanitized representation of an entity for API responses.
#[derive(Debug, Clone, Serialize)]
pub struct EntityStatusView {
    pub entity_id: EntityId,
    pub kind: EntityKind,
    pub name: String,
    pub status: &'static str,
    pub audit_entries: usize,
    pub legal_targets: Vec<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scores: Option<EntityScores>,
}
