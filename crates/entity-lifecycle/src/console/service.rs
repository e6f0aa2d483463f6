use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use super::repository::{
    EntityRepository, EntityStatusView, NotificationPublisher, RepositoryError, TransitionNotice,
};
use crate::lifecycle::scoring::score_entity;
use crate::lifecycle::{
    Entity, EntityId, LifecycleEngine, TierPolicy, TierSuggestion, TransitionError,
    TransitionRequest,
};
use crate::segments::{
    DashboardSummary, FieldComparisonSpec, Predicate, PredicateError, SegmentationReport,
};

/// Host-side service composing storage, notifications and the engine.
pub struct ConsoleService<R, N> {
    repository: Arc<R>,
    notifier: Arc<N>,
    engine: LifecycleEngine,
    tiers: TierPolicy,
}

/// Result of an ad-hoc segment query.
#[derive(Debug, Clone, Serialize)]
pub struct SegmentMatchView {
    pub as_of: DateTime<Utc>,
    pub matched: Vec<EntityId>,
    pub skipped: Vec<EntityId>,
}

impl<R, N> ConsoleService<R, N>
where
    R: EntityRepository + 'static,
    N: NotificationPublisher + 'static,
{
    pub fn new(repository: Arc<R>, notifier: Arc<N>) -> Self {
        Self::with_tier_policy(repository, notifier, TierPolicy::default())
    }

    pub fn with_tier_policy(repository: Arc<R>, notifier: Arc<N>, tiers: TierPolicy) -> Self {
        Self {
            repository,
            notifier,
            engine: LifecycleEngine::new(),
            tiers,
        }
    }

    pub fn register(&self, entity: Entity) -> Result<Entity, ConsoleServiceError> {
        let stored = self.repository.insert(entity)?;
        info!(entity_id = %stored.id(), kind = %stored.kind(), "entity registered");
        Ok(stored)
    }

    pub fn get(&self, id: &EntityId) -> Result<Entity, ConsoleServiceError> {
        let entity = self
            .repository
            .fetch(id)?
            .ok_or(RepositoryError::NotFound)?;
        Ok(entity)
    }

    pub fn status_view(
        &self,
        id: &EntityId,
        as_of: DateTime<Utc>,
    ) -> Result<EntityStatusView, ConsoleServiceError> {
        let entity = self.get(id)?;
        let scores = match score_entity(&entity, as_of) {
            Ok(scores) => Some(scores),
            Err(error) => {
                warn!(entity_id = %entity.id(), %error, "activity history could not be scored");
                None
            }
        };

        Ok(EntityStatusView {
            entity_id: entity.id().clone(),
            kind: entity.kind(),
            name: entity.name().to_string(),
            status: entity.current_status().label(),
            audit_entries: entity.audit_log().len(),
            legal_targets: self
                .engine
                .legal_targets(&entity)
                .into_iter()
                .map(|status| status.label())
                .collect(),
            scores,
        })
    }

    pub fn transition(&self, request: TransitionRequest) -> Result<Entity, ConsoleServiceError> {
        self.transition_at(request, Utc::now())
    }

    /// Fetch, apply, compare-and-swap, then notify.
    ///
    /// A notification failure is logged and does not undo the stored change.
    pub fn transition_at(
        &self,
        request: TransitionRequest,
        now: DateTime<Utc>,
    ) -> Result<Entity, ConsoleServiceError> {
        let current = self.get(&request.entity_id)?;

        let updated = match self.engine.apply(&current, &request, now) {
            Ok(updated) => updated,
            Err(error) => {
                warn!(
                    entity_id = %request.entity_id,
                    from = %request.from,
                    to = %request.to,
                    actor = %request.actor,
                    %error,
                    "transition rejected"
                );
                return Err(error.into());
            }
        };

        self.repository.replace(&current, updated.clone())?;
        info!(
            entity_id = %updated.id(),
            from = %current.current_status(),
            to = %updated.current_status(),
            actor = %request.actor,
            audit_entries = updated.audit_log().len(),
            "transition applied"
        );

        let notice = transition_notice(&current, &updated);
        if let Err(error) = self.notifier.publish(notice) {
            warn!(entity_id = %updated.id(), %error, "transition notice not delivered");
        }

        Ok(updated)
    }

    pub fn evaluate_segment(
        &self,
        specs: &[FieldComparisonSpec],
        as_of: DateTime<Utc>,
    ) -> Result<SegmentMatchView, ConsoleServiceError> {
        let predicate = Predicate::from_specs(specs)?;
        let entities = self.repository.list()?;
        let outcome = predicate.evaluate(&entities, as_of);

        Ok(SegmentMatchView {
            as_of,
            matched: outcome.ids(),
            skipped: outcome.skipped.into_iter().map(|(id, _)| id).collect(),
        })
    }

    pub fn dashboard(&self, as_of: DateTime<Utc>) -> Result<DashboardSummary, ConsoleServiceError> {
        let entities = self.repository.list()?;
        Ok(SegmentationReport::build(&entities, as_of))
    }

    /// Advisory tier changes for every donor whose history points elsewhere.
    pub fn tier_suggestions(
        &self,
        as_of: DateTime<Utc>,
    ) -> Result<Vec<TierSuggestion>, ConsoleServiceError> {
        let entities = self.repository.list()?;
        let mut suggestions = Vec::new();
        for entity in &entities {
            match self.tiers.suggest_for(entity, as_of) {
                Ok(Some(suggestion)) => suggestions.push(suggestion),
                Ok(None) => {}
                Err(error) => {
                    warn!(entity_id = %entity.id(), %error, "skipping tier suggestion")
                }
            }
        }
        Ok(suggestions)
    }
}

fn transition_notice(before: &Entity, after: &Entity) -> TransitionNotice {
    let mut details = BTreeMap::new();
    let record = after.audit_log().last();
    if let Some(record) = record {
        details.insert("reason".to_string(), record.reason.clone());
        if let Some(days) = record.details.suspension_duration_days {
            details.insert("suspension_duration_days".to_string(), days.to_string());
        }
    }

    TransitionNotice {
        template: format!("{}_{}", after.kind().label(), after.current_status().label()),
        entity_id: after.id().clone(),
        kind: after.kind(),
        from: before.current_status(),
        to: after.current_status(),
        actor: record.map(|record| record.actor.clone()).unwrap_or_default(),
        details,
    }
}

/// Error raised by the console service.
#[derive(Debug, thiserror::Error)]
pub enum ConsoleServiceError {
    #[error(transparent)]
    Transition(#[from] TransitionError),
    #[error(transparent)]
    Predicate(#[from] PredicateError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}
