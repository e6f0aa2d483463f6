use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::response::Response;
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::Value;

use crate::console::repository::{
    EntityRepository, NotificationPublisher, NotifyError, RepositoryError, TransitionNotice,
};
use crate::console::{console_router, ConsoleService};
use crate::lifecycle::{
    ActivityEvent, ActivityKind, ContentStatus, DonorTier, Entity, EntityId, Status, UserStatus,
};

pub(super) fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 8, 20, 16, 0, 0).unwrap()
}

pub(super) fn active_user() -> Entity {
    Entity::new(
        "user-100",
        "Riley",
        Status::PlatformUser(UserStatus::Active),
        now() - Duration::days(60),
    )
    .with_tags(["forum"])
    .with_events([
        ActivityEvent::new(ActivityKind::Post, now() - Duration::days(2)),
        ActivityEvent::new(ActivityKind::Report, now() - Duration::days(1)),
    ])
}

pub(super) fn flagged_post() -> Entity {
    Entity::new(
        "post-200",
        "Volunteer recap",
        Status::ContentItem(ContentStatus::Flagged),
        now() - Duration::days(5),
    )
    .with_event(ActivityEvent::new(ActivityKind::Flag, now() - Duration::days(4)))
}

pub(super) fn fading_donor() -> Entity {
    Entity::new(
        "donor-300",
        "Quinn",
        Status::Donor(DonorTier::Regular),
        now() - Duration::days(800),
    )
    .with_event(ActivityEvent::donation(now() - Duration::days(240), 75.0))
}

pub(super) fn build_service() -> (
    ConsoleService<MemoryRepository, MemoryNotifier>,
    Arc<MemoryRepository>,
    Arc<MemoryNotifier>,
) {
    let repository = Arc::new(MemoryRepository::default());
    let notifier = Arc::new(MemoryNotifier::default());
    let service = ConsoleService::new(repository.clone(), notifier.clone());
    for entity in [active_user(), flagged_post(), fading_donor()] {
        service.register(entity).expect("seed entity");
    }
    (service, repository, notifier)
}

#[derive(Default, Clone)]
pub(super) struct MemoryRepository {
    pub(super) records: Arc<Mutex<HashMap<EntityId, Entity>>>,
}

impl EntityRepository for MemoryRepository {
    fn insert(&self, entity: Entity) -> Result<Entity, RepositoryError> {
        let mut guard = self.records.lock().expect("repository mutex poisoned");
        if guard.contains_key(entity.id()) {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(entity.id().clone(), entity.clone());
        Ok(entity)
    }

    fn fetch(&self, id: &EntityId) -> Result<Option<Entity>, RepositoryError> {
        let guard = self.records.lock().expect("repository mutex poisoned");
        Ok(guard.get(id).cloned())
    }

    fn list(&self) -> Result<Vec<Entity>, RepositoryError> {
        let guard = self.records.lock().expect("repository mutex poisoned");
        let mut entities: Vec<Entity> = guard.values().cloned().collect();
        entities.sort_by(|a, b| a.id().cmp(b.id()));
        Ok(entities)
    }

    fn replace(&self, expected: &Entity, updated: Entity) -> Result<(), RepositoryError> {
        let mut guard = self.records.lock().expect("repository mutex poisoned");
        let stored = guard.get(expected.id()).ok_or(RepositoryError::NotFound)?;
        if stored.audit_log().len() != expected.audit_log().len() {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(updated.id().clone(), updated);
        Ok(())
    }
}

/// Simulates a concurrent admin landing a transition between fetch and replace.
pub(super) struct RacingRepository {
    pub(super) inner: MemoryRepository,
}

impl EntityRepository for RacingRepository {
    fn insert(&self, entity: Entity) -> Result<Entity, RepositoryError> {
        self.inner.insert(entity)
    }

    fn fetch(&self, id: &EntityId) -> Result<Option<Entity>, RepositoryError> {
        self.inner.fetch(id)
    }

    fn list(&self) -> Result<Vec<Entity>, RepositoryError> {
        self.inner.list()
    }

    fn replace(&self, _expected: &Entity, _updated: Entity) -> Result<(), RepositoryError> {
        Err(RepositoryError::Conflict)
    }
}

pub(super) struct UnavailableRepository;

impl EntityRepository for UnavailableRepository {
    fn insert(&self, _entity: Entity) -> Result<Entity, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn fetch(&self, _id: &EntityId) -> Result<Option<Entity>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn list(&self) -> Result<Vec<Entity>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn replace(&self, _expected: &Entity, _updated: Entity) -> Result<(), RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }
}

#[derive(Default, Clone)]
pub(super) struct MemoryNotifier {
    notices: Arc<Mutex<Vec<TransitionNotice>>>,
}

impl MemoryNotifier {
    pub(super) fn notices(&self) -> Vec<TransitionNotice> {
        self.notices.lock().expect("notifier mutex poisoned").clone()
    }
}

impl NotificationPublisher for MemoryNotifier {
    fn publish(&self, notice: TransitionNotice) -> Result<(), NotifyError> {
        self.notices
            .lock()
            .expect("notifier mutex poisoned")
            .push(notice);
        Ok(())
    }
}

pub(super) struct FailingNotifier;

impl NotificationPublisher for FailingNotifier {
    fn publish(&self, _notice: TransitionNotice) -> Result<(), NotifyError> {
        Err(NotifyError::Transport("smtp down".to_string()))
    }
}

pub(super) fn console_router_with_service(
    service: ConsoleService<MemoryRepository, MemoryNotifier>,
) -> axum::Router {
    console_router(Arc::new(service))
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
