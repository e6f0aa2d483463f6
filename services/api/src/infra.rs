use chrono::{DateTime, Duration, NaiveDate, Utc};
use entity_lifecycle::console::{
    EntityRepository, NotificationPublisher, NotifyError, RepositoryError, TransitionNotice,
};
use entity_lifecycle::lifecycle::{
    ActivityEvent, ActivityKind, ContentStatus, DonorTier, Entity, EntityId, Status, UserStatus,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};
use tracing::info;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

#[derive(Default, Clone)]
pub(crate) struct InMemoryEntityRepository {
    records: Arc<Mutex<HashMap<EntityId, Entity>>>,
}

impl EntityRepository for InMemoryEntityRepository {
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

    // The audit log only grows, so its length identifies the version the
    // caller read.
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

/// Keeps every notice in memory and echoes it to the log in place of email delivery.
#[derive(Default, Clone)]
pub(crate) struct InMemoryNotificationPublisher {
    notices: Arc<Mutex<Vec<TransitionNotice>>>,
}

impl NotificationPublisher for InMemoryNotificationPublisher {
    fn publish(&self, notice: TransitionNotice) -> Result<(), NotifyError> {
        info!(
            template = %notice.template,
            entity_id = %notice.entity_id,
            actor = %notice.actor,
            "notification queued"
        );
        let mut guard = self.notices.lock().expect("notifier mutex poisoned");
        guard.push(notice);
        Ok(())
    }
}

impl InMemoryNotificationPublisher {
    pub(crate) fn notices(&self) -> Vec<TransitionNotice> {
        self.notices.lock().expect("notifier mutex poisoned").clone()
    }
}

/// A small roster covering every entity kind, used by `serve --seed` and the demo.
pub(crate) fn seed_entities(now: DateTime<Utc>) -> Vec<Entity> {
    let donation =
        |days_ago: i64, amount: f64| ActivityEvent::donation(now - Duration::days(days_ago), amount);
    let event =
        |kind: ActivityKind, days_ago: i64| ActivityEvent::new(kind, now - Duration::days(days_ago));

    vec![
        Entity::new(
            "donor-ada",
            "Ada Okafor",
            Status::Donor(DonorTier::Regular),
            now - Duration::days(900),
        )
        .with_location("Portland")
        .with_tags(["gala", "monthly"])
        .with_events((0..8).map(|month| donation(15 + month * 30, 150.0))),
        Entity::new(
            "donor-ben",
            "Ben Castillo",
            Status::Donor(DonorTier::Recurring),
            now - Duration::days(1200),
        )
        .with_location("Seattle")
        .with_tags(["monthly"])
        .with_events([donation(400, 80.0), donation(260, 80.0)]),
        Entity::new(
            "donor-cy",
            "Cy Lindqvist",
            Status::Donor(DonorTier::OneTime),
            now - Duration::days(20),
        )
        .with_location("Portland"),
        Entity::new(
            "user-dana",
            "dana_builds",
            Status::PlatformUser(UserStatus::Active),
            now - Duration::days(300),
        )
        .with_tags(["forum"])
        .with_events([
            event(ActivityKind::Interaction, 3),
            event(ActivityKind::Post, 1),
            event(ActivityKind::Report, 2),
            event(ActivityKind::Report, 1),
        ]),
        Entity::new(
            "user-eli",
            "eli.w",
            Status::PlatformUser(UserStatus::Warned),
            now - Duration::days(90),
        )
        .with_events([event(ActivityKind::Warning, 10), event(ActivityKind::Post, 70)]),
        Entity::new(
            "post-fall-drive",
            "Fall food drive recap",
            Status::ContentItem(ContentStatus::Flagged),
            now - Duration::days(6),
        )
        .with_tags(["events"])
        .with_event(event(ActivityKind::Flag, 5)),
        Entity::new(
            "post-welcome",
            "Welcome thread",
            Status::ContentItem(ContentStatus::Active),
            now - Duration::days(400),
        )
        .with_events([event(ActivityKind::Interaction, 4), event(ActivityKind::Interaction, 2)]),
    ]
}

pub(crate) fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|err| format!("failed to parse '{raw}' as YYYY-MM-DD ({err})"))
}

/// Evaluation instant for a CLI date: end of that day in UTC.
pub(crate) fn end_of_day(date: NaiveDate) -> DateTime<Utc> {
    date.and_hms_opt(23, 59, 59)
        .map(|naive| naive.and_utc())
        .unwrap_or_else(Utc::now)
}
