use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::rules::{FieldName, TransitionRules};

/// Opaque identifier for a tracked entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub String);

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// The three record families tracked by the console.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EntityKind {
    Donor,
    PlatformUser,
    ContentItem,
}

impl EntityKind {
    pub const fn ordered() -> [Self; 3] {
        [Self::Donor, Self::PlatformUser, Self::ContentItem]
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Donor => "donor",
            Self::PlatformUser => "platform-user",
            Self::ContentItem => "content-item",
        }
    }

    /// Every status value defined for this kind.
    pub fn statuses(self) -> Vec<Status> {
        match self {
            Self::Donor => DonorTier::ordered().into_iter().map(Status::Donor).collect(),
            Self::PlatformUser => UserStatus::ordered()
                .into_iter()
                .map(Status::PlatformUser)
                .collect(),
            Self::ContentItem => ContentStatus::ordered()
                .into_iter()
                .map(Status::ContentItem)
                .collect(),
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DonorTier {
    Major,
    Regular,
    Recurring,
    OneTime,
    Lapsed,
}

impl DonorTier {
    pub const fn ordered() -> [Self; 5] {
        [
            Self::Major,
            Self::Regular,
            Self::Recurring,
            Self::OneTime,
            Self::Lapsed,
        ]
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Major => "major",
            Self::Regular => "regular",
            Self::Recurring => "recurring",
            Self::OneTime => "one-time",
            Self::Lapsed => "lapsed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UserStatus {
    Active,
    Warned,
    Suspended,
    Banned,
}

impl UserStatus {
    pub const fn ordered() -> [Self; 4] {
        [Self::Active, Self::Warned, Self::Suspended, Self::Banned]
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Warned => "warned",
            Self::Suspended => "suspended",
            Self::Banned => "banned",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ContentStatus {
    Active,
    Flagged,
    Hidden,
    Removed,
}

impl ContentStatus {
    pub const fn ordered() -> [Self; 4] {
        [Self::Active, Self::Flagged, Self::Hidden, Self::Removed]
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Flagged => "flagged",
            Self::Hidden => "hidden",
            Self::Removed => "removed",
        }
    }
}

/// Status of an entity, tagged with the kind it belongs to so that values from
/// different status sets can never be compared by accident.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", content = "status", rename_all = "kebab-case")]
pub enum Status {
    Donor(DonorTier),
    PlatformUser(UserStatus),
    ContentItem(ContentStatus),
}

impl Status {
    pub const fn kind(self) -> EntityKind {
        match self {
            Status::Donor(_) => EntityKind::Donor,
            Status::PlatformUser(_) => EntityKind::PlatformUser,
            Status::ContentItem(_) => EntityKind::ContentItem,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Status::Donor(tier) => tier.label(),
            Status::PlatformUser(status) => status.label(),
            Status::ContentItem(status) => status.label(),
        }
    }

    /// Resolves a status label within a kind, e.g. `("platform-user", "suspended")`.
    pub fn parse(kind: EntityKind, label: &str) -> Option<Self> {
        let label = label.trim();
        kind.statuses()
            .into_iter()
            .find(|status| status.label().eq_ignore_ascii_case(label))
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Kind of timestamped fact recorded against an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    Donation,
    Interaction,
    Post,
    Warning,
    Flag,
    Report,
}

impl ActivityKind {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Donation => "donation",
            Self::Interaction => "interaction",
            Self::Post => "post",
            Self::Warning => "warning",
            Self::Flag => "flag",
            Self::Report => "report",
        }
    }

    /// Events that count towards engagement recency and volume.
    pub const fn is_qualifying(self) -> bool {
        matches!(self, Self::Donation | Self::Interaction | Self::Post)
    }

    /// Events that accumulate moderation risk.
    pub const fn is_negative(self) -> bool {
        matches!(self, Self::Warning | Self::Flag | Self::Report)
    }
}

impl fmt::Display for ActivityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityEvent {
    pub at: DateTime<Utc>,
    pub kind: ActivityKind,
    /// Donation amount or similar; absent for events without a quantity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub magnitude: Option<f64>,
}

impl ActivityEvent {
    pub fn new(kind: ActivityKind, at: DateTime<Utc>) -> Self {
        Self {
            at,
            kind,
            magnitude: None,
        }
    }

    pub fn donation(at: DateTime<Utc>, amount: f64) -> Self {
        Self::new(ActivityKind::Donation, at).with_magnitude(amount)
    }

    pub fn with_magnitude(mut self, magnitude: f64) -> Self {
        self.magnitude = Some(magnitude);
        self
    }
}

/// Structured data captured alongside a transition.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionDetails {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suspension_duration_days: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// One entry in an entity's append-only audit log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub from: Status,
    pub to: Status,
    pub reason: String,
    pub actor: String,
    pub at: DateTime<Utc>,
    #[serde(default)]
    pub details: TransitionDetails,
}

/// Immutable record tracked by the engine.
///
/// The current status is not stored: it is the `to` of the last audit record,
/// or the initial status when the log is empty. Operations return new values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "EntitySnapshot", into = "EntitySnapshot")]
pub struct Entity {
    id: EntityId,
    name: String,
    tags: Vec<String>,
    location: Option<String>,
    created_at: DateTime<Utc>,
    initial_status: Status,
    events: Vec<ActivityEvent>,
    audit_log: Vec<TransitionRecord>,
}

impl Entity {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        initial_status: Status,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: EntityId(id.into()),
            name: name.into(),
            tags: Vec::new(),
            location: None,
            created_at,
            initial_status,
            events: Vec::new(),
            audit_log: Vec::new(),
        }
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn with_events<I>(mut self, events: I) -> Self
    where
        I: IntoIterator<Item = ActivityEvent>,
    {
        self.events.extend(events);
        self.events.sort_by_key(|event| event.at);
        self
    }

    pub fn with_event(self, event: ActivityEvent) -> Self {
        self.with_events([event])
    }

    pub fn id(&self) -> &EntityId {
        &self.id
    }

    pub fn kind(&self) -> EntityKind {
        self.initial_status.kind()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    pub fn location(&self) -> Option<&str> {
        self.location.as_deref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn initial_status(&self) -> Status {
        self.initial_status
    }

    pub fn current_status(&self) -> Status {
        self.audit_log
            .last()
            .map(|record| record.to)
            .unwrap_or(self.initial_status)
    }

    pub fn events(&self) -> &[ActivityEvent] {
        &self.events
    }

    pub fn audit_log(&self) -> &[TransitionRecord] {
        &self.audit_log
    }

    /// Copy of this entity with `record` appended; the receiver is untouched.
    pub(crate) fn with_record(&self, record: TransitionRecord) -> Self {
        let mut next = self.clone();
        next.audit_log.push(record);
        next
    }
}

/// Wire form of [`Entity`], validated on the way in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntitySnapshot {
    pub id: EntityId,
    pub kind: EntityKind,
    pub name: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    pub created_at: DateTime<Utc>,
    pub initial_status: Status,
    /// Derived on output; when supplied on input it must agree with the log.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<Status>,
    #[serde(default)]
    pub events: Vec<ActivityEvent>,
    #[serde(default)]
    pub audit_log: Vec<TransitionRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SnapshotError {
    #[error("status {status} does not belong to a {kind}")]
    KindMismatch { kind: EntityKind, status: Status },
    #[error("audit record {index} starts from {found} but the entity was {expected}")]
    BrokenChain {
        index: usize,
        expected: Status,
        found: Status,
    },
    #[error("declared status {declared} disagrees with audit log ({derived})")]
    StatusMismatch { declared: Status, derived: Status },
    #[error("audit record {index} moves {from} -> {to}, which is not a legal transition")]
    IllegalRecord { index: usize, from: Status, to: Status },
    #[error("audit record {index} is missing `{field}`")]
    IncompleteRecord { index: usize, field: &'static str },
}

impl TryFrom<EntitySnapshot> for Entity {
    type Error = SnapshotError;

    fn try_from(snapshot: EntitySnapshot) -> Result<Self, Self::Error> {
        let kind = snapshot.kind;
        let ensure_kind = |status: Status| {
            if status.kind() == kind {
                Ok(())
            } else {
                Err(SnapshotError::KindMismatch { kind, status })
            }
        };

        ensure_kind(snapshot.initial_status)?;
        let mut current = snapshot.initial_status;
        for (index, record) in snapshot.audit_log.iter().enumerate() {
            ensure_kind(record.from)?;
            ensure_kind(record.to)?;
            if record.from != current {
                return Err(SnapshotError::BrokenChain {
                    index,
                    expected: current,
                    found: record.from,
                });
            }
            if !TransitionRules::is_legal(record.from, record.to) {
                return Err(SnapshotError::IllegalRecord {
                    index,
                    from: record.from,
                    to: record.to,
                });
            }
            if record.reason.trim().is_empty() {
                return Err(SnapshotError::IncompleteRecord {
                    index,
                    field: FieldName::Reason.key(),
                });
            }
            if record.actor.trim().is_empty() {
                return Err(SnapshotError::IncompleteRecord {
                    index,
                    field: "actor",
                });
            }
            let duration = FieldName::SuspensionDurationDays;
            if record.details.suspension_duration_days.is_none()
                && TransitionRules::required_fields(kind, record.from, record.to)
                    .contains(&duration)
            {
                return Err(SnapshotError::IncompleteRecord {
                    index,
                    field: duration.key(),
                });
            }
            current = record.to;
        }

        if let Some(declared) = snapshot.status {
            if declared != current {
                return Err(SnapshotError::StatusMismatch {
                    declared,
                    derived: current,
                });
            }
        }

        let mut events = snapshot.events;
        events.sort_by_key(|event| event.at);

        Ok(Self {
            id: snapshot.id,
            name: snapshot.name,
            tags: snapshot.tags,
            location: snapshot.location,
            created_at: snapshot.created_at,
            initial_status: snapshot.initial_status,
            events,
            audit_log: snapshot.audit_log,
        })
    }
}

impl From<Entity> for EntitySnapshot {
    fn from(entity: Entity) -> Self {
        let status = Some(entity.current_status());
        Self {
            kind: entity.kind(),
            id: entity.id,
            name: entity.name,
            tags: entity.tags,
            location: entity.location,
            created_at: entity.created_at,
            initial_status: entity.initial_status,
            status,
            events: entity.events,
            audit_log: entity.audit_log,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn created() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 9, 0, 0).unwrap()
    }

    #[test]
    fn current_status_defaults_to_initial_status() {
        let entity = Entity::new(
            "user-1",
            "Jo",
            Status::PlatformUser(UserStatus::Active),
            created(),
        );
        assert_eq!(
            entity.current_status(),
            Status::PlatformUser(UserStatus::Active)
        );
        assert!(entity.audit_log().is_empty());
    }

    #[test]
    fn with_events_keeps_chronological_order() {
        let later = created() + chrono::Duration::days(3);
        let entity = Entity::new("donor-1", "Ada", Status::Donor(DonorTier::Regular), created())
            .with_event(ActivityEvent::donation(later, 50.0))
            .with_event(ActivityEvent::donation(created(), 20.0));

        let stamps: Vec<_> = entity.events().iter().map(|event| event.at).collect();
        assert_eq!(stamps, vec![created(), later]);
    }

    #[test]
    fn status_parse_is_scoped_to_kind() {
        assert_eq!(
            Status::parse(EntityKind::ContentItem, "Flagged"),
            Some(Status::ContentItem(ContentStatus::Flagged))
        );
        assert_eq!(Status::parse(EntityKind::Donor, "flagged"), None);
        assert_eq!(
            Status::parse(EntityKind::Donor, "one-time"),
            Some(Status::Donor(DonorTier::OneTime))
        );
    }

    #[test]
    fn snapshot_round_trip_reports_derived_status() {
        let entity = Entity::new(
            "content-9",
            "Spring gala photo",
            Status::ContentItem(ContentStatus::Flagged),
            created(),
        )
        .with_tags(["gala"]);

        let value = serde_json::to_value(&entity).expect("serialize");
        assert_eq!(value["status"], json!({"kind": "content-item", "status": "flagged"}));
        let back: Entity = serde_json::from_value(value).expect("deserialize");
        assert_eq!(back, entity);
    }

    #[test]
    fn snapshot_rejects_broken_audit_chain() {
        let payload = json!({
            "id": "user-2",
            "kind": "platform-user",
            "name": "Sam",
            "created_at": "2025-01-01T09:00:00Z",
            "initial_status": {"kind": "platform-user", "status": "active"},
            "audit_log": [{
                "from": {"kind": "platform-user", "status": "suspended"},
                "to": {"kind": "platform-user", "status": "active"},
                "reason": "appeal",
                "actor": "mod-1",
                "at": "2025-02-01T09:00:00Z"
            }]
        });

        let err = serde_json::from_value::<Entity>(payload).expect_err("chain is broken");
        assert!(err.to_string().contains("audit record 0"));
    }

    fn banned_user_snapshot(record: serde_json::Value) -> serde_json::Value {
        json!({
            "id": "user-4",
            "kind": "platform-user",
            "name": "Quill",
            "created_at": "2025-01-01T09:00:00Z",
            "initial_status": {"kind": "platform-user", "status": "banned"},
            "audit_log": [record]
        })
    }

    #[test]
    fn snapshot_rejects_transition_out_of_terminal_status() {
        let payload = banned_user_snapshot(json!({
            "from": {"kind": "platform-user", "status": "banned"},
            "to": {"kind": "platform-user", "status": "active"},
            "reason": "restored by script",
            "actor": "ops",
            "at": "2025-02-01T09:00:00Z"
        }));

        let snapshot: EntitySnapshot = serde_json::from_value(payload).expect("shape is valid");
        assert_eq!(
            Entity::try_from(snapshot),
            Err(SnapshotError::IllegalRecord {
                index: 0,
                from: Status::PlatformUser(UserStatus::Banned),
                to: Status::PlatformUser(UserStatus::Active),
            })
        );
    }

    #[test]
    fn snapshot_rejects_blank_reason_and_actor() {
        let record = |reason: &str, actor: &str| {
            json!({
                "from": {"kind": "platform-user", "status": "active"},
                "to": {"kind": "platform-user", "status": "warned"},
                "reason": reason,
                "actor": actor,
                "at": "2025-02-01T09:00:00Z"
            })
        };
        let load = |record| {
            let mut payload = banned_user_snapshot(record);
            payload["initial_status"] = json!({"kind": "platform-user", "status": "active"});
            let snapshot: EntitySnapshot =
                serde_json::from_value(payload).expect("shape is valid");
            Entity::try_from(snapshot)
        };

        assert_eq!(
            load(record("  ", "mod-1")),
            Err(SnapshotError::IncompleteRecord {
                index: 0,
                field: "reason"
            })
        );
        assert_eq!(
            load(record("rude replies", "")),
            Err(SnapshotError::IncompleteRecord {
                index: 0,
                field: "actor"
            })
        );
        assert!(load(record("rude replies", "mod-1")).is_ok());
    }

    #[test]
    fn snapshot_rejects_suspension_without_duration() {
        let payload = json!({
            "id": "user-5",
            "kind": "platform-user",
            "name": "Ira",
            "created_at": "2025-01-01T09:00:00Z",
            "initial_status": {"kind": "platform-user", "status": "active"},
            "audit_log": [{
                "from": {"kind": "platform-user", "status": "active"},
                "to": {"kind": "platform-user", "status": "suspended"},
                "reason": "spam",
                "actor": "mod-1",
                "at": "2025-02-01T09:00:00Z"
            }]
        });

        let err = serde_json::from_value::<Entity>(payload).expect_err("duration missing");
        assert!(err.to_string().contains("suspensionDurationDays"));
    }

    #[test]
    fn snapshot_rejects_status_from_other_kind() {
        let payload = json!({
            "id": "donor-3",
            "kind": "donor",
            "name": "Lee",
            "created_at": "2025-01-01T09:00:00Z",
            "initial_status": {"kind": "content-item", "status": "active"}
        });

        assert!(serde_json::from_value::<Entity>(payload).is_err());
    }
}
