use std::collections::BTreeSet;
use std::fmt;
use std::ops::RangeInclusive;

use serde::{Deserialize, Serialize};

use super::domain::{ContentStatus, DonorTier, EntityKind, Status, UserStatus};

/// Inclusive bounds for `suspensionDurationDays`.
pub const SUSPENSION_DAYS: RangeInclusive<i64> = 1..=365;

/// Named inputs a transition may require or accept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FieldName {
    Reason,
    SuspensionDurationDays,
    Notes,
}

impl FieldName {
    pub const fn key(self) -> &'static str {
        match self {
            Self::Reason => "reason",
            Self::SuspensionDurationDays => "suspensionDurationDays",
            Self::Notes => "notes",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        [Self::Reason, Self::SuspensionDurationDays, Self::Notes]
            .into_iter()
            .find(|field| field.key() == key)
    }
}

impl fmt::Display for FieldName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Fixed transition table for the three entity kinds.
///
/// | Kind         | From                      | To        | Required                        |
/// |--------------|---------------------------|-----------|---------------------------------|
/// | PlatformUser | active                    | warned    | reason                          |
/// | PlatformUser | active, warned            | suspended | reason, suspensionDurationDays  |
/// | PlatformUser | active, warned, suspended | banned    | reason                          |
/// | PlatformUser | suspended                 | active    | reason                          |
/// | ContentItem  | flagged                   | active    | reason                          |
/// | ContentItem  | active, flagged           | hidden    | reason                          |
/// | ContentItem  | active, flagged, hidden   | removed   | reason                          |
/// | Donor        | any tier                  | any other | reason                          |
///
/// Every legal pair also accepts optional `notes`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TransitionRules;

impl TransitionRules {
    pub fn legal_targets(kind: EntityKind, from: Status) -> BTreeSet<Status> {
        if from.kind() != kind {
            return BTreeSet::new();
        }
        targets_from(from).into_iter().collect()
    }

    pub fn is_legal(from: Status, to: Status) -> bool {
        from.kind() == to.kind() && targets_from(from).contains(&to)
    }

    /// Required fields for a legal pair; empty when the pair is illegal.
    pub fn required_fields(kind: EntityKind, from: Status, to: Status) -> BTreeSet<FieldName> {
        let mut fields = BTreeSet::new();
        if from.kind() != kind || !Self::is_legal(from, to) {
            return fields;
        }

        fields.insert(FieldName::Reason);
        if to == Status::PlatformUser(UserStatus::Suspended) {
            fields.insert(FieldName::SuspensionDurationDays);
        }
        fields
    }

    pub fn optional_fields(kind: EntityKind, from: Status, to: Status) -> BTreeSet<FieldName> {
        let mut fields = BTreeSet::new();
        if from.kind() == kind && Self::is_legal(from, to) {
            fields.insert(FieldName::Notes);
        }
        fields
    }

    pub fn is_terminal(status: Status) -> bool {
        matches!(
            status,
            Status::PlatformUser(UserStatus::Banned) | Status::ContentItem(ContentStatus::Removed)
        )
    }

    /// Transitions that clear accumulated moderation risk (reactivate, approve).
    pub fn resets_risk(from: Status, to: Status) -> bool {
        matches!(
            (from, to),
            (
                Status::PlatformUser(UserStatus::Suspended),
                Status::PlatformUser(UserStatus::Active)
            ) | (
                Status::ContentItem(ContentStatus::Flagged),
                Status::ContentItem(ContentStatus::Active)
            )
        )
    }
}

fn targets_from(from: Status) -> Vec<Status> {
    match from {
        Status::PlatformUser(status) => {
            use UserStatus::*;
            let targets: &[UserStatus] = match status {
                Active => &[Warned, Suspended, Banned],
                Warned => &[Suspended, Banned],
                Suspended => &[Active, Banned],
                Banned => &[],
            };
            targets.iter().copied().map(Status::PlatformUser).collect()
        }
        Status::ContentItem(status) => {
            use ContentStatus::*;
            let targets: &[ContentStatus] = match status {
                Active => &[Hidden, Removed],
                Flagged => &[Active, Hidden, Removed],
                Hidden => &[Removed],
                Removed => &[],
            };
            targets.iter().copied().map(Status::ContentItem).collect()
        }
        Status::Donor(tier) => DonorTier::ordered()
            .into_iter()
            .filter(|candidate| *candidate != tier)
            .map(Status::Donor)
            .collect(),
    }
}
