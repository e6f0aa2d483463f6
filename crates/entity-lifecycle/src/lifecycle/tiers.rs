use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{ActivityEvent, ActivityKind, DonorTier, Entity, EntityId, Status};
use super::engine::TransitionRequest;
use super::scoring::{lifetime_giving, validate_events, InvalidEventError};

/// Thresholds used to suggest a donor tier from donation history.
///
/// Suggestions are advisory: applying one still goes through
/// [`LifecycleEngine`](super::engine::LifecycleEngine) with a reason and actor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierPolicy {
    pub major_lifetime_giving: f64,
    pub recurring_min_gifts: usize,
    pub recurring_window_days: i64,
    pub lapse_after_days: i64,
}

impl Default for TierPolicy {
    fn default() -> Self {
        Self {
            major_lifetime_giving: 10_000.0,
            recurring_min_gifts: 6,
            recurring_window_days: 365,
            lapse_after_days: 180,
        }
    }
}

/// A proposed tier change for one donor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierSuggestion {
    pub entity_id: EntityId,
    pub current: DonorTier,
    pub suggested: DonorTier,
    pub rationale: String,
}

impl TierSuggestion {
    pub fn into_request(self, actor: impl Into<String>) -> TransitionRequest {
        TransitionRequest::new(
            self.entity_id,
            Status::Donor(self.current),
            Status::Donor(self.suggested),
            self.rationale,
            actor,
        )
    }
}

impl TierPolicy {
    pub fn suggest_tier(
        &self,
        events: &[ActivityEvent],
        as_of: DateTime<Utc>,
    ) -> Result<(DonorTier, String), InvalidEventError> {
        validate_events(events)?;

        let donations: Vec<&ActivityEvent> = events
            .iter()
            .filter(|event| event.kind == ActivityKind::Donation && event.at <= as_of)
            .collect();

        let last_gift = donations.iter().map(|event| event.at).max();
        let lapse_cutoff = days_before(as_of, self.lapse_after_days);
        match last_gift {
            Some(at) if lapse_cutoff.map_or(true, |cutoff| at >= cutoff) => {}
            Some(_) => {
                return Ok((
                    DonorTier::Lapsed,
                    format!("no gift in the last {} days", self.lapse_after_days),
                ))
            }
            None => return Ok((DonorTier::Lapsed, "no recorded gifts".to_string())),
        }

        let total = lifetime_giving(events)?;
        if total >= self.major_lifetime_giving {
            return Ok((
                DonorTier::Major,
                format!(
                    "lifetime giving {total:.2} reaches {:.2}",
                    self.major_lifetime_giving
                ),
            ));
        }

        let window_start = days_before(as_of, self.recurring_window_days);
        let recent = donations
            .iter()
            .filter(|event| window_start.map_or(true, |start| event.at >= start))
            .count();
        if recent >= self.recurring_min_gifts {
            return Ok((
                DonorTier::Recurring,
                format!(
                    "{recent} gifts in the last {} days",
                    self.recurring_window_days
                ),
            ));
        }

        if donations.len() == 1 {
            return Ok((DonorTier::OneTime, "single recorded gift".to_string()));
        }

        Ok((
            DonorTier::Regular,
            format!("{} gifts on record", donations.len()),
        ))
    }

    /// `None` for non-donors and for donors already in the suggested tier.
    pub fn suggest_for(
        &self,
        entity: &Entity,
        as_of: DateTime<Utc>,
    ) -> Result<Option<TierSuggestion>, InvalidEventError> {
        let Status::Donor(current) = entity.current_status() else {
            return Ok(None);
        };

        let (suggested, rationale) = self.suggest_tier(entity.events(), as_of)?;
        if suggested == current {
            return Ok(None);
        }

        Ok(Some(TierSuggestion {
            entity_id: entity.id().clone(),
            current,
            suggested,
            rationale,
        }))
    }
}

/// `None` when the offset falls outside the representable range, which
/// callers treat as an unbounded window.
fn days_before(as_of: DateTime<Utc>, days: i64) -> Option<DateTime<Utc>> {
    TimeDelta::try_days(days).and_then(|span| as_of.checked_sub_signed(span))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::engine::LifecycleEngine;
    use chrono::{Duration, TimeZone};

    fn as_of() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 9, 1, 0, 0, 0).unwrap()
    }

    fn gift(days_ago: i64, amount: f64) -> ActivityEvent {
        ActivityEvent::donation(as_of() - Duration::days(days_ago), amount)
    }

    #[test]
    fn no_gifts_means_lapsed() {
        let (tier, _) = TierPolicy::default()
            .suggest_tier(&[], as_of())
            .expect("valid events");
        assert_eq!(tier, DonorTier::Lapsed);
    }

    #[test]
    fn old_gifts_lapse_even_for_large_donors() {
        let (tier, rationale) = TierPolicy::default()
            .suggest_tier(&[gift(400, 50_000.0)], as_of())
            .expect("valid events");
        assert_eq!(tier, DonorTier::Lapsed);
        assert!(rationale.contains("180"));
    }

    #[test]
    fn lifetime_total_promotes_to_major() {
        let (tier, _) = TierPolicy::default()
            .suggest_tier(&[gift(300, 9_000.0), gift(20, 1_500.0)], as_of())
            .expect("valid events");
        assert_eq!(tier, DonorTier::Major);
    }

    #[test]
    fn frequent_gifts_are_recurring() {
        let events: Vec<_> = (0..6).map(|month| gift(month * 30 + 5, 25.0)).collect();
        let (tier, _) = TierPolicy::default()
            .suggest_tier(&events, as_of())
            .expect("valid events");
        assert_eq!(tier, DonorTier::Recurring);
    }

    #[test]
    fn single_recent_gift_is_one_time_and_pair_is_regular() {
        let policy = TierPolicy::default();
        let (single, _) = policy
            .suggest_tier(&[gift(10, 100.0)], as_of())
            .expect("valid events");
        assert_eq!(single, DonorTier::OneTime);

        let (pair, _) = policy
            .suggest_tier(&[gift(200, 100.0), gift(10, 100.0)], as_of())
            .expect("valid events");
        assert_eq!(pair, DonorTier::Regular);
    }

    #[test]
    fn suggestion_feeds_the_lifecycle_engine() {
        let donor = Entity::new(
            "donor-4",
            "Rae",
            Status::Donor(DonorTier::Regular),
            as_of() - Duration::days(900),
        )
        .with_event(gift(500, 80.0));

        let suggestion = TierPolicy::default()
            .suggest_for(&donor, as_of())
            .expect("valid events")
            .expect("tier should change");
        assert_eq!(suggestion.suggested, DonorTier::Lapsed);

        let updated = LifecycleEngine::new()
            .apply(&donor, &suggestion.into_request("tier-review"), as_of())
            .expect("tier change is legal");
        assert_eq!(updated.current_status(), Status::Donor(DonorTier::Lapsed));
    }

    #[test]
    fn oversized_windows_do_not_cut_off_any_gift() {
        let policy = TierPolicy {
            lapse_after_days: 200_000_000,
            recurring_window_days: i64::MAX,
            ..TierPolicy::default()
        };
        let events: Vec<_> = (0..6).map(|year| gift(year * 400 + 10, 20.0)).collect();

        let (tier, _) = policy
            .suggest_tier(&events, as_of())
            .expect("valid events");
        assert_eq!(tier, DonorTier::Recurring);

        let (tier, _) = policy
            .suggest_tier(&[gift(5_000, 20.0)], as_of())
            .expect("valid events");
        assert_eq!(tier, DonorTier::OneTime);
    }

    #[test]
    fn non_donors_get_no_suggestion() {
        let user = Entity::new(
            "user-1",
            "Kit",
            Status::PlatformUser(crate::lifecycle::domain::UserStatus::Active),
            as_of(),
        );
        assert_eq!(
            TierPolicy::default()
                .suggest_for(&user, as_of())
                .expect("valid events"),
            None
        );
    }
}
