use crate::infra::{
    end_of_day, seed_entities, InMemoryEntityRepository, InMemoryNotificationPublisher,
};
use chrono::{DateTime, NaiveDate, Utc};
use clap::Args;
use entity_lifecycle::console::ConsoleService;
use entity_lifecycle::error::AppError;
use entity_lifecycle::lifecycle::{
    ContentStatus, EntityId, FieldName, Status, TransitionRequest, UserStatus,
};
use entity_lifecycle::segments::DashboardSummary;
use std::sync::Arc;

type DemoService = ConsoleService<InMemoryEntityRepository, InMemoryNotificationPublisher>;

#[derive(Args, Debug, Default)]
pub(crate) struct DashboardArgs {
    /// Evaluation date (YYYY-MM-DD). Defaults to now.
    #[arg(long, value_parser = crate::infra::parse_date)]
    pub(crate) as_of: Option<NaiveDate>,
    /// Emit the summary as JSON instead of a text table.
    #[arg(long)]
    pub(crate) json: bool,
}

#[derive(Args, Debug)]
pub(crate) struct DemoArgs {
    /// Evaluation date (YYYY-MM-DD). Defaults to now.
    #[arg(long, value_parser = crate::infra::parse_date)]
    pub(crate) as_of: Option<NaiveDate>,
    /// Admin recorded as the actor on every demo transition.
    #[arg(long, default_value = "demo-admin")]
    pub(crate) actor: String,
    /// Apply tier suggestions instead of only listing them.
    #[arg(long)]
    pub(crate) apply_tiers: bool,
}

fn seeded_service(
    as_of: DateTime<Utc>,
) -> Result<(DemoService, Arc<InMemoryNotificationPublisher>), AppError> {
    let notifier = Arc::new(InMemoryNotificationPublisher::default());
    let service = ConsoleService::new(
        Arc::new(InMemoryEntityRepository::default()),
        notifier.clone(),
    );
    for entity in seed_entities(as_of) {
        service.register(entity)?;
    }
    Ok((service, notifier))
}

pub(crate) fn run_dashboard(args: DashboardArgs) -> Result<(), AppError> {
    let as_of = args.as_of.map(end_of_day).unwrap_or_else(Utc::now);
    let (service, _) = seeded_service(as_of)?;
    let summary = service.dashboard(as_of)?;

    if args.json {
        match serde_json::to_string_pretty(&summary) {
            Ok(json) => println!("{}", json),
            Err(err) => println!("Dashboard payload unavailable: {}", err),
        }
    } else {
        render_dashboard(&summary);
    }
    Ok(())
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs {
        as_of,
        actor,
        apply_tiers,
    } = args;
    let as_of = as_of.map(end_of_day).unwrap_or_else(Utc::now);
    let (service, notifier) = seeded_service(as_of)?;

    println!("Entity lifecycle demo");
    render_dashboard(&service.dashboard(as_of)?);

    println!("\nScores");
    for id in ["donor-ada", "donor-ben", "user-dana", "post-fall-drive"] {
        let view = service.status_view(&EntityId::from(id), as_of)?;
        match view.scores {
            Some(scores) => println!(
                "- {} ({} {}): engagement {} | risk {} | {} days since activity | giving {:.2}",
                view.entity_id,
                view.kind,
                view.status,
                scores.engagement.value(),
                scores.risk.value(),
                scores.days_since_last_activity,
                scores.lifetime_giving
            ),
            None => println!("- {}: history could not be scored", view.entity_id),
        }
    }

    println!("\nModeration");
    let suspend = TransitionRequest::new(
        EntityId::from("user-dana"),
        Status::PlatformUser(UserStatus::Active),
        Status::PlatformUser(UserStatus::Suspended),
        "repeated reports for spam",
        actor.as_str(),
    );
    match service.transition_at(suspend.clone(), as_of) {
        Ok(_) => println!("- suspension without a duration was accepted unexpectedly"),
        Err(err) => println!("- suspension without a duration rejected: {}", err),
    }
    let suspended =
        service.transition_at(suspend.with_extra(FieldName::SuspensionDurationDays, 14), as_of)?;
    println!(
        "- {} is now {} ({} audit entries)",
        suspended.id(),
        suspended.current_status(),
        suspended.audit_log().len()
    );

    let approve = TransitionRequest::new(
        EntityId::from("post-fall-drive"),
        Status::ContentItem(ContentStatus::Flagged),
        Status::ContentItem(ContentStatus::Active),
        "reviewed, report was mistaken",
        actor.as_str(),
    );
    service.transition_at(approve, as_of)?;
    let view = service.status_view(&EntityId::from("post-fall-drive"), as_of)?;
    println!(
        "- post-fall-drive approved -> {} | risk {}",
        view.status,
        view.scores.map(|scores| scores.risk.value()).unwrap_or(0)
    );

    println!("\nTier suggestions (advisory)");
    let suggestions = service.tier_suggestions(as_of)?;
    if suggestions.is_empty() {
        println!("- every donor already sits in the suggested tier");
    }
    for suggestion in suggestions {
        println!(
            "- {}: {} -> {} ({})",
            suggestion.entity_id,
            suggestion.current.label(),
            suggestion.suggested.label(),
            suggestion.rationale
        );
        if apply_tiers {
            let request = suggestion.into_request(actor.as_str());
            match service.transition_at(request, as_of) {
                Ok(entity) => println!("  applied, now {}", entity.current_status()),
                Err(err) => println!("  not applied: {}", err),
            }
        }
    }

    let notices = notifier.notices();
    if notices.is_empty() {
        println!("\nNotifications: none dispatched");
    } else {
        println!("\nNotifications:");
        for notice in notices {
            println!(
                "- template={} -> {} (by {})",
                notice.template, notice.entity_id, notice.actor
            );
        }
    }

    Ok(())
}

fn render_dashboard(summary: &DashboardSummary) {
    println!(
        "Dashboard as of {} | {} entities",
        summary.as_of.format("%Y-%m-%d %H:%M UTC"),
        summary.total
    );
    for (kind, count) in &summary.by_kind {
        let statuses = summary
            .by_status
            .get(kind)
            .map(|counts| {
                counts
                    .iter()
                    .map(|(status, count)| format!("{status} {count}"))
                    .collect::<Vec<_>>()
                    .join(", ")
            })
            .unwrap_or_default();
        println!("- {}: {} ({})", kind, count, statuses);
    }
    println!("Segments:");
    for segment in &summary.segments {
        let ids = segment
            .entity_ids
            .iter()
            .map(|id| id.0.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        println!("  - {}: {} [{}]", segment.label, segment.count, ids);
    }
    if !summary.skipped.is_empty() {
        println!("  ({} entities skipped for invalid activity)", summary.skipped.len());
    }
}
