//! Host boundary for the admin console.
//!
//! Storage and notification delivery belong to the host and are expressed
//! here only as traits. The service composes them with the lifecycle engine
//! and is the one place in the crate that logs.

pub mod repository;
pub mod router;
pub mod service;

#[cfg(test)]
mod tests;

pub use repository::{
    EntityRepository, EntityStatusView, NotificationPublisher, NotifyError, RepositoryError,
    TransitionNotice,
};
pub use router::console_router;
pub use service::{ConsoleService, ConsoleServiceError, SegmentMatchView};
