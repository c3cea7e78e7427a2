//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async query methods.
//! Reads accept `&PgPool`; writes that take part in a unit of work accept
//! `&mut PgConnection` so callers can pass `&mut *tx`.

pub mod event_repo;
pub mod extension_repo;
pub mod freeze_log_repo;
pub mod goal_repo;
pub mod initiative_repo;
pub mod notification_repo;
pub mod progress_report_repo;
pub mod user_repo;

pub use event_repo::EventRepo;
pub use extension_repo::ExtensionRepo;
pub use freeze_log_repo::FreezeLogRepo;
pub use goal_repo::GoalRepo;
pub use initiative_repo::InitiativeRepo;
pub use notification_repo::NotificationRepo;
pub use progress_report_repo::ProgressReportRepo;
pub use user_repo::UserRepo;
