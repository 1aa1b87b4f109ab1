//! Application services: scheduling, lifecycle, dispatch and intake.

pub mod branching;
pub mod dispatch;
pub mod error;
pub mod expander;
pub mod jobs;
pub mod lifecycle;
pub mod links;
pub mod mailer;
pub mod repos;
pub mod subscriptions;
