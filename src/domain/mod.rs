//! Domain layer types and invariants.

pub mod calendar;
pub mod entities;
pub mod error;
pub mod rules;
pub mod schedule;
pub mod send_time;
pub mod types;
