//! Scheduling and delivery engine for multi-step email journeys.

pub mod application;
pub mod config;
pub mod domain;
pub mod infra;
pub mod util;
