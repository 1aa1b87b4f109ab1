//! Infrastructure adapters and runtime bootstrap.

pub mod db;
pub mod error;
pub mod links;
pub mod mail;
pub mod telemetry;
