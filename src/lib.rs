//! Shelf-monitoring alert engine.
//!
//! Detection reports from a vision model come in as JSON, are validated,
//! turned into deduplicated alerts by a small rule set, and persisted to
//! SQLite together with an append-only history of every action taken on
//! each alert.

pub mod catalog;
pub mod config;
pub mod core;
pub mod db;
pub mod engine;
pub mod error;
pub mod notifications;
pub mod query;
pub mod rules;
