//! Test Module
//!
//! ## Test Categories
//! - `brain_tests`: classifier chain, emotion/urgency scoring, semantic threshold policy
//! - `session_tests`: TTL, turn limit, sweeping, per-session serialization
//! - `database_tests`: SQLite turn store
//! - `pipeline_tests`: end-to-end turns against mock collaborators
//! - `analytics_tests`: running means, merge, drop policy
//! - `chaos_test`: concurrency and degraded collaborators

pub mod mocks;
pub mod pipeline_tests;
