//! FaqDesk core: the dialog pipeline behind the FAQ assistant.
//!
//! One utterance flows through session resolution, the intent classifier
//! chain, the semantic FAQ fallback and emotion/urgency scoring, then is
//! appended to its session, persisted and folded into analytics.

pub mod actors;
pub mod brain;
pub mod config;
pub mod database;
pub mod error;
pub mod fs_manager;
pub mod models;
pub mod pipeline;
pub mod recorder;
pub mod session_store;
pub mod telemetry;

pub use config::PipelineConfig;
pub use error::AppError;
pub use pipeline::DialogPipeline;

#[cfg(test)]
mod tests;
