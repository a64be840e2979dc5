//! Collaborator seams of the pipeline and their production implementations.
//!
//! - `traits`: `Embedder`, `VectorIndex`, `TurnStore`
//! - `embedder`: fastembed-backed `Embedder`
//! - `vector_index`: LanceDB and in-memory FAQ indexes
//! - `analytics`: the analytics actor (bounded queue + consumer task)

pub mod analytics;
pub mod embedder;
pub mod messages;
pub mod traits;
pub mod vector_index;
