//! quizgrade-core: option shuffling, correctness evaluation and scoring.
//!
//! This crate defines the data model, the storage capabilities the engine
//! consumes, and the grading and score aggregation logic that the rest of
//! quizgrade builds on.

pub mod assignment;
pub mod engine;
pub mod error;
pub mod grading;
pub mod model;
pub mod parser;
pub mod report;
pub mod scoring;
pub mod shuffle;
pub mod traits;
