//! quizgrade-store: storage and configuration for quizgrade.
//!
//! Implements the storage capability traits of `quizgrade-core` over an
//! in-memory snapshot that can be persisted as JSON, and loads the file
//! configuration shared by the binaries.

pub mod config;
pub mod memory;

pub use config::{load_config, load_config_from, QuizgradeConfig};
pub use memory::{MemoryStore, MemoryTransaction, Snapshot};
