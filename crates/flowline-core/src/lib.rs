//! Flowline Core — distributed workflow execution and step scheduling.
//!
//! This crate contains the execution state machine, parameter resolution,
//! in-process pseudo-tasks, the step scheduler and its task agent pool, plus
//! the storage and transport adapters they run on. It has no CLI or server
//! dependency and can be embedded in:
//!
//! - the `flowline` CLI (via `flowline-cli`)
//! - a long-running service consuming a message broker
//! - tests, with in-memory SQLite and fake collaborators

pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod handlers;
pub mod models;
pub mod scheduler;
pub mod state;
pub mod store;
pub mod transport;

// Convenience re-exports
pub use config::EngineConfig;
pub use db::Database;
pub use error::{EngineError, EngineResult, ErrorKind};
pub use state::{Engine, EngineInner};
