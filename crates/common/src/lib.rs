//! Common utilities and shared types for twinchat.
//!
//! This crate provides foundational components used across all twinchat crates:
//!
//! - **Configuration**: Application settings via [`Config`]
//! - **Error handling**: Unified error types via [`AppError`] and [`AppResult`]
//! - **Regions**: The two deployment regions via [`Region`]
//! - **ID Generation**: ULID-based unique identifiers via [`IdGenerator`]
//! - **Best-effort effects**: Explicit non-fatal outcomes via [`BestEffort`]
//!
//! # Example
//!
//! ```no_run
//! use twinchat_common::{AppResult, Config, IdGenerator};
//!
//! fn example() -> AppResult<()> {
//!     let config = Config::load()?;
//!     let id_gen = IdGenerator::new();
//!     println!("{} -> {}", config.server.port, id_gen.generate());
//!     Ok(())
//! }
//! ```

pub mod best_effort;
pub mod config;
pub mod error;
pub mod id;
pub mod region;

pub use best_effort::BestEffort;
pub use config::Config;
pub use error::{AppError, AppResult};
pub use id::IdGenerator;
pub use region::{DeploymentRegion, Region};

/// Current time as epoch milliseconds.
///
/// All persisted timestamps use this representation so that range filters
/// compare numerically on every storage driver.
#[must_use]
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
