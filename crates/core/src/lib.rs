//! Core business logic for twinchat.

pub mod clock;
pub mod services;

pub use clock::{Clock, SystemClock};
pub use services::*;
