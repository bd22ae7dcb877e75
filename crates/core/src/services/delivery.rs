//! Verification code delivery.
//!
//! Sending mail is outside this service; the API hands each issued code to
//! a [`CodeDelivery`] and never returns it to the caller.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;
use twinchat_common::AppResult;
use twinchat_store::models::CodeType;

/// Delivers issued verification codes to their owner.
#[async_trait]
pub trait CodeDelivery: Send + Sync {
    /// Deliver `code` to `email`.
    async fn deliver(&self, email: &str, code_type: CodeType, code: &str) -> AppResult<()>;
}

/// Development delivery: writes the code to the log.
pub struct LogCodeDelivery;

#[async_trait]
impl CodeDelivery for LogCodeDelivery {
    async fn deliver(&self, email: &str, code_type: CodeType, code: &str) -> AppResult<()> {
        info!(email, code_type = code_type.as_str(), code, "Verification code (development delivery)");
        Ok(())
    }
}

/// Shared development delivery.
#[must_use]
pub fn log_delivery() -> Arc<dyn CodeDelivery> {
    Arc::new(LogCodeDelivery)
}
