//! Advancement capability.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;

// ============================================================================
// Advance
// ============================================================================

/// Moves the host application's viewport forward.
///
/// Invoking it may (not must) make the application issue more requests to
/// the watched endpoint within the poll interval.
#[async_trait]
pub trait Advance: Send + Sync {
    /// Performs one advancement action (e.g. scroll the feed to its end).
    async fn advance(&self) -> Result<()>;
}

#[async_trait]
impl<A: Advance + ?Sized> Advance for Arc<A> {
    async fn advance(&self) -> Result<()> {
        (**self).advance().await
    }
}
