//! Hooks for the on-page notice collaborator.
//!
//! Rendering banners is the embedder's business. The provider only reports
//! the moments a notice would be shown.

use std::fmt;

use serde_json::Value;
use tracing::info;

// ============================================================================
// Notifier
// ============================================================================

/// Receives user-facing notice triggers.
pub trait Notifier: Send + Sync + fmt::Debug {
    /// The active chain was switched on the user's behalf.
    fn chain_switched(&self, chain: &Value);

    /// The default-wallet preference changed.
    fn default_wallet_changed(&self, wallet: &str);
}

/// Notifier that only logs.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn chain_switched(&self, chain: &Value) {
        info!(%chain, "Chain switched");
    }

    fn default_wallet_changed(&self, wallet: &str) {
        info!(wallet, "Default wallet changed");
    }
}
