//! Provider facade module.
//!
//! This module provides the object page scripts talk to:
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Provider`] | Request pipeline, connection state and events |
//! | [`ProviderBuilder`] | Validated configuration |
//! | [`WalletProvider`] | Provider surface shared with routed and foreign providers |
//! | [`ConnectionState`] | Chain, accounts and connectivity flags |
//! | [`PresentationMode`] | Which identity flags the provider exposes |
//!
//! # Example
//!
//! ```ignore
//! use inpage_provider::{Page, PageMetadata, Port, Provider, ProviderInfo, RequestEnvelope};
//!
//! let page = Page::new(PageMetadata::new("https://app.example.com")?);
//! let (port, background) = Port::pair();
//! let provider = Provider::builder().info(info).build(page, port)?;
//!
//! let accounts = provider.request(RequestEnvelope::new("eth_accounts")).await?;
//! ```

// ============================================================================
// Submodules
// ============================================================================

/// Provider trait and self marker.
pub mod api;

/// Builder and validated configuration.
pub mod builder;

/// Facade and lifecycle.
pub mod core;

/// Named-event listeners.
pub mod emitter;

/// Presentation identity and site classification.
pub mod identity;

/// Legacy `send`/`sendAsync`/`enable` surface.
pub mod legacy;

/// Notice collaborator hooks.
pub mod notice;

/// Push-event handler table.
mod push;

/// Connection state.
pub mod state;

// ============================================================================
// Re-exports
// ============================================================================

pub use api::{SELF_MARKER, WalletProvider};
pub use builder::ProviderBuilder;
pub use core::{Provider, ProviderPhase};
pub use emitter::{EventEmitter, Listener};
pub use identity::{FixedMode, HostListClassifier, PresentationMode, SiteClassifier};
pub use legacy::{LegacyPayload, LegacyReply};
pub use notice::{Notifier, TracingNotifier};
pub use state::{ChainUpdate, ConnectionState};
