//! In-page wallet provider.
//!
//! This library implements the provider object a wallet injects into web
//! pages. Page scripts call it; every real operation happens in a separate
//! privileged context (the extension background) reached over a message
//! channel.
//!
//! # Architecture
//!
//! ```text
//! page call ─► Provider ─► DedupeRouter ─► ReadyGate ─► Bridge ─► privileged context
//!                  ▲                                       │
//!                  └──────────── responses / push events ◄─┘
//! ```
//!
//! Key design principles:
//!
//! - Calls made before the provider is ready are queued and flushed once, in order
//! - Concurrent calls for the same method share one execution
//! - Nothing reaches the privileged context until the tab has checked in and is visible
//! - Connection state changes only through push events, never through request results
//! - In router mode, calls go to whichever discovered provider is currently designated
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use inpage_provider::{
//!     DiscoveryBus, InstallOptions, Page, PageMetadata, Provider, ProviderInfo,
//!     RequestEnvelope, Result, install, transport::websocket,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let page = Page::new(PageMetadata::new("https://app.example.com")?);
//!     let port = websocket::connect("ws://127.0.0.1:9222").await?;
//!
//!     let provider = Provider::builder()
//!         .info(ProviderInfo::new("Example Wallet", ICON, "com.example.wallet"))
//!         .build(page, port)?;
//!
//!     let installation = install(provider, Arc::new(DiscoveryBus::new()), None, InstallOptions::default())?;
//!     let accounts = installation
//!         .provider()
//!         .request(RequestEnvelope::new("eth_requestAccounts"))
//!         .await?;
//!     println!("{accounts}");
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`discovery`] | Provider discovery bus and registry |
//! | [`error`] | Error types, [`RpcError`] and [`Result`] alias |
//! | [`identifiers`] | Type-safe ID wrappers |
//! | [`install`] | Page globals and the init-once guard |
//! | [`page`] | Host page metadata, visibility and ready state |
//! | [`pipeline`] | Readiness gate and dedupe router |
//! | [`protocol`] | Bridge message types |
//! | [`provider`] | The provider facade |
//! | [`router`] | Router-mode provider |
//! | [`transport`] | Ports and the message bridge |

// ============================================================================
// Modules
// ============================================================================

/// Provider discovery.
///
/// Announcement and request events, plus the registry router mode uses.
pub mod discovery;

/// Error types and result aliases.
///
/// Crate operations return [`Result<T>`]; page-facing calls return
/// [`RpcResult<T>`] with a normalized [`RpcError`].
pub mod error;

/// Type-safe identifiers.
pub mod identifiers;

/// Page globals with an init-once guard.
pub mod install;

/// Host page model.
pub mod page;

/// Request pipeline primitives.
pub mod pipeline;

/// Bridge protocol message types.
pub mod protocol;

/// The provider facade.
///
/// Use [`Provider::builder()`] to create a configured provider.
pub mod provider;

/// Router-mode provider.
pub mod router;

/// Transport to the privileged context.
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

// ============================================================================
// Re-exports
// ============================================================================

// Discovery types
pub use discovery::{DiscoveryBus, DiscoveryEvent, ProviderDetail, ProviderInfo, ProviderRegistry};

// Error types
pub use error::{Error, Result, RpcError, RpcResult};

// Identifier types
pub use identifiers::{ListenerId, RequestId};

// Installation
pub use install::{GlobalBinding, InstallOptions, Installation, install, installed};

// Page types
pub use page::{Page, PageMetadata, ReadyState, Visibility};

// Pipeline types
pub use pipeline::{DedupeRouter, ReadyGate};

// Protocol types
pub use protocol::{PushEvent, RequestEnvelope};

// Provider types
pub use provider::{
    ConnectionState, LegacyPayload, LegacyReply, PresentationMode, Provider, ProviderBuilder,
    ProviderPhase, WalletProvider,
};

// Router
pub use router::RouterProvider;

// Transport types
pub use transport::{Bridge, Port};
