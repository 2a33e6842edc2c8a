//! Transport layer to the privileged context.
//!
//! This module carries request envelopes from the page to the privileged
//! context (extension background) and brings responses and push events back.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐                              ┌─────────────────┐
//! │  Page (Rust)    │                              │  Privileged     │
//! │                 │        Port / WebSocket      │  context        │
//! │  Provider       │◄────────────────────────────►│                 │
//! │  → Bridge       │      JSON text frames        │  (background)   │
//! └─────────────────┘                              └─────────────────┘
//! ```
//!
//! # Bridge Lifecycle
//!
//! 1. Obtain a [`Port`]: [`Port::pair`] in-process, or [`websocket::connect`]
//! 2. `Bridge::new` - wrap the page end
//! 3. `Bridge::connect` - spawn the event loop (idempotent)
//! 4. `Bridge::request` - correlated request/response
//! 5. Port closes - every pending request fails with `ConnectionClosed`
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `bridge` | Correlation and push-event routing |
//! | `port` | In-memory duplex text channel |
//! | `websocket` | WebSocket-backed port |

// ============================================================================
// Submodules
// ============================================================================

/// Message bridge and event loop.
pub mod bridge;

/// In-memory duplex channel.
pub mod port;

/// WebSocket-backed port.
pub mod websocket;

// ============================================================================
// Re-exports
// ============================================================================

pub use bridge::{Bridge, CloseHandler, PushHandler};
pub use port::{Port, PortSender};
