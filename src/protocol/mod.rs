//! Bridge protocol message types.
//!
//! This module defines the message format exchanged between the page-side
//! provider and the privileged context (extension background).
//!
//! # Protocol Overview
//!
//! | Message Type | Direction | Purpose |
//! |--------------|-----------|---------|
//! | `Request` | Page → Privileged | Correlated method call |
//! | `Response` | Privileged → Page | Result or error for one `Request` |
//! | `PushEvent` | Privileged → Page | Unsolicited state notification |
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `event` | Push events and the reserved event names |
//! | `method` | Method names and typed payloads for internal calls |
//! | `request` | Envelopes, wire requests and responses |

// ============================================================================
// Submodules
// ============================================================================

/// Push event message types.
pub mod event;

/// Method names and payloads.
pub mod method;

/// Request envelope and Response message types.
pub mod request;

// ============================================================================
// Re-exports
// ============================================================================

pub use event::{ChainChange, PushEvent};
pub use method::{JsonRpcPayload, JsonRpcReply, ProviderStateSnapshot, TabCheckin};
pub use request::{Request, RequestEnvelope, Response, ResponseType};
