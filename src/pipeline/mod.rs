//! Request pipeline stages.
//!
//! Every page request that reaches the provider's ready state passes
//! through both stages before touching the bridge:
//!
//! ```text
//! request ─► DedupeRouter (key = method) ─► ReadyGate (N slots) ─► Bridge
//! ```
//!
//! | Module | Description |
//! |--------|-------------|
//! | `dedupe` | One in-flight call per key, shared by all concurrent callers |
//! | `gate` | Multi-slot barrier with in-order admission |

// ============================================================================
// Submodules
// ============================================================================

/// Per-key coalescing of concurrent calls.
pub mod dedupe;

/// Multi-slot readiness gate.
pub mod gate;

// ============================================================================
// Re-exports
// ============================================================================

pub use dedupe::{DedupeRouter, SharedCall};
pub use gate::ReadyGate;
