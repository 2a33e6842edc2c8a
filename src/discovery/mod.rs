//! Provider discovery (EIP-6963 style).
//!
//! Wallet providers on a page find each other through two page-global
//! events instead of fighting over a single global:
//!
//! ```text
//! consumer ──requestProvider──► every provider
//! provider ──announceProvider { info, provider }──► every listener
//! ```
//!
//! [`DiscoveryBus`] stands in for the page's `window` event target. It is
//! synchronous: [`DiscoveryBus::dispatch`] runs every listener before it
//! returns, and listeners may dispatch further events.
//!
//! # Event Names
//!
//! | Event | Name |
//! |-------|------|
//! | [`DiscoveryEvent::RequestProvider`] | `eip6963:requestProvider` |
//! | [`DiscoveryEvent::AnnounceProvider`] | `eip6963:announceProvider` |
//! | [`DiscoveryEvent::Initialized`] | `ethereum#initialized` |

// ============================================================================
// Submodules
// ============================================================================

/// Registry of discovered providers.
pub mod registry;

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::{Arc, OnceLock};

use base64::Engine;
use base64::engine::general_purpose::STANDARD as Base64Standard;
use parking_lot::RwLock;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::trace;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::identifiers::ListenerId;
use crate::provider::WalletProvider;

pub use registry::ProviderRegistry;

// ============================================================================
// Constants
// ============================================================================

/// Name of the discovery request event.
pub const REQUEST_PROVIDER_EVENT: &str = "eip6963:requestProvider";

/// Name of the announcement event.
pub const ANNOUNCE_PROVIDER_EVENT: &str = "eip6963:announceProvider";

/// Name of the legacy "provider injected" event.
pub const INITIALIZED_EVENT: &str = "ethereum#initialized";

// ============================================================================
// ProviderInfo
// ============================================================================

/// Public identity of an announced provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderInfo {
    /// Per-session v4 UUID.
    pub uuid: Uuid,
    /// Display name.
    pub name: String,
    /// `data:image/...;base64,` icon URI.
    pub icon: String,
    /// Reverse-DNS identifier, e.g. `com.example.wallet`.
    pub rdns: String,
}

impl ProviderInfo {
    /// Creates info with a fresh random UUID.
    #[must_use]
    pub fn new(name: impl Into<String>, icon: impl Into<String>, rdns: impl Into<String>) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            name: name.into(),
            icon: icon.into(),
            rdns: rdns.into(),
        }
    }

    /// Replaces the UUID.
    #[inline]
    #[must_use]
    pub fn with_uuid(mut self, uuid: Uuid) -> Self {
        self.uuid = uuid;
        self
    }

    /// Checks every field.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the UUID is not v4, the name is blank,
    /// the rdns is not reverse-DNS, or the icon is not a decodable base64
    /// image data URI.
    pub fn validate(&self) -> Result<()> {
        if self.uuid.get_version_num() != 4 {
            return Err(Error::config(format!("provider uuid {} is not a v4 UUID", self.uuid)));
        }

        if self.name.trim().is_empty() {
            return Err(Error::config("provider name must not be empty"));
        }

        if !rdns_pattern().is_match(&self.rdns) {
            return Err(Error::config(format!(
                "provider rdns {:?} is not a reverse-DNS name",
                self.rdns
            )));
        }

        validate_icon(&self.icon)
    }

    /// `{uuid, name, rdns}` summary sent as routing context.
    #[must_use]
    pub fn summary(&self) -> Value {
        json!({ "uuid": self.uuid, "name": self.name, "rdns": self.rdns })
    }
}

fn rdns_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?i)[a-z0-9](?:[a-z0-9-]{0,61}[a-z0-9])?(?:\.[a-z0-9](?:[a-z0-9-]{0,61}[a-z0-9])?)+$")
            .expect("rdns regex")
    })
}

fn validate_icon(icon: &str) -> Result<()> {
    let invalid = |reason: &str| Error::config(format!("provider icon {reason}"));

    let rest = icon
        .strip_prefix("data:image/")
        .ok_or_else(|| invalid("must be a data:image/ URI"))?;
    let (_, payload) = rest
        .split_once(";base64,")
        .ok_or_else(|| invalid("must be base64 encoded"))?;

    match Base64Standard.decode(payload) {
        Ok(bytes) if !bytes.is_empty() => Ok(()),
        Ok(_) => Err(invalid("is empty")),
        Err(e) => Err(invalid(&format!("has invalid base64: {e}"))),
    }
}

// ============================================================================
// ProviderDetail
// ============================================================================

/// Payload of an announcement: identity plus a handle to the provider.
#[derive(Clone)]
pub struct ProviderDetail {
    /// Provider identity.
    pub info: ProviderInfo,
    /// The announced provider object.
    pub provider: Arc<dyn WalletProvider>,
}

impl ProviderDetail {
    /// Creates a detail.
    #[must_use]
    pub fn new(info: ProviderInfo, provider: Arc<dyn WalletProvider>) -> Self {
        Self { info, provider }
    }

    /// Returns `true` if both details point at the same provider object.
    #[inline]
    #[must_use]
    pub fn same_provider(&self, other: &Arc<dyn WalletProvider>) -> bool {
        same_provider(&self.provider, other)
    }
}

impl fmt::Debug for ProviderDetail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderDetail")
            .field("info", &self.info)
            .finish_non_exhaustive()
    }
}

/// Reference identity of two provider handles.
#[inline]
#[must_use]
pub fn same_provider(a: &Arc<dyn WalletProvider>, b: &Arc<dyn WalletProvider>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

// ============================================================================
// DiscoveryEvent
// ============================================================================

/// Page-global discovery events.
#[derive(Debug, Clone)]
pub enum DiscoveryEvent {
    /// A consumer asks every provider to announce itself.
    RequestProvider,
    /// A provider announces itself.
    AnnounceProvider(ProviderDetail),
    /// A provider finished injecting itself.
    Initialized,
}

impl DiscoveryEvent {
    /// DOM event name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::RequestProvider => REQUEST_PROVIDER_EVENT,
            Self::AnnounceProvider(_) => ANNOUNCE_PROVIDER_EVENT,
            Self::Initialized => INITIALIZED_EVENT,
        }
    }
}

/// Discovery event callback.
pub type DiscoveryListener = Arc<dyn Fn(&DiscoveryEvent) + Send + Sync>;

// ============================================================================
// DiscoveryBus
// ============================================================================

/// Synchronous page-global event target for discovery events.
#[derive(Default)]
pub struct DiscoveryBus {
    listeners: RwLock<Vec<(ListenerId, DiscoveryListener)>>,
}

impl fmt::Debug for DiscoveryBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiscoveryBus")
            .field("listeners", &self.listeners.read().len())
            .finish()
    }
}

impl DiscoveryBus {
    /// Creates a bus with no listeners.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a listener for every discovery event.
    pub fn subscribe(&self, listener: DiscoveryListener) -> ListenerId {
        let id = ListenerId::next();
        self.listeners.write().push((id, listener));
        id
    }

    /// Removes a listener. Returns `true` if it was subscribed.
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }

    /// Delivers `event` to every listener subscribed at call time.
    pub fn dispatch(&self, event: &DiscoveryEvent) {
        let snapshot: Vec<DiscoveryListener> = self
            .listeners
            .read()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();

        trace!(event = event.name(), listeners = snapshot.len(), "Dispatching discovery event");
        for listener in snapshot {
            listener(event);
        }
    }

    /// Broadcasts `requestProvider`.
    pub fn request_providers(&self) {
        self.dispatch(&DiscoveryEvent::RequestProvider);
    }

    /// Broadcasts `announceProvider` for `detail`.
    pub fn announce(&self, detail: ProviderDetail) {
        self.dispatch(&DiscoveryEvent::AnnounceProvider(detail));
    }
}

// ============================================================================
// Tests
// ============================================================================
