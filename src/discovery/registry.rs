//! Registry of providers discovered on the page.
//!
//! The registry never owns a provider's lifecycle; it only remembers what
//! was announced. Entries are deduplicated by provider object identity,
//! since several wallets may share a display name, and are never evicted.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use crate::identifiers::ListenerId;
use crate::provider::WalletProvider;

use super::{DiscoveryBus, DiscoveryEvent, ProviderDetail, same_provider};

// ============================================================================
// ProviderRegistry
// ============================================================================

/// Providers announced by others, in announcement order.
pub struct ProviderRegistry {
    /// UUID of the announcing provider that owns this registry.
    own_uuid: Uuid,
    /// Handle of the owning provider, filtered out by identity.
    own: Option<Arc<dyn WalletProvider>>,
    entries: RwLock<Vec<ProviderDetail>>,
}

impl fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rdns: Vec<String> = self.entries.read().iter().map(|d| d.info.rdns.clone()).collect();
        f.debug_struct("ProviderRegistry")
            .field("own_uuid", &self.own_uuid)
            .field("entries", &rdns)
            .finish()
    }
}

impl ProviderRegistry {
    /// Creates an empty registry that ignores announcements carrying
    /// `own_uuid` or the `own` provider handle.
    #[must_use]
    pub fn new(own_uuid: Uuid, own: Option<Arc<dyn WalletProvider>>) -> Self {
        Self {
            own_uuid,
            own,
            entries: RwLock::new(Vec::new()),
        }
    }

    /// Subscribes the registry to announcements on `bus`.
    pub fn listen(self: &Arc<Self>, bus: &DiscoveryBus) -> ListenerId {
        let registry = Arc::downgrade(self);
        bus.subscribe(Arc::new(move |event| {
            if let DiscoveryEvent::AnnounceProvider(detail) = event
                && let Some(registry) = registry.upgrade()
            {
                registry.register(detail.clone());
            }
        }))
    }

    /// Returns `true` if `detail` describes the owning provider.
    #[must_use]
    pub fn is_own(&self, detail: &ProviderDetail) -> bool {
        detail.info.uuid == self.own_uuid
            || self
                .own
                .as_ref()
                .is_some_and(|own| detail.same_provider(own))
    }

    /// Adds an announced provider. Returns `true` if it was new.
    ///
    /// Self-announcements and providers already registered (by object
    /// identity) are ignored.
    pub fn register(&self, detail: ProviderDetail) -> bool {
        if self.is_own(&detail) {
            return false;
        }

        let mut entries = self.entries.write();
        if entries.iter().any(|entry| entry.same_provider(&detail.provider)) {
            return false;
        }

        debug!(rdns = %detail.info.rdns, name = %detail.info.name, "Provider discovered");
        entries.push(detail);
        true
    }

    /// Looks up a provider by rdns. The most recent announcement wins.
    #[must_use]
    pub fn find(&self, rdns: &str) -> Option<ProviderDetail> {
        self.entries
            .read()
            .iter()
            .rev()
            .find(|entry| entry.info.rdns == rdns)
            .cloned()
    }

    /// All registered providers, in announcement order.
    #[must_use]
    pub fn entries(&self) -> Vec<ProviderDetail> {
        self.entries.read().clone()
    }

    /// `{uuid, name, rdns}` of every registered provider.
    #[must_use]
    pub fn summaries(&self) -> Vec<Value> {
        self.entries.read().iter().map(|entry| entry.info.summary()).collect()
    }

    /// Number of registered providers.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns `true` if nothing has been discovered.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{StubProvider, test_info};

    fn detail(rdns: &str) -> ProviderDetail {
        ProviderDetail::new(test_info(rdns), Arc::new(StubProvider::new(rdns)))
    }

    #[test]
    fn test_dedup_by_identity_not_name() {
        let registry = ProviderRegistry::new(Uuid::new_v4(), None);
        let a = detail("io.example.a");
        let same_object = ProviderDetail::new(test_info("io.example.renamed"), Arc::clone(&a.provider));
        let same_name = detail("io.example.a");

        assert!(registry.register(a));
        assert!(!registry.register(same_object));
        assert!(registry.register(same_name));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_self_filtered_by_uuid_and_identity() {
        let own = detail("io.example.self");
        let registry = ProviderRegistry::new(own.info.uuid, Some(Arc::clone(&own.provider)));

        assert!(!registry.register(own.clone()));

        let other_uuid = ProviderDetail::new(test_info("io.example.self"), Arc::clone(&own.provider));
        assert!(!registry.register(other_uuid));

        let same_uuid = ProviderDetail::new(
            test_info("io.example.clone").with_uuid(own.info.uuid),
            Arc::new(StubProvider::new("clone")),
        );
        assert!(!registry.register(same_uuid));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_repeated_discovery_requests_do_not_duplicate() {
        let bus = DiscoveryBus::new();
        let registry = Arc::new(ProviderRegistry::new(Uuid::new_v4(), None));
        registry.listen(&bus);

        let other = detail("io.example.other");
        let announcer = other.clone();
        let bus = Arc::new(bus);
        let responder = Arc::clone(&bus);
        bus.subscribe(Arc::new(move |event| {
            if matches!(event, DiscoveryEvent::RequestProvider) {
                responder.announce(announcer.clone());
            }
        }));

        bus.request_providers();
        bus.request_providers();
        assert_eq!(registry.len(), 1);
        assert!(registry.find("io.example.other").is_some());
        assert!(registry.find("io.example.missing").is_none());
    }

    #[test]
    fn test_find_prefers_latest_announcement() {
        let registry = ProviderRegistry::new(Uuid::new_v4(), None);
        let first = detail("io.example.dup");
        let second = detail("io.example.dup");
        let second_uuid = second.info.uuid;
        registry.register(first);
        registry.register(second);

        let found = registry.find("io.example.dup").expect("found");
        assert_eq!(found.info.uuid, second_uuid);
        assert_eq!(registry.summaries().len(), 2);
    }
}
