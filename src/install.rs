//! Global exposure of the provider.
//!
//! An [`Installation`] is what a page sees after the provider is injected:
//!
//! | Page global | Rust counterpart |
//! |-------------|------------------|
//! | `ethereum` | [`GlobalBinding`] (guarded slot) |
//! | `web3.currentProvider` | [`Installation::web3_current`] |
//! | discovery listeners | `requestProvider` answered with an announcement |
//!
//! [`install`] keeps one installation per process. A second call fails with
//! [`Error::AlreadyInstalled`].
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use inpage_provider::{DiscoveryBus, InstallOptions, install};
//!
//! let bus = Arc::new(DiscoveryBus::new());
//! let installation = install(provider, bus, None, InstallOptions::default())?;
//! let ethereum = installation.binding().get();
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use parking_lot::RwLock;
use serde_json::json;
use tracing::{debug, info};

use crate::discovery::{DiscoveryBus, DiscoveryEvent, ProviderDetail, ProviderRegistry};
use crate::error::{Error, Result};
use crate::identifiers::ListenerId;
use crate::protocol::RequestEnvelope;
use crate::protocol::method::names as methods;
use crate::provider::{Provider, WalletProvider};
use crate::router::RouterProvider;

// ============================================================================
// InstallOptions
// ============================================================================

/// How the provider claims the page globals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InstallOptions {
    /// Keep serving the global even when another provider is assigned.
    pub is_default_wallet: bool,
    /// Expose the router instead of the strict provider.
    pub router_mode: bool,
}

// ============================================================================
// GlobalBinding
// ============================================================================

/// The intercepted `ethereum` slot.
///
/// Writes from third parties do not replace the binding. They are kept as
/// "the other provider" and reported to the privileged context.
pub struct GlobalBinding {
    own: Arc<dyn WalletProvider>,
    other: RwLock<Option<Arc<dyn WalletProvider>>>,
    is_default_wallet: bool,
    provider: Provider,
}

impl fmt::Debug for GlobalBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GlobalBinding")
            .field("is_default_wallet", &self.is_default_wallet)
            .field("has_other", &self.other.read().is_some())
            .finish_non_exhaustive()
    }
}

impl GlobalBinding {
    fn new(own: Arc<dyn WalletProvider>, is_default_wallet: bool, provider: Provider) -> Self {
        Self {
            own,
            other: RwLock::new(None),
            is_default_wallet,
            provider,
        }
    }

    /// Reads the slot: our provider when default, else the captured other
    /// provider if there is one.
    #[must_use]
    pub fn get(&self) -> Arc<dyn WalletProvider> {
        if self.is_default_wallet {
            return Arc::clone(&self.own);
        }
        self.other
            .read()
            .clone()
            .unwrap_or_else(|| Arc::clone(&self.own))
    }

    /// Intercepts an assignment. Returns `true` if `value` was captured.
    ///
    /// Providers built by this crate are ignored.
    pub fn set(&self, value: Arc<dyn WalletProvider>) -> bool {
        if value.is_self_marked() {
            return false;
        }

        info!(?value, "Another provider assigned to the page global");
        self.provider
            .notify(RequestEnvelope::new(methods::HAS_OTHER_PROVIDER).with_params(json!([])));
        *self.other.write() = Some(value);
        true
    }

    /// The captured other provider.
    #[must_use]
    pub fn other(&self) -> Option<Arc<dyn WalletProvider>> {
        self.other.read().clone()
    }
}

// ============================================================================
// Installation
// ============================================================================

/// The provider's page-facing bindings.
pub struct Installation {
    provider: Provider,
    strict: Arc<dyn WalletProvider>,
    router: Option<RouterProvider>,
    binding: GlobalBinding,
    web3_current: Arc<dyn WalletProvider>,
    bus: Arc<DiscoveryBus>,
    subscriptions: Vec<ListenerId>,
}

impl fmt::Debug for Installation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Installation")
            .field("provider", &self.provider)
            .field("router", &self.router)
            .field("binding", &self.binding)
            .finish_non_exhaustive()
    }
}

impl Installation {
    /// Wires `provider` into the page.
    ///
    /// `existing` is whatever already occupied the `ethereum` global. A
    /// foreign provider there is captured as the other provider.
    #[must_use]
    pub fn new(
        provider: Provider,
        bus: Arc<DiscoveryBus>,
        existing: Option<Arc<dyn WalletProvider>>,
        options: InstallOptions,
    ) -> Self {
        let strict: Arc<dyn WalletProvider> = Arc::new(provider.clone());
        let mut subscriptions = Vec::new();

        let router = options.router_mode.then(|| {
            let registry = Arc::new(ProviderRegistry::new(provider.info().uuid, Some(Arc::clone(&strict))));
            subscriptions.push(registry.listen(&bus));
            RouterProvider::new(provider.clone(), registry)
        });

        let own: Arc<dyn WalletProvider> = match &router {
            Some(router) => Arc::new(router.clone()),
            None => Arc::clone(&strict),
        };

        let binding = GlobalBinding::new(Arc::clone(&own), options.is_default_wallet, provider.clone());
        if let Some(existing) = existing {
            binding.set(existing);
        }

        let web3_current = match binding.other() {
            Some(other) if !options.is_default_wallet => other,
            _ => own,
        };

        let detail = ProviderDetail::new(provider.info().clone(), Arc::clone(&strict));
        let weak_bus = Arc::downgrade(&bus);
        let announced = detail.clone();
        subscriptions.push(bus.subscribe(Arc::new(move |event| {
            if matches!(event, DiscoveryEvent::RequestProvider)
                && let Some(bus) = weak_bus.upgrade()
            {
                bus.announce(announced.clone());
            }
        })));

        bus.announce(detail);
        if router.is_some() {
            bus.request_providers();
        }
        bus.dispatch(&DiscoveryEvent::Initialized);

        debug!(
            rdns = %provider.info().rdns,
            router_mode = options.router_mode,
            is_default_wallet = options.is_default_wallet,
            "Provider installed"
        );

        Self {
            provider,
            strict,
            router,
            binding,
            web3_current,
            bus,
            subscriptions,
        }
    }

    /// The strict provider.
    #[inline]
    #[must_use]
    pub fn provider(&self) -> &Provider {
        &self.provider
    }

    /// Handle announced through discovery.
    #[must_use]
    pub fn strict(&self) -> Arc<dyn WalletProvider> {
        Arc::clone(&self.strict)
    }

    /// The router, in router mode.
    #[inline]
    #[must_use]
    pub fn router(&self) -> Option<&RouterProvider> {
        self.router.as_ref()
    }

    /// The `ethereum` slot.
    #[inline]
    #[must_use]
    pub fn binding(&self) -> &GlobalBinding {
        &self.binding
    }

    /// What `web3.currentProvider` was set to.
    #[must_use]
    pub fn web3_current(&self) -> Arc<dyn WalletProvider> {
        Arc::clone(&self.web3_current)
    }
}

impl Drop for Installation {
    fn drop(&mut self) {
        for id in self.subscriptions.drain(..) {
            self.bus.unsubscribe(id);
        }
    }
}

// ============================================================================
// Process-wide Installation
// ============================================================================

static CLAIMED: AtomicBool = AtomicBool::new(false);
static INSTALLED: OnceLock<Installation> = OnceLock::new();

/// Installs the provider once per process.
///
/// # Errors
///
/// Returns [`Error::AlreadyInstalled`] on every call after the first.
pub fn install(
    provider: Provider,
    bus: Arc<DiscoveryBus>,
    existing: Option<Arc<dyn WalletProvider>>,
    options: InstallOptions,
) -> Result<&'static Installation> {
    if CLAIMED
        .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
        .is_err()
    {
        return Err(Error::AlreadyInstalled);
    }

    let installation = Installation::new(provider, bus, existing, options);
    Ok(INSTALLED.get_or_init(|| installation))
}

/// The process-wide installation, once [`install`] has completed.
#[must_use]
pub fn installed() -> Option<&'static Installation> {
    INSTALLED.get()
}

// ============================================================================
// Tests
// ============================================================================
