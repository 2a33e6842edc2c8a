//! Builder pattern for provider configuration.
//!
//! # Example
//!
//! ```ignore
//! use inpage_provider::{Page, PageMetadata, Port, Provider, ProviderInfo};
//!
//! let page = Page::new(PageMetadata::new("https://app.example.com")?);
//! let (port, background) = Port::pair();
//! let provider = Provider::builder()
//!     .info(ProviderInfo::new("Example Wallet", ICON, "com.example.wallet"))
//!     .quiet_methods(["eth_call", "eth_blockNumber"])
//!     .build(page, port)?;
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::{Arc, OnceLock};

use regex::Regex;
use rustc_hash::{FxHashMap, FxHashSet};
use serde_json::Value;
use tracing::debug;

use crate::discovery::ProviderInfo;
use crate::error::{Error, Result};
use crate::page::Page;
use crate::protocol::method::names as methods;
use crate::transport::Port;

use super::core::Provider;
use super::emitter::DEFAULT_MAX_LISTENERS;
use super::identity::{DEFAULT_NATIVE_FLAG, FixedMode, PresentationMode, SiteClassifier};
use super::notice::{Notifier, TracingNotifier};

// ============================================================================
// ProviderConfig
// ============================================================================

/// Validated provider settings.
pub(crate) struct ProviderConfig {
    pub(crate) info: ProviderInfo,
    pub(crate) max_listeners: usize,
    pub(crate) quiet_methods: FxHashSet<String>,
    pub(crate) presentation: PresentationMode,
    pub(crate) identity: FxHashMap<String, Value>,
    pub(crate) revoke_method: String,
    pub(crate) notifier: Arc<dyn Notifier>,
}

impl ProviderConfig {
    /// Returns `true` if requests for `method` are not logged.
    #[inline]
    pub(crate) fn is_quiet(&self, method: &str) -> bool {
        self.quiet_methods.contains(method)
    }
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("info", &self.info)
            .field("presentation", &self.presentation)
            .field("revoke_method", &self.revoke_method)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// ProviderBuilder
// ============================================================================

/// Builder for configuring a [`Provider`].
///
/// Use [`Provider::builder()`] to create a new builder.
#[derive(Clone)]
pub struct ProviderBuilder {
    info: Option<ProviderInfo>,
    max_listeners: usize,
    quiet_methods: Vec<String>,
    classifier: Arc<dyn SiteClassifier>,
    native_flag: String,
    revoke_method: String,
    notifier: Arc<dyn Notifier>,
}

impl Default for ProviderBuilder {
    fn default() -> Self {
        Self {
            info: None,
            max_listeners: DEFAULT_MAX_LISTENERS,
            quiet_methods: vec![methods::ETH_CALL.to_string()],
            classifier: Arc::new(FixedMode(PresentationMode::default())),
            native_flag: DEFAULT_NATIVE_FLAG.to_string(),
            revoke_method: methods::WALLET_REVOKE_PERMISSIONS.to_string(),
            notifier: Arc::new(TracingNotifier),
        }
    }
}

impl fmt::Debug for ProviderBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderBuilder")
            .field("info", &self.info)
            .field("max_listeners", &self.max_listeners)
            .field("quiet_methods", &self.quiet_methods)
            .field("classifier", &self.classifier)
            .field("native_flag", &self.native_flag)
            .field("revoke_method", &self.revoke_method)
            .finish_non_exhaustive()
    }
}

impl ProviderBuilder {
    /// Creates a builder with default settings.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the announced identity. Required.
    #[inline]
    #[must_use]
    pub fn info(mut self, info: ProviderInfo) -> Self {
        self.info = Some(info);
        self
    }

    /// Listener count per event above which a leak warning is logged.
    /// `0` disables the warning.
    #[inline]
    #[must_use]
    pub fn max_listeners(mut self, max: usize) -> Self {
        self.max_listeners = max;
        self
    }

    /// Methods whose requests are not logged. Replaces the default
    /// (`eth_call`).
    #[must_use]
    pub fn quiet_methods<I, S>(mut self, methods: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.quiet_methods = methods.into_iter().map(Into::into).collect();
        self
    }

    /// Uses one presentation mode on every site.
    #[inline]
    #[must_use]
    pub fn presentation(mut self, mode: PresentationMode) -> Self {
        self.classifier = Arc::new(FixedMode(mode));
        self
    }

    /// Chooses the presentation mode per site.
    #[inline]
    #[must_use]
    pub fn classifier(mut self, classifier: impl SiteClassifier + 'static) -> Self {
        self.classifier = Arc::new(classifier);
        self
    }

    /// Name of the native identity property.
    #[inline]
    #[must_use]
    pub fn native_flag(mut self, name: impl Into<String>) -> Self {
        self.native_flag = name.into();
        self
    }

    /// Method that revokes a routed delegate's permissions.
    #[inline]
    #[must_use]
    pub fn revoke_method(mut self, method: impl Into<String>) -> Self {
        self.revoke_method = method.into();
        self
    }

    /// Receiver of notice triggers.
    #[inline]
    #[must_use]
    pub fn notifier(mut self, notifier: impl Notifier + 'static) -> Self {
        self.notifier = Arc::new(notifier);
        self
    }

    /// Validates the configuration and starts a provider over `port`.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if info is missing or invalid
    /// - [`Error::Config`] if the native flag is not an identifier
    /// - [`Error::Config`] if the revoke method is empty
    /// - [`Error::Config`] if there is no tokio runtime
    pub fn build(self, page: Page, port: Port) -> Result<Provider> {
        let config = self.validate(&page)?;

        if tokio::runtime::Handle::try_current().is_err() {
            return Err(Error::config("Provider must be built inside a tokio runtime"));
        }

        debug!(
            rdns = %config.info.rdns,
            presentation = ?config.presentation,
            origin = page.metadata().origin(),
            "Starting provider"
        );
        Provider::start(config, page, port)
    }
}

// ============================================================================
// Validation
// ============================================================================

impl ProviderBuilder {
    fn validate(self, page: &Page) -> Result<ProviderConfig> {
        let info = self.info.ok_or_else(|| {
            Error::config(
                "Provider info is required. Use .info() to set it.\n\
                 Example: Provider::builder().info(ProviderInfo::new(name, icon, rdns))",
            )
        })?;
        info.validate()?;

        if !identifier_pattern().is_match(&self.native_flag) {
            return Err(Error::config(format!(
                "native flag {:?} is not a valid property name",
                self.native_flag
            )));
        }

        if self.revoke_method.trim().is_empty() {
            return Err(Error::config("revoke method must not be empty"));
        }

        let presentation = self.classifier.classify(page.metadata().host());

        Ok(ProviderConfig {
            info,
            max_listeners: self.max_listeners,
            quiet_methods: self.quiet_methods.into_iter().collect(),
            presentation,
            identity: presentation.flags(&self.native_flag),
            revoke_method: self.revoke_method,
            notifier: self.notifier,
        })
    }
}

fn identifier_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z_$][A-Za-z0-9_$]*$").expect("identifier regex"))
}

// ============================================================================
// Tests
// ============================================================================
