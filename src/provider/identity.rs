//! Presentation identity: which wallet the provider claims to be.
//!
//! Some dapps only light up for `isMetaMask`; others special-case the
//! native wallet flag. The choice per site is made by an injected
//! [`SiteClassifier`]; turning the choice into flags is a pure function.
//!
//! | Mode | `isMetaMask` | native flag |
//! |------|--------------|-------------|
//! | [`PresentationMode::ImpersonateMetaMask`] | yes | no |
//! | [`PresentationMode::Native`] | no | yes |
//! | [`PresentationMode::Both`] | yes | yes |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use rustc_hash::FxHashMap;
use serde_json::Value;

// ============================================================================
// Constants
// ============================================================================

/// Property announcing MetaMask compatibility.
pub const METAMASK_FLAG: &str = "isMetaMask";

/// Default name of the native identity property.
pub const DEFAULT_NATIVE_FLAG: &str = "isPageProvider";

/// Shared-root domains where each host is its own site.
pub const DEFAULT_SHARED_ROOTS: &[&str] = &[
    "eth.limo",
    "eth.link",
    "github.com",
    "github.io",
    "ipfs.io",
    "linktr.ee",
    "surge.sh",
    "vercel.com",
];

/// Default share of unlisted sites served in native mode.
pub const DEFAULT_GRAY_RATIO: f64 = 0.05;

// ============================================================================
// PresentationMode
// ============================================================================

/// Identity the provider presents to a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PresentationMode {
    /// Only claim to be MetaMask.
    ImpersonateMetaMask,
    /// Only present the native flag.
    Native,
    /// Present both flags.
    #[default]
    Both,
}

impl PresentationMode {
    /// Identity flags exposed for this mode, keyed by property name.
    #[must_use]
    pub fn flags(self, native_flag: &str) -> FxHashMap<String, Value> {
        let mut flags = FxHashMap::default();
        if matches!(self, Self::ImpersonateMetaMask | Self::Both) {
            flags.insert(METAMASK_FLAG.to_string(), Value::Bool(true));
        }
        if matches!(self, Self::Native | Self::Both) {
            flags.insert(native_flag.to_string(), Value::Bool(true));
        }
        flags
    }
}

// ============================================================================
// SiteClassifier
// ============================================================================

/// Chooses a presentation mode for a host.
pub trait SiteClassifier: Send + Sync + fmt::Debug {
    /// Returns the mode for `host` (hostname without port).
    fn classify(&self, host: &str) -> PresentationMode;
}

/// Classifier returning one mode for every host.
#[derive(Debug, Clone, Copy)]
pub struct FixedMode(pub PresentationMode);

impl SiteClassifier for FixedMode {
    fn classify(&self, _host: &str) -> PresentationMode {
        self.0
    }
}

/// Host-list classifier with a deterministic gray-release bucket.
///
/// Hosts matching `impersonate` get [`PresentationMode::ImpersonateMetaMask`],
/// hosts matching `native` get [`PresentationMode::Native`]. Every other
/// host is hashed into one of 100 buckets; the lowest `gray_ratio` share of
/// buckets gets `Native`, the rest `Both`.
#[derive(Debug, Clone)]
pub struct HostListClassifier {
    impersonate: Vec<String>,
    native: Vec<String>,
    shared_roots: Vec<String>,
    gray_ratio: f64,
}

impl Default for HostListClassifier {
    fn default() -> Self {
        Self {
            impersonate: Vec::new(),
            native: Vec::new(),
            shared_roots: DEFAULT_SHARED_ROOTS.iter().map(|s| s.to_string()).collect(),
            gray_ratio: DEFAULT_GRAY_RATIO,
        }
    }
}

impl HostListClassifier {
    /// Creates a classifier with empty host lists.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Hosts (and their sub-domains) that only see `isMetaMask`.
    #[must_use]
    pub fn impersonate<I, S>(mut self, hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.impersonate = hosts.into_iter().map(Into::into).collect();
        self
    }

    /// Hosts (and their sub-domains) that only see the native flag.
    #[must_use]
    pub fn native<I, S>(mut self, hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.native = hosts.into_iter().map(Into::into).collect();
        self
    }

    /// Domains whose sub-domains are bucketed individually.
    #[must_use]
    pub fn shared_roots<I, S>(mut self, hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.shared_roots = hosts.into_iter().map(Into::into).collect();
        self
    }

    /// Share of unlisted sites, in `0.0..=1.0`, served in native mode.
    #[must_use]
    pub fn gray_ratio(mut self, ratio: f64) -> Self {
        self.gray_ratio = ratio;
        self
    }

    /// Returns `true` if `host` is in the gray-release bucket.
    #[must_use]
    pub fn is_gray(&self, host: &str) -> bool {
        let domain = if in_host_list(&self.shared_roots, host) {
            host
        } else {
            root_domain(host)
        };
        f64::from(djb2(domain) % 100) / 100.0 <= self.gray_ratio
    }
}

impl SiteClassifier for HostListClassifier {
    fn classify(&self, host: &str) -> PresentationMode {
        if in_host_list(&self.impersonate, host) {
            return PresentationMode::ImpersonateMetaMask;
        }
        if in_host_list(&self.native, host) {
            return PresentationMode::Native;
        }
        if self.is_gray(host) {
            PresentationMode::Native
        } else {
            PresentationMode::Both
        }
    }
}

// ============================================================================
// Host Helpers
// ============================================================================

/// `host` equals `target` or is a sub-domain of it.
fn host_matches(host: &str, target: &str) -> bool {
    host == target
        || host
            .strip_suffix(target)
            .is_some_and(|prefix| prefix.ends_with('.'))
}

fn in_host_list(list: &[String], host: &str) -> bool {
    list.iter().any(|target| host_matches(host, target))
}

/// Last two labels of `host`.
fn root_domain(host: &str) -> &str {
    match host.rmatch_indices('.').nth(1) {
        Some((i, _)) => &host[i + 1..],
        None => host,
    }
}

/// djb2 (xor variant) over UTF-16 code units with 32-bit wrapping.
fn djb2(input: &str) -> u32 {
    let hash = input
        .encode_utf16()
        .fold(5381_i32, |hash, unit| hash.wrapping_mul(33) ^ i32::from(unit));
    hash as u32
}

// ============================================================================
// Tests
// ============================================================================
