//! Host page model.
//!
//! The provider lives inside a page it does not control. This module models
//! the parts of that page it observes:
//!
//! | Observable | Type | Used for |
//! |------------|------|----------|
//! | Origin, title, icon | [`PageMetadata`] | tab check-in handshake |
//! | Visibility | [`Visibility`] | readiness gate slot 1 |
//! | Document ready state | [`ReadyState`] | check-in timing, gate slot 2 |
//!
//! The embedding host drives the page with [`Page::set_visibility`] and
//! [`Page::set_ready_state`]; the provider subscribes to the changes.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use tokio::sync::watch;
use url::Url;

use crate::error::{Error, Result};
use crate::protocol::TabCheckin;

// ============================================================================
// PageMetadata
// ============================================================================

/// Static facts about the page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageMetadata {
    url: Url,
    origin: String,
    host: String,
    title: Option<String>,
    icon_link: Option<String>,
    meta_image: Option<String>,
    meta_title: Option<String>,
}

impl PageMetadata {
    /// Creates metadata for the page at `url`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `url` does not parse or has no host.
    pub fn new(url: &str) -> Result<Self> {
        let parsed = Url::parse(url).map_err(|e| Error::config(format!("invalid page url {url}: {e}")))?;
        let host = parsed
            .host_str()
            .ok_or_else(|| Error::config(format!("page url {url} has no host")))?
            .to_string();

        Ok(Self {
            origin: parsed.origin().ascii_serialization(),
            url: parsed,
            host,
            title: None,
            icon_link: None,
            meta_image: None,
            meta_title: None,
        })
    }

    /// Sets `document.title`.
    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Sets the `<link rel="icon">` href.
    #[must_use]
    pub fn with_icon_link(mut self, href: impl Into<String>) -> Self {
        self.icon_link = Some(href.into());
        self
    }

    /// Sets the `<meta itemprop="image">` content.
    #[must_use]
    pub fn with_meta_image(mut self, content: impl Into<String>) -> Self {
        self.meta_image = Some(content.into());
        self
    }

    /// Sets the `<meta name="title">` content.
    #[must_use]
    pub fn with_meta_title(mut self, content: impl Into<String>) -> Self {
        self.meta_title = Some(content.into());
        self
    }

    /// Page origin, e.g. `https://app.example.com`.
    #[inline]
    #[must_use]
    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Page hostname, e.g. `app.example.com`.
    #[inline]
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Builds the check-in payload.
    ///
    /// The icon is the favicon link resolved against the page URL, else the
    /// meta image. The name is the
    /// title, else the meta title, else the origin. Empty strings count as
    /// absent.
    #[must_use]
    pub fn checkin(&self) -> TabCheckin {
        let present = |v: &Option<String>| v.as_deref().filter(|s| !s.is_empty()).map(str::to_string);

        TabCheckin {
            icon: present(&self.icon_link)
                .map(|href| self.url.join(&href).map_or(href, String::from))
                .or_else(|| present(&self.meta_image)),
            name: present(&self.title)
                .or_else(|| present(&self.meta_title))
                .unwrap_or_else(|| self.origin.clone()),
            origin: self.origin.clone(),
        }
    }
}

// ============================================================================
// Observables
// ============================================================================

/// `document.visibilityState`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Visibility {
    /// Tab is in the foreground.
    #[default]
    Visible,
    /// Tab is hidden.
    Hidden,
}

/// `document.readyState`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum ReadyState {
    /// Document still parsing.
    #[default]
    Loading,
    /// DOM parsed (`DOMContentLoaded` fired).
    Interactive,
    /// All subresources loaded.
    Complete,
}

// ============================================================================
// Page
// ============================================================================

struct PageInner {
    metadata: PageMetadata,
    visibility: watch::Sender<Visibility>,
    ready_state: watch::Sender<ReadyState>,
}

/// Shared handle to the host page.
#[derive(Clone)]
pub struct Page {
    inner: Arc<PageInner>,
}

impl fmt::Debug for Page {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Page")
            .field("origin", &self.inner.metadata.origin)
            .field("visibility", &self.visibility())
            .field("ready_state", &self.ready_state())
            .finish()
    }
}

impl Page {
    /// Creates a visible, still-loading page.
    #[must_use]
    pub fn new(metadata: PageMetadata) -> Self {
        Self::with_state(metadata, Visibility::Visible, ReadyState::Loading)
    }

    /// Creates a page in the given state.
    #[must_use]
    pub fn with_state(metadata: PageMetadata, visibility: Visibility, ready_state: ReadyState) -> Self {
        let (visibility, _) = watch::channel(visibility);
        let (ready_state, _) = watch::channel(ready_state);
        Self {
            inner: Arc::new(PageInner {
                metadata,
                visibility,
                ready_state,
            }),
        }
    }

    /// Page metadata.
    #[inline]
    #[must_use]
    pub fn metadata(&self) -> &PageMetadata {
        &self.inner.metadata
    }

    /// Current visibility.
    #[inline]
    #[must_use]
    pub fn visibility(&self) -> Visibility {
        *self.inner.visibility.borrow()
    }

    /// Current document ready state.
    #[inline]
    #[must_use]
    pub fn ready_state(&self) -> ReadyState {
        *self.inner.ready_state.borrow()
    }

    /// Updates visibility; subscribers are woken only on change.
    pub fn set_visibility(&self, visibility: Visibility) {
        self.inner.visibility.send_if_modified(|current| {
            let changed = *current != visibility;
            *current = visibility;
            changed
        });
    }

    /// Advances the document ready state. Going backwards is ignored.
    pub fn set_ready_state(&self, state: ReadyState) {
        self.inner.ready_state.send_if_modified(|current| {
            if state > *current {
                *current = state;
                true
            } else {
                false
            }
        });
    }

    /// Subscribes to visibility changes.
    #[must_use]
    pub fn watch_visibility(&self) -> watch::Receiver<Visibility> {
        self.inner.visibility.subscribe()
    }

    /// Resolves once the DOM has been parsed.
    pub async fn dom_ready(&self) {
        let mut rx = self.inner.ready_state.subscribe();
        // The sender lives as long as `self`, so this cannot fail
        let _ = rx.wait_for(|state| *state >= ReadyState::Interactive).await;
    }
}

// ============================================================================
// Tests
// ============================================================================
