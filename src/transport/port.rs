//! In-memory duplex channel carrying JSON text frames.
//!
//! A [`Port`] is one end of a point-to-point channel. The page side hands its
//! end to a [`Bridge`](super::Bridge); the privileged side (or a WebSocket
//! pump, or a test double) drives the other end.
//!
//! # Example
//!
//! ```ignore
//! let (page, mut background) = Port::pair();
//! page.send(r#"{"hello":true}"#)?;
//! assert_eq!(background.recv().await.as_deref(), Some(r#"{"hello":true}"#));
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use tokio::sync::mpsc;

use crate::error::{Error, Result};

// ============================================================================
// PortSender
// ============================================================================

/// Cloneable sending half of a [`Port`].
#[derive(Clone)]
pub struct PortSender {
    tx: mpsc::UnboundedSender<String>,
}

impl PortSender {
    /// Sends one text frame to the peer.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionClosed`] if the peer end was dropped.
    pub fn send(&self, frame: impl Into<String>) -> Result<()> {
        self.tx
            .send(frame.into())
            .map_err(|_| Error::ConnectionClosed)
    }

    /// Returns `true` once the peer's receiving half is gone.
    #[inline]
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

impl fmt::Debug for PortSender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PortSender")
            .field("closed", &self.is_closed())
            .finish()
    }
}

// ============================================================================
// Port
// ============================================================================

/// One end of a duplex text channel.
pub struct Port {
    sender: PortSender,
    rx: mpsc::UnboundedReceiver<String>,
}

impl Port {
    /// Creates two connected ends.
    #[must_use]
    pub fn pair() -> (Port, Port) {
        let (a_tx, a_rx) = mpsc::unbounded_channel();
        let (b_tx, b_rx) = mpsc::unbounded_channel();

        let a = Port {
            sender: PortSender { tx: b_tx },
            rx: a_rx,
        };
        let b = Port {
            sender: PortSender { tx: a_tx },
            rx: b_rx,
        };
        (a, b)
    }

    /// Returns a cloneable sender for this end.
    #[inline]
    #[must_use]
    pub fn sender(&self) -> PortSender {
        self.sender.clone()
    }

    /// Sends one text frame to the peer.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionClosed`] if the peer end was dropped.
    #[inline]
    pub fn send(&self, frame: impl Into<String>) -> Result<()> {
        self.sender.send(frame)
    }

    /// Receives the next frame, or `None` once every peer sender is gone.
    pub async fn recv(&mut self) -> Option<String> {
        self.rx.recv().await
    }

    /// Splits into sending and receiving halves.
    #[must_use]
    pub fn into_split(self) -> (PortSender, mpsc::UnboundedReceiver<String>) {
        (self.sender, self.rx)
    }
}

impl fmt::Debug for Port {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Port")
            .field("sender", &self.sender)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Tests
// ============================================================================
