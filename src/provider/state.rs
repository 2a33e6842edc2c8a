//! Connection state owned by one provider.
//!
//! Only the push-event path and the initialization handshake mutate this
//! state. Each mutator reports whether anything changed so the caller can
//! decide which public events to emit.

use serde::Serialize;

// ============================================================================
// ConnectionState
// ============================================================================

/// Chain, account and connectivity state as last reported by the
/// privileged context.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionState {
    /// Hex chain id, e.g. `0x1`.
    pub chain_id: Option<String>,
    /// Decimal network id, e.g. `1`.
    pub network_version: Option<String>,
    /// First exposed account.
    pub selected_address: Option<String>,
    /// Exposed accounts; `None` until first reported.
    pub accounts: Option<Vec<String>>,
    /// Connected to at least one chain.
    pub is_connected: bool,
    /// Wallet unlocked.
    pub is_unlocked: bool,
    /// Initialization handshake finished (successfully or not).
    pub initialized: bool,
    /// The channel to the privileged context is gone for good.
    pub is_permanently_disconnected: bool,
}

/// What a `chainChanged` update altered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChainUpdate {
    /// `connect` transition happened.
    pub connected: bool,
    /// `chainId` changed.
    pub chain: bool,
    /// `networkVersion` changed.
    pub network: bool,
}

impl ConnectionState {
    /// Marks connected. Returns `true` on the transition.
    pub fn connect(&mut self) -> bool {
        let transitioned = !self.is_connected;
        self.is_connected = true;
        transitioned
    }

    /// Marks disconnected and forgets accounts. Returns `true` on the
    /// transition.
    pub fn disconnect(&mut self) -> bool {
        let transitioned = self.is_connected;
        self.is_connected = false;
        self.accounts = None;
        self.selected_address = None;
        transitioned
    }

    /// Stores a new account list.
    ///
    /// Returns `false` (and changes nothing) when the first account is the
    /// one already selected.
    pub fn set_accounts(&mut self, accounts: Vec<String>) -> bool {
        let first = accounts.first().cloned();
        if first == self.selected_address && self.accounts.is_some() {
            return false;
        }
        self.selected_address = first;
        self.accounts = Some(accounts);
        true
    }

    /// Applies a chain update.
    pub fn set_chain(&mut self, chain: Option<String>, network_version: Option<String>) -> ChainUpdate {
        let mut update = ChainUpdate {
            connected: self.connect(),
            ..ChainUpdate::default()
        };

        if chain.is_some() && chain != self.chain_id {
            self.chain_id = chain;
            update.chain = true;
        }
        if network_version.is_some() && network_version != self.network_version {
            self.network_version = network_version;
            update.network = true;
        }
        update
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_transitions_once() {
        let mut state = ConnectionState::default();
        assert!(state.connect());
        assert!(!state.connect());
        assert!(state.disconnect());
        assert!(!state.disconnect());
    }

    #[test]
    fn test_set_accounts_skips_same_first_account() {
        let mut state = ConnectionState::default();
        assert!(state.set_accounts(vec!["0xa".into()]));
        assert_eq!(state.selected_address.as_deref(), Some("0xa"));

        assert!(!state.set_accounts(vec!["0xa".into(), "0xb".into()]));
        assert_eq!(state.accounts, Some(vec!["0xa".to_string()]));

        assert!(state.set_accounts(vec![]));
        assert_eq!(state.selected_address, None);
        assert_eq!(state.accounts, Some(vec![]));
    }

    #[test]
    fn test_first_empty_account_list_is_recorded() {
        let mut state = ConnectionState::default();
        assert!(state.set_accounts(vec![]));
        assert_eq!(state.accounts, Some(vec![]));
    }

    #[test]
    fn test_disconnect_clears_accounts() {
        let mut state = ConnectionState::default();
        state.connect();
        state.set_accounts(vec!["0xa".into()]);
        state.disconnect();
        assert_eq!(state.accounts, None);
        assert_eq!(state.selected_address, None);
    }

    #[test]
    fn test_set_chain_reports_changes() {
        let mut state = ConnectionState::default();
        let update = state.set_chain(Some("0x1".into()), Some("1".into()));
        assert_eq!(
            update,
            ChainUpdate {
                connected: true,
                chain: true,
                network: true
            }
        );

        let update = state.set_chain(Some("0x1".into()), Some("1".into()));
        assert_eq!(update, ChainUpdate::default());

        let update = state.set_chain(Some("0x89".into()), None);
        assert!(update.chain);
        assert!(!update.network);
        assert_eq!(state.network_version.as_deref(), Some("1"));
    }
}
