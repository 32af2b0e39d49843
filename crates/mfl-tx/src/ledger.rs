//! Session-local record of platform-deposited balances.
//!
//! Best effort only: balances live for the process lifetime and are not a
//! source of truth for on-chain state. Mutation happens exclusively from
//! the submitter's confirmed terminal state.

use std::{
    collections::HashMap,
    sync::Mutex,
};

use solana_pubkey::Pubkey;
use thiserror::Error;

/// Ledger-level errors.
#[derive(Debug, Error, Clone, Eq, PartialEq)]
pub enum LedgerError {
    /// Debit would take the balance negative; balance left unchanged.
    #[error("insufficient balance: requested {requested} lamports, available {available}")]
    InsufficientBalance {
        /// Current balance in lamports.
        available: u64,
        /// Requested debit in lamports.
        requested: u64,
    },
    /// Credit would overflow the balance.
    #[error("balance overflow crediting {requested} lamports onto {available}")]
    BalanceOverflow {
        /// Current balance in lamports.
        available: u64,
        /// Requested credit in lamports.
        requested: u64,
    },
    /// Internal lock was poisoned.
    #[error("balance ledger lock poisoned: {message}")]
    Poisoned {
        /// Poisoning details.
        message: String,
    },
}

/// Per-user platform balances, lamports.
///
/// Balances are created lazily at zero on first access.
#[derive(Debug, Default)]
pub struct BalanceLedger {
    /// Balances by user identity.
    balances: Mutex<HashMap<Pubkey, u64>>,
}

impl BalanceLedger {
    /// Creates an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Increases a user's balance and returns the new total.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::BalanceOverflow`] when the credit would
    /// overflow, or [`LedgerError::Poisoned`] on lock poisoning.
    pub fn credit(&self, user: Pubkey, lamports: u64) -> Result<u64, LedgerError> {
        let mut balances = self.lock()?;
        let balance = balances.entry(user).or_insert(0);
        let updated = balance
            .checked_add(lamports)
            .ok_or(LedgerError::BalanceOverflow {
                available: *balance,
                requested: lamports,
            })?;
        *balance = updated;
        Ok(updated)
    }

    /// Decreases a user's balance and returns the new total.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::InsufficientBalance`] when the debit exceeds
    /// the balance (balance unchanged), or [`LedgerError::Poisoned`] on
    /// lock poisoning.
    pub fn debit(&self, user: Pubkey, lamports: u64) -> Result<u64, LedgerError> {
        let mut balances = self.lock()?;
        let balance = balances.entry(user).or_insert(0);
        let updated = balance
            .checked_sub(lamports)
            .ok_or(LedgerError::InsufficientBalance {
                available: *balance,
                requested: lamports,
            })?;
        *balance = updated;
        Ok(updated)
    }

    /// Returns a user's current balance.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Poisoned`] on lock poisoning.
    pub fn balance_of(&self, user: &Pubkey) -> Result<u64, LedgerError> {
        let balances = self.lock()?;
        Ok(balances.get(user).copied().unwrap_or(0))
    }

    /// Locks the balance map.
    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<Pubkey, u64>>, LedgerError> {
        self.balances.lock().map_err(|poisoned| LedgerError::Poisoned {
            message: poisoned.to_string(),
        })
    }
}
