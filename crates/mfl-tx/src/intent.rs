//! Transaction intent: the caller's description of instructions plus the
//! fee-payer identity, with a canonical digest for deduplication.

use std::fmt;

use sha2::{Digest, Sha256};
use solana_compute_budget_interface::ComputeBudgetInstruction;
use solana_hash::Hash;
use solana_instruction::Instruction;
use solana_message::{Message, VersionedMessage};
use solana_pubkey::Pubkey;

/// Ledger effect applied by the submitter once a transaction confirms.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum BalanceEffect {
    /// Increase the user's platform balance (deposit).
    Credit {
        /// User identity.
        user: Pubkey,
        /// Amount in lamports.
        lamports: u64,
    },
    /// Decrease the user's platform balance (withdrawal, entry fee).
    Debit {
        /// User identity.
        user: Pubkey,
        /// Amount in lamports.
        lamports: u64,
    },
}

/// Canonical digest identifying a transaction intent.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub struct IntentDigest([u8; 32]);

impl IntentDigest {
    /// Returns the raw digest bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for IntentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

/// Immutable description of a transaction to submit: ordered instructions
/// plus the designated fee payer.
#[derive(Debug, Clone)]
pub struct TransactionIntent {
    /// Fee payer and primary signer.
    payer: Pubkey,
    /// Ordered instructions, excluding compute-budget prefix.
    instructions: Vec<Instruction>,
    /// Optional ledger effect applied after confirmation.
    balance_effect: Option<BalanceEffect>,
}

impl TransactionIntent {
    /// Creates an intent for a fee payer.
    #[must_use]
    pub const fn new(payer: Pubkey) -> Self {
        Self {
            payer,
            instructions: Vec::new(),
            balance_effect: None,
        }
    }

    /// Appends one instruction.
    #[must_use]
    pub fn add_instruction(mut self, instruction: Instruction) -> Self {
        self.instructions.push(instruction);
        self
    }

    /// Appends many instructions.
    #[must_use]
    pub fn add_instructions<I>(mut self, instructions: I) -> Self
    where
        I: IntoIterator<Item = Instruction>,
    {
        self.instructions.extend(instructions);
        self
    }

    /// Sets the ledger effect applied once the transaction confirms.
    #[must_use]
    pub const fn with_balance_effect(mut self, effect: BalanceEffect) -> Self {
        self.balance_effect = Some(effect);
        self
    }

    /// Returns the fee payer.
    #[must_use]
    pub const fn payer(&self) -> Pubkey {
        self.payer
    }

    /// Returns the intent's instructions.
    #[must_use]
    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    /// Returns the ledger effect, when set.
    #[must_use]
    pub const fn balance_effect(&self) -> Option<BalanceEffect> {
        self.balance_effect
    }

    /// Returns all account keys the intent touches, payer first,
    /// deduplicated in first-seen order.
    #[must_use]
    pub fn account_keys(&self) -> Vec<Pubkey> {
        let mut keys = vec![self.payer];
        for instruction in &self.instructions {
            if !keys.contains(&instruction.program_id) {
                keys.push(instruction.program_id);
            }
            for meta in &instruction.accounts {
                if !keys.contains(&meta.pubkey) {
                    keys.push(meta.pubkey);
                }
            }
        }
        keys
    }

    /// Computes the canonical digest over the fee payer and the full
    /// instruction list.
    ///
    /// The digest intentionally excludes the blockhash and the
    /// compute-budget prefix so that retries of the same logical action map
    /// to the same cache key.
    #[must_use]
    pub fn digest(&self) -> IntentDigest {
        let mut hasher = Sha256::new();
        hasher.update(self.payer.as_ref());
        for instruction in &self.instructions {
            hasher.update(instruction.program_id.as_ref());
            hasher.update(u32::try_from(instruction.accounts.len()).unwrap_or(u32::MAX).to_le_bytes());
            for meta in &instruction.accounts {
                hasher.update(meta.pubkey.as_ref());
                hasher.update([u8::from(meta.is_signer), u8::from(meta.is_writable)]);
            }
            hasher.update(u32::try_from(instruction.data.len()).unwrap_or(u32::MAX).to_le_bytes());
            hasher.update(&instruction.data);
        }
        IntentDigest(hasher.finalize().into())
    }

    /// Builds a legacy message wrapped as a versioned message, prepending
    /// compute-budget instructions for the unit limit and unit price.
    #[must_use]
    pub fn to_message(
        &self,
        recent_blockhash: [u8; 32],
        compute_unit_limit: u32,
        compute_unit_price_micro_lamports: u64,
    ) -> VersionedMessage {
        let mut instructions = Vec::with_capacity(self.instructions.len().saturating_add(2));
        instructions.push(ComputeBudgetInstruction::set_compute_unit_limit(
            compute_unit_limit,
        ));
        instructions.push(ComputeBudgetInstruction::set_compute_unit_price(
            compute_unit_price_micro_lamports,
        ));
        instructions.extend(self.instructions.iter().cloned());
        let blockhash = Hash::new_from_array(recent_blockhash);
        let message = Message::new_with_blockhash(&instructions, Some(&self.payer), &blockhash);
        VersionedMessage::Legacy(message)
    }
}
