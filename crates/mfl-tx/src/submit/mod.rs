//! Transaction submitter: assembles, signs, broadcasts, and confirms a
//! transaction intent, orchestrating retries across the fee estimator,
//! blockhash provider, dedupe cache, and balance ledger.

/// Submitter implementation and retry orchestration.
mod client;
/// Submitter unit tests.
#[cfg(test)]
mod tests;
/// Submitter types, error taxonomy, and classification.
mod types;

pub use client::TransactionSubmitter;
pub use types::{Disposition, RetryCause, SubmitConfig, SubmitError, SubmitStage};
