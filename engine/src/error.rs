//! Centralized recovery engine error types.

use thiserror::Error;

use crate::types::ShareKind;

/// Failure taxonomy for a recovery attempt. Each variant is surfaced to the
/// caller exactly once; the engine never retries on its own. `NotFound` and
/// `Bailed` are not errors and live in
/// [`RecoveryOutcome`](crate::types::RecoveryOutcome) instead.
#[derive(Error, Debug)]
pub enum RecoveryError {
    /// Timed out waiting for the other keyshare to arrive.
    #[error("timed out waiting for {0} keyshare")]
    KeyshareTimeout(ShareKind),
    /// Setup only: no mnemonic is stored locally for the active wallet.
    #[error("no mnemonic found for the active wallet")]
    NoMnemonicFound,
    /// Uploading the encrypted backup record failed.
    #[error("backup upload failed: {0}")]
    UploadError(String),
    /// The downloaded backup blob did not decrypt under the derived key.
    #[error("backup decryption failed: {0}")]
    DecryptionError(String),
    /// The chain balance query failed. Never treated as a zero balance.
    #[error("balance check failed: {0}")]
    BalanceCheckError(String),
    /// Account activation or the follow-on persistence steps failed.
    #[error("account activation failed: {0}")]
    ActivationError(String),
    /// Programmer error or a collaborator invariant violation.
    #[error("internal error: {0}")]
    Internal(String),
}
