//! Keyless account-recovery engine.
//!
//! Splits trust across two independently obtained keyshares, one proved by
//! phone-number possession and one by an identity-provider login, and drives
//! the Setup and Restore flows that encrypt, store, and recover a wallet's
//! seed phrase without ever persisting it in cleartext on any single party's
//! infrastructure. Neither share alone can decrypt the backup.

pub mod balance;
pub mod collab;
pub mod error;
pub mod fingerprint;
pub mod keyshare;
pub mod logging;
pub mod orchestrator;
pub mod types;

pub use error::RecoveryError;
pub use keyshare::KeyshareStore;
pub use logging::init_logging;
pub use orchestrator::{RecoveryOrchestrator, RecoveryState};
pub use types::{
    FlowKind, Keyshare, Origin, RecoveryOutcome, RecoveryTrigger, ShareKind, UserChoice,
};

#[cfg(test)]
mod tests {
    mod codec_tests;
    mod keyshare_tests;
    mod recovery_flow_tests;
}
