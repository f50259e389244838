//! Contracts for the external collaborators the recovery flow consumes.
//!
//! The engine owns none of these: keyshare combination, backup encryption,
//! the remote record store, chain queries, and local wallet state all live
//! behind trait seams so production backends can be swapped in. The
//! [`simulated`] module provides in-memory backends for the demo cli and
//! tests.

use async_trait::async_trait;

use crate::error::RecoveryError;
use crate::types::{CombinedKeypair, Keyshare};

pub mod simulated;

/// Deterministic derivation of the encryption keypair from both keyshares.
/// Pure and fast; any failure is programmer error.
pub trait KeyCombiner: Send + Sync {
    fn combine(
        &self,
        identity: &Keyshare,
        phone: &Keyshare,
    ) -> Result<CombinedKeypair, RecoveryError>;

    /// Address of the keypair a previously derived private key belongs to.
    fn address_of(&self, private_key: &[u8]) -> Result<String, RecoveryError>;
}

/// Seed-phrase encryption under both keyshares. Decryption with either share
/// altered must fail, never return a wrong-but-plausible mnemonic.
pub trait BackupCodec: Send + Sync {
    fn encrypt(
        &self,
        identity: &Keyshare,
        phone: &Keyshare,
        mnemonic: &str,
    ) -> Result<Vec<u8>, RecoveryError>;

    fn decrypt(
        &self,
        identity: &Keyshare,
        phone: &Keyshare,
        blob: &[u8],
    ) -> Result<String, RecoveryError>;
}

/// Remote backup record store, keyed by the derived encryption address and
/// gated by an identity proof token.
#[async_trait]
pub trait BackupStore: Send + Sync {
    async fn put(
        &self,
        address: &str,
        blob: Vec<u8>,
        auth_token: &str,
    ) -> Result<(), RecoveryError>;

    /// An absent record is `None`, not an error.
    async fn get(
        &self,
        address: &str,
        auth_token: &str,
    ) -> Result<Option<Vec<u8>>, RecoveryError>;

    async fn delete(&self, address: &str) -> Result<(), RecoveryError>;
}

/// Chain balance lookup for a candidate recovered address.
#[async_trait]
pub trait ChainClient: Send + Sync {
    async fn balance(&self, address: &str) -> Result<u128, RecoveryError>;
}

/// Local wallet state: secure storage of mnemonics and derived keys, plus
/// the account activation sequence run at the end of a restore.
#[async_trait]
pub trait WalletStore: Send + Sync {
    /// Address of the currently active wallet, if one exists.
    async fn wallet_address(&self) -> Option<String>;

    async fn stored_mnemonic(&self, address: &str) -> Result<Option<String>, RecoveryError>;

    async fn store_mnemonic(&self, mnemonic: &str, address: &str) -> Result<(), RecoveryError>;

    async fn store_derived_key(
        &self,
        private_key: &[u8],
        address: &str,
    ) -> Result<(), RecoveryError>;

    async fn stored_derived_key(&self, address: &str) -> Result<Option<Vec<u8>>, RecoveryError>;

    /// Wallet address a mnemonic's key hierarchy resolves to.
    fn address_from_mnemonic(&self, mnemonic: &str) -> Result<String, RecoveryError>;

    /// Assign the account from its private key and run the standard
    /// account-initialization sequence.
    async fn activate_account(
        &self,
        private_key: &[u8],
        mnemonic: &str,
        address: &str,
    ) -> Result<(), RecoveryError>;
}
