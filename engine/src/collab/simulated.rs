//! In-memory simulated collaborators.
//!
//! These let the full Setup/Restore flow run without production
//! infrastructure, the same way the engine can run against a simulated TEE
//! vault instead of real sealed storage. The cli demo and the tests drive
//! the orchestrator through these backends; each one counts its calls so
//! tests can assert on collaborator traffic.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use async_trait::async_trait;
use rand::RngCore;
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

use crate::collab::{BackupCodec, BackupStore, ChainClient, KeyCombiner, WalletStore};
use crate::error::RecoveryError;
use crate::types::{CombinedKeypair, Keyshare};

const NONCE_LEN: usize = 12;
const ADDRESS_LEN: usize = 20;

fn address_from_key_material(domain: &[u8], material: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(domain);
    hasher.update(material);
    let digest = hasher.finalize();
    format!("0x{}", hex::encode(&digest[..ADDRESS_LEN]))
}

/// Deterministic SHA-256 mix of the two keyshares.
///
/// Stands in for the production elliptic-curve derivation, which is owned by
/// the external key-issuance design and deliberately not reimplemented here.
/// Determinism and the address mapping are the only properties the flow
/// relies on.
#[derive(Default)]
pub struct ShareMixCombiner;

impl ShareMixCombiner {
    pub fn new() -> Self {
        Self
    }
}

impl KeyCombiner for ShareMixCombiner {
    fn combine(
        &self,
        identity: &Keyshare,
        phone: &Keyshare,
    ) -> Result<CombinedKeypair, RecoveryError> {
        let mut hasher = Sha256::new();
        hasher.update(b"recovery.combine.v1");
        // Length prefix keeps (a, bc) and (ab, c) from colliding.
        hasher.update((identity.as_bytes().len() as u64).to_be_bytes());
        hasher.update(identity.as_bytes());
        hasher.update(phone.as_bytes());
        let private_key = Zeroizing::new(hasher.finalize().to_vec());
        let address = self.address_of(&private_key)?;
        Ok(CombinedKeypair { private_key, address })
    }

    fn address_of(&self, private_key: &[u8]) -> Result<String, RecoveryError> {
        Ok(address_from_key_material(b"recovery.address.v1", private_key))
    }
}

/// AES-256-GCM backup codec keyed by a digest over both keyshares, with the
/// random nonce prepended to the ciphertext. AEAD authentication guarantees
/// that decrypting with either share altered fails outright.
#[derive(Default)]
pub struct SealedBackupCodec {
    encrypt_calls: AtomicUsize,
    decrypt_calls: AtomicUsize,
}

impl SealedBackupCodec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn encrypt_calls(&self) -> usize {
        self.encrypt_calls.load(Ordering::SeqCst)
    }

    pub fn decrypt_calls(&self) -> usize {
        self.decrypt_calls.load(Ordering::SeqCst)
    }

    fn cipher(identity: &Keyshare, phone: &Keyshare) -> Aes256Gcm {
        let mut hasher = Sha256::new();
        hasher.update(b"recovery.backup-key.v1");
        hasher.update((identity.as_bytes().len() as u64).to_be_bytes());
        hasher.update(identity.as_bytes());
        hasher.update(phone.as_bytes());
        let key = Zeroizing::new(hasher.finalize().to_vec());
        Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_slice()))
    }
}

impl BackupCodec for SealedBackupCodec {
    fn encrypt(
        &self,
        identity: &Keyshare,
        phone: &Keyshare,
        mnemonic: &str,
    ) -> Result<Vec<u8>, RecoveryError> {
        self.encrypt_calls.fetch_add(1, Ordering::SeqCst);
        let cipher = Self::cipher(identity, phone);

        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, mnemonic.as_bytes())
            .map_err(|e| RecoveryError::Internal(format!("backup encryption failed: {e:?}")))?;

        let mut blob = nonce_bytes.to_vec();
        blob.extend_from_slice(&ciphertext);
        Ok(blob)
    }

    fn decrypt(
        &self,
        identity: &Keyshare,
        phone: &Keyshare,
        blob: &[u8],
    ) -> Result<String, RecoveryError> {
        self.decrypt_calls.fetch_add(1, Ordering::SeqCst);
        if blob.len() <= NONCE_LEN {
            return Err(RecoveryError::DecryptionError("blob too short".into()));
        }
        let (nonce_bytes, ciphertext) = blob.split_at(NONCE_LEN);
        let cipher = Self::cipher(identity, phone);

        let plaintext = cipher
            .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
            .map_err(|_| RecoveryError::DecryptionError("authentication failed".into()))?;

        String::from_utf8(plaintext)
            .map_err(|_| RecoveryError::DecryptionError("mnemonic is not valid UTF-8".into()))
    }
}

/// In-memory backup record store. Rejects requests without an identity proof
/// token, matching the gate the production store enforces.
#[derive(Default)]
pub struct MemoryBackupStore {
    records: Mutex<HashMap<String, Vec<u8>>>,
    put_calls: AtomicUsize,
    get_calls: AtomicUsize,
    delete_calls: AtomicUsize,
    fail_puts: AtomicBool,
}

impl MemoryBackupStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_calls(&self) -> usize {
        self.put_calls.load(Ordering::SeqCst)
    }

    pub fn get_calls(&self) -> usize {
        self.get_calls.load(Ordering::SeqCst)
    }

    pub fn delete_calls(&self) -> usize {
        self.delete_calls.load(Ordering::SeqCst)
    }

    /// Make subsequent `put` calls fail, to exercise the upload error path.
    pub fn fail_puts(&self, fail: bool) {
        self.fail_puts.store(fail, Ordering::SeqCst);
    }

    pub fn record(&self, address: &str) -> Option<Vec<u8>> {
        self.lock().get(address).cloned()
    }

    pub fn insert_record(&self, address: &str, blob: Vec<u8>) {
        self.lock().insert(address.to_string(), blob);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Vec<u8>>> {
        self.records.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl BackupStore for MemoryBackupStore {
    async fn put(
        &self,
        address: &str,
        blob: Vec<u8>,
        auth_token: &str,
    ) -> Result<(), RecoveryError> {
        self.put_calls.fetch_add(1, Ordering::SeqCst);
        if auth_token.is_empty() {
            return Err(RecoveryError::UploadError("missing identity proof token".into()));
        }
        if self.fail_puts.load(Ordering::SeqCst) {
            return Err(RecoveryError::UploadError("simulated network failure".into()));
        }
        self.lock().insert(address.to_string(), blob);
        Ok(())
    }

    async fn get(
        &self,
        address: &str,
        auth_token: &str,
    ) -> Result<Option<Vec<u8>>, RecoveryError> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        if auth_token.is_empty() {
            return Err(RecoveryError::Internal("missing identity proof token".into()));
        }
        Ok(self.lock().get(address).cloned())
    }

    async fn delete(&self, address: &str) -> Result<(), RecoveryError> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        self.lock().remove(address);
        Ok(())
    }
}

/// Chain client returning a fixed balance for every address.
#[derive(Default)]
pub struct FixedBalanceChain {
    balance: Mutex<u128>,
    calls: AtomicUsize,
    fail: AtomicBool,
}

impl FixedBalanceChain {
    pub fn new(balance: u128) -> Self {
        Self {
            balance: Mutex::new(balance),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Make subsequent balance queries fail, to exercise the RPC error path.
    pub fn fail_queries(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl ChainClient for FixedBalanceChain {
    async fn balance(&self, _address: &str) -> Result<u128, RecoveryError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(RecoveryError::BalanceCheckError("simulated rpc failure".into()));
        }
        let balance = self.balance.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        Ok(*balance)
    }
}

#[derive(Default)]
struct WalletState {
    active_address: Option<String>,
    mnemonics: HashMap<String, String>,
    derived_keys: HashMap<String, Vec<u8>>,
}

/// In-memory stand-in for the device's secure wallet storage and account
/// lifecycle.
#[derive(Default)]
pub struct MemoryWallet {
    state: Mutex<WalletState>,
    activate_calls: AtomicUsize,
}

impl MemoryWallet {
    /// A device with no wallet set up yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// A device with an active wallet whose mnemonic is already stored.
    pub fn with_wallet(address: &str, mnemonic: &str) -> Self {
        let wallet = Self::default();
        {
            let mut state = wallet.lock();
            state.active_address = Some(address.to_string());
            state.mnemonics.insert(address.to_string(), mnemonic.to_string());
        }
        wallet
    }

    pub fn active_address(&self) -> Option<String> {
        self.lock().active_address.clone()
    }

    pub fn activate_calls(&self) -> usize {
        self.activate_calls.load(Ordering::SeqCst)
    }

    pub fn derived_key(&self, address: &str) -> Option<Vec<u8>> {
        self.lock().derived_keys.get(address).cloned()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, WalletState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl WalletStore for MemoryWallet {
    async fn wallet_address(&self) -> Option<String> {
        self.active_address()
    }

    async fn stored_mnemonic(&self, address: &str) -> Result<Option<String>, RecoveryError> {
        Ok(self.lock().mnemonics.get(address).cloned())
    }

    async fn store_mnemonic(&self, mnemonic: &str, address: &str) -> Result<(), RecoveryError> {
        self.lock().mnemonics.insert(address.to_string(), mnemonic.to_string());
        Ok(())
    }

    async fn store_derived_key(
        &self,
        private_key: &[u8],
        address: &str,
    ) -> Result<(), RecoveryError> {
        self.lock().derived_keys.insert(address.to_string(), private_key.to_vec());
        Ok(())
    }

    async fn stored_derived_key(&self, address: &str) -> Result<Option<Vec<u8>>, RecoveryError> {
        Ok(self.lock().derived_keys.get(address).cloned())
    }

    fn address_from_mnemonic(&self, mnemonic: &str) -> Result<String, RecoveryError> {
        Ok(address_from_key_material(b"recovery.wallet-address.v1", mnemonic.as_bytes()))
    }

    async fn activate_account(
        &self,
        _private_key: &[u8],
        _mnemonic: &str,
        address: &str,
    ) -> Result<(), RecoveryError> {
        self.activate_calls.fetch_add(1, Ordering::SeqCst);
        self.lock().active_address = Some(address.to_string());
        Ok(())
    }
}
