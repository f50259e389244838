//! The state machine driving keyless backup Setup and Restore attempts.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::balance::BalanceGate;
use crate::collab::{BackupCodec, BackupStore, ChainClient, KeyCombiner, WalletStore};
use crate::error::RecoveryError;
use crate::fingerprint::share_fingerprint;
use crate::keyshare::{
    KEYSHARE_POLL_INTERVAL, KEYSHARE_WAIT_TIMEOUT, KeyshareStore, wait_for_share,
};
use crate::types::{
    CombinedKeypair, FlowKind, Keyshare, RecoveryOutcome, RecoveryTrigger, ShareKind, UserChoice,
};

/// Where an attempt currently is. Terminal states are `Completed`,
/// `NotFound`, `Bailed`, and `Failed`; every attempt ends in exactly one of
/// them before the next trigger is accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecoveryState {
    Idle,
    AwaitingShares,
    Combining,
    SetupEncrypting,
    SetupUploading,
    RestoreDownloading,
    RestoreDecrypting,
    BalanceChecking,
    AwaitingUserChoice,
    Activating,
    Completed,
    NotFound,
    Bailed,
    Failed,
}

impl RecoveryState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RecoveryState::Completed
                | RecoveryState::NotFound
                | RecoveryState::Bailed
                | RecoveryState::Failed
        )
    }
}

/// Drives one recovery attempt at a time from trigger to terminal state.
///
/// The entry event fires when phone verification completes; the identity
/// share normally arrived earlier via
/// [`identity_share_issued`](Self::identity_share_issued), and the waiter
/// closes the gap when it has not. A duplicate trigger while an attempt is
/// in flight is dropped, not queued.
pub struct RecoveryOrchestrator {
    shares: Arc<KeyshareStore>,
    combiner: Arc<dyn KeyCombiner>,
    codec: Arc<dyn BackupCodec>,
    backups: Arc<dyn BackupStore>,
    balance_gate: BalanceGate,
    wallet: Arc<dyn WalletStore>,
    state: Mutex<RecoveryState>,
    in_flight: AtomicBool,
    choice_tx: mpsc::Sender<UserChoice>,
    choice_rx: tokio::sync::Mutex<mpsc::Receiver<UserChoice>>,
    wait_timeout: Duration,
    poll_interval: Duration,
}

impl RecoveryOrchestrator {
    pub fn new(
        combiner: Arc<dyn KeyCombiner>,
        codec: Arc<dyn BackupCodec>,
        backups: Arc<dyn BackupStore>,
        chain: Arc<dyn ChainClient>,
        wallet: Arc<dyn WalletStore>,
    ) -> Self {
        let (choice_tx, choice_rx) = mpsc::channel(4);
        Self {
            shares: Arc::new(KeyshareStore::new()),
            combiner,
            codec,
            backups,
            balance_gate: BalanceGate::new(chain),
            wallet,
            state: Mutex::new(RecoveryState::Idle),
            in_flight: AtomicBool::new(false),
            choice_tx,
            choice_rx: tokio::sync::Mutex::new(choice_rx),
            wait_timeout: KEYSHARE_WAIT_TIMEOUT,
            poll_interval: KEYSHARE_POLL_INTERVAL,
        }
    }

    /// Override the keyshare wait parameters. Tests use short values.
    pub fn with_wait_params(mut self, timeout: Duration, poll_interval: Duration) -> Self {
        self.wait_timeout = timeout;
        self.poll_interval = poll_interval;
        self
    }

    pub fn state(&self) -> RecoveryState {
        *self.lock_state()
    }

    /// Handler for the identity-login-completed event. Fire-and-forget: the
    /// share is parked in the store until the phone trigger consumes it.
    pub fn identity_share_issued(&self, share: Keyshare) {
        tracing::debug!(
            fingerprint = %share_fingerprint(ShareKind::Identity, &share),
            "identity keyshare issued"
        );
        self.shares.set_identity_share(share);
    }

    /// Accept a zero-balance recovered account and continue to activation.
    pub fn accept_zero_balance(&self) {
        let _ = self.choice_tx.try_send(UserChoice::Continue);
    }

    /// Abandon the attempt at the zero-balance checkpoint.
    pub fn bail(&self) {
        let _ = self.choice_tx.try_send(UserChoice::Bail);
    }

    /// Entry point, fired when phone verification completes.
    ///
    /// Returns `Ok(None)` when the trigger was dropped because another
    /// attempt is still in flight; otherwise runs the attempt to a terminal
    /// state and reports it. Failures are surfaced exactly once and never
    /// retried here; retry is a user-initiated restart of the whole attempt.
    pub async fn handle_phone_share_issued(
        &self,
        trigger: RecoveryTrigger,
    ) -> Result<Option<RecoveryOutcome>, RecoveryError> {
        if self.in_flight.swap(true, Ordering::SeqCst) {
            tracing::warn!(
                flow = ?trigger.flow,
                "recovery attempt already in flight, dropping duplicate trigger"
            );
            return Ok(None);
        }

        let flow = trigger.flow;
        tracing::info!(flow = ?flow, origin = ?trigger.origin, "recovery attempt started");
        self.drain_stale_choices().await;

        let result = self.drive(trigger).await;
        match &result {
            Ok(RecoveryOutcome::Completed) => self.set_state(RecoveryState::Completed),
            Ok(RecoveryOutcome::NotFound) => self.set_state(RecoveryState::NotFound),
            Ok(RecoveryOutcome::Bailed) => self.set_state(RecoveryState::Bailed),
            Err(error) => {
                tracing::error!(flow = ?flow, %error, "recovery attempt failed");
                self.set_state(RecoveryState::Failed);
            }
        }

        // The attempt is over; its shares must not outlive it.
        self.shares.clear();
        self.in_flight.store(false, Ordering::SeqCst);
        result.map(Some)
    }

    /// Remove the stored backup record for the active wallet.
    pub async fn delete_backup(&self) -> Result<(), RecoveryError> {
        let wallet_address = self
            .wallet
            .wallet_address()
            .await
            .ok_or_else(|| RecoveryError::Internal("no active wallet".into()))?;
        let private_key = self
            .wallet
            .stored_derived_key(&wallet_address)
            .await?
            .ok_or_else(|| RecoveryError::Internal("no derived key stored for wallet".into()))?;
        let address = self.combiner.address_of(&private_key)?;
        self.backups.delete(&address).await?;
        self.shares.clear();
        tracing::info!("keyless backup deleted");
        Ok(())
    }

    async fn drive(&self, trigger: RecoveryTrigger) -> Result<RecoveryOutcome, RecoveryError> {
        let RecoveryTrigger { flow, origin: _, phone_share, auth_token } = trigger;

        // STEP 1: join the two share-producing events.
        self.set_state(RecoveryState::AwaitingShares);
        self.shares.set_phone_share(phone_share.clone());
        let identity_share = wait_for_share(
            &self.shares,
            ShareKind::Identity,
            self.wait_timeout,
            self.poll_interval,
        )
        .await?;

        let phone_fp = share_fingerprint(ShareKind::Phone, &phone_share);
        let identity_fp = share_fingerprint(ShareKind::Identity, &identity_share);
        if flow == FlowKind::Restore {
            tracing::info!(phone = %phone_fp, identity = %identity_fp, "keyshare fingerprints");
        } else {
            tracing::debug!(phone = %phone_fp, identity = %identity_fp, "keyshare fingerprints");
        }

        // STEP 2: derive the encryption keypair. Pure and deterministic.
        self.set_state(RecoveryState::Combining);
        let keypair = self.combiner.combine(&identity_share, &phone_share)?;

        match flow {
            FlowKind::Setup => {
                self.run_setup(&identity_share, &phone_share, &keypair, &auth_token).await
            }
            FlowKind::Restore => {
                self.run_restore(&identity_share, &phone_share, &keypair, &auth_token).await
            }
        }
    }

    async fn run_setup(
        &self,
        identity_share: &Keyshare,
        phone_share: &Keyshare,
        keypair: &CombinedKeypair,
        auth_token: &str,
    ) -> Result<RecoveryOutcome, RecoveryError> {
        // STEP 3a: encrypt the local mnemonic under both shares.
        self.set_state(RecoveryState::SetupEncrypting);
        let wallet_address = self
            .wallet
            .wallet_address()
            .await
            .ok_or(RecoveryError::NoMnemonicFound)?;
        let mnemonic = self
            .wallet
            .stored_mnemonic(&wallet_address)
            .await?
            .ok_or(RecoveryError::NoMnemonicFound)?;
        let blob = self.codec.encrypt(identity_share, phone_share, &mnemonic)?;

        // STEP 4a: upload, then keep the derived key so future re-auth does
        // not require recombination.
        self.set_state(RecoveryState::SetupUploading);
        self.backups.put(&keypair.address, blob, auth_token).await?;
        self.wallet.store_derived_key(&keypair.private_key, &wallet_address).await?;

        tracing::info!(address = %keypair.address, "keyless backup stored");
        Ok(RecoveryOutcome::Completed)
    }

    async fn run_restore(
        &self,
        identity_share: &Keyshare,
        phone_share: &Keyshare,
        keypair: &CombinedKeypair,
        auth_token: &str,
    ) -> Result<RecoveryOutcome, RecoveryError> {
        // STEP 3b: fetch the backup record for the derived address.
        self.set_state(RecoveryState::RestoreDownloading);
        let Some(blob) = self.backups.get(&keypair.address, auth_token).await? else {
            tracing::info!(address = %keypair.address, "no backup record for derived address");
            return Ok(RecoveryOutcome::NotFound);
        };

        self.set_state(RecoveryState::RestoreDecrypting);
        let mnemonic = self.codec.decrypt(identity_share, phone_share, &blob)?;
        let candidate = self.wallet.address_from_mnemonic(&mnemonic)?;

        // STEP 4: a recovered account with zero balance is a common false
        // positive; confirm with the user before overwriting wallet state.
        self.set_state(RecoveryState::BalanceChecking);
        let has_balance = self.balance_gate.check(&candidate).await?;
        if !has_balance {
            self.set_state(RecoveryState::AwaitingUserChoice);
            tracing::info!(address = %candidate, "recovered account has zero balance");
            if self.await_user_choice().await? == UserChoice::Bail {
                return Ok(RecoveryOutcome::Bailed);
            }
        }

        // STEP 5: activate and persist. Any sub-step failing fails the
        // attempt as an activation error.
        self.set_state(RecoveryState::Activating);
        self.wallet
            .activate_account(&keypair.private_key, &mnemonic, &candidate)
            .await
            .map_err(|e| RecoveryError::ActivationError(e.to_string()))?;
        self.wallet
            .store_mnemonic(&mnemonic, &candidate)
            .await
            .map_err(|e| RecoveryError::ActivationError(e.to_string()))?;
        self.wallet
            .store_derived_key(&keypair.private_key, &candidate)
            .await
            .map_err(|e| RecoveryError::ActivationError(e.to_string()))?;

        tracing::info!(address = %candidate, "account restored from keyless backup");
        Ok(RecoveryOutcome::Completed)
    }

    async fn await_user_choice(&self) -> Result<UserChoice, RecoveryError> {
        let mut rx = self.choice_rx.lock().await;
        rx.recv()
            .await
            .ok_or_else(|| RecoveryError::Internal("user choice channel closed".into()))
    }

    /// Discard choice signals left over from an abandoned attempt so they
    /// cannot satisfy this attempt's checkpoint.
    async fn drain_stale_choices(&self) {
        let mut rx = self.choice_rx.lock().await;
        while rx.try_recv().is_ok() {}
    }

    fn set_state(&self, next: RecoveryState) {
        let mut state = self.lock_state();
        tracing::debug!(from = ?*state, to = ?next, "state transition");
        *state = next;
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, RecoveryState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
