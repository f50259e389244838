use std::sync::Arc;
use std::time::Duration;

use crate::balance::BalanceGate;
use crate::collab::simulated::{
    FixedBalanceChain, MemoryBackupStore, MemoryWallet, SealedBackupCodec, ShareMixCombiner,
};
use crate::collab::{BackupCodec, KeyCombiner, WalletStore};
use crate::error::RecoveryError;
use crate::orchestrator::{RecoveryOrchestrator, RecoveryState};
use crate::types::{FlowKind, Keyshare, Origin, RecoveryOutcome, RecoveryTrigger};

const MNEMONIC: &str =
    "test test test test test test test test test test test junk";
const WALLET_ADDRESS: &str = "0x00000000000000000000000000000000000wa11et";
const AUTH_TOKEN: &str = "identity-proof-token";

fn identity_share() -> Keyshare {
    Keyshare::new(vec![0xAA; 32])
}

fn phone_share() -> Keyshare {
    Keyshare::new(vec![0xBB; 32])
}

fn trigger(flow: FlowKind) -> RecoveryTrigger {
    RecoveryTrigger {
        flow,
        origin: Origin::Settings,
        phone_share: phone_share(),
        auth_token: AUTH_TOKEN.to_string(),
    }
}

struct Harness {
    combiner: Arc<ShareMixCombiner>,
    codec: Arc<SealedBackupCodec>,
    backups: Arc<MemoryBackupStore>,
    chain: Arc<FixedBalanceChain>,
    wallet: Arc<MemoryWallet>,
    orchestrator: Arc<RecoveryOrchestrator>,
}

impl Harness {
    fn new(wallet: MemoryWallet, chain: FixedBalanceChain) -> Self {
        let combiner = Arc::new(ShareMixCombiner::new());
        let codec = Arc::new(SealedBackupCodec::new());
        let backups = Arc::new(MemoryBackupStore::new());
        let chain = Arc::new(chain);
        let wallet = Arc::new(wallet);
        let orchestrator = Arc::new(
            RecoveryOrchestrator::new(
                Arc::clone(&combiner) as _,
                Arc::clone(&codec) as _,
                Arc::clone(&backups) as _,
                Arc::clone(&chain) as _,
                Arc::clone(&wallet) as _,
            )
            .with_wait_params(Duration::from_millis(500), Duration::from_millis(10)),
        );
        Self { combiner, codec, backups, chain, wallet, orchestrator }
    }

    /// The address the combined keypair of the fixture shares resolves to.
    fn derived_address(&self) -> String {
        self.combiner
            .combine(&identity_share(), &phone_share())
            .expect("combine failed")
            .address
    }

    /// Seed the remote store with a backup of `MNEMONIC`, as a prior Setup
    /// run would have.
    fn seed_backup(&self) {
        let blob = self
            .codec
            .encrypt(&identity_share(), &phone_share(), MNEMONIC)
            .expect("encrypt failed");
        self.backups.insert_record(&self.derived_address(), blob);
    }

    async fn wait_for_state(&self, wanted: RecoveryState) {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        while self.orchestrator.state() != wanted {
            assert!(
                tokio::time::Instant::now() < deadline,
                "timed out waiting for state {wanted:?}, at {:?}",
                self.orchestrator.state()
            );
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

#[tokio::test]
async fn setup_happy_path_uploads_one_record() {
    let harness = Harness::new(
        MemoryWallet::with_wallet(WALLET_ADDRESS, MNEMONIC),
        FixedBalanceChain::new(0),
    );
    harness.orchestrator.identity_share_issued(identity_share());

    let outcome = harness
        .orchestrator
        .handle_phone_share_issued(trigger(FlowKind::Setup))
        .await
        .expect("setup failed");

    assert_eq!(outcome, Some(RecoveryOutcome::Completed));
    assert_eq!(harness.orchestrator.state(), RecoveryState::Completed);
    assert_eq!(harness.backups.put_calls(), 1);
    assert!(harness.backups.record(&harness.derived_address()).is_some());
    // The derived key is kept under the wallet address for future re-auth.
    assert!(harness.wallet.derived_key(WALLET_ADDRESS).is_some());
}

#[tokio::test]
async fn setup_without_local_mnemonic_fails_before_upload() {
    let harness = Harness::new(MemoryWallet::new(), FixedBalanceChain::new(0));
    harness.orchestrator.identity_share_issued(identity_share());

    let result = harness
        .orchestrator
        .handle_phone_share_issued(trigger(FlowKind::Setup))
        .await;

    assert!(matches!(result, Err(RecoveryError::NoMnemonicFound)));
    assert_eq!(harness.orchestrator.state(), RecoveryState::Failed);
    assert_eq!(harness.backups.put_calls(), 0);
}

#[tokio::test]
async fn setup_upload_failure_surfaces_as_upload_error() {
    let harness = Harness::new(
        MemoryWallet::with_wallet(WALLET_ADDRESS, MNEMONIC),
        FixedBalanceChain::new(0),
    );
    harness.backups.fail_puts(true);
    harness.orchestrator.identity_share_issued(identity_share());

    let result = harness
        .orchestrator
        .handle_phone_share_issued(trigger(FlowKind::Setup))
        .await;

    assert!(matches!(result, Err(RecoveryError::UploadError(_))));
    assert_eq!(harness.orchestrator.state(), RecoveryState::Failed);
    assert!(harness.wallet.derived_key(WALLET_ADDRESS).is_none());
}

#[tokio::test]
async fn restore_with_missing_backup_is_not_found() {
    let harness = Harness::new(MemoryWallet::new(), FixedBalanceChain::new(0));
    harness.orchestrator.identity_share_issued(identity_share());

    let outcome = harness
        .orchestrator
        .handle_phone_share_issued(trigger(FlowKind::Restore))
        .await
        .expect("restore should terminate cleanly");

    assert_eq!(outcome, Some(RecoveryOutcome::NotFound));
    assert_eq!(harness.orchestrator.state(), RecoveryState::NotFound);
    assert_eq!(harness.codec.decrypt_calls(), 0);
    assert_eq!(harness.wallet.activate_calls(), 0);
}

#[tokio::test]
async fn restore_with_funds_activates_without_confirmation() {
    let harness = Harness::new(MemoryWallet::new(), FixedBalanceChain::new(125));
    harness.seed_backup();
    harness.orchestrator.identity_share_issued(identity_share());

    let outcome = harness
        .orchestrator
        .handle_phone_share_issued(trigger(FlowKind::Restore))
        .await
        .expect("restore failed");

    let candidate = harness.wallet.address_from_mnemonic(MNEMONIC).unwrap();
    assert_eq!(outcome, Some(RecoveryOutcome::Completed));
    assert_eq!(harness.wallet.activate_calls(), 1);
    assert_eq!(harness.wallet.active_address(), Some(candidate.clone()));
    // Mnemonic and derived key are persisted under the candidate address.
    assert_eq!(
        harness.wallet.stored_mnemonic(&candidate).await.unwrap().as_deref(),
        Some(MNEMONIC)
    );
    assert!(harness.wallet.derived_key(&candidate).is_some());
}

#[tokio::test]
async fn restore_zero_balance_bail_skips_activation() {
    let harness = Harness::new(MemoryWallet::new(), FixedBalanceChain::new(0));
    harness.seed_backup();
    harness.orchestrator.identity_share_issued(identity_share());

    let attempt = {
        let orchestrator = Arc::clone(&harness.orchestrator);
        tokio::spawn(async move {
            orchestrator.handle_phone_share_issued(trigger(FlowKind::Restore)).await
        })
    };

    harness.wait_for_state(RecoveryState::AwaitingUserChoice).await;
    harness.orchestrator.bail();

    let outcome = attempt.await.unwrap().expect("restore should terminate cleanly");
    assert_eq!(outcome, Some(RecoveryOutcome::Bailed));
    assert_eq!(harness.orchestrator.state(), RecoveryState::Bailed);
    assert_eq!(harness.wallet.activate_calls(), 0);
}

#[tokio::test]
async fn restore_zero_balance_continue_activates() {
    let harness = Harness::new(MemoryWallet::new(), FixedBalanceChain::new(0));
    harness.seed_backup();
    harness.orchestrator.identity_share_issued(identity_share());

    let attempt = {
        let orchestrator = Arc::clone(&harness.orchestrator);
        tokio::spawn(async move {
            orchestrator.handle_phone_share_issued(trigger(FlowKind::Restore)).await
        })
    };

    harness.wait_for_state(RecoveryState::AwaitingUserChoice).await;
    harness.orchestrator.accept_zero_balance();

    let outcome = attempt.await.unwrap().expect("restore failed");
    assert_eq!(outcome, Some(RecoveryOutcome::Completed));
    assert_eq!(harness.wallet.activate_calls(), 1);
    assert_eq!(
        harness.wallet.active_address(),
        Some(harness.wallet.address_from_mnemonic(MNEMONIC).unwrap())
    );
}

#[tokio::test]
async fn restore_balance_rpc_failure_is_not_treated_as_zero() {
    let harness = Harness::new(MemoryWallet::new(), FixedBalanceChain::new(0));
    harness.seed_backup();
    harness.chain.fail_queries(true);
    harness.orchestrator.identity_share_issued(identity_share());

    let result = harness
        .orchestrator
        .handle_phone_share_issued(trigger(FlowKind::Restore))
        .await;

    assert!(matches!(result, Err(RecoveryError::BalanceCheckError(_))));
    assert_eq!(harness.orchestrator.state(), RecoveryState::Failed);
    assert_eq!(harness.wallet.activate_calls(), 0);
}

#[tokio::test]
async fn restore_tampered_blob_fails_decryption() {
    let harness = Harness::new(MemoryWallet::new(), FixedBalanceChain::new(0));
    let mut blob = harness
        .codec
        .encrypt(&identity_share(), &phone_share(), MNEMONIC)
        .unwrap();
    if let Some(last) = blob.last_mut() {
        *last ^= 0xFF;
    }
    harness.backups.insert_record(&harness.derived_address(), blob);
    harness.orchestrator.identity_share_issued(identity_share());

    let result = harness
        .orchestrator
        .handle_phone_share_issued(trigger(FlowKind::Restore))
        .await;

    assert!(matches!(result, Err(RecoveryError::DecryptionError(_))));
    assert_eq!(harness.wallet.activate_calls(), 0);
}

#[tokio::test]
async fn missing_identity_share_times_out() {
    let harness = Harness::new(
        MemoryWallet::with_wallet(WALLET_ADDRESS, MNEMONIC),
        FixedBalanceChain::new(0),
    );
    // Identity share never arrives.

    let result = harness
        .orchestrator
        .handle_phone_share_issued(trigger(FlowKind::Setup))
        .await;

    assert!(matches!(result, Err(RecoveryError::KeyshareTimeout(_))));
    assert_eq!(harness.orchestrator.state(), RecoveryState::Failed);
    assert_eq!(harness.backups.put_calls(), 0);
}

#[tokio::test]
async fn duplicate_trigger_is_dropped_while_in_flight() {
    let harness = Harness::new(
        MemoryWallet::with_wallet(WALLET_ADDRESS, MNEMONIC),
        FixedBalanceChain::new(0),
    );

    // First attempt blocks in the waiter until the identity share lands.
    let first = {
        let orchestrator = Arc::clone(&harness.orchestrator);
        tokio::spawn(async move {
            orchestrator.handle_phone_share_issued(trigger(FlowKind::Setup)).await
        })
    };
    harness.wait_for_state(RecoveryState::AwaitingShares).await;

    let second = harness
        .orchestrator
        .handle_phone_share_issued(trigger(FlowKind::Setup))
        .await
        .expect("dropped trigger is not an error");
    assert_eq!(second, None);

    harness.orchestrator.identity_share_issued(identity_share());
    let first = first.await.unwrap().expect("first attempt failed");
    assert_eq!(first, Some(RecoveryOutcome::Completed));

    // Only the first attempt ever reached the collaborators.
    assert_eq!(harness.backups.put_calls(), 1);
    assert_eq!(harness.codec.encrypt_calls(), 1);
}

#[tokio::test]
async fn balance_gate_reports_funds_and_propagates_failures() {
    let chain = Arc::new(FixedBalanceChain::new(42));
    let gate = BalanceGate::new(Arc::clone(&chain) as _);

    assert!(gate.check("0xabc").await.unwrap());

    chain.fail_queries(true);
    assert!(matches!(
        gate.check("0xabc").await,
        Err(RecoveryError::BalanceCheckError(_))
    ));
}

#[tokio::test]
async fn delete_backup_makes_restore_not_found() {
    let harness = Harness::new(
        MemoryWallet::with_wallet(WALLET_ADDRESS, MNEMONIC),
        FixedBalanceChain::new(0),
    );
    harness.orchestrator.identity_share_issued(identity_share());
    harness
        .orchestrator
        .handle_phone_share_issued(trigger(FlowKind::Setup))
        .await
        .expect("setup failed");

    harness.orchestrator.delete_backup().await.expect("delete failed");
    assert_eq!(harness.backups.delete_calls(), 1);
    assert!(harness.backups.record(&harness.derived_address()).is_none());

    harness.orchestrator.identity_share_issued(identity_share());
    let outcome = harness
        .orchestrator
        .handle_phone_share_issued(trigger(FlowKind::Restore))
        .await
        .expect("restore should terminate cleanly");
    assert_eq!(outcome, Some(RecoveryOutcome::NotFound));
}
