//! Transient keyshare storage and the polling waiter that joins the two
//! independently triggered share-producing events.

use std::sync::Mutex;
use std::time::Duration;

use crate::error::RecoveryError;
use crate::types::{Keyshare, ShareKind};

/// How long to wait between checks for the missing keyshare.
pub const KEYSHARE_POLL_INTERVAL: Duration = Duration::from_millis(500);
/// How long to wait for the missing keyshare before failing the attempt.
pub const KEYSHARE_WAIT_TIMEOUT: Duration = Duration::from_secs(25);

#[derive(Default)]
struct Slots {
    identity: Option<Keyshare>,
    phone: Option<Keyshare>,
}

/// Single-slot holder per share kind, the only process-wide state in this
/// subsystem. Each slot is written by exactly one external event handler; a
/// retried login overwrites its slot, it does not append.
#[derive(Default)]
pub struct KeyshareStore {
    slots: Mutex<Slots>,
}

impl KeyshareStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, kind: ShareKind, share: Keyshare) {
        let mut slots = self.lock();
        match kind {
            ShareKind::Identity => slots.identity = Some(share),
            ShareKind::Phone => slots.phone = Some(share),
        }
    }

    pub fn get(&self, kind: ShareKind) -> Option<Keyshare> {
        let slots = self.lock();
        match kind {
            ShareKind::Identity => slots.identity.clone(),
            ShareKind::Phone => slots.phone.clone(),
        }
    }

    pub fn set_identity_share(&self, share: Keyshare) {
        self.set(ShareKind::Identity, share);
    }

    pub fn set_phone_share(&self, share: Keyshare) {
        self.set(ShareKind::Phone, share);
    }

    pub fn identity_share(&self) -> Option<Keyshare> {
        self.get(ShareKind::Identity)
    }

    pub fn phone_share(&self) -> Option<Keyshare> {
        self.get(ShareKind::Phone)
    }

    /// Drop both shares. Called when an attempt reaches a terminal state;
    /// shares never outlive the attempt that produced them.
    pub fn clear(&self) {
        let mut slots = self.lock();
        slots.identity = None;
        slots.phone = None;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Slots> {
        self.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Poll the store until the requested share arrives or `timeout` elapses.
///
/// The two share-producing events are user-driven and may complete in either
/// order; the producer of the missing share has no reference back to any
/// waiter, so polling is the simplest correct join. Returns within one
/// `poll_interval` of the share landing.
pub async fn wait_for_share(
    store: &KeyshareStore,
    kind: ShareKind,
    timeout: Duration,
    poll_interval: Duration,
) -> Result<Keyshare, RecoveryError> {
    let start = tokio::time::Instant::now();
    loop {
        if let Some(share) = store.get(kind) {
            return Ok(share);
        }
        if start.elapsed() >= timeout {
            tracing::warn!(kind = %kind, "keyshare wait timed out");
            return Err(RecoveryError::KeyshareTimeout(kind));
        }
        tokio::time::sleep(poll_interval).await;
    }
}
