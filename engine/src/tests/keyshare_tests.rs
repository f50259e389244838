use std::sync::Arc;
use std::time::Duration;

use crate::error::RecoveryError;
use crate::keyshare::{KeyshareStore, wait_for_share};
use crate::types::{Keyshare, ShareKind};

#[test]
fn second_write_overwrites() {
    let store = KeyshareStore::new();
    store.set_identity_share(Keyshare::new(vec![1]));
    store.set_identity_share(Keyshare::new(vec![2]));

    assert_eq!(store.identity_share(), Some(Keyshare::new(vec![2])));
    assert_eq!(store.phone_share(), None);
}

#[test]
fn clear_drops_both_shares() {
    let store = KeyshareStore::new();
    store.set_identity_share(Keyshare::new(vec![1]));
    store.set_phone_share(Keyshare::new(vec![2]));
    store.clear();

    assert_eq!(store.identity_share(), None);
    assert_eq!(store.phone_share(), None);
}

#[tokio::test]
async fn waiter_returns_share_already_present() {
    let store = KeyshareStore::new();
    store.set_phone_share(Keyshare::new(vec![7]));

    let share = wait_for_share(
        &store,
        ShareKind::Phone,
        Duration::from_millis(100),
        Duration::from_millis(10),
    )
    .await
    .expect("share was present");

    assert_eq!(share, Keyshare::new(vec![7]));
}

#[tokio::test]
async fn waiter_picks_up_late_share() {
    let store = Arc::new(KeyshareStore::new());

    let writer = {
        let store = Arc::clone(&store);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            store.set_identity_share(Keyshare::new(vec![9]));
        })
    };

    let share = wait_for_share(
        &store,
        ShareKind::Identity,
        Duration::from_secs(1),
        Duration::from_millis(10),
    )
    .await
    .expect("share arrived before timeout");

    assert_eq!(share, Keyshare::new(vec![9]));
    writer.await.unwrap();
}

#[tokio::test]
async fn waiter_times_out_when_share_never_arrives() {
    let store = KeyshareStore::new();

    let result = wait_for_share(
        &store,
        ShareKind::Identity,
        Duration::from_millis(50),
        Duration::from_millis(10),
    )
    .await;

    assert!(matches!(
        result,
        Err(RecoveryError::KeyshareTimeout(ShareKind::Identity))
    ));
}
