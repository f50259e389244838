//! One-way keyshare fingerprints for support diagnostics.

use sha2::{Digest, Sha256};

use crate::types::{Keyshare, ShareKind};

const PHONE_PREFIX: &[u8] = b"CAB_PHONE_KEYSHARE_HASH_";
const IDENTITY_PREFIX: &[u8] = b"CAB_EMAIL_KEYSHARE_HASH_";

/// Hash a keyshare for log output. One-way and domain-separated per share
/// kind; the raw share never appears in diagnostics.
pub fn share_fingerprint(kind: ShareKind, share: &Keyshare) -> String {
    let prefix = match kind {
        ShareKind::Phone => PHONE_PREFIX,
        ShareKind::Identity => IDENTITY_PREFIX,
    };
    let mut hasher = Sha256::new();
    hasher.update(prefix);
    hasher.update(share.as_bytes());
    hex::encode(hasher.finalize())
}
