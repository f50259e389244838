//! Shared data types for the recovery engine: keyshares, flow kinds, and
//! terminal outcomes.

use std::fmt;

use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

/// Which half of the two-factor secret a byte string is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ShareKind {
    /// Proved by an identity-provider login.
    Identity,
    /// Proved by possession of a phone number.
    Phone,
}

impl fmt::Display for ShareKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShareKind::Identity => write!(f, "identity"),
            ShareKind::Phone => write!(f, "phone"),
        }
    }
}

/// An opaque keyshare. One half of the two-factor secret; alone it
/// authorizes nothing. Contents are zeroized on drop and never printed.
#[derive(Clone)]
pub struct Keyshare(Zeroizing<Vec<u8>>);

impl Keyshare {
    pub fn new(bytes: Vec<u8>) -> Self {
        Keyshare(Zeroizing::new(bytes))
    }

    pub fn from_hex(encoded: &str) -> Result<Self, hex::FromHexError> {
        Ok(Keyshare::new(hex::decode(encoded)?))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for Keyshare {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Never reveal share bytes, even in debug output.
        write!(f, "Keyshare({} bytes)", self.0.len())
    }
}

impl PartialEq for Keyshare {
    fn eq(&self, other: &Self) -> bool {
        self.0.as_slice() == other.0.as_slice()
    }
}

impl Eq for Keyshare {}

/// The encryption keypair deterministically derived from both keyshares.
/// Its address is the lookup key for the stored backup record.
#[derive(Clone)]
pub struct CombinedKeypair {
    pub private_key: Zeroizing<Vec<u8>>,
    pub address: String,
}

impl fmt::Debug for CombinedKeypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CombinedKeypair(address: {})", self.address)
    }
}

/// Whether an attempt backs up the current wallet or restores a previous one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlowKind {
    Setup,
    Restore,
}

/// Where the user started the flow from. Carried for diagnostics only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Origin {
    Onboarding,
    Settings,
}

/// Entry-event payload delivered when phone verification completes.
#[derive(Debug, Clone)]
pub struct RecoveryTrigger {
    pub flow: FlowKind,
    pub origin: Origin,
    /// Share issued by the completed SMS challenge.
    pub phone_share: Keyshare,
    /// Identity proof token gating access to the remote backup store.
    pub auth_token: String,
}

/// Terminal outcome of a recovery attempt. `NotFound` and `Bailed` are valid
/// results, not failures; the caller routes the user differently for each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecoveryOutcome {
    Completed,
    /// Restore only: no backup record exists for the derived address.
    NotFound,
    /// Restore only: the user declined a zero-balance recovered account.
    Bailed,
}

/// Signal accepted while an attempt sits at the zero-balance checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserChoice {
    Continue,
    Bail,
}
