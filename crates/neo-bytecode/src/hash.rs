//! Content addressing and checksums

use std::fmt;

use ripemd::Ripemd160;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// SHA-256 digest
pub fn sha256(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}

/// Double SHA-256 digest
pub fn hash256(data: &[u8]) -> [u8; 32] {
    sha256(&sha256(data))
}

/// RIPEMD-160 of SHA-256, the runtime's 20-byte content address
pub fn hash160(data: &[u8]) -> [u8; 20] {
    Ripemd160::digest(sha256(data)).into()
}

/// First four bytes of the double SHA-256, read as little-endian
pub fn checksum(data: &[u8]) -> u32 {
    let digest = hash256(data);
    u32::from_le_bytes([digest[0], digest[1], digest[2], digest[3]])
}

/// Operand of a `SYSCALL`: first four bytes of SHA-256 of the service name
pub fn interop_hash(name: &str) -> [u8; 4] {
    let digest = sha256(name.as_bytes());
    [digest[0], digest[1], digest[2], digest[3]]
}

/// Script hash: the content address under which a contract is deployed
///
/// Stored little-endian, the way it appears in the container. `Display`
/// follows the runtime's convention of big-endian hex with a `0x` prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ScriptHash(pub [u8; 20]);

impl ScriptHash {
    /// Hash a script
    pub fn of(script: &[u8]) -> Self {
        Self(hash160(script))
    }

    /// Get the little-endian bytes
    #[inline]
    pub const fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }
}

impl fmt::Display for ScriptHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut be = self.0;
        be.reverse();
        write!(f, "0x{}", hex::encode(be))
    }
}
