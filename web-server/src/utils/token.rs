// web-server/src/utils/token.rs
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// Compare a presented secret with the expected one in constant time over
/// their digests. An empty expected secret never matches.
pub fn secrets_match(presented: &str, expected: &str) -> bool {
    if expected.is_empty() {
        return false;
    }
    let presented = Sha256::digest(presented.as_bytes());
    let expected = Sha256::digest(expected.as_bytes());
    presented.as_slice().ct_eq(expected.as_slice()).into()
}
