//! Small helpers shared across modules.

use std::time::{SystemTime, UNIX_EPOCH};

use sha2::{Digest, Sha256};

/// Short, non-reversible tag for a bearer token, safe to put in logs.
///
/// First 8 hex chars of the token's SHA-256.
pub fn token_fingerprint(token: &str) -> String {
    let digest = Sha256::digest(token.as_bytes());
    hex::encode(&digest[..4])
}

/// Seconds since the Unix epoch (0 if the clock is before it).
pub fn epoch_secs(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH).unwrap_or_default().as_secs()
}

/// Milliseconds since the Unix epoch.
#[allow(clippy::cast_possible_truncation)]
pub fn epoch_millis(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_token_fingerprint_is_short_and_stable() {
        let a = token_fingerprint("0123456789ABCDEF");
        assert_eq!(a.len(), 8);
        assert_eq!(a, token_fingerprint("0123456789ABCDEF"));
        assert_ne!(a, token_fingerprint("0123456789ABCDEE"));
    }

    #[test]
    fn test_epoch_conversions() {
        let t = UNIX_EPOCH + Duration::from_millis(1_700_000_000_123);
        assert_eq!(epoch_secs(t), 1_700_000_000);
        assert_eq!(epoch_millis(t), 1_700_000_000_123);
        assert_eq!(epoch_secs(UNIX_EPOCH - Duration::from_secs(5)), 0);
    }
}
