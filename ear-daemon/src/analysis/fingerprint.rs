//! Short, non-reversible audio hash used to tag feedback entries

use sha2::{Digest, Sha256};

/// Bytes of the little-endian f32 block that feed the hash
pub const FINGERPRINT_BYTES: usize = 10_000;

/// Hex characters kept from the digest
const FINGERPRINT_LEN: usize = 16;

/// First 16 hex chars of SHA-256 over the block's leading 10 000 bytes
pub fn audio_fingerprint(samples: &[f32]) -> String {
    let mut hasher = Sha256::new();
    let mut remaining = FINGERPRINT_BYTES;

    for sample in samples {
        if remaining == 0 {
            break;
        }
        let bytes = sample.to_le_bytes();
        let take = remaining.min(bytes.len());
        hasher.update(&bytes[..take]);
        remaining -= take;
    }

    let digest = hasher.finalize();
    digest[..FINGERPRINT_LEN / 2]
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}
