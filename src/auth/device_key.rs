//! Dispenser device key generation and verification
//!
//! Each dispenser unit authenticates its status reports with a device key
//! issued at registration. Only the SHA-256 hash is stored; the clear key
//! is shown exactly once in the registration response.

use rand::Rng;

/// Device key prefix for identification
const DEVICE_KEY_PREFIX: &str = "mfd_";

/// Result of device key generation
#[derive(Debug, Clone)]
pub struct GeneratedDeviceKey {
    /// The full device key (only shown once!)
    pub key: String,
    /// Prefix for display, e.g. "mfd_ab12cd34..."
    pub prefix: String,
    /// Hashed key (for storage)
    pub key_hash: String,
}

/// Generate a new device key for a dispenser
pub fn generate_device_key() -> GeneratedDeviceKey {
    let mut rng = rand::thread_rng();

    let random_bytes: [u8; 32] = rng.gen();
    let key_suffix = hex::encode(random_bytes);

    let full_key = format!("{}{}", DEVICE_KEY_PREFIX, key_suffix);
    let key_hash = hash_device_key(&full_key);

    GeneratedDeviceKey {
        prefix: format!("{}{}...", DEVICE_KEY_PREFIX, &key_suffix[..8]),
        key_hash,
        key: full_key,
    }
}

/// Hash a device key for storage
pub fn hash_device_key(key: &str) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Verify a device key against a stored hash
pub fn verify_device_key(key: &str, stored_hash: &str) -> bool {
    hash_device_key(key) == stored_hash
}

/// Check if a string looks like a device key
pub fn is_device_key_format(s: &str) -> bool {
    s.starts_with(DEVICE_KEY_PREFIX) && s.len() > DEVICE_KEY_PREFIX.len() + 32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_device_key() {
        let generated = generate_device_key();

        assert!(generated.key.starts_with(DEVICE_KEY_PREFIX));
        assert!(is_device_key_format(&generated.key));
        assert!(verify_device_key(&generated.key, &generated.key_hash));
        assert!(!verify_device_key("mfd_wrong", &generated.key_hash));
    }

    #[test]
    fn test_keys_are_unique() {
        let a = generate_device_key();
        let b = generate_device_key();
        assert_ne!(a.key, b.key);
        assert_ne!(a.key_hash, b.key_hash);
    }
}
