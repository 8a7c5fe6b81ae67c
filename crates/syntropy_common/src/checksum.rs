//! Config checksums.
//!
//! The canonical form of a [`SetupConfig`] is its YAML serialization with
//! `metadata.checksum` blank. The checksum is the lowercase SHA-256 hex of
//! those bytes.

use crate::error::ChecksumError;
use crate::setup_config::SetupConfig;
use sha2::{Digest, Sha256};

/// SHA-256 hex of arbitrary bytes
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// YAML serialization used on disk
pub fn to_yaml(config: &SetupConfig) -> Result<String, ChecksumError> {
    Ok(serde_yaml::to_string(config)?)
}

/// Canonical bytes the checksum is computed over
pub fn canonical_bytes(config: &SetupConfig) -> Result<Vec<u8>, ChecksumError> {
    let mut unsealed = config.clone();
    unsealed.metadata.checksum.clear();
    Ok(to_yaml(&unsealed)?.into_bytes())
}

pub fn compute(config: &SetupConfig) -> Result<String, ChecksumError> {
    Ok(sha256_hex(&canonical_bytes(config)?))
}

/// Compute the checksum and store it in `metadata.checksum`
pub fn seal(config: &mut SetupConfig) -> Result<(), ChecksumError> {
    config.metadata.checksum = compute(config)?;
    Ok(())
}

/// Whether the stored checksum matches the content
pub fn is_sealed(config: &SetupConfig) -> bool {
    !config.metadata.checksum.is_empty()
        && compute(config).is_ok_and(|sum| sum == config.metadata.checksum)
}

/// Verify a serialized config against an expected checksum.
///
/// The text must be exactly the canonical serialization of the config it
/// parses to, so any byte change (including whitespace) fails.
pub fn verify(serialized: &str, expected: &str) -> bool {
    let Ok(config) = serde_yaml::from_str::<SetupConfig>(serialized) else {
        return false;
    };
    match to_yaml(&config) {
        Ok(reserialized) if reserialized == serialized => {}
        _ => return false,
    }
    config.metadata.checksum == expected && is_sealed(&config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::setup_config::{ManagerConfig, OwnerKey};

    fn sample() -> SetupConfig {
        let mut config = SetupConfig {
            manager: ManagerConfig {
                home_dir: "/home/t/.syntropy".to_string(),
                log_level: "info".to_string(),
                ..Default::default()
            },
            owner_key: OwnerKey {
                algorithm: "RSA".to_string(),
                public_key_pem: "-----BEGIN PUBLIC KEY-----\nAAAA\n-----END PUBLIC KEY-----\n"
                    .to_string(),
                size_bits: 2048,
                ..Default::default()
            },
            ..Default::default()
        };
        seal(&mut config).unwrap();
        config
    }

    #[test]
    fn test_checksum_is_hex_sha256() {
        let config = sample();
        assert_eq!(config.metadata.checksum.len(), 64);
        assert!(config.metadata.checksum.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_checksum_excludes_itself() {
        let config = sample();
        let mut other = config.clone();
        other.metadata.checksum = "garbage".to_string();
        assert_eq!(compute(&config).unwrap(), compute(&other).unwrap());
    }

    #[test]
    fn test_verify_round_trip() {
        let config = sample();
        let yaml = to_yaml(&config).unwrap();
        assert!(verify(&yaml, &config.metadata.checksum));
    }

    #[test]
    fn test_any_byte_mutation_fails_verification() {
        let config = sample();
        let yaml = to_yaml(&config).unwrap();
        let bytes = yaml.as_bytes();

        for i in 0..bytes.len() {
            let mut mutated = bytes.to_vec();
            mutated[i] = if mutated[i] == b'x' { b'y' } else { b'x' };
            let text = String::from_utf8_lossy(&mutated);
            assert!(
                !verify(&text, &config.metadata.checksum),
                "mutation at byte {} went undetected",
                i
            );
        }
    }

    #[test]
    fn test_content_change_breaks_seal() {
        let mut config = sample();
        assert!(is_sealed(&config));
        config.manager.log_level = "debug".to_string();
        assert!(!is_sealed(&config));
    }
}
