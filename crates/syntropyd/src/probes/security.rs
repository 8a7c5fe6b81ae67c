//! Security probe: crypto round-trips, RNG sanity and file modes.

use super::{Probe, ProbeContext, ProbeKind, ValidationFragment};
use pkcs8::{DecodePrivateKey, EncodePrivateKey, LineEnding, ObjectIdentifier, PrivateKeyInfo, SecretDocument};
use rand::rngs::OsRng;
use rand::RngCore;
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use syntropy_common::validation::SecuritySection;
use syntropy_common::{
    AutoFix, Category, ProbeError, Risk, Severity, ValidationItem, ValidationRequest,
};
use tracing::{debug, warn};

/// rsaEncryption
pub const RSA_OID: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.1");

pub const DEFAULT_KEY_BITS: usize = 2048;
const RANDOM_SAMPLE_LEN: usize = 32;
/// More zero bytes than this fraction of the sample means a broken RNG
const MAX_ZERO_FRACTION: f64 = 0.25;
const PLAINTEXT: &[u8] = b"syntropy security probe";

/// True when `sample` has no more than a quarter zero bytes
pub fn entropy_looks_sane(sample: &[u8]) -> bool {
    if sample.is_empty() {
        return false;
    }
    let zeros = sample.iter().filter(|b| **b == 0).count();
    (zeros as f64 / sample.len() as f64) <= MAX_ZERO_FRACTION
}

pub struct SecurityProbe {
    key_bits: usize,
    scratch_dir: PathBuf,
}

impl Default for SecurityProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl SecurityProbe {
    pub fn new() -> Self {
        Self {
            key_bits: DEFAULT_KEY_BITS,
            scratch_dir: std::env::temp_dir(),
        }
    }

    pub fn with_key_bits(mut self, bits: usize) -> Self {
        self.key_bits = bits;
        self
    }

    /// Directory used for the permission check file
    pub fn with_scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = dir.into();
        self
    }

    fn fail(fragment: &mut ValidationFragment, code: &str, message: String) {
        warn!("Security check {} failed: {}", code, message);
        fragment.push(ValidationItem::error(code, message, Category::Security));
    }

    /// OAEP encrypt then decrypt a fixed plaintext
    fn check_encryption(&self, key: &RsaPrivateKey, fragment: &mut ValidationFragment) -> bool {
        let public = RsaPublicKey::from(key);
        let ciphertext = match public.encrypt(&mut OsRng, Oaep::new::<Sha256>(), PLAINTEXT) {
            Ok(c) => c,
            Err(e) => {
                Self::fail(fragment, "ENCRYPTION_TEST_FAILED", format!("OAEP encryption failed: {}", e));
                return false;
            }
        };
        let plaintext = match key.decrypt(Oaep::new::<Sha256>(), &ciphertext) {
            Ok(p) => p,
            Err(e) => {
                Self::fail(fragment, "DECRYPTION_TEST_FAILED", format!("OAEP decryption failed: {}", e));
                return false;
            }
        };
        if plaintext != PLAINTEXT {
            fragment.push(ValidationItem::new(
                "ENCRYPTION_INTEGRITY_FAILED",
                "Decrypted data does not match the original plaintext",
                Severity::Critical,
                Category::Security,
            ));
            return false;
        }
        true
    }

    /// PKCS#8 DER, PEM and back, asserting the algorithm is RSA
    fn check_serialization(&self, key: &RsaPrivateKey, fragment: &mut ValidationFragment) -> bool {
        let der = match key.to_pkcs8_der() {
            Ok(d) => d,
            Err(e) => {
                Self::fail(fragment, "KEY_SERIALIZATION_FAILED", format!("PKCS#8 encoding failed: {}", e));
                return false;
            }
        };
        let pem = match der.to_pem("PRIVATE KEY", LineEnding::LF) {
            Ok(p) => p,
            Err(e) => {
                Self::fail(fragment, "PEM_ENCODING_FAILED", format!("PEM encoding failed: {}", e));
                return false;
            }
        };
        let decoded = match SecretDocument::from_pem(&pem) {
            Ok((_, doc)) => doc,
            Err(e) => {
                Self::fail(fragment, "PEM_DECODING_FAILED", format!("PEM decoding failed: {}", e));
                return false;
            }
        };
        let info = match PrivateKeyInfo::try_from(decoded.as_bytes()) {
            Ok(i) => i,
            Err(e) => {
                Self::fail(fragment, "KEY_PARSING_FAILED", format!("PKCS#8 parsing failed: {}", e));
                return false;
            }
        };
        if info.algorithm.oid != RSA_OID {
            Self::fail(
                fragment,
                "INVALID_KEY_TYPE",
                format!("Decoded key has algorithm {}, expected RSA", info.algorithm.oid),
            );
            return false;
        }
        if let Err(e) = RsaPrivateKey::from_pkcs8_der(decoded.as_bytes()) {
            Self::fail(fragment, "KEY_PARSING_FAILED", format!("RSA key parsing failed: {}", e));
            return false;
        }
        true
    }

    fn check_random(&self, fragment: &mut ValidationFragment) -> bool {
        let mut sample = [0u8; RANDOM_SAMPLE_LEN];
        if let Err(e) = OsRng.try_fill_bytes(&mut sample) {
            Self::fail(fragment, "SECURE_RANDOM_FAILED", format!("OS random source failed: {}", e));
            return false;
        }
        if !entropy_looks_sane(&sample) {
            fragment.push(
                ValidationItem::warning(
                    "POOR_ENTROPY",
                    "The OS random source returned suspiciously many zero bytes",
                    Category::Security,
                )
                .with_fix(AutoFix::manual(
                    "Check that the kernel entropy source is available (e.g. /dev/urandom)",
                    Risk::Low,
                )),
            );
            return false;
        }
        true
    }

    fn check_file_permissions(&self, fragment: &mut ValidationFragment) -> bool {
        let path = self
            .scratch_dir
            .join(format!(".syntropy-perm-{}", uuid::Uuid::new_v4()));
        let _cleanup = RemoveOnDrop(&path);

        match write_owner_only(&path) {
            Ok(true) => true,
            Ok(false) => {
                fragment.push(
                    ValidationItem::warning(
                        "INSECURE_FILE_PERMISSIONS",
                        "Files created owner-only are readable by group or others",
                        Category::Security,
                    )
                    .with_fix(
                        AutoFix::command("chmod 600 ~/.syntropy/keys/owner.key", Risk::Low)
                            .with_manual("Check the filesystem mount options and umask"),
                    ),
                );
                false
            }
            Err(e) => {
                fragment.push(ValidationItem::warning(
                    "FILE_PERMISSION_TEST_FAILED",
                    format!("Could not create a test file in {}: {}", self.scratch_dir.display(), e),
                    Category::Security,
                ));
                false
            }
        }
    }
}

struct RemoveOnDrop<'a>(&'a Path);

impl Drop for RemoveOnDrop<'_> {
    fn drop(&mut self) {
        let _ = fs::remove_file(self.0);
    }
}

/// Create `path` with mode 0600, write to it and report whether the
/// group/other bits are clear
fn write_owner_only(path: &Path) -> std::io::Result<bool> {
    let mut options = fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(path)?;
    file.write_all(PLAINTEXT)?;
    file.sync_all()?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = fs::metadata(path)?.permissions().mode();
        Ok(mode & 0o077 == 0)
    }
    #[cfg(not(unix))]
    {
        Ok(true)
    }
}

impl Probe for SecurityProbe {
    fn kind(&self) -> ProbeKind {
        ProbeKind::Security
    }

    fn run(&self, _req: &ValidationRequest, ctx: &ProbeContext) -> Result<ValidationFragment, ProbeError> {
        let mut fragment = ValidationFragment::new(ProbeKind::Security);
        let mut section = SecuritySection::default();

        match RsaPrivateKey::new(&mut OsRng, self.key_bits) {
            Ok(key) => {
                debug!("Generated {}-bit RSA test key", self.key_bits);
                section.encryption_available = self.check_encryption(&key, &mut fragment);
                section.key_generation = self.check_serialization(&key, &mut fragment);
            }
            Err(e) => {
                Self::fail(
                    &mut fragment,
                    "KEY_GENERATION_FAILED",
                    format!("RSA {} key generation failed: {}", self.key_bits, e),
                );
                Self::fail(
                    &mut fragment,
                    "ENCRYPTION_FAILED",
                    "Encryption cannot be tested without a key".to_string(),
                );
            }
        }

        if ctx.is_cancelled() {
            fragment.interrupted = true;
            fragment.security = Some(section);
            return Ok(fragment);
        }

        section.secure_random = self.check_random(&mut fragment);
        section.file_permissions = self.check_file_permissions(&mut fragment);

        fragment.security = Some(section);
        Ok(fragment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use syntropy_common::InterfaceType;

    #[test]
    fn test_entropy_threshold() {
        assert!(entropy_looks_sane(&[1u8; 32]));
        let mut sample = [7u8; 32];
        sample[..8].fill(0);
        assert!(entropy_looks_sane(&sample));
        sample[8] = 0;
        assert!(!entropy_looks_sane(&sample));
        assert!(!entropy_looks_sane(&[]));
    }

    #[test]
    fn test_probe_on_healthy_host() {
        let dir = tempfile::tempdir().unwrap();
        let probe = SecurityProbe::new().with_scratch_dir(dir.path());
        let fragment = probe
            .run(&ValidationRequest::new(InterfaceType::Cli), &ProbeContext::new(Duration::from_secs(60)))
            .unwrap();

        let section = fragment.security.unwrap();
        assert!(section.key_generation);
        assert!(section.encryption_available);
        assert!(section.secure_random);
        assert!(section.file_permissions);
        assert!(fragment.items.is_empty(), "{:?}", fragment.items);

        // scratch file is always cleaned up
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_tiny_key_fails_generation() {
        let dir = tempfile::tempdir().unwrap();
        let probe = SecurityProbe::new().with_key_bits(8).with_scratch_dir(dir.path());
        let fragment = probe
            .run(&ValidationRequest::new(InterfaceType::Cli), &ProbeContext::new(Duration::from_secs(60)))
            .unwrap();
        assert!(fragment.has_code("KEY_GENERATION_FAILED"));
        let section = fragment.security.unwrap();
        assert!(!section.key_generation);
        assert!(!section.encryption_available);
    }

    #[test]
    fn test_missing_scratch_dir_is_reported() {
        let probe = SecurityProbe::new()
            .with_key_bits(1024)
            .with_scratch_dir("/definitely/not/here/syntropy-scratch");
        let fragment = probe
            .run(&ValidationRequest::new(InterfaceType::Cli), &ProbeContext::new(Duration::from_secs(60)))
            .unwrap();
        assert!(fragment.has_code("FILE_PERMISSION_TEST_FAILED"));
        assert!(!fragment.security.unwrap().file_permissions);
    }
}
