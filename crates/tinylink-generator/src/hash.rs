use crate::Generator;
use sha2::{Digest, Sha256};
use typed_builder::TypedBuilder;

/// Upper bound on code length; a base58-encoded SHA-256 digest is never shorter.
pub const MAX_CODE_LENGTH: usize = 32;

#[derive(Debug, Clone, TypedBuilder)]
pub struct HashGeneratorSettings {
    /// Number of base58 characters per code. Clamped to [`MAX_CODE_LENGTH`].
    #[builder(default = 8)]
    length: usize,
}

/// Hash-based generator: SHA-256 of the (salted) URL, base58 encoded.
///
/// Base58 keeps codes alphanumeric and drops the look-alike `0`, `O`, `I`
/// and `l`. The trailing characters of the encoding are kept since they
/// are the low-order digits of the digest.
#[derive(Debug, Clone)]
pub struct HashGenerator {
    length: usize,
}

impl HashGenerator {
    pub fn new(settings: HashGeneratorSettings) -> Self {
        Self {
            length: settings.length.clamp(1, MAX_CODE_LENGTH),
        }
    }

    pub fn length(&self) -> usize {
        self.length
    }

    fn salted(original_url: &str, attempt: u32) -> String {
        if attempt == 0 {
            original_url.to_string()
        } else {
            format!("{original_url}#{attempt}")
        }
    }
}

impl Default for HashGenerator {
    fn default() -> Self {
        Self::new(HashGeneratorSettings::builder().build())
    }
}

impl Generator for HashGenerator {
    fn generate(&self, original_url: &str, attempt: u32) -> String {
        let digest = Sha256::digest(Self::salted(original_url, attempt).as_bytes());
        let encoded = bs58::encode(digest).into_string();
        let start = encoded.len().saturating_sub(self.length);
        encoded[start..].to_string()
    }
}
