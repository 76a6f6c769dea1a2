use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use blake2::{digest::consts::U32, Blake2b, Digest as _};
use ed25519_dalek::{Signer, SigningKey, SECRET_KEY_LENGTH};
use std::path::Path;
use thiserror::Error;
use zeroize::Zeroizing;

use super::{ObjectId, SuiAddress};

type Blake2b256 = Blake2b<U32>;

// Scheme flag prepended to public keys and serialized signatures
pub const ED25519_SCHEME_FLAG: u8 = 0x00;

pub const ED25519_PUBLIC_KEY_SIZE: usize = 32;
pub const ED25519_SIGNATURE_SIZE: usize = 64;

// Signing intent prefix (scope, version, app) for user transaction data
const TRANSACTION_INTENT: [u8; 3] = [0, 0, 0];

#[derive(Error, Debug)]
pub enum KeyError {
    #[error(
        "Invalid secret key length: expected {} bytes, got {}",
        SECRET_KEY_LENGTH,
        _0
    )]
    InvalidSecretKeyLength(usize),

    #[error("Invalid base64 key material")]
    InvalidBase64,

    #[error("Unsupported key scheme flag {0:#04x}")]
    UnsupportedScheme(u8),

    #[error("Cannot read key file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid base64 transaction bytes")]
    InvalidTransactionBytes,
}

// Process keypair used to sign every submitted transaction.
// Key material is wiped from intermediate buffers on drop.
pub struct KeyPair {
    signing_key: SigningKey,
}

impl KeyPair {
    pub fn new(signing_key: SigningKey) -> Self {
        Self { signing_key }
    }

    pub fn generate() -> Self {
        Self::new(SigningKey::generate(&mut rand::rngs::OsRng))
    }

    // Decode from base64. Accepts the raw 32-byte secret as well as the
    // 33-byte flag-prefixed export format.
    pub fn from_base64(encoded: &str) -> Result<Self, KeyError> {
        let decoded = Zeroizing::new(
            BASE64
                .decode(encoded.trim())
                .map_err(|_| KeyError::InvalidBase64)?,
        );
        let bytes: &[u8] = match decoded.len() {
            SECRET_KEY_LENGTH => &decoded,
            len if len == SECRET_KEY_LENGTH + 1 => {
                if decoded[0] != ED25519_SCHEME_FLAG {
                    return Err(KeyError::UnsupportedScheme(decoded[0]));
                }
                &decoded[1..]
            }
            len => return Err(KeyError::InvalidSecretKeyLength(len)),
        };
        let secret: [u8; SECRET_KEY_LENGTH] = bytes
            .try_into()
            .map_err(|_| KeyError::InvalidSecretKeyLength(bytes.len()))?;
        Ok(Self::new(SigningKey::from_bytes(&secret)))
    }

    // Read the key once from the configured path
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, KeyError> {
        let content = Zeroizing::new(std::fs::read_to_string(path)?);
        Self::from_base64(&content)
    }

    pub fn public_key_bytes(&self) -> [u8; ED25519_PUBLIC_KEY_SIZE] {
        self.signing_key.verifying_key().to_bytes()
    }

    // Account address: Blake2b-256 over flag || public key
    pub fn address(&self) -> SuiAddress {
        let mut hasher = Blake2b256::new();
        hasher.update([ED25519_SCHEME_FLAG]);
        hasher.update(self.public_key_bytes());
        let digest: [u8; 32] = hasher.finalize().into();
        ObjectId::new(digest)
    }

    // Produce the serialized signature (flag || signature || public key, base64)
    // over the intent-prefixed Blake2b-256 digest of the transaction bytes
    pub fn sign_transaction(&self, tx_bytes_b64: &str) -> Result<String, KeyError> {
        let tx_bytes = BASE64
            .decode(tx_bytes_b64)
            .map_err(|_| KeyError::InvalidTransactionBytes)?;

        let mut hasher = Blake2b256::new();
        hasher.update(TRANSACTION_INTENT);
        hasher.update(&tx_bytes);
        let digest: [u8; 32] = hasher.finalize().into();

        let signature = self.signing_key.sign(&digest);

        let mut serialized =
            Vec::with_capacity(1 + ED25519_SIGNATURE_SIZE + ED25519_PUBLIC_KEY_SIZE);
        serialized.push(ED25519_SCHEME_FLAG);
        serialized.extend_from_slice(&signature.to_bytes());
        serialized.extend_from_slice(&self.public_key_bytes());
        Ok(BASE64.encode(serialized))
    }
}
