//! Detached JSON Web Signatures over secp256k1 (`ES256K`).
//!
//! Used to sign HTTP request bodies and to check the signature a server
//! attaches to its responses. Tokens use the JWS compact serialization with
//! the payload segment left empty (`header..signature`), so the verifier must
//! be handed the exact body bytes separately.
//!
//! Key pairs are stored as two raw `.bin` files: the 32-byte private scalar
//! and the 33-byte SEC1 compressed public point.

mod error;
mod jws;

pub use error::{KeyError, Rejection, SigningError};
pub use jws::{ALGORITHM, PayloadEncoding, ProtectedHeader, Signer, TrustedKeys, Verifier};
pub use k256::ecdsa::VerifyingKey;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use k256::ecdsa::SigningKey;
use rand_core::OsRng;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::Path;

/// Represents a key pair for ES256K operations
#[derive(Clone)]
pub struct KeyPair {
    signing_key: SigningKey,
    verifying_key: VerifyingKey,
}

impl KeyPair {
    /// Generate a new random key pair
    pub fn generate() -> Self {
        let signing_key = SigningKey::random(&mut OsRng);
        let verifying_key = VerifyingKey::from(&signing_key);

        Self {
            signing_key,
            verifying_key,
        }
    }

    /// Rebuild a key pair from the raw bytes written by [`KeyPair::save_to_files`].
    ///
    /// Fails with [`KeyError::Mismatch`] when the public key does not belong
    /// to the private key.
    pub fn from_bytes(private_key: &[u8], public_key: &[u8]) -> Result<Self, KeyError> {
        let signing_key =
            SigningKey::from_slice(private_key).map_err(|_| KeyError::InvalidPrivateKey)?;
        let verifying_key = parse_public_key(public_key)?;
        if VerifyingKey::from(&signing_key) != verifying_key {
            return Err(KeyError::Mismatch);
        }

        Ok(Self {
            signing_key,
            verifying_key,
        })
    }

    /// Save the key pair to files.
    ///
    /// The private key is written unencrypted; protect the file with
    /// filesystem permissions.
    pub fn save_to_files(
        &self,
        private_key_path: impl AsRef<Path>,
        public_key_path: impl AsRef<Path>,
    ) -> Result<(), KeyError> {
        fs::write(private_key_path, self.signing_key.to_bytes())?;
        fs::write(public_key_path, self.public_key_bytes())?;
        Ok(())
    }

    /// Load a key pair stored by save_to_files
    pub fn load_from_files(
        private_key_path: impl AsRef<Path>,
        public_key_path: impl AsRef<Path>,
    ) -> Result<Self, KeyError> {
        let private_key_bytes = fs::read(private_key_path)?;
        let public_key_bytes = fs::read(public_key_path)?;
        Self::from_bytes(&private_key_bytes, &public_key_bytes)
    }

    /// Load only the private key; the public key is derived from it.
    pub fn load_private_key(private_key_path: impl AsRef<Path>) -> Result<Self, KeyError> {
        let private_key_bytes = fs::read(private_key_path)?;
        let signing_key =
            SigningKey::from_slice(&private_key_bytes).map_err(|_| KeyError::InvalidPrivateKey)?;
        let verifying_key = VerifyingKey::from(&signing_key);

        Ok(Self {
            signing_key,
            verifying_key,
        })
    }

    /// Get the public (verifying) key
    pub fn public_key(&self) -> &VerifyingKey {
        &self.verifying_key
    }

    /// SEC1 compressed encoding of the public key
    pub fn public_key_bytes(&self) -> Vec<u8> {
        self.verifying_key.to_encoded_point(true).as_bytes().to_vec()
    }

    pub fn key_id(&self) -> String {
        key_id(&self.verifying_key)
    }
}

/// `kid` for a public key: BASE64URL(SHA-256(SEC1 compressed point)).
pub fn key_id(key: &VerifyingKey) -> String {
    let digest = Sha256::digest(key.to_encoded_point(true).as_bytes());
    URL_SAFE_NO_PAD.encode(digest)
}

/// Read a public key written by [`KeyPair::save_to_files`].
pub fn load_public_key(path: impl AsRef<Path>) -> Result<VerifyingKey, KeyError> {
    let bytes = fs::read(path)?;
    parse_public_key(&bytes)
}

fn parse_public_key(bytes: &[u8]) -> Result<VerifyingKey, KeyError> {
    VerifyingKey::from_sec1_bytes(bytes).map_err(|_| KeyError::InvalidPublicKey)
}

// ----------------------------------------------
//
// Unit tests
//
