use thiserror::Error;

/// Problems with key material: unreadable files or bytes that are not a
/// valid secp256k1 key.
#[derive(Debug, Error)]
pub enum KeyError {
    #[error("key file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid private key")]
    InvalidPrivateKey,

    #[error("invalid public key")]
    InvalidPublicKey,

    #[error("public key does not match private key")]
    Mismatch,
}

#[derive(Debug, Error)]
pub enum SigningError {
    #[error("failed to encode protected header: {0}")]
    Header(#[from] serde_json::Error),

    #[error("ECDSA signing failed: {0}")]
    Signature(#[from] k256::ecdsa::Error),
}

/// Why a token was not accepted. Returned by [`crate::Verifier::check`];
/// [`crate::Verifier::verify`] folds all of these into `false`.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum Rejection {
    #[error("signature header is missing")]
    Missing,

    #[error("malformed token: {0}")]
    Malformed(&'static str),

    #[error("unsupported algorithm {0:?}")]
    UnsupportedAlgorithm(String),

    #[error("unsupported critical header parameter {0:?}")]
    UnsupportedCritical(String),

    #[error("signing key is not trusted")]
    UnknownKey,

    #[error("signature does not match payload")]
    BadSignature,
}
