use std::collections::BTreeMap;
use std::path::Path;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::Utc;
use k256::ecdsa::signature::{Signer as _, Verifier as _};
use k256::ecdsa::{Signature, VerifyingKey};
use serde::{Deserialize, Serialize};

use crate::error::{KeyError, Rejection, SigningError};
use crate::{key_id, load_public_key, KeyPair};

/// JWS `alg` value: ECDSA over secp256k1 with SHA-256 (RFC 8812).
pub const ALGORITHM: &str = "ES256K";

const B64_PARAM: &str = "b64";

/// How the payload enters the JWS signing input.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PayloadEncoding {
    /// RFC 7515: `header "." BASE64URL(payload)`
    #[default]
    Base64Url,
    /// RFC 7797 (`b64: false`): `header "." payload`
    Unencoded,
}

/// JOSE protected header carried in the first token segment.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtectedHeader {
    pub alg: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kid: Option<String>,
    /// Request identifier the signature is bound to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jti: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub b64: Option<bool>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub crit: Vec<String>,
}

impl ProtectedHeader {
    fn encoding(&self) -> PayloadEncoding {
        match self.b64 {
            Some(false) => PayloadEncoding::Unencoded,
            _ => PayloadEncoding::Base64Url,
        }
    }
}

/// Produces detached compact JWS tokens with a held private key.
#[derive(Clone)]
pub struct Signer {
    keys: KeyPair,
    kid: String,
    encoding: PayloadEncoding,
}

impl Signer {
    pub fn new(keys: KeyPair) -> Self {
        let kid = keys.key_id();
        Self {
            keys,
            kid,
            encoding: PayloadEncoding::default(),
        }
    }

    pub fn with_encoding(mut self, encoding: PayloadEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    pub fn from_files(
        private_key_path: impl AsRef<Path>,
        public_key_path: impl AsRef<Path>,
    ) -> Result<Self, KeyError> {
        KeyPair::load_from_files(private_key_path, public_key_path).map(Self::new)
    }

    pub fn key_id(&self) -> &str {
        &self.kid
    }

    pub fn public_key(&self) -> &VerifyingKey {
        self.keys.public_key()
    }

    /// Sign `payload` and bind it to `request_id`.
    ///
    /// Returns `BASE64URL(header) ".." BASE64URL(r || s)`, a single line that
    /// can be sent as an HTTP header value. `payload` may be empty.
    pub fn sign(&self, payload: &[u8], request_id: &str) -> Result<String, SigningError> {
        let unencoded = self.encoding == PayloadEncoding::Unencoded;
        let header = ProtectedHeader {
            alg: ALGORITHM.to_string(),
            kid: Some(self.kid.clone()),
            jti: Some(request_id.to_string()),
            iat: Some(Utc::now().timestamp()),
            b64: unencoded.then_some(false),
            crit: if unencoded {
                vec![B64_PARAM.to_string()]
            } else {
                Vec::new()
            },
        };

        let encoded_header = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&header)?);
        let input = signing_input(&encoded_header, payload, self.encoding);
        let signature: Signature = self.keys.signing_key.try_sign(&input)?;

        Ok(format!(
            "{}..{}",
            encoded_header,
            URL_SAFE_NO_PAD.encode(signature.to_bytes())
        ))
    }
}

/// Public keys accepted by a [`Verifier`], indexed by `kid`.
#[derive(Clone, Debug, Default)]
pub struct TrustedKeys {
    keys: BTreeMap<String, VerifyingKey>,
}

impl TrustedKeys {
    pub fn new() -> Self {
        Self::default()
    }

    /// Trust `key`; returns its `kid`.
    pub fn insert(&mut self, key: VerifyingKey) -> String {
        let kid = key_id(&key);
        self.keys.insert(kid.clone(), key);
        kid
    }

    /// Trust the public key stored at `path`; returns its `kid`.
    pub fn load_file(&mut self, path: impl AsRef<Path>) -> Result<String, KeyError> {
        let key = load_public_key(path)?;
        Ok(self.insert(key))
    }

    pub fn get(&self, kid: &str) -> Option<&VerifyingKey> {
        self.keys.get(kid)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    fn sole(&self) -> Option<&VerifyingKey> {
        match self.keys.len() {
            1 => self.keys.values().next(),
            _ => None,
        }
    }
}

/// Checks detached JWS tokens against body bytes.
#[derive(Clone, Debug)]
pub struct Verifier {
    trusted: TrustedKeys,
}

impl Verifier {
    pub fn new(trusted: TrustedKeys) -> Self {
        Self { trusted }
    }

    pub fn from_key(key: VerifyingKey) -> Self {
        let mut trusted = TrustedKeys::new();
        trusted.insert(key);
        Self::new(trusted)
    }

    /// Trust every public key file in `paths`.
    pub fn from_files<P: AsRef<Path>>(paths: &[P]) -> Result<Self, KeyError> {
        let mut trusted = TrustedKeys::new();
        for path in paths {
            trusted.load_file(path)?;
        }
        Ok(Self::new(trusted))
    }

    pub fn trusted_keys(&self) -> &TrustedKeys {
        &self.trusted
    }

    /// `true` only if `token` is a well-formed detached JWS over exactly
    /// `body`, signed by a trusted key. Missing or garbage tokens are `false`.
    pub fn verify(&self, token: Option<&str>, body: &[u8]) -> bool {
        self.check(token, body).is_ok()
    }

    /// Same as [`Verifier::verify`] but reports why a token was rejected and
    /// hands back the verified header.
    pub fn check(&self, token: Option<&str>, body: &[u8]) -> Result<ProtectedHeader, Rejection> {
        let token = token.filter(|t| !t.is_empty()).ok_or(Rejection::Missing)?;

        let mut segments = token.split('.');
        let (Some(encoded_header), Some(payload), Some(encoded_signature), None) = (
            segments.next(),
            segments.next(),
            segments.next(),
            segments.next(),
        ) else {
            return Err(Rejection::Malformed("expected three segments"));
        };
        if !payload.is_empty() {
            return Err(Rejection::Malformed("payload segment is not detached"));
        }

        let header_json = URL_SAFE_NO_PAD
            .decode(encoded_header)
            .map_err(|_| Rejection::Malformed("header is not base64url"))?;
        let header: ProtectedHeader = serde_json::from_slice(&header_json)
            .map_err(|_| Rejection::Malformed("header is not a JOSE header"))?;

        if header.alg != ALGORITHM {
            return Err(Rejection::UnsupportedAlgorithm(header.alg));
        }
        if let Some(name) = header.crit.iter().find(|name| *name != B64_PARAM) {
            return Err(Rejection::UnsupportedCritical(name.clone()));
        }
        if header.b64.is_some() && !header.crit.iter().any(|name| name == B64_PARAM) {
            return Err(Rejection::Malformed("b64 must be listed in crit"));
        }

        let key = match header.kid.as_deref() {
            Some(kid) => self.trusted.get(kid),
            None => self.trusted.sole(),
        }
        .ok_or(Rejection::UnknownKey)?;

        let signature_bytes = URL_SAFE_NO_PAD
            .decode(encoded_signature)
            .map_err(|_| Rejection::Malformed("signature is not base64url"))?;
        let signature = Signature::from_slice(&signature_bytes)
            .map_err(|_| Rejection::Malformed("signature is not a 64-byte ES256K value"))?;

        let input = signing_input(encoded_header, body, header.encoding());
        key.verify(&input, &signature)
            .map_err(|_| Rejection::BadSignature)?;

        Ok(header)
    }
}

fn signing_input(encoded_header: &str, payload: &[u8], encoding: PayloadEncoding) -> Vec<u8> {
    let mut input = Vec::with_capacity(encoded_header.len() + 1 + payload.len() * 4 / 3 + 4);
    input.extend_from_slice(encoded_header.as_bytes());
    input.push(b'.');
    match encoding {
        PayloadEncoding::Base64Url => {
            input.extend_from_slice(URL_SAFE_NO_PAD.encode(payload).as_bytes())
        }
        PayloadEncoding::Unencoded => input.extend_from_slice(payload),
    }
    input
}

#[cfg(test)]
mod tests {
    use super::*;
    use k256::ecdsa::signature::Signer as _;

    fn signer() -> Signer {
        Signer::new(KeyPair::generate())
    }

    fn verifier_for(signer: &Signer) -> Verifier {
        Verifier::from_key(signer.public_key().clone())
    }

    fn decode_header(token: &str) -> ProtectedHeader {
        let encoded = token.split('.').next().unwrap();
        serde_json::from_slice(&URL_SAFE_NO_PAD.decode(encoded).unwrap()).unwrap()
    }

    #[test]
    fn test_round_trip() {
        let signer = signer();
        let verifier = verifier_for(&signer);
        let body = br#"{"numCPF":"12345678901","tpEvento":1}"#;

        let token = signer.sign(body, "req-1").unwrap();
        assert!(verifier.verify(Some(&token), body));
    }

    #[test]
    fn test_empty_payload_scenario() {
        let signer = signer();
        let verifier = verifier_for(&signer);

        let token = signer.sign(b"", "abc").unwrap();
        assert!(verifier.verify(Some(&token), b""));
        assert!(!verifier.verify(Some(&token), b"x"));
    }

    #[test]
    fn test_tampered_payload_fails() {
        let signer = signer();
        let verifier = verifier_for(&signer);

        let token = signer.sign(b"{\"msg\":\"ok\"}", "req").unwrap();
        assert_eq!(
            verifier.check(Some(&token), b"{\"msg\":\"ko\"}"),
            Err(Rejection::BadSignature)
        );
    }

    #[test]
    fn test_token_shape() {
        let signer = signer();
        let token = signer.sign(b"payload", "req-42").unwrap();

        let parts: Vec<&str> = token.split('.').collect();
        assert_eq!(parts.len(), 3);
        assert!(!parts[0].is_empty());
        assert!(parts[1].is_empty(), "payload must be detached");
        assert_eq!(URL_SAFE_NO_PAD.decode(parts[2]).unwrap().len(), 64);
        assert!(!token.contains('\n'));

        let header = decode_header(&token);
        assert_eq!(header.alg, ALGORITHM);
        assert_eq!(header.jti.as_deref(), Some("req-42"));
        assert_eq!(header.kid.as_deref(), Some(signer.key_id()));
        assert!(header.iat.is_some());
        assert!(header.b64.is_none());
        assert!(header.crit.is_empty());
    }

    #[test]
    fn test_missing_token_is_false() {
        let verifier = verifier_for(&signer());
        assert!(!verifier.verify(None, b"anything"));
        assert!(!verifier.verify(Some(""), b"anything"));
        assert_eq!(verifier.check(None, b""), Err(Rejection::Missing));
    }

    #[test]
    fn test_garbage_tokens_are_false() {
        let verifier = verifier_for(&signer());
        for garbage in [
            "garbage",
            "a.b",
            "a..b..c",
            "!!!..!!!",
            "e30..AAAA",
            "eyJhbGciOiJFUzI1NksifQ.cGF5bG9hZA.AAAA",
            "....",
        ] {
            assert!(!verifier.verify(Some(garbage), b"body"), "{garbage}");
        }
    }

    #[test]
    fn test_untrusted_key_is_rejected() {
        let signer = signer();
        let other = verifier_for(&self::signer());

        let token = signer.sign(b"body", "req").unwrap();
        assert_eq!(other.check(Some(&token), b"body"), Err(Rejection::UnknownKey));
    }

    #[test]
    fn test_flipped_signature_byte_fails() {
        let signer = signer();
        let verifier = verifier_for(&signer);
        let token = signer.sign(b"body", "req").unwrap();

        let (head, sig) = token.rsplit_once('.').unwrap();
        let mut sig_bytes = URL_SAFE_NO_PAD.decode(sig).unwrap();
        sig_bytes[3] ^= 0x42;
        let forged = format!("{}.{}", head, URL_SAFE_NO_PAD.encode(sig_bytes));

        assert!(!verifier.verify(Some(&forged), b"body"));
    }

    #[test]
    fn test_header_tampering_fails() {
        let signer = signer();
        let verifier = verifier_for(&signer);
        let token = signer.sign(b"body", "req-1").unwrap();

        let mut header = decode_header(&token);
        header.jti = Some("req-2".to_string());
        let forged_header = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&header).unwrap());
        let signature = token.rsplit('.').next().unwrap();
        let forged = format!("{}..{}", forged_header, signature);

        assert_eq!(
            verifier.check(Some(&forged), b"body"),
            Err(Rejection::BadSignature)
        );
    }

    #[test]
    fn test_unsupported_algorithm() {
        let verifier = verifier_for(&signer());
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none"}"#);
        let token = format!("{}..", header);
        assert_eq!(
            verifier.check(Some(&token), b""),
            Err(Rejection::UnsupportedAlgorithm("none".to_string()))
        );
    }

    #[test]
    fn test_unencoded_payload_round_trip() {
        let signer = signer().with_encoding(PayloadEncoding::Unencoded);
        let verifier = verifier_for(&signer);
        let body = b"{\"msg\":\"teste\"}";

        let token = signer.sign(body, "req").unwrap();
        let header = decode_header(&token);
        assert_eq!(header.b64, Some(false));
        assert_eq!(header.crit, vec!["b64".to_string()]);

        assert!(verifier.verify(Some(&token), body));
        assert!(!verifier.verify(Some(&token), b"{\"msg\":\"other\"}"));
    }

    #[test]
    fn test_unknown_critical_parameter() {
        let verifier = verifier_for(&signer());
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"ES256K","crit":["exp"]}"#);
        let token = format!("{}..AAAA", header);
        assert_eq!(
            verifier.check(Some(&token), b""),
            Err(Rejection::UnsupportedCritical("exp".to_string()))
        );
    }

    #[test]
    fn test_kid_selects_among_trusted_keys() {
        let a = signer();
        let b = signer();
        let mut trusted = TrustedKeys::new();
        assert_eq!(trusted.insert(a.public_key().clone()), a.key_id());
        assert_eq!(trusted.insert(b.public_key().clone()), b.key_id());
        let verifier = Verifier::new(trusted);
        assert_eq!(verifier.trusted_keys().len(), 2);

        let token_a = a.sign(b"body", "1").unwrap();
        let token_b = b.sign(b"body", "2").unwrap();
        assert!(verifier.verify(Some(&token_a), b"body"));
        assert!(verifier.verify(Some(&token_b), b"body"));
    }

    #[test]
    fn test_header_without_kid_needs_single_trusted_key() {
        let signer = signer();
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"ES256K"}"#);
        let input = signing_input(&header, b"body", PayloadEncoding::Base64Url);
        let signature: Signature = signer.keys.signing_key.sign(&input);
        let token = format!("{}..{}", header, URL_SAFE_NO_PAD.encode(signature.to_bytes()));

        assert!(verifier_for(&signer).verify(Some(&token), b"body"));

        let mut two = TrustedKeys::new();
        two.insert(signer.public_key().clone());
        two.insert(self::signer().public_key().clone());
        assert_eq!(
            Verifier::new(two).check(Some(&token), b"body"),
            Err(Rejection::UnknownKey)
        );
    }
}
