//! Signed calls: every request body is signed, every response is verified.

use jws_lib::{PayloadEncoding, Signer, Verifier};
use reqwest::blocking::Client;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Method, StatusCode};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::SIGNATURE_HEADER;
use crate::config::{ClientConfig, TlsMode, load_or_generate_keys};
use crate::error::{CallError, ConfigError};
use crate::request_id::generate_request_id;

const JSON_CONTENT_TYPE: &str = "application/json; charset=utf-8";

/// Builds the blocking HTTP client. `TrustAll` disables certificate checks
/// and must only be used against local test servers.
pub fn build_http_client(tls: TlsMode) -> Result<Client, reqwest::Error> {
    let builder = Client::builder();
    let builder = match tls {
        TlsMode::Verify => builder,
        TlsMode::TrustAll => {
            warn!("TLS certificate verification is DISABLED (trust_all); test use only");
            builder.danger_accept_invalid_certs(true)
        }
    };
    builder.build()
}

/// A sequential client for an API that signs both directions with detached
/// JWS. One underlying HTTP client is reused across calls.
pub struct SignedClient {
    http: Client,
    host: String,
    signer: Signer,
    verifier: Verifier,
    bind_responses: bool,
}

impl SignedClient {
    pub fn new(http: Client, host: impl Into<String>, signer: Signer, verifier: Verifier) -> Self {
        let host = host.into().trim_end_matches('/').to_string();
        Self {
            http,
            host,
            signer,
            verifier,
            bind_responses: true,
        }
    }

    /// When on (the default), a response is trusted only if its signature
    /// carries the `jti` of the request it answers, so a signed response
    /// captured from one call cannot be replayed as the answer to another.
    pub fn with_response_binding(mut self, bind: bool) -> Self {
        self.bind_responses = bind;
        self
    }

    /// Loads (or generates) the client key pair and the trusted server key
    /// named in `config`.
    pub fn from_config(config: &ClientConfig) -> Result<Self, ConfigError> {
        let keys = load_or_generate_keys(&config.private_key, &config.public_key)?;
        let mut signer = Signer::new(keys);
        if config.unencoded_payload {
            signer = signer.with_encoding(PayloadEncoding::Unencoded);
        }
        let verifier = Verifier::from_files(std::slice::from_ref(&config.server_public_key))?;
        let http = build_http_client(config.tls).map_err(ConfigError::HttpClient)?;

        info!(
            "Client for {} signing as {}",
            config.host,
            signer.key_id()
        );
        Ok(Self::new(http, config.host.clone(), signer, verifier)
            .with_response_binding(config.bind_responses))
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// `GET path_and_query`, signing the empty body.
    pub fn get(&self, path_and_query: &str) -> Result<String, CallError> {
        self.call(Method::GET, path_and_query, None)
    }

    /// `POST path` with `body` serialized as JSON.
    pub fn post_json<T: Serialize + ?Sized>(&self, path: &str, body: &T) -> Result<String, CallError> {
        let bytes = serde_json::to_vec(body)?;
        self.call(Method::POST, path, Some(bytes))
    }

    /// Sign, send, read the body once and verify it.
    ///
    /// Returns the body only when the status is a success and the response
    /// signature verifies. A `body` of `Some` is sent as JSON.
    pub fn call(
        &self,
        method: Method,
        path: &str,
        body: Option<Vec<u8>>,
    ) -> Result<String, CallError> {
        let request_id = generate_request_id();
        let token = self
            .signer
            .sign(body.as_deref().unwrap_or_default(), &request_id)?;

        let url = format!("{}{}", self.host, path);
        debug!("[{}] {} {}", request_id, method, url);

        let mut request = self
            .http
            .request(method, &url)
            .header(SIGNATURE_HEADER, token);
        if let Some(body) = body {
            request = request.header(CONTENT_TYPE, JSON_CONTENT_TYPE).body(body);
        }

        let response = request.send()?;
        let status = response.status();
        let signature = response
            .headers()
            .get(SIGNATURE_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned);
        let body = response.bytes()?;

        debug!("[{}] {} ({} bytes)", request_id, status, body.len());
        let expected_jti = self.bind_responses.then_some(request_id.as_str());
        evaluate_response(
            &self.verifier,
            status,
            signature.as_deref(),
            &body,
            expected_jti,
        )
    }
}

/// Decide what a received response means.
///
/// Non-success statuses surface the raw body whatever the signature says;
/// a success status needs a signature that verifies over `body` and, when
/// `expected_jti` is given, names that request id as its `jti`.
pub fn evaluate_response(
    verifier: &Verifier,
    status: StatusCode,
    signature: Option<&str>,
    body: &[u8],
    expected_jti: Option<&str>,
) -> Result<String, CallError> {
    if !status.is_success() {
        return Err(CallError::HttpStatus {
            status,
            body: String::from_utf8_lossy(body).into_owned(),
        });
    }

    match verifier.check(signature, body) {
        Ok(header) => match expected_jti {
            Some(expected) if header.jti.as_deref() != Some(expected) => {
                warn!(
                    "Rejecting {} response: signed for request {:?}, expected {}",
                    status, header.jti, expected
                );
                Err(CallError::UntrustedResponse { status })
            }
            _ => Ok(String::from_utf8_lossy(body).into_owned()),
        },
        Err(reason) => {
            warn!("Rejecting {} response: {}", status, reason);
            Err(CallError::UntrustedResponse { status })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jws_lib::KeyPair;

    fn server_side() -> (Signer, Verifier) {
        let signer = Signer::new(KeyPair::generate());
        let verifier = Verifier::from_key(signer.public_key().clone());
        (signer, verifier)
    }

    #[test]
    fn test_ok_with_valid_signature_returns_body() {
        let (signer, verifier) = server_side();
        let body = br#"{"msg":"ok"}"#;
        let token = signer.sign(body, "resp-1").unwrap();

        let result = evaluate_response(&verifier, StatusCode::OK, Some(&token), body, None);
        assert_eq!(result.unwrap(), r#"{"msg":"ok"}"#);
    }

    #[test]
    fn test_ok_without_signature_is_untrusted() {
        let (_, verifier) = server_side();
        let result = evaluate_response(&verifier, StatusCode::OK, None, br#"{"msg":"ok"}"#, None);

        let err = result.unwrap_err();
        assert!(matches!(
            err,
            CallError::UntrustedResponse { status } if status == StatusCode::OK
        ));
        assert!(err.to_string().contains("invalid signature"));
    }

    #[test]
    fn test_ok_with_signature_over_other_body_is_untrusted() {
        let (signer, verifier) = server_side();
        let token = signer.sign(br#"{"msg":"ok"}"#, "resp").unwrap();

        let result = evaluate_response(
            &verifier,
            StatusCode::OK,
            Some(&token),
            br#"{"msg":"evil"}"#,
            None,
        );
        assert!(matches!(result, Err(CallError::UntrustedResponse { .. })));
    }

    #[test]
    fn test_ok_with_garbage_signature_is_untrusted() {
        let (_, verifier) = server_side();
        let result = evaluate_response(&verifier, StatusCode::CREATED, Some("not-a-jws"), b"{}", None);
        assert!(matches!(result, Err(CallError::UntrustedResponse { .. })));
    }

    #[test]
    fn test_server_error_surfaces_raw_body() {
        let (signer, verifier) = server_side();
        let body = b"internal failure";

        for signature in [None, Some(signer.sign(body, "resp").unwrap())] {
            let result = evaluate_response(
                &verifier,
                StatusCode::INTERNAL_SERVER_ERROR,
                signature.as_deref(),
                body,
                Some("req-1"),
            );
            match result {
                Err(CallError::HttpStatus { status, body }) => {
                    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
                    assert_eq!(body, "internal failure");
                }
                other => panic!("unexpected outcome: {other:?}"),
            }
        }
    }

    #[test]
    fn test_response_bound_to_request_id() {
        let (signer, verifier) = server_side();
        let body = br#"{"msg":"ok"}"#;
        let token = signer.sign(body, "req-1").unwrap();

        let result = evaluate_response(&verifier, StatusCode::OK, Some(&token), body, Some("req-1"));
        assert_eq!(result.unwrap(), r#"{"msg":"ok"}"#);
    }

    #[test]
    fn test_response_signed_for_other_request_is_untrusted() {
        let (signer, verifier) = server_side();
        let body = br#"{"msg":"ok"}"#;
        let replayed = signer.sign(body, "req-1").unwrap();

        let result = evaluate_response(&verifier, StatusCode::OK, Some(&replayed), body, Some("req-2"));
        assert!(matches!(result, Err(CallError::UntrustedResponse { .. })));
    }

    #[test]
    fn test_host_trailing_slash_is_trimmed() {
        let (signer, verifier) = server_side();
        let http = build_http_client(TlsMode::Verify).unwrap();
        let client = SignedClient::new(http, "http://localhost:3001/", signer, verifier);
        assert_eq!(client.host(), "http://localhost:3001");
    }
}
