//! Local stand-in for the signing API.
//!
//! Every `/api` request must carry a detached JWS by a trusted client key
//! over its raw body, and every response body is signed with the server key.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Router,
    body::Bytes,
    extract::{Query, State},
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode, header::CONTENT_TYPE},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use base64::{Engine as _, engine::general_purpose};
use chrono::Utc;
use jws_lib::{ProtectedHeader, Signer, Verifier};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::request_id::generate_request_id;
use crate::{
    ECO_PATH, EcoResponse, ErrorBody, RCC0001_PATH, RegistroContrato, RegistroRecibo,
    SIGNATURE_HEADER, ServerKey,
};

#[derive(Clone)]
struct AppState {
    signer: Arc<Signer>,
    verifier: Arc<Verifier>,
}

/// Query for GET /api/v1/ferramentas/eco
#[derive(Deserialize)]
struct EcoQuery {
    #[serde(default)]
    msg: String,
}

/// Builds and runs the server on `addr`.
///
/// `signer` signs every response; `verifier` holds the client keys allowed
/// to call the API.
pub async fn run_server(
    addr: SocketAddr,
    signer: Signer,
    verifier: Verifier,
) -> Result<(), Box<dyn std::error::Error>> {
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    run_server_with_listener(signer, verifier, listener).await
}

/// Runs the server with a provided listener (useful for tests with ephemeral ports)
pub async fn run_server_with_listener(
    signer: Signer,
    verifier: Verifier,
    listener: tokio::net::TcpListener,
) -> Result<(), Box<dyn std::error::Error>> {
    let addr = listener.local_addr()?;
    info!(
        "Mock signing API starting on {} (server kid {}, {} trusted client keys)",
        addr,
        signer.key_id(),
        verifier.trusted_keys().len()
    );

    axum::serve(listener, router(signer, verifier)).await?;
    Ok(())
}

pub fn router(signer: Signer, verifier: Verifier) -> Router {
    let state = AppState {
        signer: Arc::new(signer),
        verifier: Arc::new(verifier),
    };

    Router::new()
        .route("/key", get(handle_get_key))
        .route(ECO_PATH, get(handle_eco).fallback(method_not_allowed))
        .route(RCC0001_PATH, post(handle_rcc0001).fallback(method_not_allowed))
        .fallback(fallback_handler)
        .with_state(state)
}

/// GET /key → Base64 of the server public key and its kid
async fn handle_get_key(State(state): State<AppState>) -> Response {
    let now = Utc::now();
    let public_key = state.signer.public_key().to_encoded_point(true);
    let resp = ServerKey {
        request: "GET".to_string(),
        time_requested: now,
        public_key: general_purpose::STANDARD.encode(public_key.as_bytes()),
        kid: state.signer.key_id().to_string(),
    };
    info!("{} Request: GET /key → kid {}", now.to_rfc3339(), resp.kid);
    signed_json(&state, None, StatusCode::OK, &resp)
}

/// GET /api/v1/ferramentas/eco?msg=... → `{"msg": ...}`
async fn handle_eco(
    State(state): State<AppState>,
    Query(query): Query<EcoQuery>,
    headers: HeaderMap,
) -> Response {
    let header = match authenticate(&state, &headers, b"") {
        Ok(header) => header,
        Err(rejected) => return rejected,
    };

    info!(
        "{} Request: GET {} [{}] msg='{}'",
        Utc::now().to_rfc3339(),
        ECO_PATH,
        header.jti.as_deref().unwrap_or("-"),
        query.msg
    );
    signed_json(
        &state,
        header.jti.as_deref(),
        StatusCode::OK,
        &EcoResponse { msg: query.msg },
    )
}

/// POST /api/v1/RCC0001 (JSON `RegistroContrato`) → receipt
async fn handle_rcc0001(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let header = match authenticate(&state, &headers, &body) {
        Ok(header) => header,
        Err(rejected) => return rejected,
    };

    let registro: RegistroContrato = match serde_json::from_slice(&body) {
        Ok(registro) => registro,
        Err(e) => {
            warn!("{} Invalid RCC0001 body: {}", Utc::now().to_rfc3339(), e);
            let err_body = ErrorBody {
                error: format!("invalid RCC0001 body: {e}"),
            };
            return signed_json(
                &state,
                header.jti.as_deref(),
                StatusCode::BAD_REQUEST,
                &err_body,
            );
        }
    };

    let recibo = RegistroRecibo {
        protocolo: Uuid::new_v4().to_string(),
        request_id: header.jti.unwrap_or_default(),
        sit_registro: registro.sit_registro,
    };
    info!(
        "{} Request: POST {} [{}] → protocolo {}",
        Utc::now().to_rfc3339(),
        RCC0001_PATH,
        recibo.request_id,
        recibo.protocolo
    );
    signed_json(&state, Some(&recibo.request_id), StatusCode::OK, &recibo)
}

/// Fallback for any unsupported route
async fn fallback_handler(State(state): State<AppState>) -> Response {
    error!("{} Invalid request, returning 400", Utc::now().to_rfc3339());
    let err_body = ErrorBody {
        error: "Invalid request".to_string(),
    };
    signed_json(&state, None, StatusCode::BAD_REQUEST, &err_body)
}

/// Known route, wrong method
async fn method_not_allowed(State(state): State<AppState>) -> Response {
    warn!("{} Method not allowed, returning 405", Utc::now().to_rfc3339());
    let err_body = ErrorBody {
        error: "Method not allowed".to_string(),
    };
    signed_json(&state, None, StatusCode::METHOD_NOT_ALLOWED, &err_body)
}

/// Check the request signature over `body`; a signed 401 otherwise.
fn authenticate(
    state: &AppState,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<ProtectedHeader, Response> {
    let token = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok());

    state.verifier.check(token, body).map_err(|reason| {
        warn!("{} Rejecting request: {}", Utc::now().to_rfc3339(), reason);
        let err_body = ErrorBody {
            error: format!("invalid request signature: {reason}"),
        };
        signed_json(state, None, StatusCode::UNAUTHORIZED, &err_body)
    })
}

/// Sign `body` as the answer to request `jti`, or under a fresh id when the
/// request could not be authenticated.
fn signed_json<T: Serialize>(
    state: &AppState,
    jti: Option<&str>,
    status: StatusCode,
    body: &T,
) -> Response {
    match serde_json::to_vec(body) {
        Ok(bytes) => signed_bytes(state, jti, status, bytes),
        Err(e) => {
            error!("Failed to encode response body: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

fn signed_bytes(
    state: &AppState,
    jti: Option<&str>,
    status: StatusCode,
    bytes: Vec<u8>,
) -> Response {
    let jti = jti.map(str::to_owned).unwrap_or_else(generate_request_id);
    let token = match state.signer.sign(&bytes, &jti) {
        Ok(token) => token,
        Err(e) => {
            error!("Failed to sign response: {}", e);
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };
    let token = match HeaderValue::from_str(&token) {
        Ok(value) => value,
        Err(e) => {
            error!("Signature is not a valid header value: {}", e);
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let mut response = (status, bytes).into_response();
    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert(HeaderName::from_static(SIGNATURE_HEADER), token);
    response
}
