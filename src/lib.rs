//! Client library for a REST API that signs every request and response body
//! with a detached JWS carried in the `x-jws-signature` header.
//!
//! - [`client::SignedClient`] signs outgoing bodies and refuses responses
//!   whose signature does not verify.
//! - [`server`] is a local stand-in for the remote API that enforces the
//!   same contract from the other side.
//! - [`config`] loads host, TLS and key file settings from TOML.

pub mod client;
pub mod config;
pub mod error;
pub mod request_id;
pub mod server;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Header carrying the detached JWS on both requests and responses.
pub const SIGNATURE_HEADER: &str = "x-jws-signature";

/// Echo tool: `GET` with a `msg` query parameter.
pub const ECO_PATH: &str = "/api/v1/ferramentas/eco";

/// Contract registration: `POST` with a [`RegistroContrato`] body.
pub const RCC0001_PATH: &str = "/api/v1/RCC0001";

/// Body returned by the echo tool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EcoResponse {
    pub msg: String,
}

/// Contract registration record sent to RCC0001.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistroContrato {
    #[serde(rename = "numCPF")]
    pub num_cpf: String,
    pub tp_empregador: u8,
    pub num_beneficio: String,
    pub num_matricula: String,
    pub num_contrato: String,
    pub sit_registro: String,
    pub tp_evento: u8,
    pub dt_evento: NaiveDate,
    pub dt_contrato_origem: NaiveDate,
}

/// Receipt returned by RCC0001
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistroRecibo {
    pub protocolo: String,
    pub request_id: String,
    pub sit_registro: String,
}

/// Body returned by GET /key
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerKey {
    pub request: String,
    #[serde(rename = "time-requested")]
    pub time_requested: DateTime<Utc>,
    #[serde(rename = "public-key")]
    pub public_key: String,
    pub kid: String,
}

/// Error body used by the mock server for 4xx responses
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}
