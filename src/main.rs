//! Demo: one signed GET and one signed POST against the configured host.

use chrono::NaiveDate;
use jws_api_client::client::SignedClient;
use jws_api_client::config::Settings;
use jws_api_client::error::CallError;
use jws_api_client::{ECO_PATH, RCC0001_PATH, RegistroContrato};

fn main() {
    // Initialize logging to stdout
    tracing_subscriber::fmt::init();

    let settings = match Settings::load() {
        Ok(settings) => settings,
        Err(e) => {
            tracing::error!("Failed to load config: {}", e);
            std::process::exit(1);
        }
    };

    let client = match SignedClient::from_config(&settings.client) {
        Ok(client) => client,
        Err(e) => {
            tracing::error!("Failed to set up signed client: {}", e);
            std::process::exit(1);
        }
    };

    report(
        "Http Get Request",
        client.get(&format!("{}?msg=teste", ECO_PATH)),
    );

    match sample_registro() {
        Some(registro) => report("Http Post Request", client.post_json(RCC0001_PATH, &registro)),
        None => tracing::error!("Invalid sample date"),
    }
}

fn report(label: &str, outcome: Result<String, CallError>) {
    match outcome {
        Ok(body) => println!("{} - Success: {}", label, body),
        Err(CallError::HttpStatus { status, body }) => {
            tracing::warn!("{} failed with {}", label, status);
            println!("{} - Error: {}", label, body);
        }
        Err(e) => {
            tracing::error!("{} failed: {}", label, e);
            println!("{} - Error: {}", label, e);
        }
    }
}

fn sample_registro() -> Option<RegistroContrato> {
    let date = NaiveDate::from_ymd_opt(2020, 10, 22)?;
    Some(RegistroContrato {
        num_cpf: "12345678901".to_string(),
        tp_empregador: 1,
        num_beneficio: "1234567890".to_string(),
        num_matricula: "12345678901234567890".to_string(),
        num_contrato: "12345678901234567890123456789012345678901234567890".to_string(),
        sit_registro: "A".to_string(),
        tp_evento: 1,
        dt_evento: date,
        dt_contrato_origem: date,
    })
}
