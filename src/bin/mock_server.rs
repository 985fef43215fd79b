//! Local signing API for running the demo client end-to-end.
//!
//! Provisions both the server and the client key pair on first start so the
//! two binaries trust each other out of the box.

use jws_api_client::config::{Settings, load_or_generate_keys};
use jws_api_client::server;
use jws_lib::{Signer, Verifier};

#[tokio::main]
async fn main() {
    // Initialize logging to stdout
    tracing_subscriber::fmt::init();

    let settings = match Settings::load() {
        Ok(settings) => settings,
        Err(e) => {
            tracing::error!("Failed to load config: {}", e);
            std::process::exit(1);
        }
    };

    let server_keys =
        match load_or_generate_keys(&settings.server.private_key, &settings.server.public_key) {
            Ok(keys) => keys,
            Err(e) => {
                tracing::error!("Failed to load or generate server keys: {}", e);
                std::process::exit(1);
            }
        };

    if let Err(e) = load_or_generate_keys(&settings.client.private_key, &settings.client.public_key)
    {
        tracing::error!("Failed to load or generate client keys: {}", e);
        std::process::exit(1);
    }

    let verifier = match Verifier::from_files(settings.server.trusted_client_keys.as_slice()) {
        Ok(verifier) => verifier,
        Err(e) => {
            tracing::error!("Failed to load trusted client keys: {}", e);
            std::process::exit(1);
        }
    };

    server::run_server(settings.server.listen, Signer::new(server_keys), verifier)
        .await
        .unwrap_or_else(|err| {
            tracing::error!("Server error: {}", err);
        });
}
