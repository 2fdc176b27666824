//! Terraform Provider for Corellium
//!
//! Terraform launches this binary as a go-plugin and talks to it over gRPC.

use clap::Parser;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use corellium_provider::server::{self, ServeMode};

/// Set to `1` to log JSON lines instead of text
const JSON_LOG_ENV: &str = "TF_LOG_PROVIDER_CORELLIUM_JSON";

#[derive(Parser)]
#[command(name = "terraform-provider-corellium")]
#[command(about = "Terraform provider for the Corellium virtual device platform")]
#[command(version)]
struct Cli {
    /// Run outside Terraform and print TF_REATTACH_PROVIDERS for attaching to it
    #[arg(long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // stdout carries the handshake, so logs go to stderr
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var(JSON_LOG_ENV).is_ok_and(|v| v == "1");
    tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| fmt::layer().json().with_writer(std::io::stderr)))
        .with((!json).then(|| fmt::layer().with_writer(std::io::stderr)))
        .init();

    info!("Corellium provider v{}", env!("CARGO_PKG_VERSION"));

    let mode = if cli.debug {
        ServeMode::Debug
    } else {
        if !server::magic_cookie_matches() {
            eprintln!(
                "This binary is a plugin. These are not meant to be executed directly.\n\
                 Please execute the program that consumes these plugins, which will\n\
                 load any plugins automatically."
            );
            std::process::exit(1);
        }
        ServeMode::Plugin {
            client_cert: server::client_cert_from_env(),
        }
    };

    server::serve(mode).await
}
