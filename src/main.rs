//! ttfb-server: a TCP responder for Time To First Byte experiments
//!
//! Pretends to be an HTTP/1.1 server and answers any request with the
//! same canned `200 OK`, but only after a deliberate stall:
//! - The `H` of `HTTP/1.1 200 OK` is sent and flushed immediately
//! - The rest of the status line, the headers and the body follow 10 seconds later
//! - The connection is then closed
//!
//! Configuration via CLI arguments or TOML file.

mod config;
mod protocols;
mod response;
mod server;

use chrono::Utc;
use config::Config;
use protocols::staged::STAGE_DELAY;
use response::ResponseTemplate;
use server::{Server, ServerError};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::load()?;

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let template = ResponseTemplate::new(Utc::now());

    info!(
        port = config.port,
        delay_secs = STAGE_DELAY.as_secs(),
        status_bytes = template.status_line().len(),
        header_bytes = template.headers().len(),
        body_bytes = template.body().len(),
        response_bytes = template.as_bytes().len(),
        "Starting ttfb-server"
    );

    // Listener failures end the process with a diagnostic on stdout
    if let Err(e) = serve(&config, template).await {
        println!("{e}");
        std::process::exit(1);
    }

    Ok(())
}

async fn serve(config: &Config, template: ResponseTemplate) -> Result<(), ServerError> {
    Server::bind(config.listen_addr(), template)?.run().await
}
