//! Readiness probe for the development server
//!
//! The server is started elsewhere. When asked to, the runner polls the target
//! URL until it answers before launching a browser.

use std::time::{Duration, Instant};

use tokio::time::sleep;
use tracing::{info, warn};

use crate::error::{VerifyError, VerifyResult};

const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Wait until `url` answers with a non-server-error status.
pub async fn wait_for_server(url: &str, timeout_duration: Duration) -> VerifyResult<()> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(2))
        .build()?;

    let start = Instant::now();
    let mut attempts = 0;

    loop {
        attempts += 1;

        match client.get(url).send().await {
            Ok(resp) if !resp.status().is_server_error() => {
                info!("Server is up at {} ({})", url, resp.status());
                return Ok(());
            }
            Ok(resp) => {
                warn!("Readiness probe returned {}", resp.status());
            }
            Err(e) => {
                if attempts == 1 {
                    info!("Waiting for server at {}...", url);
                }
                // Connection refused is expected while the server is starting
                if !e.is_connect() {
                    warn!("Readiness probe error: {}", e);
                }
            }
        }

        if start.elapsed() >= timeout_duration {
            break;
        }
        sleep(POLL_INTERVAL).await;
    }

    Err(VerifyError::ServerUnavailable {
        url: url.to_string(),
        attempts,
    })
}
