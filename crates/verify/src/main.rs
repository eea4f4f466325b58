//! verify-user-setup
//!
//! Checks the user setup form in a headless browser. Exits 0 when the form
//! passes, 1 when verification fails, 2 when the readiness probe fails.

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use setup_verify::config::{self, Browser, Viewport};
use setup_verify::{PlaywrightConfig, PlaywrightLauncher, VerificationReport, VerifyConfig, Verifier};

#[derive(Parser, Debug)]
#[command(name = "verify-user-setup")]
#[command(about = "Verify the user setup form exposes no Role field")]
#[command(version)]
struct Cli {
    /// Page to verify
    #[arg(long, env = "VERIFY_URL", default_value = config::TARGET_URL)]
    url: String,

    /// Success screenshot path
    #[arg(long, env = "VERIFY_SCREENSHOT", default_value = config::SUCCESS_SCREENSHOT)]
    screenshot: PathBuf,

    /// Error screenshot path
    #[arg(long, env = "VERIFY_ERROR_SCREENSHOT", default_value = config::ERROR_SCREENSHOT)]
    error_screenshot: PathBuf,

    /// Browser to use (chromium, firefox, webkit)
    #[arg(long, env = "VERIFY_BROWSER", default_value = "chromium")]
    browser: Browser,

    /// Show the browser window
    #[arg(long)]
    headed: bool,

    /// Viewport width
    #[arg(long, default_value = "1280")]
    viewport_width: u32,

    /// Viewport height
    #[arg(long, default_value = "720")]
    viewport_height: u32,

    /// Default timeout for navigation and waits (milliseconds)
    #[arg(long, env = "VERIFY_TIMEOUT_MS", default_value_t = config::DEFAULT_TIMEOUT_MS)]
    timeout_ms: u64,

    /// Directory containing the playwright node module
    #[arg(long, env = "VERIFY_NODE_PATH")]
    node_path: Option<PathBuf>,

    /// Skip checking that the playwright module resolves
    #[arg(long)]
    skip_driver_check: bool,

    /// Poll the page over HTTP for up to this many seconds before launching
    #[arg(long, value_name = "SECS")]
    wait_for_server: Option<u64>,

    /// Write a JSON run report here
    #[arg(long)]
    report: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Log as JSON
    #[arg(long)]
    json_logs: bool,
}

impl Cli {
    fn verify_config(&self) -> VerifyConfig {
        VerifyConfig {
            target_url: self.url.clone(),
            success_screenshot: self.screenshot.clone(),
            error_screenshot: self.error_screenshot.clone(),
            browser: self.browser,
            headless: !self.headed,
            viewport: Viewport {
                width: self.viewport_width,
                height: self.viewport_height,
            },
            timeout_ms: self.timeout_ms,
            node_path: self.node_path.clone(),
            ..Default::default()
        }
    }
}

fn init_logging(cli: &Cli) {
    let filter = if cli.debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    if cli.json_logs {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer())
            .with(filter)
            .init();
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(&cli);

    std::process::exit(exit_code(run(cli).await));
}

fn exit_code(result: anyhow::Result<bool>) -> i32 {
    match result {
        Ok(true) => 0,
        Ok(false) => 1,
        Err(e) => {
            println!("Error: {:#}", e);
            2
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<bool> {
    let config = cli.verify_config();

    if let Some(secs) = cli.wait_for_server {
        setup_verify::server::wait_for_server(&config.target_url, Duration::from_secs(secs)).await?;
    }

    let launcher = PlaywrightLauncher::new(PlaywrightConfig {
        check_installed: !cli.skip_driver_check,
        ..PlaywrightConfig::from(&config)
    });
    let verifier = Verifier::new(launcher, config);

    let (report, passed) = match verifier.run().await {
        Ok(report) => (report, true),
        Err(failure) => {
            println!("Error: {}", failure);
            if let Some(path) = &failure.diagnostic {
                info!("Diagnostic screenshot: {}", path.display());
            }
            (failure.report, false)
        }
    };

    Ok(conclude(&report, passed, cli.report.as_deref()))
}

/// Exit status follows the verification, not the report write.
fn conclude(report: &VerificationReport, passed: bool, report_path: Option<&Path>) -> bool {
    if let Some(path) = report_path {
        if let Err(e) = report.write(path) {
            error!("Failed to write report to {}: {}", path.display(), e);
        }
    }
    passed
}
