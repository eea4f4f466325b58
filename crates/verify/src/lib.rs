//! User setup form verification
//!
//! Drives a headless browser through Playwright to check that the user setup
//! form at the local development server does not show a "Role" field or a
//! visible select control, fills the name field and captures a screenshot.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Verifier<L: BrowserLauncher>                               │
//! │    ├── launch()           -> BrowserSession                 │
//! │    ├── steps::user_setup  -> [VerificationStep]             │
//! │    │     ├── navigate { url }                               │
//! │    │     ├── wait_for { selector }                          │
//! │    │     ├── assert_not_visible { query }  ("Role", select) │
//! │    │     ├── fill { query, value }                          │
//! │    │     └── screenshot { path }                            │
//! │    ├── on failure: error screenshot                         │
//! │    └── close()            (exactly once)                    │
//! ├─────────────────────────────────────────────────────────────┤
//! │  PlaywrightSession                                          │
//! │    node bridge.js  <── JSON lines over stdin/stdout ──>     │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod artifact;
pub mod config;
pub mod error;
pub mod playwright;
pub mod runner;
pub mod server;
pub mod session;
pub mod steps;

pub use config::VerifyConfig;
pub use error::{VerificationFailure, VerifyError, VerifyResult};
pub use playwright::{PlaywrightConfig, PlaywrightLauncher};
pub use runner::{VerificationReport, Verifier};
pub use session::{BrowserLauncher, BrowserSession, Query};

/// Run the user setup verification with Playwright.
pub async fn run_verification(config: VerifyConfig) -> Result<VerificationReport, VerificationFailure> {
    let launcher = PlaywrightLauncher::new(PlaywrightConfig::from(&config));
    Verifier::new(launcher, config).run().await
}
