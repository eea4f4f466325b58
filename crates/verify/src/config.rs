//! Verification configuration
//!
//! Every field defaults to the fixed value the user setup check was written
//! against, so `VerifyConfig::default()` is the canonical run.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Page served by the local development server
pub const TARGET_URL: &str = "http://localhost:5173/verify_setup.html";

/// Written after a passing run
pub const SUCCESS_SCREENSHOT: &str = "verification/user_setup_verification.png";

/// Written when any step fails
pub const ERROR_SCREENSHOT: &str = "verification/error.png";

pub const FORM_SELECTOR: &str = "form";
pub const ROLE_TEXT: &str = "Role";
pub const SELECT_SELECTOR: &str = "select";
pub const TEXT_INPUT_SELECTOR: &str = "input[type='text']";
pub const FILL_VALUE: &str = "Test User";

/// Playwright's own default action/navigation timeout
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Browser {
    #[default]
    Chromium,
    Firefox,
    Webkit,
}

impl Browser {
    pub fn as_str(&self) -> &'static str {
        match self {
            Browser::Chromium => "chromium",
            Browser::Firefox => "firefox",
            Browser::Webkit => "webkit",
        }
    }
}

impl std::str::FromStr for Browser {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "chromium" | "chrome" => Ok(Browser::Chromium),
            "firefox" => Ok(Browser::Firefox),
            "webkit" => Ok(Browser::Webkit),
            other => Err(format!("unknown browser: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self { width: 1280, height: 720 }
    }
}

/// Configuration for a verification run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyConfig {
    /// Page under test
    pub target_url: String,

    /// Element that signals the page is interactive
    pub form_selector: String,

    /// Exact text that must not be visible
    pub role_text: String,

    /// Control that must not be visible
    pub select_selector: String,

    /// Input that receives `fill_value`
    pub text_input_selector: String,
    pub fill_value: String,

    pub success_screenshot: PathBuf,
    pub error_screenshot: PathBuf,

    /// Browser engine
    pub browser: Browser,
    pub headless: bool,
    pub viewport: Viewport,

    /// Default timeout handed to the automation engine
    pub timeout_ms: u64,

    /// Directory containing the `playwright` node module (NODE_PATH)
    pub node_path: Option<PathBuf>,
}

impl Default for VerifyConfig {
    fn default() -> Self {
        Self {
            target_url: TARGET_URL.to_string(),
            form_selector: FORM_SELECTOR.to_string(),
            role_text: ROLE_TEXT.to_string(),
            select_selector: SELECT_SELECTOR.to_string(),
            text_input_selector: TEXT_INPUT_SELECTOR.to_string(),
            fill_value: FILL_VALUE.to_string(),
            success_screenshot: PathBuf::from(SUCCESS_SCREENSHOT),
            error_screenshot: PathBuf::from(ERROR_SCREENSHOT),
            browser: Browser::Chromium,
            headless: true,
            viewport: Viewport::default(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
            node_path: None,
        }
    }
}
