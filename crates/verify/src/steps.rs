//! The user setup verification procedure as a list of steps

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::config::VerifyConfig;
use crate::session::Query;

/// A single step of the procedure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum VerificationStep {
    /// Load the page under test
    Navigate { url: String },

    /// Wait for an element to appear
    WaitFor { selector: String },

    /// Fail if any element matching `query` is visible
    AssertNotVisible { query: Query, description: String },

    /// Fill the first element matching `query`
    Fill { query: Query, value: String },

    /// Save a full-page screenshot
    Screenshot { path: PathBuf },
}

impl VerificationStep {
    pub fn name(&self) -> String {
        match self {
            VerificationStep::Navigate { url } => format!("navigate:{}", url),
            VerificationStep::WaitFor { selector } => format!("wait:{}", selector),
            VerificationStep::AssertNotVisible { query, .. } => format!("assert_not_visible:{}", query),
            VerificationStep::Fill { query, .. } => format!("fill:{}", query),
            VerificationStep::Screenshot { path } => format!("screenshot:{}", path.display()),
        }
    }
}

/// Steps for the user setup form, in execution order.
pub fn user_setup(config: &VerifyConfig) -> Vec<VerificationStep> {
    vec![
        VerificationStep::Navigate {
            url: config.target_url.clone(),
        },
        VerificationStep::WaitFor {
            selector: config.form_selector.clone(),
        },
        // A setup form must not offer role selection
        VerificationStep::AssertNotVisible {
            query: Query::exact_text(&config.role_text),
            description: format!("\"{}\" label", config.role_text),
        },
        VerificationStep::AssertNotVisible {
            query: Query::css(&config.select_selector),
            description: "select control".to_string(),
        },
        VerificationStep::Fill {
            query: Query::css(&config.text_input_selector),
            value: config.fill_value.clone(),
        },
        VerificationStep::Screenshot {
            path: config.success_screenshot.clone(),
        },
    ]
}
