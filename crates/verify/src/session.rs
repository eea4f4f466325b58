//! Browser session seam
//!
//! The runner only needs a handful of page operations. They are expressed as
//! a trait so the procedure can run against Playwright in production and
//! against an in-memory page in tests.

use std::fmt;
use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::VerifyResult;

/// How to find elements on the page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Query {
    /// CSS selector
    Css(String),

    /// Elements whose visible text equals this string exactly
    ExactText(String),
}

impl Query {
    pub fn css(selector: impl Into<String>) -> Self {
        Query::Css(selector.into())
    }

    pub fn exact_text(text: impl Into<String>) -> Self {
        Query::ExactText(text.into())
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Query::Css(selector) => write!(f, "{}", selector),
            Query::ExactText(text) => write!(f, "text=\"{}\"", text),
        }
    }
}

/// An open page in a browser owned by a single verification run
#[async_trait]
pub trait BrowserSession: Send {
    /// Load `url` and wait for the response.
    async fn goto(&mut self, url: &str) -> VerifyResult<()>;

    /// Wait until an element matching `selector` appears on the page.
    async fn wait_for_selector(&mut self, selector: &str) -> VerifyResult<()>;

    /// Whether at least one element matching `query` is visible. Zero matches
    /// and hidden matches both answer `false`.
    async fn any_visible(&mut self, query: &Query) -> VerifyResult<bool>;

    /// Set the value of the first element matching `query`.
    async fn fill(&mut self, query: &Query, value: &str) -> VerifyResult<()>;

    /// Current value of the first element matching `query`.
    async fn input_value(&mut self, query: &Query) -> VerifyResult<String>;

    /// Save a full-page screenshot to `path`.
    async fn screenshot(&mut self, path: &Path) -> VerifyResult<()>;

    /// Close the browser. Called exactly once per run.
    async fn close(&mut self) -> VerifyResult<()>;
}

/// Acquires browser sessions
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    type Session: BrowserSession;

    async fn launch(&self) -> VerifyResult<Self::Session>;
}
