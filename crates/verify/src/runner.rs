//! Verification runner: owns the browser session for one run and walks the
//! user setup procedure

use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::artifact::{ensure_parent_dir, ScreenshotArtifact};
use crate::config::VerifyConfig;
use crate::error::{VerificationFailure, VerifyError, VerifyResult};
use crate::session::{BrowserLauncher, BrowserSession};
use crate::steps::{self, VerificationStep};

/// Result of executing a single step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepRecord {
    pub name: String,
    pub success: bool,
    pub duration_ms: u64,
    pub error: Option<String>,
}

/// Everything observed during one run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationReport {
    pub target_url: String,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub success: bool,
    pub steps: Vec<StepRecord>,

    /// Success screenshot
    pub screenshot: Option<ScreenshotArtifact>,

    /// Error screenshot
    pub diagnostic: Option<PathBuf>,

    pub error_kind: Option<String>,
    pub error: Option<String>,
}

impl VerificationReport {
    /// Empty report for a run that has not executed any step yet
    pub fn new(target_url: &str) -> Self {
        Self {
            target_url: target_url.to_string(),
            started_at: Utc::now(),
            duration_ms: 0,
            success: false,
            steps: Vec::new(),
            screenshot: None,
            diagnostic: None,
            error_kind: None,
            error: None,
        }
    }

    fn fail(&mut self, error: &VerifyError) {
        self.success = false;
        self.error_kind = Some(error.kind().to_string());
        self.error = Some(error.to_string());
    }

    /// Write the report as pretty JSON
    pub fn write(&self, path: &Path) -> VerifyResult<()> {
        ensure_parent_dir(path)?;
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        info!("Report written to: {}", path.display());
        Ok(())
    }
}

/// Runs the user setup verification against sessions from `L`
pub struct Verifier<L> {
    launcher: L,
    config: VerifyConfig,
}

impl<L: BrowserLauncher> Verifier<L> {
    pub fn new(launcher: L, config: VerifyConfig) -> Self {
        Self { launcher, config }
    }

    pub fn config(&self) -> &VerifyConfig {
        &self.config
    }

    /// Run the procedure once. The session is closed exactly once whatever
    /// happens after it was launched; on failure the error screenshot is taken
    /// before that and the original error is returned.
    pub async fn run(&self) -> Result<VerificationReport, VerificationFailure> {
        let start = Instant::now();
        let mut report = VerificationReport::new(&self.config.target_url);

        info!("Verifying {}", self.config.target_url);
        self.clear_stale_artifacts();

        let mut session = match self.launcher.launch().await {
            Ok(session) => session,
            Err(error) => {
                error!("Failed to launch browser: {}", error);
                report.fail(&error);
                report.duration_ms = start.elapsed().as_millis() as u64;
                return Err(VerificationFailure {
                    error,
                    diagnostic: None,
                    report,
                });
            }
        };

        let result = self.execute(&mut session, &mut report).await;

        let diagnostic = match &result {
            Ok(()) => None,
            Err(e) => {
                error!("Verification failed: {}", e);
                self.capture_diagnostic(&mut session).await
            }
        };

        if let Err(e) = session.close().await {
            warn!("Failed to close browser: {}", e);
        }

        report.duration_ms = start.elapsed().as_millis() as u64;
        report.diagnostic = diagnostic.clone();

        match result {
            Ok(()) => {
                report.success = true;
                info!("✓ User setup verified ({} ms)", report.duration_ms);
                Ok(report)
            }
            Err(error) => {
                report.fail(&error);
                Err(VerificationFailure {
                    error,
                    diagnostic,
                    report,
                })
            }
        }
    }

    /// Execute every step in order, stopping at the first failure
    async fn execute(&self, session: &mut L::Session, report: &mut VerificationReport) -> VerifyResult<()> {
        for step in steps::user_setup(&self.config) {
            let step_start = Instant::now();
            let name = step.name();
            debug!("Executing step: {}", name);

            let result = self.execute_step(session, &step).await;
            let duration_ms = step_start.elapsed().as_millis() as u64;

            match result {
                Ok(artifact) => {
                    info!("✓ {} ({} ms)", name, duration_ms);
                    if artifact.is_some() {
                        report.screenshot = artifact;
                    }
                    report.steps.push(StepRecord {
                        name,
                        success: true,
                        duration_ms,
                        error: None,
                    });
                }
                Err(e) => {
                    error!("✗ {} - {}", name, e);
                    report.steps.push(StepRecord {
                        name,
                        success: false,
                        duration_ms,
                        error: Some(e.to_string()),
                    });
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    async fn execute_step(
        &self,
        session: &mut L::Session,
        step: &VerificationStep,
    ) -> VerifyResult<Option<ScreenshotArtifact>> {
        match step {
            VerificationStep::Navigate { url } => {
                session.goto(url).await?;
                Ok(None)
            }
            VerificationStep::WaitFor { selector } => {
                session.wait_for_selector(selector).await?;
                Ok(None)
            }
            VerificationStep::AssertNotVisible { query, description } => {
                if session.any_visible(query).await? {
                    return Err(VerifyError::Assertion(format!(
                        "{} ({}) is visible",
                        description, query
                    )));
                }
                Ok(None)
            }
            VerificationStep::Fill { query, value } => {
                session.fill(query, value).await?;
                let actual = session.input_value(query).await?;
                if actual != *value {
                    return Err(VerifyError::Assertion(format!(
                        "{} holds \"{}\" after filling \"{}\"",
                        query, actual, value
                    )));
                }
                Ok(None)
            }
            VerificationStep::Screenshot { path } => {
                ensure_parent_dir(path)?;
                let captured = match session.screenshot(path).await {
                    Ok(()) => ScreenshotArtifact::inspect(path),
                    Err(e) => Err(e),
                };
                match captured {
                    Ok(artifact) => {
                        info!("Screenshot saved: {} ({} bytes)", path.display(), artifact.bytes);
                        Ok(Some(artifact))
                    }
                    Err(e) => {
                        // A partial capture is not a success artifact
                        discard(path);
                        Err(e)
                    }
                }
            }
        }
    }

    /// Best effort: a failing diagnostic never replaces the original error.
    async fn capture_diagnostic(&self, session: &mut L::Session) -> Option<PathBuf> {
        let path = &self.config.error_screenshot;
        if let Err(e) = ensure_parent_dir(path) {
            warn!("Cannot create directory for {}: {}", path.display(), e);
            return None;
        }
        match session.screenshot(path).await {
            Ok(()) => {
                info!("Error screenshot saved: {}", path.display());
                Some(path.clone())
            }
            Err(e) => {
                warn!("Failed to capture error screenshot: {}", e);
                None
            }
        }
    }

    /// Artifacts on disk describe the latest run only
    fn clear_stale_artifacts(&self) {
        for path in [&self.config.success_screenshot, &self.config.error_screenshot] {
            discard(path);
        }
    }
}

fn discard(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => debug!("Removed {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Cannot remove {}: {}", path.display(), e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Query;
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;
    use test_case::test_case;

    #[derive(Debug, Clone)]
    struct Element {
        tag: &'static str,
        input_type: Option<&'static str>,
        text: String,
        visible: bool,
        readonly: bool,
        value: String,
    }

    impl Element {
        fn new(tag: &'static str) -> Self {
            Self {
                tag,
                input_type: None,
                text: String::new(),
                visible: true,
                readonly: false,
                value: String::new(),
            }
        }

        fn text_input() -> Self {
            Self {
                input_type: Some("text"),
                ..Self::new("input")
            }
        }

        fn with_text(mut self, text: &str) -> Self {
            self.text = text.to_string();
            self
        }

        fn hidden(mut self) -> Self {
            self.visible = false;
            self
        }

        fn matches(&self, query: &Query) -> bool {
            match query {
                Query::ExactText(text) => self.text == *text,
                Query::Css(selector) if selector == "input[type='text']" => {
                    self.tag == "input" && self.input_type == Some("text")
                }
                Query::Css(selector) => self.tag == selector,
            }
        }
    }

    #[derive(Debug)]
    struct Page {
        reachable: bool,
        elements: Vec<Element>,
        screenshot_fails: bool,
        empty_screenshots: bool,
        launches: usize,
        closes: usize,
    }

    impl Page {
        /// `<form><input type="text"/></form>`
        fn setup_form() -> Self {
            Self {
                reachable: true,
                elements: vec![Element::new("form"), Element::text_input()],
                screenshot_fails: false,
                empty_screenshots: false,
                launches: 0,
                closes: 0,
            }
        }

        fn with(mut self, element: Element) -> Self {
            self.elements.push(element);
            self
        }

        fn input_value(&self) -> Option<String> {
            self.elements
                .iter()
                .find(|e| e.tag == "input")
                .map(|e| e.value.clone())
        }
    }

    struct FakeLauncher {
        page: Arc<Mutex<Page>>,
        fail_launch: bool,
    }

    struct FakeSession {
        page: Arc<Mutex<Page>>,
        loaded: bool,
    }

    #[async_trait]
    impl BrowserLauncher for FakeLauncher {
        type Session = FakeSession;

        async fn launch(&self) -> VerifyResult<FakeSession> {
            if self.fail_launch {
                return Err(VerifyError::DriverNotFound);
            }
            self.page.lock().unwrap().launches += 1;
            Ok(FakeSession {
                page: self.page.clone(),
                loaded: false,
            })
        }
    }

    #[async_trait]
    impl BrowserSession for FakeSession {
        async fn goto(&mut self, url: &str) -> VerifyResult<()> {
            if !self.page.lock().unwrap().reachable {
                return Err(VerifyError::Navigation {
                    url: url.to_string(),
                    reason: "net::ERR_CONNECTION_REFUSED".into(),
                });
            }
            self.loaded = true;
            Ok(())
        }

        async fn wait_for_selector(&mut self, selector: &str) -> VerifyResult<()> {
            let page = self.page.lock().unwrap();
            let query = Query::css(selector);
            if self.loaded && page.elements.iter().any(|e| e.visible && e.matches(&query)) {
                Ok(())
            } else {
                Err(VerifyError::Timeout(selector.to_string()))
            }
        }

        async fn any_visible(&mut self, query: &Query) -> VerifyResult<bool> {
            let page = self.page.lock().unwrap();
            Ok(page.elements.iter().any(|e| e.visible && e.matches(query)))
        }

        async fn fill(&mut self, query: &Query, value: &str) -> VerifyResult<()> {
            let mut page = self.page.lock().unwrap();
            match page.elements.iter_mut().find(|e| e.matches(query)) {
                Some(element) => {
                    if !element.readonly {
                        element.value = value.to_string();
                    }
                    Ok(())
                }
                None => Err(VerifyError::ElementNotFound(query.to_string())),
            }
        }

        async fn input_value(&mut self, query: &Query) -> VerifyResult<String> {
            let page = self.page.lock().unwrap();
            page.elements
                .iter()
                .find(|e| e.matches(query))
                .map(|e| e.value.clone())
                .ok_or_else(|| VerifyError::ElementNotFound(query.to_string()))
        }

        async fn screenshot(&mut self, path: &Path) -> VerifyResult<()> {
            let page = self.page.lock().unwrap();
            if page.screenshot_fails {
                return Err(VerifyError::Driver("screenshot failed".into()));
            }
            if page.empty_screenshots {
                std::fs::write(path, b"")?;
            } else {
                std::fs::write(path, b"\x89PNG\r\n\x1a\nfake")?;
            }
            Ok(())
        }

        async fn close(&mut self) -> VerifyResult<()> {
            self.page.lock().unwrap().closes += 1;
            Ok(())
        }
    }

    struct Harness {
        dir: TempDir,
        page: Arc<Mutex<Page>>,
        verifier: Verifier<FakeLauncher>,
    }

    impl Harness {
        fn new(page: Page) -> Self {
            Self::build(page, false)
        }

        fn build(page: Page, fail_launch: bool) -> Self {
            let dir = tempfile::tempdir().unwrap();
            let page = Arc::new(Mutex::new(page));
            let config = VerifyConfig {
                success_screenshot: dir.path().join("verification/user_setup_verification.png"),
                error_screenshot: dir.path().join("verification/error.png"),
                ..Default::default()
            };
            let launcher = FakeLauncher {
                page: page.clone(),
                fail_launch,
            };
            Self {
                dir,
                page,
                verifier: Verifier::new(launcher, config),
            }
        }

        fn success_path(&self) -> PathBuf {
            self.dir.path().join("verification/user_setup_verification.png")
        }

        fn error_path(&self) -> PathBuf {
            self.dir.path().join("verification/error.png")
        }

        fn closes(&self) -> usize {
            self.page.lock().unwrap().closes
        }
    }

    #[tokio::test]
    async fn test_clean_form_passes() {
        let harness = Harness::new(Page::setup_form());

        let report = harness.verifier.run().await.unwrap();

        assert!(report.success);
        assert_eq!(report.steps.len(), 6);
        assert!(report.steps.iter().all(|s| s.success));
        assert_eq!(harness.page.lock().unwrap().input_value().as_deref(), Some("Test User"));

        let written = std::fs::metadata(harness.success_path()).unwrap();
        assert!(written.len() > 0);
        assert!(!harness.error_path().exists());

        let artifact = report.screenshot.unwrap();
        assert_eq!(artifact.path, harness.success_path());
        assert_eq!(artifact.bytes, written.len());
        assert!(report.diagnostic.is_none());
        assert_eq!(harness.closes(), 1);
    }

    #[tokio::test]
    async fn test_visible_role_label_fails() {
        let harness = Harness::new(Page::setup_form().with(Element::new("label").with_text("Role")));

        let failure = harness.verifier.run().await.unwrap_err();

        assert!(matches!(failure.error, VerifyError::Assertion(_)));
        assert!(failure.error.to_string().contains("\"Role\" label"));
        assert_eq!(failure.diagnostic, Some(harness.error_path()));
        assert!(harness.error_path().exists());
        assert!(!harness.success_path().exists());
        assert_eq!(failure.report.error_kind.as_deref(), Some("assertion"));
        // stopped before filling
        assert_eq!(harness.page.lock().unwrap().input_value().as_deref(), Some(""));
        assert_eq!(harness.closes(), 1);
    }

    #[tokio::test]
    async fn test_hidden_role_label_passes() {
        let harness = Harness::new(Page::setup_form().with(Element::new("label").with_text("Role").hidden()));

        assert!(harness.verifier.run().await.is_ok());
        assert!(harness.success_path().exists());
    }

    #[tokio::test]
    async fn test_role_match_is_exact() {
        let harness = Harness::new(Page::setup_form().with(Element::new("label").with_text("Roles")));

        assert!(harness.verifier.run().await.is_ok());
    }

    #[tokio::test]
    async fn test_visible_select_fails() {
        let harness = Harness::new(Page::setup_form().with(Element::new("select")));

        let failure = harness.verifier.run().await.unwrap_err();

        assert!(matches!(failure.error, VerifyError::Assertion(_)));
        assert!(failure.error.to_string().contains("select control"));
        assert!(harness.error_path().exists());
        assert!(!harness.success_path().exists());
        assert_eq!(harness.closes(), 1);
    }

    #[tokio::test]
    async fn test_hidden_select_passes() {
        let harness = Harness::new(Page::setup_form().with(Element::new("select").hidden()));

        assert!(harness.verifier.run().await.is_ok());
    }

    #[tokio::test]
    async fn test_unreachable_page_is_navigation_error() {
        let mut page = Page::setup_form();
        page.reachable = false;
        let harness = Harness::new(page);

        let failure = harness.verifier.run().await.unwrap_err();

        assert!(matches!(failure.error, VerifyError::Navigation { .. }));
        assert!(harness.error_path().exists());
        assert_eq!(failure.report.steps.len(), 1);
        assert_eq!(harness.closes(), 1);
    }

    #[tokio::test]
    async fn test_missing_form_times_out() {
        let mut page = Page::setup_form();
        page.elements.retain(|e| e.tag != "form");
        let harness = Harness::new(page);

        let failure = harness.verifier.run().await.unwrap_err();

        assert!(matches!(failure.error, VerifyError::Timeout(_)));
        assert_eq!(harness.closes(), 1);
    }

    #[tokio::test]
    async fn test_missing_text_input_is_element_not_found() {
        let mut page = Page::setup_form();
        page.elements.retain(|e| e.tag != "input");
        let harness = Harness::new(page);

        let failure = harness.verifier.run().await.unwrap_err();

        assert!(matches!(failure.error, VerifyError::ElementNotFound(_)));
        assert!(!harness.success_path().exists());
        assert_eq!(harness.closes(), 1);
    }

    #[tokio::test]
    async fn test_failed_diagnostic_keeps_original_error() {
        let mut page = Page::setup_form().with(Element::new("select"));
        page.screenshot_fails = true;
        let harness = Harness::new(page);

        let failure = harness.verifier.run().await.unwrap_err();

        assert!(matches!(failure.error, VerifyError::Assertion(_)));
        assert!(failure.diagnostic.is_none());
        assert!(!harness.error_path().exists());
        assert_eq!(harness.closes(), 1);
    }

    #[tokio::test]
    async fn test_empty_success_screenshot_is_discarded() {
        let mut page = Page::setup_form();
        page.empty_screenshots = true;
        let harness = Harness::new(page);

        let failure = harness.verifier.run().await.unwrap_err();

        assert!(matches!(failure.error, VerifyError::Driver(_)));
        assert!(failure.report.screenshot.is_none());
        assert!(!harness.success_path().exists());
        assert_eq!(harness.closes(), 1);
    }

    #[tokio::test]
    async fn test_fill_that_does_not_stick_fails() {
        let mut input = Element::text_input();
        input.readonly = true;
        let page = Page {
            elements: vec![Element::new("form"), input],
            ..Page::setup_form()
        };
        let harness = Harness::new(page);

        let failure = harness.verifier.run().await.unwrap_err();

        assert!(matches!(failure.error, VerifyError::Assertion(_)));
        assert!(failure.error.to_string().contains("Test User"));
        assert!(!harness.success_path().exists());
        assert_eq!(harness.closes(), 1);
    }

    #[tokio::test]
    async fn test_launch_failure_has_nothing_to_close() {
        let harness = Harness::build(Page::setup_form(), true);

        let failure = harness.verifier.run().await.unwrap_err();

        assert!(matches!(failure.error, VerifyError::DriverNotFound));
        assert!(failure.diagnostic.is_none());
        assert!(failure.report.steps.is_empty());
        assert_eq!(harness.closes(), 0);
    }

    #[test_case(Page::setup_form() ; "clean form")]
    #[test_case(Page::setup_form().with(Element::new("label").with_text("Role")) ; "visible role")]
    #[test_case(Page::setup_form().with(Element::new("select")) ; "visible select")]
    #[test_case(Page { reachable: false, ..Page::setup_form() } ; "unreachable")]
    #[test_case(Page { elements: vec![Element::new("form")], ..Page::setup_form() } ; "no text input")]
    #[test_case(Page { screenshot_fails: true, ..Page::setup_form() } ; "screenshot fails")]
    #[tokio::test]
    async fn test_session_closed_exactly_once(page: Page) {
        let harness = Harness::new(page);

        let _ = harness.verifier.run().await;

        let page = harness.page.lock().unwrap();
        assert_eq!(page.launches, 1);
        assert_eq!(page.closes, 1);
    }

    #[tokio::test]
    async fn test_repeated_runs_agree() {
        let passing = Harness::new(Page::setup_form());
        assert!(passing.verifier.run().await.is_ok());
        assert!(passing.verifier.run().await.is_ok());

        let failing = Harness::new(Page::setup_form().with(Element::new("select")));
        let first = failing.verifier.run().await.unwrap_err();
        let second = failing.verifier.run().await.unwrap_err();
        assert_eq!(first.error.kind(), second.error.kind());
        assert_eq!(first.report.steps.len(), second.report.steps.len());
        assert_eq!(failing.closes(), 2);
    }

    #[tokio::test]
    async fn test_stale_success_screenshot_removed_on_failure() {
        let harness = Harness::new(Page::setup_form());
        harness.verifier.run().await.unwrap();
        assert!(harness.success_path().exists());

        harness
            .page
            .lock()
            .unwrap()
            .elements
            .push(Element::new("label").with_text("Role"));
        harness.verifier.run().await.unwrap_err();

        assert!(!harness.success_path().exists());
        assert!(harness.error_path().exists());
    }

    #[tokio::test]
    async fn test_report_written_as_json() {
        let harness = Harness::new(Page::setup_form());
        let report = harness.verifier.run().await.unwrap();

        let path = harness.dir.path().join("reports/run.json");
        report.write(&path).unwrap();

        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["target_url"], "http://localhost:5173/verify_setup.html");
        assert_eq!(json["steps"].as_array().unwrap().len(), 6);
    }
}
