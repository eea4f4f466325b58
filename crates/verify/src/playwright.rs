//! Playwright browser automation
//!
//! A single `node` process runs an embedded bridge script for the lifetime of
//! a session. Requests and responses are newline-delimited JSON objects on the
//! child's stdin/stdout, correlated by `id`.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::{debug, info, warn};

use crate::config::{Browser, VerifyConfig, Viewport};
use crate::error::{VerifyError, VerifyResult};
use crate::session::{BrowserLauncher, BrowserSession, Query};

/// Extra time the Rust side waits beyond the engine's own timeout
const RESPONSE_GRACE: Duration = Duration::from_secs(10);

/// Bridge between the JSON line protocol and the Playwright API
const BRIDGE_SCRIPT: &str = r#"
const readline = require('readline');
const playwright = require('playwright');

let browser = null;
let page = null;

function send(msg) {
  process.stdout.write(JSON.stringify(msg) + '\n');
}

function locate(query) {
  if (query.kind === 'exact_text') {
    return page.getByText(query.value, { exact: true });
  }
  return page.locator(query.value);
}

function fail(kind, message) {
  const err = new Error(message);
  err.kind = kind;
  return err;
}

async function handle(req) {
  switch (req.op) {
    case 'launch': {
      browser = await playwright[req.browser].launch({ headless: req.headless });
      const context = await browser.newContext({ viewport: req.viewport });
      context.setDefaultTimeout(req.timeout_ms);
      context.setDefaultNavigationTimeout(req.timeout_ms);
      page = await context.newPage();
      return null;
    }
    case 'goto': {
      try {
        const response = await page.goto(req.url);
        return response ? response.status() : null;
      } catch (err) {
        throw fail('navigation', err.message);
      }
    }
    case 'wait_for_selector':
      await page.waitForSelector(req.selector);
      return null;
    case 'any_visible': {
      const matches = locate(req.query);
      const count = await matches.count();
      for (let i = 0; i < count; i++) {
        if (await matches.nth(i).isVisible()) {
          return true;
        }
      }
      return false;
    }
    case 'fill': {
      const target = locate(req.query);
      if ((await target.count()) === 0) {
        throw fail('not_found', 'no element matches ' + req.query.value);
      }
      await target.first().fill(req.value);
      return null;
    }
    case 'input_value': {
      const target = locate(req.query);
      if ((await target.count()) === 0) {
        throw fail('not_found', 'no element matches ' + req.query.value);
      }
      return await target.first().inputValue();
    }
    case 'screenshot':
      await page.screenshot({ path: req.path, fullPage: req.full_page });
      return null;
    case 'close':
      if (browser) {
        await browser.close();
        browser = null;
      }
      return null;
    default:
      throw fail('protocol', 'unknown op: ' + req.op);
  }
}

let queue = Promise.resolve();
const rl = readline.createInterface({ input: process.stdin });

rl.on('line', (line) => {
  queue = queue.then(async () => {
    let req;
    try {
      req = JSON.parse(line);
    } catch (err) {
      send({ id: null, ok: false, kind: 'protocol', message: err.message });
      return;
    }
    try {
      const value = await handle(req);
      send({ id: req.id, ok: true, value: value === undefined ? null : value });
    } catch (err) {
      let kind = err.kind;
      if (!kind) {
        kind = err.name === 'TimeoutError' ? 'timeout' : 'other';
      }
      send({ id: req.id, ok: false, kind, message: String((err && err.message) || err) });
    }
  });
});

rl.on('close', () => {
  queue = queue.then(async () => {
    if (browser) {
      await browser.close();
    }
  });
});
"#;

/// Configuration for Playwright
#[derive(Debug, Clone)]
pub struct PlaywrightConfig {
    pub browser: Browser,
    pub headless: bool,
    pub viewport: Viewport,
    pub timeout_ms: u64,
    pub node_path: Option<PathBuf>,

    /// Resolve the `playwright` module before launching
    pub check_installed: bool,
}

impl Default for PlaywrightConfig {
    fn default() -> Self {
        Self::from(&VerifyConfig::default())
    }
}

impl From<&VerifyConfig> for PlaywrightConfig {
    fn from(config: &VerifyConfig) -> Self {
        Self {
            browser: config.browser,
            headless: config.headless,
            viewport: config.viewport,
            timeout_ms: config.timeout_ms,
            node_path: config.node_path.clone(),
            check_installed: true,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum BridgeOp<'a> {
    Launch {
        browser: &'static str,
        headless: bool,
        timeout_ms: u64,
        viewport: Viewport,
    },
    Goto {
        url: &'a str,
    },
    WaitForSelector {
        selector: &'a str,
    },
    AnyVisible {
        query: &'a Query,
    },
    Fill {
        query: &'a Query,
        value: &'a str,
    },
    InputValue {
        query: &'a Query,
    },
    Screenshot {
        path: String,
        full_page: bool,
    },
    Close,
}

#[derive(Debug, Serialize)]
struct Request<'a> {
    id: u64,
    #[serde(flatten)]
    op: BridgeOp<'a>,
}

#[derive(Debug, Deserialize)]
struct Response {
    id: Option<u64>,
    ok: bool,
    #[serde(default)]
    value: serde_json::Value,
    #[serde(default)]
    kind: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

impl Response {
    /// Turn a bridge reply into a result. `subject` is the URL or selector the
    /// request was about.
    fn into_result(self, subject: &str) -> VerifyResult<serde_json::Value> {
        if self.ok {
            return Ok(self.value);
        }

        let message = self.message.unwrap_or_default();
        // Playwright messages carry a multi-line call log after the summary
        let reason = message.lines().next().unwrap_or("").trim().to_string();

        Err(match self.kind.as_deref() {
            Some("navigation") => VerifyError::Navigation {
                url: subject.to_string(),
                reason,
            },
            Some("timeout") => VerifyError::Timeout(format!("{} ({})", subject, reason)),
            Some("not_found") => VerifyError::ElementNotFound(subject.to_string()),
            _ => VerifyError::Driver(reason),
        })
    }
}

/// Launches Playwright-backed sessions
#[derive(Debug, Clone, Default)]
pub struct PlaywrightLauncher {
    config: PlaywrightConfig,
}

impl PlaywrightLauncher {
    pub fn new(config: PlaywrightConfig) -> Self {
        Self { config }
    }

    /// Check that `require('playwright')` resolves for a script living in
    /// `script_dir`, with the same NODE_PATH the bridge gets. Nothing is
    /// installed or downloaded.
    pub async fn check_playwright_installed(&self, script_dir: &Path) -> VerifyResult<()> {
        let mut cmd = self.node_command();
        cmd.args(["-e", "require.resolve('playwright')"])
            .current_dir(script_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        match cmd.status().await {
            Ok(status) if status.success() => Ok(()),
            Ok(status) => {
                debug!("playwright module did not resolve ({})", status);
                Err(VerifyError::DriverNotFound)
            }
            Err(e) => {
                debug!("Cannot run node: {}", e);
                Err(VerifyError::DriverNotFound)
            }
        }
    }

    /// `node` with the bridge's NODE_PATH applied
    fn node_command(&self) -> Command {
        let mut cmd = Command::new("node");
        if let Some(node_path) = self.node_path() {
            cmd.env("NODE_PATH", node_path);
        }
        cmd
    }

    /// NODE_PATH for the bridge: configured value, else an inherited
    /// NODE_PATH, else `./node_modules` when present.
    fn node_path(&self) -> Option<PathBuf> {
        if let Some(path) = &self.config.node_path {
            return Some(path.clone());
        }
        if std::env::var_os("NODE_PATH").is_some() {
            return None;
        }
        std::fs::canonicalize("node_modules")
            .ok()
            .filter(|p| p.is_dir())
    }
}

#[async_trait]
impl BrowserLauncher for PlaywrightLauncher {
    type Session = PlaywrightSession;

    async fn launch(&self) -> VerifyResult<PlaywrightSession> {
        let script_dir = tempfile::tempdir()?;
        if self.config.check_installed {
            self.check_playwright_installed(script_dir.path()).await?;
        }

        let script_path = script_dir.path().join("bridge.js");
        tokio::fs::write(&script_path, BRIDGE_SCRIPT).await?;

        debug!("Starting Playwright bridge: {}", script_path.display());

        let mut cmd = self.node_command();
        cmd.arg(&script_path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => VerifyError::DriverNotFound,
            _ => VerifyError::Io(e),
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| VerifyError::Driver("bridge stdin unavailable".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| VerifyError::Driver("bridge stdout unavailable".into()))?;
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(target: "playwright", "{}", line);
                }
            });
        }

        let mut session = PlaywrightSession {
            child,
            stdin: Some(stdin),
            stdout: BufReader::new(stdout).lines(),
            next_id: 0,
            response_timeout: Duration::from_millis(self.config.timeout_ms) + RESPONSE_GRACE,
            closed: false,
            _script_dir: script_dir,
        };

        let browser = self.config.browser.as_str();
        session
            .request(
                BridgeOp::Launch {
                    browser,
                    headless: self.config.headless,
                    timeout_ms: self.config.timeout_ms,
                    viewport: self.config.viewport,
                },
                browser,
            )
            .await?;

        info!("Launched {} (headless: {})", browser, self.config.headless);
        Ok(session)
    }
}

/// Playwright browser handle
pub struct PlaywrightSession {
    child: Child,
    stdin: Option<ChildStdin>,
    stdout: Lines<BufReader<ChildStdout>>,
    next_id: u64,
    response_timeout: Duration,
    closed: bool,

    /// Holds the bridge script until the session is gone
    _script_dir: TempDir,
}

impl PlaywrightSession {
    async fn request(&mut self, op: BridgeOp<'_>, subject: &str) -> VerifyResult<serde_json::Value> {
        self.next_id += 1;
        let id = self.next_id;

        let mut line = serde_json::to_string(&Request { id, op })?;
        line.push('\n');
        debug!("-> {}", line.trim_end());

        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| VerifyError::Driver("session already closed".into()))?;
        stdin.write_all(line.as_bytes()).await?;
        stdin.flush().await?;

        let wait = self.response_timeout;
        let response = tokio::time::timeout(wait, self.read_response(id))
            .await
            .map_err(|_| {
                VerifyError::Driver(format!("no response from bridge within {} ms", wait.as_millis()))
            })??;

        response.into_result(subject)
    }

    async fn read_response(&mut self, id: u64) -> VerifyResult<Response> {
        loop {
            let line = self
                .stdout
                .next_line()
                .await?
                .ok_or_else(|| VerifyError::Driver("Playwright bridge exited unexpectedly".into()))?;

            match serde_json::from_str::<Response>(&line) {
                Ok(response) if response.id == Some(id) => {
                    debug!("<- {}", line);
                    return Ok(response);
                }
                Ok(response) if response.id.is_none() => {
                    return Err(VerifyError::Driver(response.message.unwrap_or_default()));
                }
                // Stray output from the bridge or a late reply
                _ => debug!("bridge: {}", line),
            }
        }
    }
}

#[async_trait]
impl BrowserSession for PlaywrightSession {
    async fn goto(&mut self, url: &str) -> VerifyResult<()> {
        let status = self.request(BridgeOp::Goto { url }, url).await?;
        debug!("Loaded {} (status: {})", url, status);
        Ok(())
    }

    async fn wait_for_selector(&mut self, selector: &str) -> VerifyResult<()> {
        self.request(BridgeOp::WaitForSelector { selector }, selector).await?;
        Ok(())
    }

    async fn any_visible(&mut self, query: &Query) -> VerifyResult<bool> {
        let subject = query.to_string();
        let value = self.request(BridgeOp::AnyVisible { query }, &subject).await?;
        value
            .as_bool()
            .ok_or_else(|| VerifyError::Driver(format!("expected boolean, got {}", value)))
    }

    async fn fill(&mut self, query: &Query, value: &str) -> VerifyResult<()> {
        let subject = query.to_string();
        self.request(BridgeOp::Fill { query, value }, &subject).await?;
        Ok(())
    }

    async fn input_value(&mut self, query: &Query) -> VerifyResult<String> {
        let subject = query.to_string();
        let value = self.request(BridgeOp::InputValue { query }, &subject).await?;
        value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| VerifyError::Driver(format!("expected string, got {}", value)))
    }

    async fn screenshot(&mut self, path: &Path) -> VerifyResult<()> {
        let path = path.to_string_lossy().to_string();
        let subject = path.clone();
        self.request(BridgeOp::Screenshot { path, full_page: true }, &subject).await?;
        Ok(())
    }

    async fn close(&mut self) -> VerifyResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        let result = self.request(BridgeOp::Close, "close").await.map(|_| ());

        // EOF on stdin lets the bridge exit on its own
        drop(self.stdin.take());
        match tokio::time::timeout(RESPONSE_GRACE, self.child.wait()).await {
            Ok(Ok(status)) => debug!("Playwright bridge exited: {}", status),
            Ok(Err(e)) => warn!("Failed to reap Playwright bridge: {}", e),
            Err(_) => {
                warn!("Playwright bridge did not exit, killing it");
                let _ = self.child.kill().await;
            }
        }

        result
    }
}
