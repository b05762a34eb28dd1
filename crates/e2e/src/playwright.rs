//! Playwright-backed [`UiDriver`]
//!
//! Rust generates a small Node bridge script, runs it as one long-lived
//! child process and speaks newline-delimited JSON with it: commands go in
//! on stdin, replies and page events come back on stdout. A reader task
//! routes replies to the waiting request and fans `response` events out to
//! matching subscriptions.

use async_trait::async_trait;
use parking_lot::Mutex;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command as TokioCommand};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::driver::{
    BoundingBox, DialogPolicy, NetworkResponse, ResponseSubscription, UiDriver, WaitState,
};
use crate::error::{E2eError, E2eResult};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Browser {
    #[default]
    Chromium,
    Firefox,
    Webkit,
}

impl Browser {
    fn as_str(&self) -> &'static str {
        match self {
            Browser::Chromium => "chromium",
            Browser::Firefox => "firefox",
            Browser::Webkit => "webkit",
        }
    }
}

impl std::str::FromStr for Browser {
    type Err = E2eError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "chromium" => Ok(Browser::Chromium),
            "firefox" => Ok(Browser::Firefox),
            "webkit" => Ok(Browser::Webkit),
            other => Err(E2eError::InvalidRequest(format!("unknown browser '{}'", other))),
        }
    }
}

/// Configuration for Playwright
#[derive(Debug, Clone)]
pub struct PlaywrightConfig {
    pub base_url: String,
    pub viewport_width: u32,
    pub viewport_height: u32,
    pub browser: Browser,
    pub headless: bool,
    /// Default timeout for actions without an explicit one
    pub action_timeout: Duration,
    /// Time allowed for the browser to launch
    pub launch_timeout: Duration,
}

impl Default for PlaywrightConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:3000".to_string(),
            viewport_width: 1280,
            viewport_height: 720,
            browser: Browser::Chromium,
            headless: true,
            action_timeout: Duration::from_secs(5),
            launch_timeout: Duration::from_secs(30),
        }
    }
}

const BRIDGE_TEMPLATE: &str = r#"
const { chromium, firefox, webkit } = require('playwright');
const readline = require('readline');

const emit = (msg) => process.stdout.write(JSON.stringify(msg) + '\n');

(async () => {
  const browser = await __BROWSER__.launch({ headless: __HEADLESS__ });
  const context = await browser.newContext({
    viewport: { width: __WIDTH__, height: __HEIGHT__ }
  });
  const page = await context.newPage();
  const baseUrl = __BASE_URL__;
  let dialogPolicy = 'accept';

  page.on('dialog', async (dialog) => {
    emit({ event: 'dialog', kind: dialog.type(), message: dialog.message() });
    if (dialogPolicy === 'dismiss') {
      await dialog.dismiss();
    } else {
      await dialog.accept();
    }
  });
  page.on('response', (response) => {
    emit({
      event: 'response',
      url: response.url(),
      status: response.status(),
      method: response.request().method()
    });
  });

  const first = (selector) => page.locator(selector).first();
  const ops = {
    navigate: async (c) => {
      await page.goto(/^https?:/.test(c.url) ? c.url : baseUrl + c.url);
      return null;
    },
    click: async (c) => { await first(c.selector).click({ timeout: c.timeout }); return null; },
    fill: async (c) => {
      await first(c.selector).fill(c.text, { timeout: c.timeout });
      return null;
    },
    press: async (c) => { await page.keyboard.press(c.key); return null; },
    wait_for: async (c) => {
      await first(c.selector).waitFor({ state: c.state, timeout: c.timeout });
      return null;
    },
    text: async (c) => {
      if (await page.locator(c.selector).count() === 0) return null;
      return await first(c.selector).textContent();
    },
    all_texts: async (c) => await page.locator(c.selector).allTextContents(),
    visible: async (c) => await first(c.selector).isVisible(),
    bounding_box: async (c) => {
      if (await page.locator(c.selector).count() === 0) return null;
      return await first(c.selector).boundingBox();
    },
    attribute: async (c) => {
      if (await page.locator(c.selector).count() === 0) return null;
      return await first(c.selector).getAttribute(c.name);
    },
    screenshot: async (c) => {
      await page.screenshot({ path: c.path, fullPage: true });
      return null;
    },

    dialog_policy: async (c) => { dialogPolicy = c.policy; return null; }
  };

  emit({ event: 'ready' });

  const rl = readline.createInterface({ input: process.stdin });
  for await (const line of rl) {
    if (!line.trim()) continue;
    const cmd = JSON.parse(line);
    if (cmd.op === 'close') break;
    try {
      const value = await ops[cmd.op](cmd);
      emit({ id: cmd.id, ok: true, value: value === undefined ? null : value });
    } catch (error) {
      emit({ id: cmd.id, ok: false, error: error.message, timeout: error.name === 'TimeoutError' });
    }
  }

  await browser.close();
})().catch((error) => {
  emit({ event: 'fatal', message: error.message });
  process.exit(1);
});
"#;

/// Command sent to the bridge
#[derive(Debug, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum BridgeOp<'a> {
    Navigate { url: &'a str },
    Click { selector: &'a str, timeout: u64 },
    Fill { selector: &'a str, text: &'a str, timeout: u64 },
    Press { key: &'a str },
    WaitFor { selector: &'a str, state: &'static str, timeout: u64 },
    Text { selector: &'a str },
    AllTexts { selector: &'a str },
    Visible { selector: &'a str },
    BoundingBox { selector: &'a str },
    Attribute { selector: &'a str, name: &'a str },
    Screenshot { path: &'a str },
    DialogPolicy { policy: DialogPolicy },
    Close,
}

impl BridgeOp<'_> {
    fn describe(&self) -> String {
        match self {
            BridgeOp::Navigate { url } => format!("navigate:{}", url),
            BridgeOp::Click { selector, .. } => format!("click:{}", selector),
            BridgeOp::Fill { selector, .. } => format!("fill:{}", selector),
            BridgeOp::Press { key } => format!("press:{}", key),
            BridgeOp::WaitFor { selector, state, .. } => format!("wait:{}:{}", selector, state),
            BridgeOp::Text { selector } => format!("text:{}", selector),
            BridgeOp::AllTexts { selector } => format!("all_texts:{}", selector),
            BridgeOp::Visible { selector } => format!("visible:{}", selector),
            BridgeOp::BoundingBox { selector } => format!("bounding_box:{}", selector),
            BridgeOp::Attribute { selector, name } => format!("attribute:{}@{}", selector, name),
            BridgeOp::Screenshot { path } => format!("screenshot:{}", path),
            BridgeOp::DialogPolicy { policy } => format!("dialog_policy:{:?}", policy),
            BridgeOp::Close => "close".to_string(),
        }
    }

    /// Timeout the bridge applies itself, if any.
    fn timeout_ms(&self) -> Option<u64> {
        match self {
            BridgeOp::Click { timeout, .. }
            | BridgeOp::Fill { timeout, .. }
            | BridgeOp::WaitFor { timeout, .. } => Some(*timeout),
            _ => None,
        }
    }
}

#[derive(Debug, Serialize)]
struct BridgeCommand<'a> {
    id: u64,
    #[serde(flatten)]
    op: &'a BridgeOp<'a>,
}

#[derive(Debug, Deserialize)]
struct BridgeReply {
    ok: bool,
    #[serde(default)]
    value: serde_json::Value,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    timeout: bool,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum BridgeEvent {
    Ready,
    Response { url: String, status: u16, method: String },
    Dialog { kind: String, message: String },
    Fatal { message: String },
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum BridgeMessage {
    Reply {
        id: u64,
        #[serde(flatten)]
        reply: BridgeReply,
    },
    Event(BridgeEvent),
}

struct Subscriber {
    pattern: Regex,
    tx: mpsc::UnboundedSender<NetworkResponse>,
}

type Pending = Arc<Mutex<HashMap<u64, oneshot::Sender<BridgeReply>>>>;
type Subscribers = Arc<Mutex<Vec<Subscriber>>>;

/// Playwright browser handle
pub struct PlaywrightDriver {
    config: PlaywrightConfig,
    child: tokio::sync::Mutex<Child>,
    stdin: tokio::sync::Mutex<ChildStdin>,
    pending: Pending,
    subscribers: Subscribers,
    next_id: AtomicU64,
    reader: JoinHandle<()>,
    _script_dir: tempfile::TempDir,
}

impl PlaywrightDriver {
    /// Launch a browser and wait until the bridge reports ready.
    pub async fn launch(config: PlaywrightConfig) -> E2eResult<Self> {
        Self::check_playwright_installed()?;

        let script_dir = tempfile::tempdir()?;
        let script_path = script_dir.path().join("bridge.js");
        std::fs::write(&script_path, Self::build_script(&config)?)?;
        debug!("Launching Playwright bridge: {}", script_path.display());

        let mut child = TokioCommand::new("node")
            .arg(&script_path)
            .current_dir(std::env::current_dir()?)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| E2eError::Driver("bridge stdin unavailable".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| E2eError::Driver("bridge stdout unavailable".to_string()))?;

        let pending: Pending = Arc::new(Mutex::new(HashMap::new()));
        let subscribers: Subscribers = Arc::new(Mutex::new(Vec::new()));
        let (ready_tx, ready_rx) = oneshot::channel();
        let reader =
            tokio::spawn(read_bridge(stdout, pending.clone(), subscribers.clone(), ready_tx));

        match tokio::time::timeout(config.launch_timeout, ready_rx).await {
            Ok(Ok(Ok(()))) => {}
            Ok(Ok(Err(message))) => {
                return Err(E2eError::Driver(format!("browser launch failed: {}", message)));
            }
            Ok(Err(_)) => {
                return Err(E2eError::Driver(
                    "bridge exited before becoming ready".to_string(),
                ));
            }
            Err(_) => return Err(E2eError::timeout("browser launch", config.launch_timeout)),
        }

        info!(
            "Playwright {} ready ({}x{}, headless: {})",
            config.browser.as_str(),
            config.viewport_width,
            config.viewport_height,
            config.headless
        );

        Ok(Self {
            config,
            child: tokio::sync::Mutex::new(child),
            stdin: tokio::sync::Mutex::new(stdin),
            pending,
            subscribers,
            next_id: AtomicU64::new(1),
            reader,
            _script_dir: script_dir,
        })
    }

    /// Check if Playwright is installed
    fn check_playwright_installed() -> E2eResult<()> {
        let output = Command::new("npx")
            .args(["playwright", "--version"])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();

        match output {
            Ok(status) if status.success() => Ok(()),
            _ => Err(E2eError::PlaywrightNotFound),
        }
    }

    /// Render the bridge script for `config`.
    pub fn build_script(config: &PlaywrightConfig) -> E2eResult<String> {
        Ok(BRIDGE_TEMPLATE
            .replace("__BROWSER__", config.browser.as_str())
            .replace("__HEADLESS__", if config.headless { "true" } else { "false" })
            .replace("__WIDTH__", &config.viewport_width.to_string())
            .replace("__HEIGHT__", &config.viewport_height.to_string())
            .replace("__BASE_URL__", &serde_json::to_string(&config.base_url)?))
    }

    pub fn config(&self) -> &PlaywrightConfig {
        &self.config
    }

    /// Ask the bridge to close the browser, then reap the process.
    pub async fn close(&self) -> E2eResult<()> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        if let Err(e) = self.send(id, &BridgeOp::Close).await {
            debug!("close request not delivered: {}", e);
        }
        let mut child = self.child.lock().await;
        match tokio::time::timeout(Duration::from_secs(5), child.wait()).await {
            Ok(status) => {
                let status = status?;
                debug!("Playwright bridge exited: {}", status);
            }
            Err(_) => {
                warn!("Playwright bridge did not exit, killing it");
                child.kill().await?;
            }
        }
        Ok(())
    }

    fn timeout_ms(&self, timeout: Duration) -> u64 {
        timeout.as_millis() as u64
    }

    async fn send(&self, id: u64, op: &BridgeOp<'_>) -> E2eResult<()> {
        let mut line = serde_json::to_string(&BridgeCommand { id, op })?;
        line.push('\n');
        let mut stdin = self.stdin.lock().await;
        stdin.write_all(line.as_bytes()).await?;
        stdin.flush().await?;
        Ok(())
    }

    async fn request(&self, op: BridgeOp<'_>) -> E2eResult<serde_json::Value> {
        let what = op.describe();
        let budget = op
            .timeout_ms()
            .map(Duration::from_millis)
            .unwrap_or(self.config.action_timeout);

        // Register before sending so a fast reply cannot be dropped.
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(id, tx);
        if let Err(e) = self.send(id, &op).await {
            self.pending.lock().remove(&id);
            return Err(e);
        }
        trace!("-> #{} {}", id, what);

        // Allow the bridge its own timeout plus headroom to report it.
        let reply = match tokio::time::timeout(budget + Duration::from_secs(5), rx).await {
            Ok(Ok(reply)) => reply,
            Ok(Err(_)) => return Err(E2eError::Driver(format!("bridge closed during {}", what))),
            Err(_) => {
                self.pending.lock().remove(&id);
                return Err(E2eError::timeout(what, budget));
            }
        };

        if reply.ok {
            Ok(reply.value)
        } else if reply.timeout {
            Err(E2eError::timeout(what, budget))
        } else {
            Err(E2eError::Driver(format!(
                "{}: {}",
                what,
                reply.error.unwrap_or_else(|| "unknown error".to_string())
            )))
        }
    }
}

async fn read_bridge(
    stdout: ChildStdout,
    pending: Pending,
    subscribers: Subscribers,
    ready_tx: oneshot::Sender<Result<(), String>>,
) {
    let mut ready_tx = Some(ready_tx);
    let mut lines = BufReader::new(stdout).lines();

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                warn!("Playwright bridge read error: {}", e);
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        match serde_json::from_str::<BridgeMessage>(&line) {
            Ok(BridgeMessage::Reply { id, reply }) => {
                if let Some(tx) = pending.lock().remove(&id) {
                    let _ = tx.send(reply);
                } else {
                    debug!("Reply for unknown request {}", id);
                }
            }
            Ok(BridgeMessage::Event(BridgeEvent::Ready)) => {
                if let Some(tx) = ready_tx.take() {
                    let _ = tx.send(Ok(()));
                }
            }
            Ok(BridgeMessage::Event(BridgeEvent::Response { url, status, method })) => {
                let response = NetworkResponse { url, status, method };
                let mut subs = subscribers.lock();
                subs.retain(|s| !s.tx.is_closed());
                for sub in subs.iter().filter(|s| s.pattern.is_match(&response.url)) {
                    let _ = sub.tx.send(response.clone());
                }
            }
            Ok(BridgeMessage::Event(BridgeEvent::Dialog { kind, message })) => {
                info!("Native {} dialog: {}", kind, message);
            }
            Ok(BridgeMessage::Event(BridgeEvent::Fatal { message })) => {
                warn!("Playwright bridge failed: {}", message);
                if let Some(tx) = ready_tx.take() {
                    let _ = tx.send(Err(message));
                }
            }
            Err(e) => {
                // Page console output and the like
                trace!("bridge: {} ({})", line, e);
            }
        }
    }

    // Fail everything still waiting.
    pending.lock().clear();
}

#[async_trait]
impl UiDriver for PlaywrightDriver {
    async fn navigate(&self, url: &str) -> E2eResult<()> {
        self.request(BridgeOp::Navigate { url }).await?;
        Ok(())
    }

    async fn click(&self, locator: &str) -> E2eResult<()> {
        let timeout = self.timeout_ms(self.config.action_timeout);
        self.request(BridgeOp::Click { selector: locator, timeout }).await?;
        Ok(())
    }

    async fn fill(&self, locator: &str, text: &str) -> E2eResult<()> {
        let timeout = self.timeout_ms(self.config.action_timeout);
        self.request(BridgeOp::Fill { selector: locator, text, timeout }).await?;
        Ok(())
    }

    async fn press_key(&self, key: &str) -> E2eResult<()> {
        self.request(BridgeOp::Press { key }).await?;
        Ok(())
    }

    async fn wait_for(&self, locator: &str, state: WaitState, timeout: Duration) -> E2eResult<()> {
        self.request(BridgeOp::WaitFor {
            selector: locator,
            state: state.as_str(),
            timeout: self.timeout_ms(timeout),
        })
        .await?;
        Ok(())
    }

    async fn get_text(&self, locator: &str) -> E2eResult<Option<String>> {
        Ok(serde_json::from_value(self.request(BridgeOp::Text { selector: locator }).await?)?)
    }

    async fn all_texts(&self, locator: &str) -> E2eResult<Vec<String>> {
        Ok(serde_json::from_value(self.request(BridgeOp::AllTexts { selector: locator }).await?)?)
    }

    async fn is_visible(&self, locator: &str) -> E2eResult<bool> {
        Ok(serde_json::from_value(self.request(BridgeOp::Visible { selector: locator }).await?)?)
    }

    async fn bounding_box(&self, locator: &str) -> E2eResult<Option<BoundingBox>> {
        let value = self.request(BridgeOp::BoundingBox { selector: locator }).await?;
        Ok(serde_json::from_value(value)?)
    }

    async fn get_attribute(&self, locator: &str, name: &str) -> E2eResult<Option<String>> {
        Ok(serde_json::from_value(
            self.request(BridgeOp::Attribute { selector: locator, name }).await?,
        )?)
    }

    async fn screenshot(&self, path: &Path) -> E2eResult<()> {
        let path: PathBuf = if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir()?.join(path)
        };
        self.request(BridgeOp::Screenshot { path: &path.to_string_lossy() }).await?;
        Ok(())
    }

    async fn on_native_dialog(&self, policy: DialogPolicy) -> E2eResult<()> {
        self.request(BridgeOp::DialogPolicy { policy }).await?;
        Ok(())
    }

    async fn on_network_response(&self, url_pattern: &str) -> E2eResult<ResponseSubscription> {
        let pattern = Regex::new(url_pattern)?;
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.lock().push(Subscriber { pattern, tx });
        Ok(ResponseSubscription::new(url_pattern, rx))
    }
}

impl Drop for PlaywrightDriver {
    fn drop(&mut self) {
        self.reader.abort();
    }
}
