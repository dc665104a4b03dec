//! Playwright integration for headless browser automation.
//!
//! This module contains the inline bridge script, the line protocol spoken
//! with it, error mapping, and availability checks for Node.js and Playwright.

use crate::{PagecapError, Result};
use serde::{Deserialize, Serialize};
use std::io;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

/// Long-lived bridge: launches Chromium once, prints `ready`, then answers one
/// JSON command per stdin line with one JSON reply per stdout line. Each reply
/// echoes the command's `seq`.
pub(crate) const PLAYWRIGHT_BRIDGE_SCRIPT: &str = r#"
const [, width, height, scale, headlessFlag] = process.argv;
const readline = require('readline');

function reply(payload) {
  process.stdout.write(JSON.stringify(payload) + '\n');
}

function errorMessage(err) {
  return err && err.message ? err.message : String(err);
}

function isTimeout(err) {
  return !!err && (err.name === 'TimeoutError' || /timeout/i.test(errorMessage(err)));
}

async function handle(page, cmd) {
  switch (cmd.op) {
    case 'goto':
      await page.goto(cmd.url, { waitUntil: 'networkidle', timeout: cmd.timeoutMs });
      return { status: 'ok' };
    case 'wait':
      await page.waitForSelector(cmd.selector, { state: 'attached', timeout: cmd.timeoutMs });
      return { status: 'ok' };
    case 'screenshot': {
      const element = await page.$(cmd.selector);
      if (!element) {
        return { status: 'not_found' };
      }
      await element.screenshot({ path: cmd.path, type: 'png', timeout: cmd.timeoutMs });
      return { status: 'ok' };
    }
    default:
      return { status: 'error', message: `unknown op: ${cmd.op}` };
  }
}

async function run() {
  let browser;
  try {
    const { chromium } = require('playwright');
    browser = await chromium.launch({ headless: headlessFlag !== '0' });
    const context = await browser.newContext({
      viewport: {
        width: parseInt(width, 10),
        height: parseInt(height, 10)
      },
      deviceScaleFactor: parseFloat(scale)
    });
    const page = await context.newPage();
    reply({ status: 'ready' });

    const lines = readline.createInterface({ input: process.stdin, crlfDelay: Infinity });
    for await (const line of lines) {
      if (!line.trim()) continue;
      let cmd;
      try {
        cmd = JSON.parse(line);
      } catch (err) {
        reply({ status: 'error', message: 'invalid command: ' + errorMessage(err) });
        continue;
      }
      if (cmd.op === 'close') break;
      try {
        reply({ seq: cmd.seq, ...(await handle(page, cmd)) });
      } catch (err) {
        reply({ seq: cmd.seq, status: isTimeout(err) ? 'timeout' : 'error', message: errorMessage(err) });
      }
    }
  } catch (err) {
    console.error(JSON.stringify({ status: 'error', message: errorMessage(err) }));
    process.exitCode = 1;
  } finally {
    if (browser) {
      await browser.close();
    }
    process.stdin.destroy();
  }
}

run();
"#;

/// Timeout for checking node/playwright availability.
pub(crate) const NODE_CHECK_TIMEOUT: Duration = Duration::from_secs(5);

/// Script to check if Playwright is installed.
const PLAYWRIGHT_CHECK_SCRIPT: &str = "require('playwright'); process.stdout.write('ok');";

/// One command sent to the bridge.
#[derive(Debug, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub(crate) enum BridgeCommand<'a> {
    #[serde(rename_all = "camelCase")]
    Goto { url: &'a str, timeout_ms: u64 },
    #[serde(rename_all = "camelCase")]
    Wait { selector: &'a str, timeout_ms: u64 },
    #[serde(rename_all = "camelCase")]
    Screenshot {
        selector: &'a str,
        path: &'a str,
        timeout_ms: u64,
    },
    Close,
}

impl BridgeCommand<'_> {
    pub(crate) fn op(&self) -> &'static str {
        match self {
            BridgeCommand::Goto { .. } => "goto",
            BridgeCommand::Wait { .. } => "wait",
            BridgeCommand::Screenshot { .. } => "screenshot",
            BridgeCommand::Close => "close",
        }
    }

    /// Serialize as one protocol line tagged with `seq`.
    pub(crate) fn to_line(&self, seq: u64) -> Result<String> {
        let mut line = serde_json::to_string(&SequencedCommand { seq, command: self })?;
        line.push('\n');
        Ok(line)
    }
}

#[derive(Serialize)]
struct SequencedCommand<'c, 'a> {
    seq: u64,
    #[serde(flatten)]
    command: &'c BridgeCommand<'a>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum BridgeStatus {
    Ready,
    Ok,
    Timeout,
    NotFound,
    Error,
}

/// One reply line from the bridge.
#[derive(Debug, Deserialize)]
pub(crate) struct BridgeReply {
    /// Sequence number of the command answered; absent on the `ready` line.
    #[serde(default)]
    pub seq: Option<u64>,
    pub status: BridgeStatus,
    pub message: Option<String>,
}

impl BridgeReply {
    pub(crate) fn parse(line: &str) -> Result<Self> {
        serde_json::from_str(line.trim()).map_err(|e| {
            PagecapError::browser(format!(
                "Unexpected Playwright bridge output: {} - raw: {}",
                e,
                line.trim()
            ))
        })
    }

    pub(crate) fn detail(&self) -> &str {
        self.message.as_deref().unwrap_or("no additional details")
    }
}

/// Error result printed to stderr when the bridge dies.
#[derive(Debug, Deserialize)]
pub(crate) struct ScriptError {
    pub status: String,
    pub message: String,
}

/// Maps a spawn error to an appropriate PagecapError.
pub(crate) fn map_spawn_error(err: io::Error, command: &str) -> PagecapError {
    if err.kind() == io::ErrorKind::NotFound {
        PagecapError::browser(format!(
            "Unable to spawn Playwright helper; '{}' was not found on PATH",
            command
        ))
    } else {
        PagecapError::Io(err)
    }
}

/// Maps Playwright stderr output to an appropriate PagecapError.
pub(crate) fn map_playwright_error(status_text: impl Into<String>, stderr: &str) -> PagecapError {
    let last_line = stderr.lines().rev().find(|l| !l.trim().is_empty());
    if let Some(Ok(error)) = last_line.map(serde_json::from_str::<ScriptError>) {
        return map_playwright_status_error(&error.status, error.message);
    }

    if stderr
        .to_ascii_lowercase()
        .contains("cannot find module 'playwright'")
    {
        return missing_playwright();
    }

    PagecapError::browser(format!(
        "Playwright exited with status {}: {}",
        status_text.into(),
        stderr.trim()
    ))
}

/// Maps a Playwright status error to an appropriate PagecapError.
pub(crate) fn map_playwright_status_error(status: &str, message: String) -> PagecapError {
    if message
        .to_ascii_lowercase()
        .contains("cannot find module 'playwright'")
    {
        missing_playwright()
    } else {
        PagecapError::browser(format!("Playwright error (status {}): {}", status, message))
    }
}

fn missing_playwright() -> PagecapError {
    PagecapError::browser(
        "Playwright npm package is missing; install with `npm install playwright`.",
    )
}

/// Ensures Node.js is available on the system.
pub(crate) async fn ensure_node_available(node_command: &str) -> Result<()> {
    let mut cmd = Command::new(node_command);
    cmd.arg("--version")
        .stdout(Stdio::null())
        .stderr(Stdio::null());

    let status = tokio::time::timeout(NODE_CHECK_TIMEOUT, cmd.status())
        .await
        .map_err(|_| {
            PagecapError::browser(format!(
                "Timed out checking node availability after {:?}",
                NODE_CHECK_TIMEOUT
            ))
        })?
        .map_err(|err| map_spawn_error(err, node_command))?;

    if !status.success() {
        return Err(PagecapError::browser(format!(
            "Node command {:?} is not available (exit {})",
            node_command, status
        )));
    }

    Ok(())
}

/// Ensures Playwright npm package is installed.
pub(crate) async fn ensure_playwright_available(node_command: &str) -> Result<()> {
    let mut cmd = Command::new(node_command);
    cmd.arg("-e")
        .arg(PLAYWRIGHT_CHECK_SCRIPT)
        .stdout(Stdio::null())
        .stderr(Stdio::piped());

    let output = tokio::time::timeout(NODE_CHECK_TIMEOUT, cmd.output())
        .await
        .map_err(|_| {
            PagecapError::browser(format!(
                "Timed out checking Playwright availability after {:?}",
                NODE_CHECK_TIMEOUT
            ))
        })?
        .map_err(|err| map_spawn_error(err, node_command))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(map_playwright_error(
            format!("{:?}", output.status),
            &stderr,
        ));
    }

    Ok(())
}
