//! Playwright-backed [`BrowserLauncher`] driving a Node.js bridge process.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::task::JoinHandle;
use tokio::time::{timeout, timeout_at, Instant};
use tracing::{debug, warn};
use url::Url;

use super::engine::{
    element_selector, BrowserLauncher, ElementShot, ElementWait, PageSession, SessionSettings,
};
use super::playwright::{
    ensure_node_available, ensure_playwright_available, map_playwright_error, map_spawn_error,
    BridgeCommand, BridgeReply, BridgeStatus, PLAYWRIGHT_BRIDGE_SCRIPT,
};
use crate::{PagecapError, Result};

/// Extra time granted to the bridge on top of each command's own timeout.
const BRIDGE_GRACE: Duration = Duration::from_secs(5);

/// Time allowed for the bridge to close Chromium and exit.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(10);

/// Launches Chromium through Playwright in a Node.js helper process.
#[derive(Debug, Clone)]
pub struct PlaywrightLauncher {
    node_command: String,
    headless: bool,
    reply_grace: Duration,
}

impl PlaywrightLauncher {
    pub fn new(node_command: impl Into<String>, headless: bool) -> Self {
        Self {
            node_command: node_command.into(),
            headless,
            reply_grace: BRIDGE_GRACE,
        }
    }
}

impl Default for PlaywrightLauncher {
    fn default() -> Self {
        Self::new("node", true)
    }
}

#[async_trait]
impl BrowserLauncher for PlaywrightLauncher {
    async fn launch(&self, settings: &SessionSettings) -> Result<Box<dyn PageSession>> {
        // Fail fast if Node is missing to avoid spawning Playwright unnecessarily.
        ensure_node_available(&self.node_command).await?;
        ensure_playwright_available(&self.node_command).await?;

        let mut cmd = Command::new(&self.node_command);
        cmd.arg("-e")
            .arg(PLAYWRIGHT_BRIDGE_SCRIPT)
            .arg(settings.viewport.width.to_string())
            .arg(settings.viewport.height.to_string())
            .arg(settings.device_scale_factor.to_string())
            .arg(if self.headless { "1" } else { "0" })
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let (device_width, device_height) =
            settings.viewport.device_pixels(settings.device_scale_factor);
        debug!(
            viewport = %settings.viewport,
            scale = settings.device_scale_factor,
            device_width,
            device_height,
            "spawning Playwright bridge"
        );
        let mut child = cmd
            .spawn()
            .map_err(|err| map_spawn_error(err, &self.node_command))?;

        let stdin = child.stdin.take();
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| PagecapError::browser("Playwright bridge has no stdout"))?;
        let stderr_pipe = child.stderr.take();
        let stderr_task = tokio::spawn(async move {
            let mut buf = Vec::new();
            if let Some(mut err) = stderr_pipe {
                let _ = err.read_to_end(&mut buf).await;
            }
            buf
        });

        let mut session = PlaywrightSession {
            child,
            stdin,
            stdout: BufReader::new(stdout).lines(),
            stderr_task: Some(stderr_task),
            reply_grace: self.reply_grace,
            next_seq: 0,
            closed: false,
        };

        match session.read_reply("launch", None, settings.launch_timeout).await {
            Ok(reply) if reply.status == BridgeStatus::Ready => {
                Ok(Box::new(session) as Box<dyn PageSession>)
            }
            Ok(reply) => {
                let _ = session.close().await;
                Err(PagecapError::browser(format!(
                    "Playwright bridge failed to start: {}",
                    reply.detail()
                )))
            }
            Err(err) => {
                let _ = session.close().await;
                Err(err)
            }
        }
    }

    fn engine_name(&self) -> &'static str {
        "playwright-chromium"
    }
}

/// One Chromium context owned by a bridge process.
///
/// Commands are numbered; a reply whose `seq` does not match the pending
/// command is a late answer to one that already timed out and is dropped.
pub struct PlaywrightSession {
    child: Child,
    stdin: Option<ChildStdin>,
    stdout: Lines<BufReader<ChildStdout>>,
    stderr_task: Option<JoinHandle<Vec<u8>>>,
    reply_grace: Duration,
    next_seq: u64,
    closed: bool,
}

impl PlaywrightSession {
    async fn request(&mut self, command: BridgeCommand<'_>, budget: Duration) -> Result<BridgeReply> {
        if self.closed {
            return Err(PagecapError::browser("Playwright bridge is closed"));
        }
        self.next_seq += 1;
        let seq = self.next_seq;
        let line = command.to_line(seq)?;
        let written = match self.stdin.as_mut() {
            Some(stdin) => write_line(stdin, &line).await,
            None => return Err(PagecapError::browser("Playwright bridge is closed")),
        };
        if let Err(err) = written {
            return Err(self.bridge_failure(command.op(), err).await);
        }
        self.read_reply(command.op(), Some(seq), budget + self.reply_grace)
            .await
    }

    async fn read_reply(&mut self, op: &str, seq: Option<u64>, budget: Duration) -> Result<BridgeReply> {
        let deadline = Instant::now() + budget;
        loop {
            let line = match timeout_at(deadline, self.stdout.next_line()).await {
                Ok(Ok(Some(line))) => line,
                Ok(Ok(None)) => return Err(self.exited_error(op).await),
                Ok(Err(err)) => return Err(self.bridge_failure(op, err).await),
                Err(_) => {
                    return Err(PagecapError::browser(format!(
                        "Playwright bridge did not answer '{}' within {:?}",
                        op, budget
                    )))
                }
            };
            let reply = BridgeReply::parse(&line)?;
            if reply.seq == seq {
                return Ok(reply);
            }
            debug!(op, expected = ?seq, got = ?reply.seq, "discarding stale bridge reply");
        }
    }

    async fn bridge_failure(&mut self, op: &str, err: std::io::Error) -> PagecapError {
        if err.kind() == std::io::ErrorKind::BrokenPipe {
            return self.exited_error(op).await;
        }
        PagecapError::Io(err)
    }

    /// Build an error from the exit status and stderr of a bridge that went away.
    async fn exited_error(&mut self, op: &str) -> PagecapError {
        let status = match timeout(CLOSE_TIMEOUT, self.child.wait()).await {
            Ok(Ok(status)) => status.to_string(),
            Ok(Err(err)) => return PagecapError::Io(err),
            Err(_) => "unknown".to_string(),
        };
        self.closed = true;
        let stderr = self.take_stderr().await;
        debug!(op, %status, "Playwright bridge exited");
        map_playwright_error(status, &stderr)
    }

    async fn take_stderr(&mut self) -> String {
        match self.stderr_task.take() {
            Some(task) => match timeout(CLOSE_TIMEOUT, task).await {
                Ok(Ok(buf)) => String::from_utf8_lossy(&buf).into_owned(),
                _ => String::new(),
            },
            None => String::new(),
        }
    }
}

#[async_trait]
impl PageSession for PlaywrightSession {
    async fn goto(&mut self, url: &Url, timeout: Duration) -> Result<()> {
        let reply = self
            .request(
                BridgeCommand::Goto {
                    url: url.as_str(),
                    timeout_ms: timeout.as_millis() as u64,
                },
                timeout,
            )
            .await?;
        match reply.status {
            BridgeStatus::Ok => Ok(()),
            BridgeStatus::Timeout => Err(PagecapError::browser(format!(
                "network did not become idle within {:?}: {}",
                timeout,
                reply.detail()
            ))),
            _ => Err(PagecapError::browser(format!(
                "navigation failed: {}",
                reply.detail()
            ))),
        }
    }

    async fn wait_for_element(&mut self, page_id: &str, timeout: Duration) -> Result<ElementWait> {
        let selector = element_selector(page_id);
        let reply = self
            .request(
                BridgeCommand::Wait {
                    selector: &selector,
                    timeout_ms: timeout.as_millis() as u64,
                },
                timeout,
            )
            .await?;
        match reply.status {
            BridgeStatus::Ok => Ok(ElementWait::Attached),
            BridgeStatus::Timeout => Ok(ElementWait::TimedOut),
            _ => Err(PagecapError::browser(format!(
                "waiting for {} failed: {}",
                selector,
                reply.detail()
            ))),
        }
    }

    async fn capture_element(
        &mut self,
        page_id: &str,
        path: &Path,
        timeout: Duration,
    ) -> Result<ElementShot> {
        let selector = element_selector(page_id);
        let path_text = path.to_string_lossy();
        let reply = self
            .request(
                BridgeCommand::Screenshot {
                    selector: &selector,
                    path: path_text.as_ref(),
                    timeout_ms: timeout.as_millis() as u64,
                },
                timeout,
            )
            .await?;
        match reply.status {
            BridgeStatus::Ok => Ok(ElementShot::Saved),
            BridgeStatus::NotFound => Ok(ElementShot::NotFound),
            BridgeStatus::Timeout => Ok(ElementShot::TimedOut),
            _ => Err(PagecapError::browser(format!(
                "screenshot of {} failed: {}",
                selector,
                reply.detail()
            ))),
        }
    }

    async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        if let Some(mut stdin) = self.stdin.take() {
            if let Ok(line) = BridgeCommand::Close.to_line(self.next_seq + 1) {
                let _ = write_line(&mut stdin, &line).await;
            }
        }

        match timeout(CLOSE_TIMEOUT, self.child.wait()).await {
            Ok(Ok(status)) => {
                debug!(%status, "Playwright bridge closed");
                Ok(())
            }
            Ok(Err(err)) => Err(PagecapError::Io(err)),
            Err(_) => {
                warn!("Playwright bridge did not exit after {:?}; killing it", CLOSE_TIMEOUT);
                let _ = self.child.kill().await;
                let _ = self.child.wait().await;
                Ok(())
            }
        }
    }
}

async fn write_line(stdin: &mut ChildStdin, line: &str) -> std::io::Result<()> {
    stdin.write_all(line.as_bytes()).await?;
    stdin.flush().await
}
