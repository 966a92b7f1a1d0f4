// Dev-server bootstrap for crawls against a local build

use anyhow::{Context, Result, bail};
use nix::sys::signal::{Signal, killpg};
use nix::unistd::Pid;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::time::{Instant, sleep, timeout};
use tracing::{debug, info, warn};

pub const DEFAULT_SERVER_TIMEOUT: Duration = Duration::from_secs(120);
const POLL_INTERVAL: Duration = Duration::from_millis(250);
const GRACEFUL_SHUTDOWN: Duration = Duration::from_secs(2);

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub command: String,
    pub timeout: Duration,
    /// Use a server that already answers instead of refusing to start.
    pub reuse_existing: bool,
}

/// Handle on the dev server.
///
/// The command runs in its own process group so that grandchildren
/// (`npm run dev` spawning node, for instance) go down with it. The whole
/// group is killed when this is dropped.
#[derive(Debug)]
pub struct WebServer {
    child: Option<Child>,
}

impl WebServer {
    /// Make sure something answers at `base_url`, spawning `settings.command`
    /// when nothing does.
    pub async fn ensure(base_url: &str, settings: &ServerSettings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(2))
            .build()
            .context("failed to build readiness client")?;

        if is_reachable(&client, base_url).await {
            if settings.reuse_existing {
                info!("Reusing server already listening at {}", base_url);
                return Ok(Self { child: None });
            }
            bail!(
                "{} is already in use; stop the running server or pass --skip-web-server",
                base_url
            );
        }

        info!("Starting dev server: {}", settings.command);
        let mut child = Command::new("sh")
            .arg("-c")
            .arg(&settings.command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .process_group(0)
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("failed to spawn `{}`", settings.command))?;

        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stdout).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(target: "routewalk::server", "{}", line);
                }
            });
        }

        // From here on an early return drops the server and kills its group
        let mut server = Self { child: Some(child) };
        let deadline = Instant::now() + settings.timeout;
        loop {
            if is_reachable(&client, base_url).await {
                info!("Dev server ready at {}", base_url);
                return Ok(server);
            }
            if let Some(child) = server.child.as_mut() {
                if let Some(status) = child.try_wait()? {
                    bail!("dev server exited before it was ready ({})", status);
                }
            }
            if Instant::now() >= deadline {
                bail!(
                    "dev server did not answer at {} within {}s",
                    base_url,
                    settings.timeout.as_secs()
                );
            }
            sleep(POLL_INTERVAL).await;
        }
    }

    pub fn is_managed(&self) -> bool {
        self.child.is_some()
    }

    /// Process group id of the spawned command, if one is running.
    pub fn process_group(&self) -> Option<Pid> {
        self.child
            .as_ref()
            .and_then(Child::id)
            .map(|pid| Pid::from_raw(pid as i32))
    }

    /// SIGTERM the group, give it a moment, then SIGKILL whatever is left.
    pub async fn shutdown(mut self) {
        let group = self.process_group();
        let Some(mut child) = self.child.take() else {
            return;
        };
        if let Some(group) = group {
            signal_group(group, Signal::SIGTERM);
            if timeout(GRACEFUL_SHUTDOWN, child.wait()).await.is_err() {
                warn!("dev server ignored SIGTERM; killing it");
            }
            signal_group(group, Signal::SIGKILL);
        }
        if let Err(e) = child.kill().await {
            debug!("dev server already gone: {}", e);
        }
    }
}

impl Drop for WebServer {
    fn drop(&mut self) {
        if let Some(group) = self.process_group() {
            signal_group(group, Signal::SIGKILL);
        }
    }
}

fn signal_group(group: Pid, signal: Signal) {
    if let Err(e) = killpg(group, signal) {
        debug!("{} to process group {} failed: {}", signal, group, e);
    }
}

/// Any HTTP response counts, whatever its status.
pub async fn is_reachable(client: &reqwest::Client, url: &str) -> bool {
    client.get(url).send().await.is_ok()
}
