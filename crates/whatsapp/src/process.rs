//! Spawning and supervising the Node.js Baileys sidecar.

use std::{
    path::{Path, PathBuf},
    process::Stdio,
    time::Duration,
};

use {
    anyhow::{Context, Result, bail},
    tokio::{
        io::{AsyncBufReadExt, BufReader},
        process::{Child, Command},
    },
    tracing::{Level, debug, error, info, warn},
};

/// Environment variable pointing at the sidecar checkout.
pub const SIDECAR_DIR_ENV: &str = "ALYA_SIDECAR_DIR";

const SIDECAR_REL_PATH: &str = "sidecar/whatsapp-baileys";
const STARTUP_GRACE: Duration = Duration::from_millis(500);
const STOP_TIMEOUT: Duration = Duration::from_secs(5);

fn has_manifest(dir: &Path) -> bool {
    dir.join("package.json").exists()
}

/// Whether `dist/index.js` has been produced by `npm run build`.
pub fn is_built(dir: &Path) -> bool {
    dir.join("dist/index.js").exists()
}

/// Find the sidecar checkout.
///
/// An explicit directory must exist. Otherwise `ALYA_SIDECAR_DIR` is tried,
/// then paths next to the executable, then paths relative to the working
/// directory.
pub fn locate_sidecar(explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(dir) = explicit {
        if has_manifest(dir) {
            return Ok(dir.to_path_buf());
        }
        bail!("no package.json in sidecar directory {}", dir.display());
    }

    if let Ok(dir) = std::env::var(SIDECAR_DIR_ENV) {
        let dir = PathBuf::from(dir);
        if has_manifest(&dir) {
            return Ok(dir);
        }
        warn!(path = %dir.display(), "{SIDECAR_DIR_ENV} has no package.json, searching elsewhere");
    }

    let mut candidates = Vec::new();
    if let Ok(exe) = std::env::current_exe()
        && let Some(bin_dir) = exe.parent()
    {
        candidates.push(bin_dir.join("..").join(SIDECAR_REL_PATH));
        candidates.push(bin_dir.join("../..").join(SIDECAR_REL_PATH));
    }
    for up in ["", "..", "../.."] {
        candidates.push(Path::new(up).join(SIDECAR_REL_PATH));
    }

    candidates
        .into_iter()
        .find(|dir| has_manifest(dir))
        .map(|dir| dir.canonicalize().unwrap_or(dir))
        .with_context(|| {
            format!("whatsapp sidecar not found; set {SIDECAR_DIR_ENV} or check out {SIDECAR_REL_PATH}")
        })
}

async fn npm(dir: &Path, args: &[&str]) -> Result<()> {
    info!(path = %dir.display(), ?args, "running npm for sidecar");
    let output = Command::new("npm")
        .args(args)
        .current_dir(dir)
        .output()
        .await
        .with_context(|| format!("failed to run npm {}", args.join(" ")))?;
    if !output.status.success() {
        bail!(
            "npm {} failed: {}",
            args.join(" "),
            String::from_utf8_lossy(&output.stderr)
        );
    }
    Ok(())
}

/// Install dependencies and build the sidecar if it has never been built.
pub async fn ensure_built(dir: &Path) -> Result<()> {
    if is_built(dir) {
        return Ok(());
    }
    if !dir.join("node_modules").exists() {
        npm(dir, &["install"]).await?;
    }
    npm(dir, &["run", "build"]).await
}

/// Map a pino numeric level onto a tracing level.
pub fn pino_level(level: u64) -> Level {
    match level {
        0..=20 => Level::DEBUG,
        21..=30 => Level::INFO,
        31..=40 => Level::WARN,
        _ => Level::ERROR,
    }
}

/// Split one stdout line into level and message. Non-JSON lines are info.
fn parse_log_line(line: &str) -> (Level, String) {
    if line.starts_with('{')
        && let Ok(record) = serde_json::from_str::<serde_json::Value>(line)
    {
        let level = record.get("level").and_then(|v| v.as_u64()).unwrap_or(30);
        let msg = record
            .get("msg")
            .and_then(|v| v.as_str())
            .unwrap_or(line)
            .to_string();
        return (pino_level(level), msg);
    }
    (Level::INFO, line.to_string())
}

fn emit(level: Level, msg: &str) {
    if level == Level::DEBUG {
        debug!(target: "whatsapp_sidecar", "{msg}");
    } else if level == Level::INFO {
        info!(target: "whatsapp_sidecar", "{msg}");
    } else if level == Level::WARN {
        warn!(target: "whatsapp_sidecar", "{msg}");
    } else {
        error!(target: "whatsapp_sidecar", "{msg}");
    }
}

/// A running sidecar child process.
pub struct SidecarProcess {
    child: Child,
    port: u16,
}

impl SidecarProcess {
    /// Start `node dist/index.js` in `dir`, listening on `port`.
    pub async fn spawn(dir: &Path, port: u16, auth_dir: Option<&Path>) -> Result<Self> {
        if !has_manifest(dir) {
            bail!(
                "whatsapp sidecar missing at {}; run `npm install && npm run build` there",
                dir.display()
            );
        }
        ensure_built(dir).await?;

        let mut cmd = Command::new("node");
        cmd.arg("dist/index.js")
            .current_dir(dir)
            .env("ALYA_WHATSAPP_PORT", port.to_string())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(auth_dir) = auth_dir {
            cmd.env("ALYA_WHATSAPP_AUTH_DIR", auth_dir);
        }
        let mut child = cmd.spawn().context("failed to spawn whatsapp sidecar")?;

        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stdout).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    let (level, msg) = parse_log_line(&line);
                    emit(level, &msg);
                }
            });
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    warn!(target: "whatsapp_sidecar", "{line}");
                }
            });
        }

        // Catch processes that die on startup (missing node, port in use).
        tokio::time::sleep(STARTUP_GRACE).await;
        if let Some(status) = child.try_wait().context("failed to poll sidecar process")? {
            bail!("whatsapp sidecar exited immediately with {status}");
        }

        info!(port, pid = ?child.id(), "whatsapp sidecar started");
        Ok(Self { child, port })
    }

    pub fn is_running(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    /// SIGTERM, then kill if the process has not exited within five seconds.
    pub async fn stop(&mut self) {
        info!(port = self.port, "stopping whatsapp sidecar");

        #[cfg(unix)]
        {
            use nix::{
                sys::signal::{Signal, kill},
                unistd::Pid,
            };
            if let Some(pid) = self.child.id().and_then(|pid| i32::try_from(pid).ok()) {
                let _ = kill(Pid::from_raw(pid), Signal::SIGTERM);
            }
        }
        #[cfg(not(unix))]
        {
            let _ = self.child.start_kill();
        }

        match tokio::time::timeout(STOP_TIMEOUT, self.child.wait()).await {
            Ok(Ok(status)) => info!(%status, "whatsapp sidecar exited"),
            Ok(Err(e)) => warn!(error = %e, "failed to wait for whatsapp sidecar"),
            Err(_) => {
                warn!("whatsapp sidecar ignored SIGTERM, killing");
                let _ = self.child.kill().await;
            },
        }
    }
}
