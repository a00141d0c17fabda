use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::config::RecorderConfig;

/// External encoder invoked with fixed arguments.
#[derive(Debug, Clone)]
pub struct Transcoder {
    program: String,
    args: Vec<String>,
    stop_timeout: Duration,
}

/// How a transcoder process ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Input was closed by us and the process finished (or was killed after
    /// the stop timeout).
    Stopped,
    /// The process went away on its own or stopped accepting input.
    Failed(String),
}

impl Transcoder {
    pub fn new(cfg: &RecorderConfig) -> Self {
        Self {
            program: cfg.program.clone(),
            args: cfg.args.clone(),
            stop_timeout: cfg.stop_timeout(),
        }
    }

    fn command(&self, output: &Path) -> Command {
        let output = output.to_string_lossy();
        let mut command = Command::new(&self.program);
        command
            .args(self.args.iter().map(|arg| arg.replace("{output}", &output)))
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        command
    }

    pub fn spawn(&self, output: &Path) -> std::io::Result<Child> {
        let child = self.command(output).spawn()?;
        info!(
            pid = child.id().unwrap_or(0),
            output = %output.display(),
            "transcoder started"
        );
        Ok(child)
    }

    /// Pump frames into the process until the sink closes or the process dies.
    pub async fn feed(
        &self,
        device_id: &str,
        mut child: Child,
        mut frames: mpsc::Receiver<Bytes>,
    ) -> Outcome {
        let Some(mut stdin) = child.stdin.take() else {
            let _ = child.kill().await;
            return Outcome::Failed("transcoder stdin unavailable".to_string());
        };

        if let Some(stderr) = child.stderr.take() {
            let device = device_id.to_string();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    if line.is_empty() {
                        continue;
                    }
                    if line.contains("error") || line.contains("Error") {
                        error!(device = %device, "transcoder: {}", line);
                    } else {
                        warn!(device = %device, "transcoder: {}", line);
                    }
                }
            });
        }

        loop {
            tokio::select! {
                frame = frames.recv() => match frame {
                    Some(frame) => {
                        if let Err(e) = stdin.write_all(&frame).await {
                            let _ = child.kill().await;
                            return Outcome::Failed(format!("write to transcoder: {e}"));
                        }
                    }
                    None => break,
                },
                status = child.wait() => {
                    return Outcome::Failed(describe(status));
                }
            }
        }

        // Input closed on purpose: EOF lets the encoder finalize the file.
        let _ = stdin.shutdown().await;
        drop(stdin);
        match tokio::time::timeout(self.stop_timeout, child.wait()).await {
            Ok(status) => debug!(device = device_id, "transcoder {}", describe(status)),
            Err(_) => {
                warn!(
                    device = device_id,
                    "transcoder did not finish in {:?}, killing",
                    self.stop_timeout
                );
                let _ = child.kill().await;
            }
        }
        Outcome::Stopped
    }
}

fn describe(status: std::io::Result<ExitStatus>) -> String {
    match status {
        Ok(status) => match status.code() {
            Some(code) => format!("exited with code {code}"),
            None => "terminated by signal".to_string(),
        },
        Err(e) => format!("wait failed: {e}"),
    }
}
