use std::{env, net::SocketAddr, str::FromStr, time::Duration};

use serde::{Deserialize, Serialize};

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub http: Http,
    #[serde(default)]
    pub log: Log,
    #[serde(default)]
    pub auth: Auth,
    #[serde(default)]
    pub registry: RegistryConfig,
    #[serde(default)]
    pub recorder: RecorderConfig,
    #[serde(default)]
    pub viewer: ViewerConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Http {
    #[serde(default = "default_http_listen")]
    pub listen: SocketAddr,
    #[serde(default)]
    pub cors: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Auth {
    /// Bearer tokens accepted by the admin API. Empty leaves it open.
    #[serde(default)]
    pub tokens: Vec<String>,
    /// Viewer origins accepted in addition to same-origin.
    #[serde(default)]
    pub allowed_origins: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Log {
    #[serde(default = "default_log_level")]
    pub level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Seconds between sweeps of offline devices
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval: u64,
    /// Seconds a device may stay offline before it is forgotten
    #[serde(default = "default_offline_ttl")]
    pub offline_ttl: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecorderConfig {
    /// Directory holding `{device}/{date}/{hour}.mp4`
    #[serde(default = "default_recorder_root")]
    pub root: String,
    #[serde(default = "default_program")]
    pub program: String,
    /// Transcoder arguments, `{output}` is replaced by the file path
    #[serde(default = "default_args")]
    pub args: Vec<String>,
    /// Frames buffered in front of the transcoder before new ones are dropped
    #[serde(default = "default_sink_capacity")]
    pub sink_capacity: usize,
    /// Milliseconds to wait before restarting a failed transcoder
    #[serde(default = "default_restart_delay")]
    pub restart_delay: u64,
    #[serde(default = "default_max_restarts")]
    pub max_restarts: u32,
    /// Seconds of uptime after which a transcoder counts as healthy again
    #[serde(default = "default_stable_after")]
    pub stable_after: u64,
    /// Milliseconds given to the transcoder to finalize after its input closes
    #[serde(default = "default_stop_timeout")]
    pub stop_timeout: u64,
    #[serde(default = "default_rollover")]
    pub rollover: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViewerConfig {
    #[serde(default = "default_viewer_queue")]
    pub queue: usize,
}

fn default_http_listen() -> SocketAddr {
    SocketAddr::from_str(&format!(
        "0.0.0.0:{}",
        env::var("PORT").unwrap_or(String::from("8080"))
    ))
    .expect("invalid listen address")
}

impl Default for Http {
    fn default() -> Self {
        Self {
            listen: default_http_listen(),
            cors: Default::default(),
        }
    }
}

impl Default for Log {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    env::var("LOG_LEVEL").unwrap_or_else(|_| {
        if cfg!(debug_assertions) {
            "debug".to_string()
        } else {
            "info".to_string()
        }
    })
}

fn default_sweep_interval() -> u64 {
    60
}

fn default_offline_ttl() -> u64 {
    3600
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            sweep_interval: default_sweep_interval(),
            offline_ttl: default_offline_ttl(),
        }
    }
}

impl RegistryConfig {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval.max(1))
    }

    pub fn offline_ttl(&self) -> Duration {
        Duration::from_secs(self.offline_ttl)
    }
}

fn default_recorder_root() -> String {
    "recordings".to_string()
}

fn default_program() -> String {
    "ffmpeg".to_string()
}

fn default_args() -> Vec<String> {
    [
        "-hide_banner",
        "-loglevel",
        "error",
        "-use_wallclock_as_timestamps",
        "1",
        "-f",
        "mjpeg",
        "-i",
        "pipe:0",
        "-an",
        "-c:v",
        "libx264",
        "-preset",
        "ultrafast",
        "-tune",
        "zerolatency",
        "-pix_fmt",
        "yuv420p",
        "-movflags",
        "+frag_keyframe+empty_moov+default_base_moof",
        "-f",
        "mp4",
        "-y",
        "{output}",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_sink_capacity() -> usize {
    64
}

fn default_restart_delay() -> u64 {
    2000
}

fn default_max_restarts() -> u32 {
    3
}

fn default_stable_after() -> u64 {
    30
}

fn default_stop_timeout() -> u64 {
    5000
}

fn default_rollover() -> bool {
    true
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            root: default_recorder_root(),
            program: default_program(),
            args: default_args(),
            sink_capacity: default_sink_capacity(),
            restart_delay: default_restart_delay(),
            max_restarts: default_max_restarts(),
            stable_after: default_stable_after(),
            stop_timeout: default_stop_timeout(),
            rollover: default_rollover(),
        }
    }
}

impl RecorderConfig {
    pub fn restart_delay(&self) -> Duration {
        Duration::from_millis(self.restart_delay)
    }

    pub fn stable_after(&self) -> Duration {
        Duration::from_secs(self.stable_after)
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout)
    }
}

fn default_viewer_queue() -> usize {
    2
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            queue: default_viewer_queue(),
        }
    }
}

impl Config {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.recorder.program.trim().is_empty() {
            anyhow::bail!("recorder.program cannot be empty");
        }
        if self.recorder.sink_capacity == 0 {
            anyhow::bail!("recorder.sink_capacity must be at least 1");
        }
        if !self.recorder.args.iter().any(|a| a.contains("{output}")) {
            anyhow::bail!("recorder.args must contain an {{output}} placeholder");
        }
        if self.viewer.queue == 0 {
            anyhow::bail!("viewer.queue must be at least 1");
        }
        Ok(())
    }
}
