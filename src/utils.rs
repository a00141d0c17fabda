use std::fs::read_to_string;

use anyhow::Context;
use tracing::debug;

/// `--config` path, else `{name}.toml`, else `/etc/camrelay/{name}.toml`, else
/// defaults. A file that exists but does not parse is an error.
pub fn load<T>(name: &str, path: Option<String>) -> anyhow::Result<T>
where
    T: serde::de::DeserializeOwned + Default,
{
    let content = match path {
        Some(path) => Some(read_to_string(&path).with_context(|| format!("read config {path}"))?),
        None => read_to_string(format!("{name}.toml"))
            .or_else(|_| read_to_string(format!("/etc/camrelay/{name}.toml")))
            .ok(),
    };
    match content {
        Some(content) => toml::from_str(&content).context("parse config"),
        None => Ok(Default::default()),
    }
}

pub async fn shutdown_signal() {
    let signal = wait_for_stop_signal().await;
    debug!("Received signal: {}", signal);
}

/// SIGTERM or SIGINT.
#[cfg(unix)]
async fn wait_for_stop_signal() -> &'static str {
    use tokio::signal::unix::{signal, SignalKind};

    let (Ok(mut terminate), Ok(mut interrupt)) = (
        signal(SignalKind::terminate()),
        signal(SignalKind::interrupt()),
    ) else {
        return std::future::pending().await;
    };
    tokio::select! {
        _ = terminate.recv() => "SIGTERM",
        _ = interrupt.recv() => "SIGINT",
    }
}

#[cfg(windows)]
async fn wait_for_stop_signal() -> &'static str {
    match tokio::signal::ctrl_c().await {
        Ok(()) => "CTRL_C",
        Err(_) => std::future::pending().await,
    }
}
