use clap::Parser;
use tracing::{debug, error, info, warn};

use camcore::config::Config;

mod log;
mod utils;

#[derive(Parser)]
#[command(name = "camrelay", version)]
struct Args {
    /// Set config file path
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let cfg: Config = utils::load("camrelay", args.config)?;
    cfg.validate()?;

    log::set(format!(
        "camrelay={},camcore={},tower_http=info",
        cfg.log.level, cfg.log.level
    ));

    warn!("set log level: {}", cfg.log.level);
    debug!("load config: {:?}", cfg);

    let listener = match tokio::net::TcpListener::bind(&cfg.http.listen).await {
        Ok(l) => l,
        Err(e) => {
            error!("bind to {} failed: {}", &cfg.http.listen, e);
            return Err(e.into());
        }
    };
    info!("server listening on : {}", &cfg.http.listen);
    info!("recording into: {}", &cfg.recorder.root);

    camcore::metrics_register();
    camcore::serve(cfg, listener, utils::shutdown_signal()).await;
    info!("Server shutdown");
    Ok(())
}
