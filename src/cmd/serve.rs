//! HTTP API server — `dialflow serve`.

use anyhow::Result;
use tracing_subscriber::EnvFilter;

use dialflow::config::Config;
use dialflow::server::start_server;

pub async fn cmd_serve(
    config: &Config,
    port: Option<u16>,
    host: Option<String>,
    dev: bool,
) -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("dialflow=info".parse()?)
                .add_directive("tower_http=info".parse()?),
        )
        .init();

    let mut config = config.clone();
    if let Some(port) = port {
        config.settings.server.port = port;
    }
    if let Some(host) = host {
        config.settings.server.host = host;
    }

    start_server(&config, dev).await
}
