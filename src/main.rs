use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use log::info;
use tokio_util::sync::CancellationToken;

use geoherd::config::HerdConfig;
use geoherd::logging;
use geoherd::server::Server;

const DEFAULT_CONFIG_PATH: &str = "config.toml";

fn usage(config: &HerdConfig) -> ! {
    eprintln!("usage: geoherd [--config <path>] <server-name>");
    eprintln!("valid names: {}", config.server_names().join(", "));
    std::process::exit(1);
}

#[tokio::main]
async fn main() -> Result<()> {
    // One positional argument (the daemon's name), plus an optional
    // --config override.
    let args: Vec<String> = std::env::args().skip(1).collect();
    let mut config_path = DEFAULT_CONFIG_PATH.to_string();
    let mut name: Option<String> = None;

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if arg == "--config" {
            config_path = iter
                .next()
                .cloned()
                .context("--config requires a file path")?;
        } else if name.is_none() {
            name = Some(arg.clone());
        } else {
            name = None; // extra positional — fall through to usage
            break;
        }
    }

    let config = HerdConfig::load(Path::new(&config_path))?;

    let name = match name {
        Some(n) if config.ports.contains_key(&n) => n,
        _ => usage(&config),
    };

    logging::init(&name)?;

    let server = Arc::new(Server::from_config(&name, &config)?);

    // Ctrl-C cancels the accept loop for a clean exit.
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("shutdown requested");
                cancel.cancel();
            }
        });
    }

    server.run(cancel).await
}
