use std::env;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing::{error, info};

use mailsink::runtime::Runtime;
use mailsink::utils::config::ConfigLoader;

const SHUTDOWN_DEADLINE: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let mut config_path = String::from("/etc/mailsink/config.ini");

    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" | "-c" => {
                config_path = args
                    .next()
                    .ok_or_else(|| anyhow::anyhow!("--config requires a path"))?;
            }
            other => {
                error!("Unknown argument: {}", other);
                std::process::exit(1);
            }
        }
    }

    let config = Arc::new(ConfigLoader::load(&config_path)?);
    let runtime = Arc::new(Runtime::new(config));
    let mut tasks: Vec<tokio::task::JoinHandle<()>> = Vec::new();

    info!("Mailsink starting");
    runtime.run(&mut tasks).await?;

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");
    runtime.shutdown(SHUTDOWN_DEADLINE).await;

    for task in tasks {
        let _ = task.await;
    }

    Ok(())
}
