//! vsphere-delete - remove a managed entity from a vSphere inventory.
//!
//! Looks the entity up by name under the root folder (virtual machine,
//! cluster, folder, datacenter, ...), submits `Destroy_Task`, and waits for
//! the task to finish.

mod config;
mod delete;
mod error;
#[cfg(test)]
mod fake;
mod locator;
mod task_poller;

use clap::Parser;
use config::{Config, ConfigError, expand_tilde};
use delete::delete_entity;
use std::path::PathBuf;
use tracing::{debug, info, warn};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};
use vsphere_api::VimClient;

/// Delete a managed entity by name
#[derive(Parser, Debug)]
#[command(name = "vsphere-delete")]
#[command(about = "Delete a virtual machine, cluster or folder from a vSphere inventory")]
struct Args {
    /// URL of the vCenter/ESXi web service
    #[arg(long)]
    url: Option<String>,

    /// Username for the authentication
    #[arg(long)]
    username: Option<String>,

    /// Password for the authentication
    #[arg(long)]
    password: Option<String>,

    /// Name of the entity to delete
    #[arg(long)]
    entityname: String,

    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Accept invalid TLS certificates
    #[arg(long)]
    insecure: bool,

    /// Seconds to wait for the destroy task (0 waits indefinitely)
    #[arg(long)]
    timeout_secs: Option<u64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging();

    let mut config = match &args.config {
        Some(path) => Config::load(expand_tilde(path))?,
        None => match Config::load_default() {
            Ok(config) => config,
            Err(ConfigError::NotFound(msg)) => {
                debug!("{msg}");
                Config::default()
            }
            Err(e) => return Err(e.into()),
        },
    };
    config.merge_args(
        args.url,
        args.username,
        args.password,
        args.insecure,
        args.timeout_secs,
    );
    let connection = config.connection()?;

    debug!("vSphere URL: {}", connection.url);
    debug!("API release: {}", connection.options.release);

    let mut client = VimClient::connect(
        connection.url.as_str(),
        &connection.username,
        &connection.password,
        &connection.options,
    )
    .await?;
    info!("Connected to {}", client.about().full_name);

    let result = delete_entity(&client, &args.entityname, config.delete_options()).await;

    if let Err(e) = client.logout().await {
        warn!("Logout failed: {e}");
    }

    let report = result?;
    println!("{report}");
    Ok(())
}

fn init_logging() {
    // Base filter suppresses noisy libraries, RUST_LOG layers on top (can override if explicit)
    let base = "hyper=warn,hyper_util=warn,reqwest=warn,rustls=warn";
    let filter = match std::env::var("RUST_LOG") {
        Ok(env) => EnvFilter::new(format!("{base},{env}")),
        Err(_) => EnvFilter::new(format!("{base},info")),
    };

    // Logs go to stderr so stdout only carries the result line
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .init();
}
