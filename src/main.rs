use std::{net::SocketAddr, sync::Arc};

use adobe_adapters::{
    aem,
    api::{http, protocol::Dispatcher, stdio},
    config::{AemConfig, WorkfrontConfig},
    core::Adapter,
    logging, workfront,
};
use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;

#[derive(Parser)]
#[command(name = "adobe-adapters", version, about = "Tool adapters for Adobe Experience Manager and Workfront")]
struct Cli {
    /// Serve the tool protocol over HTTP on this address instead of stdio
    #[arg(long, global = true, env = "ADAPTER_HTTP_ADDR")]
    http: Option<SocketAddr>,

    #[command(subcommand)]
    adapter: AdapterKind,
}

#[derive(Subcommand)]
enum AdapterKind {
    /// Adobe Experience Manager assets, pages, search and replication
    Aem,
    /// Adobe Workfront objects
    Workfront,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init();
    let cli = Cli::parse();

    let reqwest_client = reqwest::Client::builder()
        .build()
        .context("building HTTP client")?;

    let adapter: Arc<dyn Adapter> = match cli.adapter {
        AdapterKind::Aem => {
            let config = AemConfig::from_env()?;
            info!(message = "Starting AEM adapter", host = %config.host);
            Arc::new(aem::connect(&config, reqwest_client).context("invalid AEM_CLIENT_ID")?)
        }
        AdapterKind::Workfront => {
            let config = WorkfrontConfig::from_env()?;
            info!(message = "Starting Workfront adapter", host = %config.host, api_version = %config.api_version);
            Arc::new(workfront::connect(&config, reqwest_client))
        }
    };

    let dispatcher = Dispatcher::new(adapter);
    match cli.http {
        Some(addr) => http::serve(dispatcher, addr).await?,
        None => stdio::serve(dispatcher).await?,
    }
    Ok(())
}
