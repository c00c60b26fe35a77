//! traceview server: UDP log receiver plus HTTP query service.
//!
//! Payloads arriving on the UDP port are queued, parsed and stored in
//! memory. The HTTP port serves range queries over the stored records and
//! the static UI from the content directory. Ctrl-C stops both listeners,
//! drains the ingestion queue and exits.

mod api;
mod udp;

use std::future::Future;
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use traceview::{InMemoryStore, PayloadParser, PipelineConfig, TraceConfig, TraceStore, ingest};

use crate::api::QueryApi;
use crate::udp::UdpReceiver;

/// traceview-server: collect log events over UDP and query them over HTTP.
#[derive(Parser)]
#[command(name = "traceview-server", version, about)]
struct Cli {
    /// Address both listeners bind to.
    #[arg(long, default_value = "0.0.0.0")]
    host: IpAddr,

    /// UDP port for incoming payloads.
    #[arg(long, default_value = "1969")]
    udp_port: u16,

    /// HTTP port for the query service.
    #[arg(long, default_value = "8969")]
    http_port: u16,

    /// Timestamp field names, comma separated. Empty uses built-in names.
    #[arg(long, default_value = "")]
    timestamp_fields: String,

    /// Message field names, comma separated. Empty uses built-in names.
    #[arg(long, default_value = "")]
    message_fields: String,

    /// Level field names, comma separated. Empty uses built-in names.
    #[arg(long, default_value = "")]
    level_fields: String,

    /// Correlation id field names, comma separated.
    #[arg(long, default_value = "")]
    correlation_id_fields: String,

    /// Keep the raw text of every payload next to its record.
    #[arg(long)]
    keep_original_payload: bool,

    /// Number of ingestion workers.
    #[arg(long, default_value = "2")]
    workers: usize,

    /// Capacity of the ingestion queue.
    #[arg(long, default_value = "200")]
    queue_capacity: usize,

    /// Directory of static files served by the HTTP port.
    #[arg(long, default_value = "./content")]
    content_dir: PathBuf,
}

impl Cli {
    fn trace_config(&self) -> TraceConfig {
        TraceConfig {
            timestamp_fields: TraceConfig::split_names(&self.timestamp_fields),
            message_fields: TraceConfig::split_names(&self.message_fields),
            level_fields: TraceConfig::split_names(&self.level_fields),
            correlation_id_fields: TraceConfig::split_names(&self.correlation_id_fields),
            keep_original_payload: self.keep_original_payload,
        }
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        error!("traceview-server failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config = cli.trace_config();
    config.validate()?;
    info!(?config, "field mapping");

    let parser = Arc::new(PayloadParser::new(config.clone()));
    let store: Arc<dyn TraceStore> = Arc::new(InMemoryStore::new(&config));
    let (handle, pipeline) = ingest::spawn(
        parser,
        Arc::clone(&store),
        PipelineConfig::new(cli.queue_capacity, cli.workers),
    );

    let udp = UdpReceiver::bind(SocketAddr::new(cli.host, cli.udp_port)).await?;
    info!(addr = %udp.local_addr()?, workers = pipeline.workers(), "UDP receiver listening");

    let listener = TcpListener::bind(SocketAddr::new(cli.host, cli.http_port)).await?;
    info!(addr = %listener.local_addr()?, content_dir = %cli.content_dir.display(), "HTTP query service listening");

    let api = QueryApi::new(Arc::clone(&store), pipeline.stats(), cli.content_dir);

    let (stop_tx, stop_rx) = watch::channel(false);
    let udp_task = tokio::spawn(udp.run(handle, stopped(stop_rx.clone())));
    let http_task = tokio::spawn(api.serve(listener, stopped(stop_rx)));

    let supervised = supervise(tokio::signal::ctrl_c(), udp_task, http_task, stop_tx).await;

    let counts = pipeline.join().await;
    info!(
        received = counts.received,
        stored = counts.stored,
        rejected = counts.rejected,
        store_failed = counts.store_failed,
        records = store.len(),
        "ingestion drained, exiting"
    );
    supervised
}

/// Waits for `shutdown` or for either listener task to end, then stops
/// both and waits for them.
///
/// A listener that ends before shutdown was requested is an error, so a
/// dead port takes the process down instead of going unnoticed.
async fn supervise(
    shutdown: impl Future<Output = io::Result<()>>,
    mut udp_task: JoinHandle<()>,
    mut http_task: JoinHandle<io::Result<()>>,
    stop_tx: watch::Sender<bool>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut udp_done = false;
    let mut http_done = false;

    let outcome: Result<(), Box<dyn std::error::Error>> = tokio::select! {
        signal = shutdown => signal.map(|()| info!("shutdown requested")).map_err(Into::into),
        served = &mut http_task => {
            http_done = true;
            match served {
                Ok(Ok(())) => Err("HTTP query service stopped unexpectedly".into()),
                Ok(Err(e)) => Err(e.into()),
                Err(e) => Err(e.into()),
            }
        }
        received = &mut udp_task => {
            udp_done = true;
            match received {
                Ok(()) => Err("UDP receiver stopped unexpectedly".into()),
                Err(e) => Err(e.into()),
            }
        }
    };

    // Fails only if both tasks are already gone.
    let _ = stop_tx.send(true);

    if !udp_done {
        udp_task.await?;
    }
    if !http_done {
        http_task.await??;
    }
    outcome
}

/// Resolves once `true` has been published on the stop channel.
async fn stopped(mut rx: watch::Receiver<bool>) {
    while !*rx.borrow_and_update() {
        if rx.changed().await.is_err() {
            return;
        }
    }
}
