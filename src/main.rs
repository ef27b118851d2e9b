//! vizstream server binary.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use vizstream::{FrameStore, Settings};

/// Stream a pre-encoded visualization frame log to websocket viewers.
#[derive(Debug, Parser)]
#[command(name = "vizstream", version, about)]
struct Cli {
    /// Directory holding the log's frame files (`<seq>-frame.json` /
    /// `<seq>-frame.glb`, lowest sequence number is the metadata).
    #[arg(long, env = "VIZSTREAM_LOG_DIR")]
    log_dir: PathBuf,

    /// Websocket listen port.
    #[arg(long, default_value_t = 8081)]
    port: u16,

    /// Live mode: metadata carries no log bounds and completed windows do
    /// not report transform_log_done.
    #[arg(long)]
    live: bool,

    /// Default playback window length in log-time milliseconds.
    #[arg(long, default_value_t = 30_000.0)]
    duration: f64,

    /// Delay in milliseconds between a completed send and the next.
    #[arg(long, default_value_t = 50)]
    send_interval: u64,

    /// Skip sending image-bearing (binary) frames.
    #[arg(long)]
    skip_images: bool,

    /// Hard ceiling on frame indices served per playback window.
    #[arg(long)]
    frame_limit: Option<usize>,

    /// Loop playback, rebasing timestamps across each restart.
    #[arg(long = "loop")]
    loop_playback: bool,
}

impl Cli {
    fn settings(&self) -> Settings {
        Settings {
            live: self.live,
            duration_ms: self.duration,
            send_interval_ms: self.send_interval,
            skip_images: self.skip_images,
            frame_limit: self.frame_limit.unwrap_or(usize::MAX),
            loop_playback: self.loop_playback,
            port: self.port,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();
    let settings = Arc::new(cli.settings());

    let store = FrameStore::load_dir(&cli.log_dir)
        .with_context(|| format!("loading frame log from {}", cli.log_dir.display()))?;

    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, shutting down");
            signal_cancel.cancel();
        }
    });

    vizstream::server::serve(store, settings, cancel)
        .await
        .context("server terminated")?;
    Ok(())
}
