//! `tile` command: render an overlay image into a downloadable tile archive.

use std::collections::HashSet;
use std::io::Write;
use std::path::PathBuf;

use bytes::Bytes;
use clap::Args;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use tilepress::config::PyramidConfig;
use tilepress::coord::{Corners, WorldPoint};
use tilepress::notify::{BroadcastChannel, Notification, ProgressMessage};
use tilepress::service::ServiceError;

use crate::error::CliError;
use crate::runner::CliRunner;

/// Arguments for the `tile` command.
#[derive(Debug, Args)]
pub struct TileArgs {
    /// Source image (PNG, JPEG or GIF)
    #[arg(long)]
    pub image: PathBuf,

    /// World pixel position of the image's top-left corner at zoom 0
    #[arg(long, value_name = "X,Y")]
    pub top_left: WorldPoint,

    /// World pixel position of the image's top-right corner at zoom 0
    #[arg(long, value_name = "X,Y")]
    pub top_right: WorldPoint,

    /// World pixel position of the image's bottom-right corner at zoom 0
    #[arg(long, value_name = "X,Y")]
    pub bottom_right: WorldPoint,

    /// Lowest zoom level to render (default from config)
    #[arg(long)]
    pub min_zoom: Option<u8>,

    /// Highest zoom level to render (default from config)
    #[arg(long)]
    pub max_zoom: Option<u8>,

    /// Concurrent workers (default from config)
    #[arg(long)]
    pub workers: Option<usize>,

    /// Owner recorded on the job
    #[arg(long, default_value = "local")]
    pub owner: String,

    /// Output zip file
    #[arg(long, short)]
    pub output: PathBuf,
}

impl TileArgs {
    fn corners(&self) -> Corners {
        Corners::new(self.top_left, self.top_right, self.bottom_right)
    }
}

/// Run the tile command.
pub async fn run(args: TileArgs) -> Result<(), CliError> {
    let runner = CliRunner::new()?;
    runner.log_startup("tile");

    let channel = BroadcastChannel::default();
    let progress_rx = channel.subscribe();
    let service = runner.create_service(channel);

    let image = tokio::fs::read(&args.image)
        .await
        .map_err(|e| CliError::ReadImage {
            path: args.image.clone(),
            error: e,
        })?;
    let job = service.create_job(&args.owner, Bytes::from(image)).await?;

    let zooms = zoom_range(
        &PyramidConfig::from(runner.config()),
        args.min_zoom,
        args.max_zoom,
    );
    let record = service.start(&job.id, args.corners(), Some(zooms.clone())).await?;
    println!(
        "Job {}: {} tiles across zoom {} to {}",
        job.id,
        record.total_tiles,
        zooms.start(),
        zooms.end()
    );

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received, stopping workers");
            interrupt.cancel();
        }
    });

    let stop_progress = CancellationToken::new();
    let progress = tokio::spawn(report_progress(
        progress_rx,
        record.total_tiles,
        stop_progress.clone(),
    ));

    let workers = args
        .workers
        .unwrap_or_else(|| service.worker_config().workers());
    let outcome = service.run_workers(&job.id, workers, cancel).await;
    if outcome.is_ok() {
        service
            .dispatcher()
            .run_pending()
            .await
            .map_err(ServiceError::from)?;
    }
    stop_progress.cancel();
    let _ = progress.await;
    println!();

    let summary = outcome?;
    info!(
        job_id = %job.id,
        tiles = summary.tiles_rendered,
        cycles = summary.cycles,
        "Tiling finished"
    );

    let archive = service.download(&job.id).await?;
    runner.save_archive(&args.output, &archive.data)
}

/// Resolves the zoom range from flags, falling back to the configured range.
fn zoom_range(
    pyramid: &PyramidConfig,
    min_zoom: Option<u8>,
    max_zoom: Option<u8>,
) -> std::ops::RangeInclusive<u8> {
    let configured = pyramid.zoom_range();
    let min = min_zoom.unwrap_or(*configured.start());
    let max = max_zoom.unwrap_or(*configured.end());
    min..=max
}

/// Prints a running tile count until `stop` fires.
///
/// Queued notifications are drained before stopping.
async fn report_progress(
    mut rx: broadcast::Receiver<Notification>,
    total: u64,
    stop: CancellationToken,
) {
    let mut seen: HashSet<String> = HashSet::new();
    loop {
        tokio::select! {
            biased;

            result = rx.recv() => {
                match result {
                    Ok(notification) => {
                        let Ok(message) = ProgressMessage::from_payload(&notification.payload) else {
                            continue;
                        };
                        seen.extend(message.ids);
                        print!("\r  {}/{} tiles", seen.len(), total);
                        if message.tiles_done {
                            print!(" (all stored, packaging)");
                        }
                        let _ = std::io::stdout().flush();
                    }
                    Err(RecvError::Closed) => break,
                    Err(RecvError::Lagged(n)) => {
                        debug!("Progress reporter lagged by {} messages", n);
                    }
                }
            }

            _ = stop.cancelled() => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zoom_range_falls_back_to_config() {
        let pyramid = PyramidConfig::new().with_zoom_range(2..=9);

        assert_eq!(zoom_range(&pyramid, None, None), 2..=9);
        assert_eq!(zoom_range(&pyramid, Some(4), None), 4..=9);
        assert_eq!(zoom_range(&pyramid, None, Some(6)), 2..=6);
    }
}
