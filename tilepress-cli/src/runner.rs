//! CLI runner for common setup and operations.
//!
//! Encapsulates configuration loading, logging initialization and service
//! creation so command handlers stay small.

use std::path::Path;

use tracing::info;
use tilepress::config::{ConfigFile, PyramidConfig};
use tilepress::logging::{init_logging_at, LoggingGuard};
use tilepress::notify::BroadcastChannel;
use tilepress::render::AffineRenderer;
use tilepress::service::{MemoryTilingService, TilingService};

use crate::error::CliError;

/// Runner that manages CLI lifecycle and common operations.
pub struct CliRunner {
    /// Keeps logging active while the runner exists
    #[allow(dead_code)]
    logging_guard: LoggingGuard,
    config: ConfigFile,
}

impl CliRunner {
    /// Loads the config file (defaults if absent) and starts logging.
    pub fn new() -> Result<Self, CliError> {
        let config = ConfigFile::load()?;
        let logging_guard = init_logging_at(&config.logging.file)
            .map_err(|e| CliError::LoggingInit(e.to_string()))?;

        Ok(Self {
            logging_guard,
            config,
        })
    }

    pub fn config(&self) -> &ConfigFile {
        &self.config
    }

    /// Log startup information for a command.
    pub fn log_startup(&self, command: &str) {
        info!("tilepress v{}", tilepress::VERSION);
        info!("tilepress CLI: {} command", command);
    }

    /// Creates an in-process service publishing progress on `channel`.
    pub fn create_service(
        &self,
        channel: BroadcastChannel,
    ) -> MemoryTilingService<AffineRenderer, BroadcastChannel> {
        let tile_size = PyramidConfig::from(&self.config).tile_size();
        TilingService::in_memory(AffineRenderer::new(tile_size), channel, &self.config)
    }

    /// Writes the finished archive to disk.
    pub fn save_archive(&self, path: &Path, data: &[u8]) -> Result<(), CliError> {
        std::fs::write(path, data).map_err(|e| CliError::FileWrite {
            path: path.to_path_buf(),
            error: e,
        })?;

        let size_mb = data.len() as f64 / 1_048_576.0;
        info!(path = %path.display(), bytes = data.len(), "Archive saved");
        println!("Saved {} ({:.2} MB)", path.display(), size_mb);
        Ok(())
    }
}
