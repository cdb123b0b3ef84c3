//! Configuration for tilepress components.
//!
//! The INI file at `~/.tilepress/config.ini` is loaded into a [`ConfigFile`];
//! components take the typed configs derived from it:
//!
//! - [`WorkerConfig`] - batch size, lease sizing, backoff, worker count
//! - [`PyramidConfig`] - zoom range, per-zoom tile cap, tile size
//!
//! # Example
//!
//! ```
//! use tilepress::config::{ConfigFile, PyramidConfig, WorkerConfig};
//!
//! let file = ConfigFile::default();
//! let worker = WorkerConfig::from(&file);
//! let pyramid = PyramidConfig::from(&file);
//! assert_eq!(worker.batch_size(), 10);
//! assert_eq!(pyramid.zoom_range(), 0..=21);
//! ```

mod defaults;
mod file;
mod parser;
mod pyramid;
mod settings;
mod worker;
mod writer;

pub use defaults::*;
pub use file::{config_directory, config_file_path, ConfigFile, ConfigFileError};
pub use pyramid::PyramidConfig;
pub use settings::{LoggingSettings, PyramidSettings, QueueSettings, WorkerSettings};
pub use worker::WorkerConfig;
pub use writer::to_config_string;
