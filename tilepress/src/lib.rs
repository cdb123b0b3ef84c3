//! tilepress - tile pyramids from georeferenced overlay images
//!
//! An uploaded image is placed on the world map by three corner points,
//! cut into 256x256 PNG tiles across a range of zoom levels, and packaged
//! into one downloadable zip once every tile exists.
//!
//! Rendering is spread over any number of workers sharing a leased work
//! queue. Workers may crash or race; the completion gate still triggers
//! archive assembly exactly once per job.
//!
//! # High-Level API
//!
//! The [`service`] module wires every component together:
//!
//! ```ignore
//! use tilepress::config::ConfigFile;
//! use tilepress::notify::TracingChannel;
//! use tilepress::render::AffineRenderer;
//! use tilepress::service::TilingService;
//!
//! let service = TilingService::in_memory(AffineRenderer::default(), TracingChannel, &ConfigFile::load()?);
//! let job = service.create_job("alice", image).await?;
//! service.start(&job.id, corners, Some(0..=12)).await?;
//! service.run_workers(&job.id, 4, cancel).await?;
//! ```
//!
//! Lower-level pieces live in [`job`], [`worker`], [`store`], [`queue`],
//! [`render`] and [`notify`].

pub mod config;
pub mod coord;
pub mod error;
pub mod job;
pub mod logging;
pub mod notify;
pub mod queue;
pub mod render;
pub mod service;
pub mod store;
pub mod time;
pub mod worker;

/// Version of the tilepress library and CLI.
///
/// Synchronized across the workspace from `Cargo.toml`.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
