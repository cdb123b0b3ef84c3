//! tilepress CLI - Command-line interface
//!
//! Renders a georeferenced overlay image into a zip of web map tiles using
//! the tilepress library.

mod commands;
mod error;
mod runner;

use clap::{Parser, Subcommand};

use commands::config::ConfigCommands;
use commands::tile::TileArgs;

#[derive(Parser)]
#[command(name = "tilepress")]
#[command(version, about = "Cut overlay images into web map tile pyramids", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render an image into a tile archive
    Tile(TileArgs),

    /// Manage the configuration file
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Tile(args) => commands::tile::run(args).await,
        Commands::Config { command } => commands::config::run(command),
    };

    if let Err(e) = result {
        e.exit();
    }
}
