// Copyright (C) 2026 Brian Johnson
//
// This program is free software; you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation; either version 2 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along
// with this program; if not, write to the Free Software Foundation, Inc.,
// 51 Franklin Street, Fifth Floor, Boston, MA 02110-1301 USA.


use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::Level;

use hdlink::{app, Link, LinkConfig, Role};

#[derive(Parser)]
#[command(name = "hdlink")]
#[command(about = "Stop-and-wait HDLC-style file transfer over RS-232", long_about = None)]
#[command(disable_help_subcommand = true)]
struct Cli {
    /// Serial port to use (e.g., /dev/ttyS0 or COM1)
    #[arg(short, long)]
    port: String,

    /// Baud rate
    #[arg(short, long, default_value = "38400")]
    baud: u32,

    /// Transmissions of a frame before giving up
    #[arg(short, long, default_value = "3")]
    retries: u32,

    /// Seconds to wait for an answer to each transmission
    #[arg(short, long, default_value = "3", value_name = "SECS")]
    timeout: u64,

    /// Largest payload per information frame
    #[arg(long, default_value = "1000", value_name = "BYTES")]
    max_payload: usize,

    /// Enable debug output
    #[arg(long)]
    debug: bool,

    /// Print link statistics after closing
    #[arg(long)]
    stats: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Send a file
    Send {
        /// File to send
        file: PathBuf,
    },
    /// Receive a file
    Receive {
        /// Directory to save the received file
        #[arg(short, long, default_value = ".")]
        output_dir: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(if cli.debug { Level::DEBUG } else { Level::INFO })
        .with_target(false)
        .init();

    if let Err(e) = run(cli) {
        tracing::error!("{:#}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let role = match &cli.command {
        Commands::Send { file } => {
            if !file.is_file() {
                bail!("File not found: {}", file.display());
            }
            Role::Transmitter
        }
        Commands::Receive { output_dir } => {
            if !output_dir.is_dir() {
                bail!("Output directory not found: {}", output_dir.display());
            }
            Role::Receiver
        }
    };

    let config = LinkConfig {
        role,
        baud_rate: cli.baud,
        max_retries: cli.retries,
        timeout: Duration::from_secs(cli.timeout),
        max_payload: cli.max_payload,
    };

    tracing::info!("Opening {} at {} baud as {:?}", cli.port, cli.baud, role);
    let mut link = Link::connect(&cli.port, config)
        .with_context(|| format!("failed to open link on {}", cli.port))?;

    match &cli.command {
        Commands::Send { file } => {
            let sent = app::send_file(&mut link, file).context("send failed")?;
            tracing::info!("File sent successfully ({} bytes)", sent);
        }
        Commands::Receive { output_dir } => {
            let path = app::receive_file(&mut link, output_dir).context("receive failed")?;
            tracing::info!("File received successfully: {}", path.display());
            app::wait_for_disconnect(&mut link).context("waiting for disconnect failed")?;
        }
    }

    let stats = link.close().context("failed to close link")?;
    if cli.stats {
        tracing::info!("{}", stats);
    }

    Ok(())
}
