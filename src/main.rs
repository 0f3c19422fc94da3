//! # Leech BitTorrent Client
//!
//! A command-line BitTorrent downloader for single-file torrents.
//!
//! ## Usage
//!
//! ```bash
//! leech <torrent_file>
//! leech <torrent_file> -o <output_file>
//! RUST_LOG=leech=debug leech <torrent_file> --max-connecting 20
//! ```

#[macro_use]
extern crate log;

use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use leech::{tracker, DownloadConfig, ProgressObserver, ProgressSample, Torrent};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "A command-line BitTorrent downloader, written in Rust."
)]
struct Args {
    /// Path to the .torrent file
    torrent: PathBuf,

    /// Output filename (defaults to name from torrent)
    #[arg(short = 'o', long)]
    output: Option<PathBuf>,

    /// Port announced to the trackers
    #[arg(short = 'p', long, default_value_t = 6881)]
    port: u16,

    /// Failed verifications before a piece is given up on (0 retries forever)
    #[arg(long, default_value_t = 10)]
    max_attempts: u32,

    /// Limit on peers being connected to at the same time
    #[arg(long)]
    max_connecting: Option<usize>,

    /// Overwrite the output file without asking
    #[arg(short = 'y', long)]
    yes: bool,
}

impl Args {
    fn config(&self) -> DownloadConfig {
        DownloadConfig {
            max_attempts: (self.max_attempts > 0).then_some(self.max_attempts),
            max_connecting: self.max_connecting,
            ..DownloadConfig::default()
        }
    }
}

/// Renders progress samples on a terminal progress bar.
struct ProgressDisplay {
    bar: ProgressBar,
}

impl ProgressDisplay {
    fn new(nb_pieces: usize) -> Result<ProgressDisplay> {
        let bar = ProgressBar::new(nb_pieces as u64);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} {pos}/{len} pieces [{bar:40.cyan/blue}] {percent}% {msg}")?
                .progress_chars("#>-"),
        );
        bar.enable_steady_tick(Duration::from_millis(120));
        Ok(ProgressDisplay { bar })
    }
}

impl ProgressObserver for ProgressDisplay {
    fn on_progress(&self, sample: &ProgressSample) {
        self.bar.set_position(sample.completed as u64);
        self.bar.set_message(format!("{} peers", sample.active_peers));
    }
}

/// Sanitize a filename to prevent path traversal and basic issues.
fn sanitize_filename(filename: &str) -> String {
    // Replace path separators with underscores to prevent directory traversal
    let safe_name = filename.replace(['/', '\\'], "_");

    if safe_name.trim().is_empty() || safe_name == "." || safe_name == ".." {
        "download".to_string()
    } else {
        safe_name
    }
}

fn confirm_overwrite(path: &Path) -> Result<bool> {
    println!("Output file '{}' already exists.", path.display());
    print!("Do you want to overwrite it? (y/N): ");
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    let input = input.trim().to_lowercase();

    Ok(input == "y" || input == "yes")
}

/// Writes the assembled file. Nothing is created on disk before this.
fn write_output(path: &Path, data: &[u8]) -> Result<()> {
    let mut output_file = File::create(path)
        .with_context(|| format!("could not create output file '{}'", path.display()))?;

    output_file
        .write_all(data)
        .with_context(|| format!("could not write data to file '{}'", path.display()))?;

    Ok(())
}

fn run(args: Args) -> Result<()> {
    if !args.torrent.exists() {
        return Err(anyhow!(
            "could not find torrent file: {}",
            args.torrent.display()
        ));
    }

    let torrent = Torrent::open(&args.torrent)?;

    let output_filepath = match &args.output {
        Some(output) => output.clone(),
        None => PathBuf::from(sanitize_filename(torrent.name())),
    };

    if output_filepath.exists() && !args.yes && !confirm_overwrite(&output_filepath)? {
        println!("Download cancelled.");
        return Ok(());
    }

    let peers = tracker::request_peers(&torrent, args.port)?;
    info!("Found {} peers", peers.len());

    println!(
        "Downloading {:?} ({} pieces, {} bytes) from {} peers",
        torrent.name(),
        torrent.piece_count(),
        torrent.length(),
        peers.len()
    );

    let display = ProgressDisplay::new(torrent.piece_count())?;
    let data = torrent.download(&peers, &args.config(), &display)?;
    display.bar.finish();

    write_output(&output_filepath, &data)?;

    println!("Saved in \"{}\".", output_filepath.display());

    Ok(())
}

fn main() {
    // Initialize logger
    pretty_env_logger::init_timed();

    let args = Args::parse();

    if let Err(error) = run(args) {
        eprintln!("Error: {:#}", error);
        std::process::exit(1);
    }
}
