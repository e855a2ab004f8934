use std::fs;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};

use audio_dedup::playlist::Playlist;
use audio_dedup::utils::format_file_size;
use audio_dedup::{
    actions, DownloadOptions, DownloadOutcome, DownloadReport, Downloader, DuplicatePair,
    EventSink, HashDepth, HttpFetcher, ScanReport, Scanner,
};

#[derive(Parser)]
#[command(
    name = "audiodedup",
    version,
    about = "Find duplicate audio files by content and download new ones without re-fetching what you already own",
    long_about = "Scan directory trees for audio files with identical content, download audio links from a web page while skipping tracks already in your library, and export or delete the duplicates found."
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Scan directory trees for duplicate audio files
    Scan {
        /// Directories to scan (can be specified multiple times)
        #[arg(short, long, value_name = "PATH", required = true)]
        dir: Vec<PathBuf>,

        /// Hash entire files instead of size plus head and tail chunks
        #[arg(long)]
        full_hash: bool,

        /// Write duplicate pairs to a CSV file
        #[arg(long, value_name = "PATH")]
        export: Option<PathBuf>,

        /// Prompt to delete each duplicate after the scan
        #[arg(long)]
        delete: bool,

        /// Skip confirmation prompts (use with caution)
        #[arg(short, long)]
        yes: bool,
    },
    /// Download audio links from a web page, skipping duplicates
    Download {
        /// Page URL to pull audio links from
        url: String,

        /// Folder downloads are saved to
        #[arg(long, value_name = "PATH")]
        to: PathBuf,

        /// Existing library to check downloads against
        #[arg(long, value_name = "PATH")]
        existing: Option<PathBuf>,

        /// Hash entire files instead of size plus head and tail chunks
        #[arg(long)]
        full_hash: bool,
    },
    /// Build a playlist file from a folder of audio files
    Playlist {
        /// Folder to collect audio files from
        folder: PathBuf,

        /// Where to write the playlist JSON
        #[arg(long, value_name = "PATH")]
        out: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Scan {
            dir,
            full_hash,
            export,
            delete,
            yes,
        } => run_scan(dir, hash_depth(full_hash), export, delete, yes),
        Command::Download {
            url,
            to,
            existing,
            full_hash,
        } => run_download(url, to, existing, hash_depth(full_hash)),
        Command::Playlist { folder, out } => run_playlist(folder, out),
    }
}

fn hash_depth(full_hash: bool) -> HashDepth {
    if full_hash {
        HashDepth::Full
    } else {
        HashDepth::HeadTail
    }
}

fn run_scan(
    dirs: Vec<PathBuf>,
    depth: HashDepth,
    export: Option<PathBuf>,
    delete: bool,
    yes: bool,
) -> Result<()> {
    println!(
        "{}",
        style("Scanning directories for duplicate audio files...")
            .cyan()
            .bold()
    );

    let (events, receiver) = EventSink::channel();
    let worker = thread::spawn(move || Scanner::with_depth(depth).scan(&dirs, &events));

    drain_events(receiver);
    let report = worker.join().expect("scan worker panicked");

    display_scan(&report);

    if let Some(output) = export {
        actions::export_pairs_csv(&report.pairs, &output)?;
        println!("Exported duplicate pairs to {}", output.display());
    }

    if delete && !report.pairs.is_empty() {
        delete_duplicates(&report.pairs, yes)?;
    }

    Ok(())
}

fn run_download(
    url: String,
    to: PathBuf,
    existing: Option<PathBuf>,
    depth: HashDepth,
) -> Result<()> {
    println!(
        "{}",
        style(format!("Downloading audio files from {url}"))
            .cyan()
            .bold()
    );

    let options = DownloadOptions {
        source_url: url,
        dest_dir: to,
        existing_dir: existing,
        depth,
    };

    let (events, receiver) = EventSink::channel();
    let worker = thread::spawn(move || -> Result<DownloadReport> {
        let fetcher = HttpFetcher::new()?;
        Downloader::new(fetcher).run(&options, &events)
    });

    drain_events(receiver);
    let report = worker.join().expect("download worker panicked")?;

    display_download(&report);
    Ok(())
}

fn run_playlist(folder: PathBuf, out: PathBuf) -> Result<()> {
    let playlist = Playlist::from_folder(&folder);
    if playlist.is_empty() {
        println!("{}", style("No audio files found").yellow());
        return Ok(());
    }
    playlist.save(&out)?;
    println!(
        "Saved {} tracks from {} to {}",
        playlist.len(),
        folder.display(),
        out.display()
    );
    Ok(())
}

/// Print worker events as they arrive; returns once the worker has
/// finished and dropped its sink.
fn drain_events(receiver: std::sync::mpsc::Receiver<String>) {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap(),
    );
    spinner.enable_steady_tick(Duration::from_millis(120));
    for message in receiver {
        spinner.set_message(message.clone());
        spinner.println(format!("  {}", style(message).dim()));
    }
    spinner.finish_and_clear();
}

fn display_scan(report: &ScanReport) {
    println!();
    if report.pairs.is_empty() {
        println!("{}", style("No duplicates found").green().bold());
        println!("Audio files processed: {}", report.processed_count);
        return;
    }

    println!("{}", style("Duplicate Audio Files").cyan().bold());
    println!("{}", style("=".repeat(40)).cyan());

    let mut wasted = 0u64;
    for pair in &report.pairs {
        let size = fs::metadata(&pair.duplicate).map(|m| m.len()).unwrap_or(0);
        wasted += size;
        println!("  {} {}", style("original :").bold(), pair.original.display());
        println!(
            "  {} {} ({})",
            style("duplicate:").bold(),
            pair.duplicate.display(),
            format_file_size(size)
        );
        println!();
    }

    println!("{}", style("Summary").green().bold());
    println!("{}", style("-".repeat(20)).green());
    println!("Audio files processed: {}", report.processed_count);
    println!("Duplicate pairs found: {}", report.pairs.len());
    println!("Potential space savings: {}", format_file_size(wasted));
}

fn display_download(report: &DownloadReport) {
    println!();
    println!("{}", style("Download Summary").green().bold());
    println!("{}", style("-".repeat(20)).green());
    println!(
        "Downloaded: {}/{}",
        report.downloaded, report.total_candidates
    );
    println!("Duplicates skipped: {}", report.skipped_duplicates);

    let failures = report
        .outcomes
        .iter()
        .filter(|(_, outcome)| {
            matches!(
                outcome,
                DownloadOutcome::FailedTransfer | DownloadOutcome::FailedIntegrity
            )
        })
        .count();
    if failures > 0 {
        println!("{}", style(format!("Failures: {failures}")).red());
    }
}

/// Ask before removing each duplicate; the original in every pair is kept.
fn delete_duplicates(pairs: &[DuplicatePair], yes: bool) -> Result<()> {
    let mut freed = 0u64;
    let mut deleted = 0usize;

    for pair in pairs {
        if !yes {
            let proceed = dialoguer::Confirm::new()
                .with_prompt(format!("Delete {}?", pair.duplicate.display()))
                .interact()?;
            if !proceed {
                continue;
            }
        }
        match actions::delete_file(&pair.duplicate) {
            Ok(size) => {
                freed += size;
                deleted += 1;
                println!("Deleted: {}", pair.duplicate.display());
            }
            Err(err) => eprintln!("{}", style(format!("{err:#}")).red()),
        }
    }

    println!(
        "Deleted {} files, freed {}",
        deleted,
        format_file_size(freed)
    );
    Ok(())
}
