use clap::{ArgAction, Parser, Subcommand};
use secu_engine::{
    create_archive_with, extract_archive_with, ArchiveError, ArchiveOptions, ArchiveReader,
    EntryType, ExtractOptions, CURRENT_VERSION,
};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "secu", version, about = "Pack and unpack SECU archives")]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug). RUST_LOG overrides.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Pack a directory into an archive
    Pack {
        dir:     PathBuf,
        archive: PathBuf,
        /// Table layout: 2 (length-prefixed names) or 1 (legacy 512-byte names)
        #[arg(long, default_value_t = CURRENT_VERSION)]
        format_version: u32,
        /// Fail instead of replacing an existing archive
        #[arg(long)]
        no_overwrite: bool,
    },
    /// Unpack an archive into a directory
    Unpack {
        archive: PathBuf,
        dir:     PathBuf,
        /// Fail instead of replacing existing files
        #[arg(long)]
        no_overwrite: bool,
    },
    /// List archive entries
    List {
        archive: PathBuf,
        #[arg(long)]
        json: bool,
    },
    /// Show header fields
    Info {
        archive: PathBuf,
        #[arg(long)]
        json: bool,
    },
    /// Check that every entry is in bounds and the data region is fully used
    Verify {
        archive: PathBuf,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error ({}): {e}", e.kind().name());
            ExitCode::from(e.code() as u8)
        }
    }
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run(command: Commands) -> Result<(), ArchiveError> {
    match command {
        // ── Pack ─────────────────────────────────────────────────────────────
        Commands::Pack { dir, archive, format_version, no_overwrite } => {
            let opts = ArchiveOptions { format_version, overwrite: !no_overwrite };
            create_archive_with(&archive, &dir, &opts)?;
            println!("Created: {}", archive.display());
        }

        // ── Unpack ───────────────────────────────────────────────────────────
        Commands::Unpack { archive, dir, no_overwrite } => {
            let opts = ExtractOptions { overwrite: !no_overwrite };
            extract_archive_with(&archive, &dir, &opts)?;
            println!("Unpacked to: {}", dir.display());
        }

        // ── List ─────────────────────────────────────────────────────────────
        Commands::List { archive, json } => {
            let reader = ArchiveReader::open(&archive)?;
            if json {
                println!("{}", to_json(reader.entries())?);
                return Ok(());
            }
            println!("Archive: {}", archive.display());
            println!("{:<5} {:>12} {:>12}  Name", "Type", "Offset", "Size");
            for e in reader.entries() {
                let kind = match e.kind {
                    EntryType::File      => "file",
                    EntryType::Directory => "dir",
                };
                println!("{:<5} {:>12} {:>12}  {}", kind, e.offset, e.size, e.name);
            }
        }

        // ── Info ─────────────────────────────────────────────────────────────
        Commands::Info { archive, json } => {
            let reader = ArchiveReader::open(&archive)?;
            let h = reader.header();
            if json {
                println!("{}", to_json(h)?);
                return Ok(());
            }
            println!("── SECU Archive ─────────────────────────────────────────");
            println!("  Path              {}", archive.display());
            println!("  Format version    {}", h.version);
            println!("  Entries           {}", h.file_count);
            println!("  File table offset {} B", h.file_table_offset);
            println!("  Data table offset {} B", h.data_table_offset);
            println!("  Data region       {} B", reader.data_len());
            println!("  Archive size      {} B", reader.archive_len());
        }

        // ── Verify ───────────────────────────────────────────────────────────
        Commands::Verify { archive } => {
            let mut reader = ArchiveReader::open(&archive)?;
            let report = reader.verify()?;
            println!(
                "ok: {} files, {} directories, {} data bytes",
                report.files, report.directories, report.data_bytes
            );
        }
    }

    Ok(())
}

fn to_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<String, ArchiveError> {
    serde_json::to_string_pretty(value)
        .map_err(|e| ArchiveError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))
}
