//! arcache command-line front end.
//!
//! Mounts local archives through the cache and lists or prints their
//! members. Mostly useful to check what a provider makes of a file.

use arcache::error::{ErrorKind, Result};
use arcache::source::FileSource;
use arcache::{CacheManager, Config, MountHandle};
use clap::{ArgAction, Parser, Subcommand};
use exn::{OptionExt, ResultExt};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Read members of zip, tar, WARC and ARC archives through the archive cache.
#[derive(Parser, Debug)]
#[command(name = "arcache", author, version, about, long_about = None, propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Increase verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    /// Configuration file path
    #[arg(short, long, global = true, env = "ARCACHE_CONFIG_FILE")]
    config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the members of an archive
    List {
        file: PathBuf,
        /// File name to detect the archive type from, instead of FILE's
        #[arg(long)]
        name: Option<String>,
    },
    /// Write one member of an archive to stdout
    Cat {
        file: PathBuf,
        member: String,
        /// File name to detect the archive type from, instead of FILE's
        #[arg(long)]
        name: Option<String>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with_writer(io::stderr)
        .with_target(false)
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err:?}");
            ExitCode::FAILURE
        },
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load(cli.config.as_deref()).or_raise(|| ErrorKind::Config)?;
    let manager = CacheManager::start(&config).await?;
    let result = match cli.command {
        Command::List { file, name } => list(&manager, &file, name).await,
        Command::Cat { file, member, name } => cat(&manager, &file, member, name).await,
    };
    manager.shutdown();
    result
}

async fn mount(manager: &CacheManager, file: &Path, name: Option<String>) -> Result<MountHandle> {
    let mut source = FileSource::open(file).await.or_raise(|| ErrorKind::Cache)?;
    if let Some(name) = name {
        source = source.with_hint(name);
    }
    manager
        .get_or_create_mount(&source.key(), &source)
        .await?
        .ok_or_raise(|| ErrorKind::NotAnArchive(file.to_path_buf()))
}

async fn list(manager: &CacheManager, file: &Path, name: Option<String>) -> Result<()> {
    let handle = mount(manager, file, name).await?;
    tracing::info!(kind = %handle.kind(), members = handle.members().len(), "Mounted archive");
    let mut stdout = io::stdout().lock();
    for member in handle.members() {
        // A closed pipe (`arcache list x.zip | head`) just ends the listing.
        if writeln!(stdout, "{:>12}  {}", member.size, member.name).is_err() {
            break;
        }
    }
    Ok(())
}

async fn cat(manager: &CacheManager, file: &Path, member: String, name: Option<String>) -> Result<()> {
    let handle = mount(manager, file, name).await?;
    let task_member = member.clone();
    tokio::task::spawn_blocking(move || -> Result<u64> {
        let mut reader = handle.open(&task_member).or_raise(|| ErrorKind::Member(task_member.clone()))?;
        let mut stdout = io::stdout().lock();
        let copied = io::copy(&mut reader, &mut stdout).or_raise(|| ErrorKind::Member(task_member.clone()))?;
        stdout.flush().or_raise(|| ErrorKind::Member(task_member.clone()))?;
        Ok(copied)
    })
    .await
    .or_raise(|| ErrorKind::Member(member))??;
    Ok(())
}
