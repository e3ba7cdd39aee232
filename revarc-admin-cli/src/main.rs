//! Revarc Administration CLI

mod history;
mod maintain;
mod store;
mod transfer;
mod verify;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use revarc_core::{EngineConfig, Range, RevisionCriteria, VersionId};
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "revarc-admin")]
#[command(author = "Revarc Contributors")]
#[command(version = "0.1.0")]
#[command(about = "Document revision archive administration tool")]
struct Cli {
    /// Engine configuration file (JSON)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List the revisions of an archive
    Log {
        archive: PathBuf,
        /// Only revisions by this author
        #[arg(long)]
        author: Option<String>,
        /// Only the last revision of each major series
        #[arg(long)]
        major_only: bool,
        /// Only the newest N matching revisions
        #[arg(long)]
        last: Option<usize>,
    },

    /// Print the text of one revision
    Show { archive: PathBuf, version: String },

    /// Reconstruct every revision and report failures
    Verify {
        archive: PathBuf,
        #[arg(short, long)]
        quiet: bool,
    },

    /// Build an archive from JSON revision records
    Import {
        records: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Write the revision records of an archive as JSON
    Export {
        archive: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Re-encode an archive with the configured snapshot interval
    Compact {
        archive: PathBuf,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Recover metadata of legacy revisions from their XML text
    Recover {
        archive: PathBuf,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Append a revision, creating the archive if needed
    Commit {
        archive: PathBuf,
        /// File holding the new text ("-" for stdin)
        file: String,
        #[arg(long, default_value = "")]
        author: String,
        #[arg(long, default_value = "")]
        comment: String,
        #[arg(long)]
        minor: bool,
        /// Document id for a new archive
        #[arg(long, default_value_t = 0)]
        doc_id: i64,
        /// Wiki name for a new archive
        #[arg(long, default_value = "")]
        wiki: String,
    },

    /// Delete a range of revisions
    Remove {
        archive: PathBuf,
        from: String,
        to: String,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let env_filter = if cli.debug {
        tracing_subscriber::EnvFilter::new("debug")
    } else {
        tracing_subscriber::EnvFilter::from_default_env()
            .add_directive(tracing::Level::INFO.into())
    };
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(env_filter)
        .init();

    let config = match &cli.config {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => EngineConfig::default(),
    };

    match cli.command {
        Commands::Log {
            archive,
            author,
            major_only,
            last,
        } => {
            let parsed = store::read_archive(&archive, &config)?;
            let mut criteria = RevisionCriteria::new();
            if let Some(author) = author {
                criteria = criteria.with_author(author);
            }
            if major_only {
                criteria = criteria.major_only();
            }
            if let Some(n) = last {
                criteria = criteria.with_range(Range::Last(n));
            }
            for line in history::log_lines(&parsed.chain, &criteria)? {
                println!("{}", line);
            }
        }

        Commands::Show { archive, version } => {
            let version: VersionId = version.parse()?;
            let parsed = store::read_archive(&archive, &config)?;
            let text = parsed.chain.reconstruct(version)?;
            print!("{}", text);
        }

        Commands::Verify { archive, quiet } => {
            verify::verify_archive(&archive, &config, quiet)?;
        }

        Commands::Import { records, output } => {
            println!("Importing records: {}", records.display());
            let count = transfer::import_records(&records, &output)?;
            println!("Wrote {} revisions to {}", count, output.display());
        }

        Commands::Export { archive, output } => {
            let count = transfer::export_records(&archive, &output, &config)?;
            println!("Exported {} records to {}", count, output.display());
        }

        Commands::Compact { archive, output } => {
            let count = maintain::compact_archive(&archive, output.as_deref(), &config)?;
            println!(
                "Compacted {} revisions (snapshot every {})",
                count, config.nodes_per_full
            );
        }

        Commands::Recover { archive, output } => {
            let (recovered, legacy) =
                maintain::recover_archive(&archive, output.as_deref(), &config)?;
            println!("Recovered {} of {} legacy revisions", recovered, legacy);
        }

        Commands::Commit {
            archive,
            file,
            author,
            comment,
            minor,
            doc_id,
            wiki,
        } => {
            let text = read_input(&file)?;
            let version = maintain::commit_revision(
                &archive,
                &text,
                maintain::metadata_now(author, comment),
                minor,
                maintain::NewArchive { doc_id, wiki },
                &config,
            )?;
            println!("Committed version {}", version);
        }

        Commands::Remove {
            archive,
            from,
            to,
            output,
        } => {
            let from: VersionId = from.parse()?;
            let to: VersionId = to.parse()?;
            let removed =
                maintain::remove_revisions(&archive, from, to, output.as_deref(), &config)?;
            println!("Removed {} revisions", removed);
        }
    }

    Ok(())
}

fn read_input(file: &str) -> Result<String> {
    if file == "-" {
        let mut text = String::new();
        std::io::stdin()
            .read_to_string(&mut text)
            .context("Failed to read stdin")?;
        Ok(text)
    } else {
        std::fs::read_to_string(Path::new(file)).with_context(|| format!("Failed to read {}", file))
    }
}
