use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "stash", about = "Attachment ingestion pipeline")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Validate, scan and store a file
    Ingest {
        /// Path to the file to ingest
        file: PathBuf,
        /// Declared extension (defaults to the file's own)
        #[arg(long)]
        ext: Option<String>,
    },
    /// Download a stored attachment
    Get {
        /// Attachment id, optionally with its extension
        id: String,
        /// Output file (defaults to `<id><ext>` in the current directory)
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    /// Delete a stored attachment
    Delete {
        /// Attachment id, optionally with its extension
        id: String,
    },
    /// Move a stored attachment into quarantine
    Quarantine {
        /// Attachment id, optionally with its extension
        id: String,
    },
    /// List stored attachments
    List {
        /// List the quarantine bucket instead
        #[arg(long)]
        quarantined: bool,
    },
    /// Run the retention sweeper until interrupted
    Sweep {
        /// Run a single pass and exit
        #[arg(long)]
        once: bool,
    },
}

/// Extension to declare for an input file, taken from its name.
pub fn declared_extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty())
        .map(|e| e.to_lowercase())
}

/// Where `get` writes a downloaded attachment when no output file is given.
pub fn default_output_path(dir: &Path, id: &str, extension: &str) -> PathBuf {
    dir.join(format!("{}{}", id, extension))
}
