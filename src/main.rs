use clap::Parser;
use eyre::{Context, Result, eyre};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use zed_chat_archive::sync;
use zed_chat_archive::utils::ImportConfig;

/// Import Zed editor AI chat history into a searchable SQLite archive.
/// Up to date with 0.225.9
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Directory holding the archived Zed data (conversations/ and threads/).
    /// Defaults to ./datasources if not set in config.
    #[arg(value_name = "SOURCE_DIR")]
    source_dir: Option<PathBuf>,

    /// Path of the unified archive database.
    /// Defaults to ./datasources/unified.db if not set in config.
    #[arg(value_name = "DB_PATH")]
    db_path: Option<PathBuf>,

    /// Path to a specific configuration file.
    /// Defaults to $XDG_CONFIG_HOME/zed-chat-archive/config.toml
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Discard the archive and reimport everything from scratch.
    #[arg(long)]
    full: bool,

    /// Print each record added, updated, deleted or skipped.
    #[arg(short, long)]
    verbose: bool,

    /// Suppress the run summary.
    #[arg(short, long)]
    quiet: bool,
}

#[derive(Deserialize, Default)]
struct FileConfig {
    source_dir: Option<PathBuf>,
    db_path: Option<PathBuf>,
}

fn load_file_config(explicit_path: Option<&Path>) -> Result<FileConfig> {
    let path = if let Some(p) = explicit_path {
        if !p.exists() {
            return Err(eyre!("Config file not found: {}", p.display()));
        }
        Some(p.to_path_buf())
    } else {
        // Search: XDG/OS config dir, then nothing
        dirs::config_dir()
            .map(|d| d.join("zed-chat-archive/config.toml"))
            .filter(|p| p.exists())
    };

    match path {
        None => Ok(FileConfig::default()),
        Some(p) => {
            let content = fs::read_to_string(&p)
                .wrap_err_with(|| format!("Failed to read config: {}", p.display()))?;
            toml::from_str(&content)
                .wrap_err_with(|| format!("Failed to parse config: {}", p.display()))
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // 1. Load config file (CLI path > default path)
    let file_cfg = load_file_config(cli.config.as_deref())?;

    // 2. Resolve source_dir (CLI > Config > Default)
    let source_dir = cli
        .source_dir
        .or(file_cfg.source_dir)
        .unwrap_or_else(|| PathBuf::from("datasources"));

    // 3. Resolve db_path (CLI > Config > Default)
    let db_path = cli
        .db_path
        .or(file_cfg.db_path)
        .unwrap_or_else(|| PathBuf::from("datasources/unified.db"));

    // 4. Build the Import Config
    let config = ImportConfig {
        source_dir,
        db_path,
        full: cli.full,
        verbose: cli.verbose,
        quiet: cli.quiet,
    };

    // 5. Run the Business Logic
    sync::execute(&config)?;
    Ok(())
}
