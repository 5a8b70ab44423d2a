use chrono::{DateTime, Utc};
use eyre::{Context, Result, eyre};
use rusqlite::{Connection, OpenFlags, backup::Backup};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::NamedTempFile;

/// Configuration required to run an import.
/// This decouples the logic from how the arguments were parsed (CLI/Config file).
#[derive(Clone)]
pub struct ImportConfig {
    pub source_dir: PathBuf,
    pub db_path: PathBuf,
    pub full: bool,
    pub verbose: bool,
    pub quiet: bool,
}

/// What happened to a single source record during a sync pass.
#[derive(Clone, Copy)]
pub enum SyncOutcome {
    Added,
    Updated,
    Skipped,
}

/// Create a read-only snapshot of a database in a temporary file.
///
/// The live `threads.db` may be open in a running Zed instance; reading a
/// snapshot avoids holding locks against it for the duration of the pass.
pub fn backup_database(db_path: &Path) -> Result<NamedTempFile> {
    let src = Connection::open_with_flags(
        db_path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .wrap_err_with(|| format!("Failed to open source database: {}", db_path.display()))?;

    let tmp = NamedTempFile::new().wrap_err("Failed to create temporary file")?;
    let mut dst =
        Connection::open(tmp.path()).wrap_err("Failed to open snapshot database connection")?;

    {
        let backup = Backup::new(&src, &mut dst).wrap_err("Failed to initialize backup")?;
        backup
            .run_to_completion(1000, Duration::from_millis(5), None)
            .wrap_err("Backup did not complete successfully")?;
    }

    Ok(tmp)
}

/// Decompress data bytes based on the data type.
pub fn decompress(data_type: &str, raw_data: &[u8]) -> Result<Vec<u8>> {
    match data_type {
        "zstd" => zstd::decode_all(raw_data).wrap_err("zstd decompression failed"),
        "json" => Ok(raw_data.to_vec()),
        other => Err(eyre!("Unknown data_type: {:?}", other)),
    }
}

/// Render a file's modification time as an RFC 3339 string.
///
/// The string doubles as the change-detection value for conversation files,
/// so it must be deterministic for a given mtime.
pub fn file_mtime_rfc3339(path: &Path) -> Result<String> {
    let metadata = fs::metadata(path)
        .wrap_err_with(|| format!("Failed to stat file: {}", path.display()))?;
    let modified = metadata
        .modified()
        .wrap_err("Modification time not available")?;
    Ok(DateTime::<Utc>::from(modified).to_rfc3339())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decompress_passes_json_through() {
        let raw = br#"{"version":"0.3.0"}"#;
        let out = decompress("json", raw).unwrap();
        assert_eq!(out, raw.to_vec());
    }

    #[test]
    fn decompress_handles_zstd() {
        let raw = br#"{"version":"0.2.0","messages":[]}"#;
        let compressed = zstd::encode_all(&raw[..], 3).unwrap();
        let out = decompress("zstd", &compressed).unwrap();
        assert_eq!(out, raw.to_vec());
    }

    #[test]
    fn decompress_rejects_unknown_data_type() {
        assert!(decompress("lz4", b"x").is_err());
    }

    #[test]
    fn mtime_string_is_stable_for_an_unchanged_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.zed.json");
        fs::write(&path, "{}").unwrap();
        let first = file_mtime_rfc3339(&path).unwrap();
        let second = file_mtime_rfc3339(&path).unwrap();
        assert_eq!(first, second);
    }
}
