//! Directory backups as gzip-compressed tar archives.
//!
//! A backup contains the source directory under its own base name. Hidden
//! entries (leading `.`) and excluded names are skipped at every level.

use chrono::{DateTime, Local};
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

/// Names left out of a full backup.
pub const DEFAULT_EXCLUDES: &[&str] = &["backup", "logs", "steward.log"];

#[derive(Debug, Error)]
pub enum BackupError {
    #[error("Backup source {0} is not a directory")]
    InvalidSource(PathBuf),

    #[error("Backup directory {0} is not writable")]
    NotWritable(PathBuf),

    #[error("Couldn't write backup: {0}")]
    Io(#[from] io::Error),
}

/// Archives `source` into `backup_dir`, skipping `excludes`.
pub fn perform_full_backup(
    source: &Path,
    backup_dir: &Path,
    version: &str,
    excludes: &[String],
) -> Result<PathBuf, BackupError> {
    let name = backup_file_name(None, version, Local::now());
    write_archive(source, backup_dir, &name, excludes)
}

/// Archives the plugin directory. Nothing is excluded.
pub fn perform_plugins_backup(
    plugins_dir: &Path,
    backup_dir: &Path,
    version: &str,
) -> Result<PathBuf, BackupError> {
    let name = backup_file_name(Some("plugins"), version, Local::now());
    write_archive(plugins_dir, backup_dir, &name, &[])
}

/// `backup_[<kind>_]<version>_<yy-mm-dd_HH-MM>_<unix>.tar.gz`
pub fn backup_file_name(kind: Option<&str>, version: &str, at: DateTime<Local>) -> String {
    let kind = kind.map(|kind| format!("{kind}_")).unwrap_or_default();
    format!(
        "backup_{}{}_{}_{}.tar.gz",
        kind,
        version,
        at.format("%y-%m-%d_%H-%M"),
        at.timestamp()
    )
}

fn prepare_backup_dir(backup_dir: &Path) -> Result<(), BackupError> {
    if !backup_dir.is_dir() {
        fs::create_dir_all(backup_dir)?;
        debug!("Created backup directory {}", backup_dir.display());
    }
    if fs::metadata(backup_dir)?.permissions().readonly() {
        return Err(BackupError::NotWritable(backup_dir.to_path_buf()));
    }
    Ok(())
}

fn write_archive(
    source: &Path,
    backup_dir: &Path,
    file_name: &str,
    excludes: &[String],
) -> Result<PathBuf, BackupError> {
    if !source.is_dir() {
        return Err(BackupError::InvalidSource(source.to_path_buf()));
    }
    prepare_backup_dir(backup_dir)?;

    let root = source
        .file_name()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("backup"));
    let target = backup_dir.join(file_name);

    let encoder = GzEncoder::new(File::create(&target)?, Compression::default());
    let mut archive = tar::Builder::new(encoder);
    archive.append_dir(&root, source)?;
    let entries = append_directory(&mut archive, source, &root, excludes)?;
    archive.into_inner()?.finish()?;

    info!(
        "Backup of {} written to {} ({} entries)",
        source.display(),
        target.display(),
        entries
    );
    Ok(target)
}

fn append_directory<W: io::Write>(
    archive: &mut tar::Builder<W>,
    dir: &Path,
    archive_dir: &Path,
    excludes: &[String],
) -> io::Result<usize> {
    let mut entries = fs::read_dir(dir)?.collect::<Result<Vec<_>, _>>()?;
    entries.sort_by_key(|entry| entry.file_name());

    let mut count = 0;
    for entry in entries {
        let name = entry.file_name();
        let name_str = name.to_string_lossy();
        if name_str.starts_with('.') || excludes.iter().any(|exclude| *exclude == name_str) {
            debug!("Skipping {}", entry.path().display());
            continue;
        }

        let path = entry.path();
        let archive_path = archive_dir.join(&name);
        let file_type = entry.file_type()?;
        if file_type.is_file() {
            archive.append_path_with_name(&path, &archive_path)?;
            count += 1;
        } else if file_type.is_dir() {
            archive.append_dir(&archive_path, &path)?;
            count += 1 + append_directory(archive, &path, &archive_path, excludes)?;
        }
    }
    Ok(count)
}
