// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Durable file replacement.
//!
//! Readers of a file written here observe either the old contents or the new
//! contents, never a mix, and the replacement survives power loss once this
//! returns.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Replaces `path` with `data` via temp file, fsync, rename, fsync(dir).
pub fn write_atomic(path: &Path, data: &[u8]) -> io::Result<()> {
    let dir = parent_dir(path);
    let tmp_path = temp_sibling(path);

    let result = write_then_rename(&tmp_path, path, data).and_then(|()| sync_dir(&dir));

    if result.is_err() {
        let _ = fs::remove_file(&tmp_path);
    }
    result
}

fn write_then_rename(tmp_path: &Path, path: &Path, data: &[u8]) -> io::Result<()> {
    let mut tmp = OpenOptions::new().write(true).create_new(true).open(tmp_path)?;
    tmp.write_all(data)?;
    tmp.sync_all()?;
    drop(tmp);
    fs::rename(tmp_path, path)
}

/// Fsyncs a directory so renames and creates inside it are durable.
#[cfg(unix)]
pub fn sync_dir(dir: &Path) -> io::Result<()> {
    File::open(dir)?.sync_all()
}

#[cfg(not(unix))]
pub fn sync_dir(_dir: &Path) -> io::Result<()> {
    Ok(())
}

pub(crate) fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

// Hidden, unique per writer: `.index.yaml.tmp-<pid>-<rand>`.
fn temp_sibling(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "file".to_string());
    let nonce: u32 = rand::random();
    parent_dir(path).join(format!(".{}.tmp-{}-{:08x}", name, std::process::id(), nonce))
}
