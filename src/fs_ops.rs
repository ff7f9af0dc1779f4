//! Directory-level file moves used to stage solver inputs and relocate
//! outputs. Patterns are shell-style globs evaluated inside one directory.

use crate::{FwiError, FwiResult};
use std::fs;
use std::path::{Path, PathBuf};

/// Files and directories in `dir` whose names match `pattern`, sorted.
pub fn matching(dir: &Path, pattern: &str) -> FwiResult<Vec<PathBuf>> {
    let full = format!("{}/{}", glob::Pattern::escape(&dir.to_string_lossy()), pattern);
    let mut paths = Vec::new();
    for entry in glob::glob(&full)? {
        paths.push(entry?);
    }
    paths.sort();
    Ok(paths)
}

pub fn copy_dir_all(src: &Path, dst: &Path) -> FwiResult<()> {
    fs::create_dir_all(dst)?;

    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let path = entry.path();
        let dest_path = dst.join(entry.file_name());

        if path.is_dir() {
            copy_dir_all(&path, &dest_path)?;
        } else {
            fs::copy(&path, &dest_path)?;
        }
    }

    Ok(())
}

/// Copy every match of `pattern` in `src_dir` into `dst_dir`. Returns the count.
pub fn copy_matching(src_dir: &Path, pattern: &str, dst_dir: &Path) -> FwiResult<usize> {
    fs::create_dir_all(dst_dir)?;
    let sources = matching(src_dir, pattern)?;
    for src in &sources {
        let dst = dst_dir.join(file_name(src)?);
        if src.is_dir() {
            copy_dir_all(src, &dst)?;
        } else {
            fs::copy(src, &dst)?;
        }
    }
    Ok(sources.len())
}

/// Move every match of `pattern` in `src_dir` into `dst_dir`, replacing
/// files of the same name. Returns the count.
pub fn move_matching(src_dir: &Path, pattern: &str, dst_dir: &Path) -> FwiResult<usize> {
    fs::create_dir_all(dst_dir)?;
    let sources = matching(src_dir, pattern)?;
    for src in &sources {
        move_path(src, &dst_dir.join(file_name(src)?))?;
    }
    Ok(sources.len())
}

/// Rename `src` to `dst`, falling back to copy and delete across filesystems.
pub fn move_path(src: &Path, dst: &Path) -> FwiResult<()> {
    if dst.is_dir() {
        fs::remove_dir_all(dst)?;
    }
    match fs::rename(src, dst) {
        Ok(()) => Ok(()),
        Err(_) if src.is_dir() => {
            copy_dir_all(src, dst)?;
            fs::remove_dir_all(src)?;
            Ok(())
        }
        Err(_) => {
            fs::copy(src, dst)?;
            fs::remove_file(src)?;
            Ok(())
        }
    }
}

/// Replace the first occurrence of `from` with `to` in each file name.
/// Paths whose names do not contain `from` are left alone.
pub fn rename_in_names(paths: &[PathBuf], from: &str, to: &str) -> FwiResult<usize> {
    let mut renamed = 0;
    for path in paths {
        let name = file_name(path)?;
        if !name.contains(from) {
            continue;
        }
        let new_name = name.replacen(from, to, 1);
        fs::rename(path, path.with_file_name(new_name))?;
        renamed += 1;
    }
    Ok(renamed)
}

/// Immediate subdirectories of `dir`, sorted by name.
pub fn list_subdirs(dir: &Path) -> FwiResult<Vec<PathBuf>> {
    let mut dirs = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            dirs.push(path);
        }
    }
    dirs.sort();
    Ok(dirs)
}

/// Remove a file or directory tree if it exists.
pub fn remove_if_exists(path: &Path) -> FwiResult<()> {
    if path.is_dir() {
        fs::remove_dir_all(path)?;
    } else if path.exists() || path.is_symlink() {
        fs::remove_file(path)?;
    }
    Ok(())
}

fn file_name(path: &Path) -> FwiResult<String> {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .ok_or_else(|| FwiError::Other(format!("unusable file name: {}", path.display())))
}
