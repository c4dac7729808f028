//! Structural edits requested from the graph: create, rename and delete.
//!
//! Every operation returns the affected path so the session can queue the
//! matching change and focus the result. None of them touch the graph; the
//! graph catches up through the change processor.

use camino::{Utf8Path, Utf8PathBuf};
use tokio::fs;
use tracing::{debug, info};

use crate::error::OpError;

/// Longest accepted entry name, in bytes.
pub const MAX_NAME_LEN: usize = 255;

/// Checks that `name` is a single, portable path component.
///
/// # Examples
///
/// ```
/// use st_session::validate_filename;
///
/// assert!(validate_filename("main.rs").is_ok());
/// assert!(validate_filename("src/main.rs").is_err());
/// assert!(validate_filename("..").is_err());
/// ```
///
/// # Errors
///
/// Returns [`OpError::InvalidName`] describing the first problem found.
pub fn validate_filename(name: &str) -> Result<(), OpError> {
    let reject = |reason| Err(OpError::invalid_name(name, reason));

    if name.is_empty() {
        return reject("name cannot be empty");
    }
    if name.len() > MAX_NAME_LEN {
        return reject("name is too long");
    }
    if name == "." || name == ".." {
        return reject("reserved name");
    }
    if name.contains('/') {
        return reject("name cannot contain '/'");
    }
    if name.contains('\0') {
        return reject("name cannot contain NUL");
    }

    #[cfg(windows)]
    {
        const FORBIDDEN: [char; 8] = ['\\', ':', '*', '?', '"', '<', '>', '|'];
        const RESERVED: [&str; 22] = [
            "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7",
            "COM8", "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
        ];
        if name.contains(FORBIDDEN) {
            return reject("name contains a reserved character");
        }
        let stem = name.split('.').next().unwrap_or_default().to_uppercase();
        if RESERVED.contains(&stem.as_str()) {
            return reject("reserved device name");
        }
    }

    if name.starts_with(' ') || name.ends_with(' ') {
        return reject("name cannot start or end with spaces");
    }
    if name.ends_with('.') {
        return reject("name cannot end with a dot");
    }
    Ok(())
}

/// The directory a create action on `path` applies to: `path` itself when
/// it is a directory, otherwise its parent.
///
/// # Errors
///
/// Returns [`OpError::NotFound`] if `path` does not exist.
pub async fn target_directory(path: &Utf8Path) -> Result<Utf8PathBuf, OpError> {
    let metadata = fs::metadata(path)
        .await
        .map_err(|e| OpError::from_io(path, e))?;
    if metadata.is_dir() {
        return Ok(path.to_path_buf());
    }
    path.parent()
        .map(Utf8Path::to_path_buf)
        .ok_or_else(|| OpError::NotADirectory(path.to_path_buf()))
}

/// Creates directory `name` inside `dir`.
///
/// # Errors
///
/// Fails if the name is invalid, `dir` is missing, or the entry exists.
pub async fn create_folder(dir: &Utf8Path, name: &str) -> Result<Utf8PathBuf, OpError> {
    validate_filename(name)?;
    let path = dir.join(name);
    fs::create_dir(&path)
        .await
        .map_err(|e| OpError::from_io(&path, e))?;
    info!(path = %path, "Created folder");
    Ok(path)
}

/// Creates an empty file `name` inside `dir`.
///
/// # Errors
///
/// Fails if the name is invalid, `dir` is missing, or the entry exists.
pub async fn create_file(dir: &Utf8Path, name: &str) -> Result<Utf8PathBuf, OpError> {
    validate_filename(name)?;
    let path = dir.join(name);
    fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&path)
        .await
        .map_err(|e| OpError::from_io(&path, e))?;
    info!(path = %path, "Created file");
    Ok(path)
}

/// Renames `path` to `new_name` within the same directory.
///
/// Renaming to the current name is a no-op.
///
/// # Errors
///
/// Fails if the name is invalid, `path` is missing, or the target exists.
pub async fn rename(path: &Utf8Path, new_name: &str) -> Result<Utf8PathBuf, OpError> {
    validate_filename(new_name)?;
    let parent = path
        .parent()
        .ok_or_else(|| OpError::OutsideWorkspace(path.to_path_buf()))?;
    let target = parent.join(new_name);

    fs::symlink_metadata(path)
        .await
        .map_err(|e| OpError::from_io(path, e))?;
    if target == path {
        debug!(path = %path, "Rename to same name");
        return Ok(target);
    }
    if fs::symlink_metadata(&target).await.is_ok() {
        return Err(OpError::AlreadyExists(target));
    }

    fs::rename(path, &target)
        .await
        .map_err(|e| OpError::from_io(path, e))?;
    info!(from = %path, to = %target, "Renamed");
    Ok(target)
}

/// Moves `path` (recursively, for directories) to the platform trash.
///
/// # Errors
///
/// Returns [`OpError::NotFound`] if `path` is missing and
/// [`OpError::Trash`] if the platform refuses.
pub async fn delete(path: &Utf8Path) -> Result<(), OpError> {
    fs::symlink_metadata(path)
        .await
        .map_err(|e| OpError::from_io(path, e))?;

    let target = path.to_path_buf();
    tokio::task::spawn_blocking(move || trash::delete(&target))
        .await?
        .map_err(|source| OpError::Trash {
            path: path.to_path_buf(),
            source,
        })?;
    info!(path = %path, "Moved to trash");
    Ok(())
}
