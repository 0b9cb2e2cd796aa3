use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

/// Atomically write bytes to a file by writing to a temp file then renaming.
///
/// The file will either have the old contents or the new contents, never a
/// partial write. Manifests are always persisted through this function.
///
/// # Errors
/// Returns an error if the write or rename fails.
pub async fn atomic_write(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let parent = path.parent().unwrap_or(Path::new("."));

    // Same directory as the target so the rename never crosses filesystems
    let mut temp_path = parent.to_path_buf();
    temp_path.push(format!(
        ".{}.tmp.{}",
        path.file_name().and_then(|n| n.to_str()).unwrap_or("file"),
        std::process::id()
    ));

    {
        let mut file = fs::File::create(&temp_path).await?;
        file.write_all(bytes).await?;
        file.sync_all().await?;
    }

    if let Err(e) = rename(&temp_path, path).await {
        let _ = fs::remove_file(&temp_path).await;
        return Err(e);
    }
    Ok(())
}

/// Create a directory and all of its parents. Succeeds if it already exists.
///
/// # Errors
/// Returns an error if the directory cannot be created.
pub async fn ensure_dir(path: &Path) -> io::Result<()> {
    fs::create_dir_all(path).await
}

/// Remove a file. Succeeds if the file is already missing.
///
/// # Errors
/// Returns any error other than `NotFound`.
pub async fn ensure_unlink(path: &Path) -> io::Result<()> {
    match fs::remove_file(path).await {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

/// Create a symlink at `link` pointing to `target`. Succeeds if `link` already exists.
///
/// # Errors
/// Returns any error other than `AlreadyExists`.
pub async fn ensure_symlink(target: &Path, link: &Path) -> io::Result<()> {
    #[cfg(unix)]
    let result = fs::symlink(target, link).await;
    #[cfg(windows)]
    let resolved = link
        .parent()
        .map_or_else(|| target.to_path_buf(), |parent| parent.join(target));
    #[cfg(windows)]
    let result = if resolved.is_dir() {
        fs::symlink_dir(target, link).await
    } else {
        fs::symlink_file(target, link).await
    };

    match result {
        Err(e) if e.kind() != io::ErrorKind::AlreadyExists => Err(e),
        _ => Ok(()),
    }
}

/// Remove a file or a directory tree. Succeeds if nothing exists at `path`.
///
/// # Errors
/// Returns any error other than `NotFound`.
pub async fn remove_path(path: &Path) -> io::Result<()> {
    let meta = match fs::symlink_metadata(path).await {
        Ok(meta) => meta,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e),
    };

    let result = if meta.is_dir() {
        fs::remove_dir_all(path).await
    } else {
        fs::remove_file(path).await
    };

    match result {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

/// Return `Some(path)` when something exists at `path`, `None` when it does not.
///
/// # Errors
/// Returns any error other than `NotFound`.
pub async fn exists(path: &Path) -> io::Result<Option<PathBuf>> {
    match fs::symlink_metadata(path).await {
        Ok(_) => Ok(Some(path.to_path_buf())),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

/// Copy a file, creating the destination's parent directories first.
///
/// # Errors
/// Returns an error if the parent cannot be created or the copy fails.
pub async fn copy_file(src: &Path, dest: &Path) -> io::Result<u64> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).await?;
    }
    fs::copy(src, dest).await
}

/// Rename a file, falling back to copy + remove when the rename fails
/// (across filesystems, or onto an existing file on Windows).
///
/// # Errors
/// Returns the rename error if the fallback copy fails too.
pub async fn rename(src: &Path, dest: &Path) -> io::Result<()> {
    match fs::rename(src, dest).await {
        Ok(()) => Ok(()),
        Err(rename_err) => {
            if fs::copy(src, dest).await.is_err() {
                return Err(rename_err);
            }
            fs::remove_file(src).await
        }
    }
}

/// Recursively copy a directory tree. Symlinks are recreated, pointing at
/// the same target.
///
/// # Errors
/// Returns an error if any entry cannot be read or written.
pub async fn copy_dir_all(src: &Path, dst: &Path) -> io::Result<()> {
    let mut pending = vec![(src.to_path_buf(), dst.to_path_buf())];

    while let Some((from, to)) = pending.pop() {
        fs::create_dir_all(&to).await?;
        let mut entries = fs::read_dir(&from).await?;
        while let Some(entry) = entries.next_entry().await? {
            let ty = entry.file_type().await?;
            let target = to.join(entry.file_name());
            if ty.is_dir() {
                pending.push((entry.path(), target));
            } else if ty.is_symlink() {
                let link_target = fs::read_link(entry.path()).await?;
                ensure_symlink(&link_target, &target).await?;
            } else if ty.is_file() {
                fs::copy(entry.path(), &target).await?;
            }
        }
    }

    Ok(())
}
