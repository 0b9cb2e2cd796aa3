//! Tarball extraction and zip creation.
//!
//! Both run the synchronous `tar`/`zip` streams on the blocking pool and
//! resolve exactly once.

use crate::error::{IsolateError, Result};
use flate2::read::GzDecoder;
use std::fs::{self, File};
use std::io;
use std::path::{Component, Path, PathBuf};
use tar::Archive;
use tracing::debug;
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Unpack a gzipped tarball into `dest`, dropping the single top-level
/// directory npm wraps package contents in (`package/`).
pub async fn extract_tarball(tarball: &Path, dest: &Path) -> Result<()> {
    let tarball = tarball.to_path_buf();
    let dest = dest.to_path_buf();
    tokio::task::spawn_blocking(move || extract_blocking(&tarball, &dest))
        .await
        .map_err(|e| IsolateError::archive(format!("Extraction task failed: {e}")))?
}

/// Write every file under `src` into a deflated zip at `dest`.
pub async fn zip_directory(src: &Path, dest: &Path) -> Result<()> {
    let src = src.to_path_buf();
    let dest = dest.to_path_buf();
    tokio::task::spawn_blocking(move || zip_blocking(&src, &dest))
        .await
        .map_err(|e| IsolateError::archive(format!("Zip task failed: {e}")))?
}

fn extract_blocking(tarball: &Path, dest: &Path) -> Result<()> {
    debug!(tarball = %tarball.display(), dest = %dest.display(), "extracting");
    let file = File::open(tarball).map_err(|e| IsolateError::io(tarball, e))?;
    let mut archive = Archive::new(GzDecoder::new(file));
    fs::create_dir_all(dest).map_err(|e| IsolateError::io(dest, e))?;

    let entries = archive
        .entries()
        .map_err(|e| IsolateError::archive(format!("Failed to read tarball entries: {e}")))?;

    for entry in entries {
        let mut entry = entry
            .map_err(|e| IsolateError::archive(format!("Failed to read tarball entry: {e}")))?;

        let path = entry
            .path()
            .map_err(|e| IsolateError::archive(format!("Failed to read entry path: {e}")))?
            .into_owned();

        let Some(relative) = strip_top_level(&path)? else {
            continue;
        };
        let dest_path = dest.join(&relative);

        if let Some(parent) = dest_path.parent() {
            fs::create_dir_all(parent).map_err(|e| IsolateError::io(parent, e))?;
        }

        let entry_type = entry.header().entry_type();
        if entry_type.is_dir() {
            fs::create_dir_all(&dest_path).map_err(|e| IsolateError::io(&dest_path, e))?;
        } else if entry_type.is_file() {
            let mut out = File::create(&dest_path).map_err(|e| IsolateError::io(&dest_path, e))?;
            io::copy(&mut entry, &mut out).map_err(|e| IsolateError::io(&dest_path, e))?;

            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                if let Ok(mode) = entry.header().mode() {
                    let _ = fs::set_permissions(&dest_path, fs::Permissions::from_mode(mode));
                }
            }
        }
        // Links and special entries are skipped
    }

    Ok(())
}

/// Validate an entry path and drop its first component.
///
/// Returns `None` for the top-level directory entry itself.
fn strip_top_level(path: &Path) -> Result<Option<PathBuf>> {
    let shown = path.to_string_lossy();

    if path.is_absolute() {
        return Err(IsolateError::archive(format!(
            "Tarball contains absolute path: {shown}"
        )));
    }

    let mut components = path.components().filter(|c| !matches!(c, Component::CurDir));
    components.next();

    let mut relative = PathBuf::new();
    for component in components {
        match component {
            Component::Normal(part) => relative.push(part),
            _ => {
                return Err(IsolateError::archive(format!(
                    "Tarball contains path traversal: {shown}"
                )))
            }
        }
    }

    Ok((!relative.as_os_str().is_empty()).then_some(relative))
}

fn zip_blocking(src: &Path, dest: &Path) -> Result<()> {
    debug!(src = %src.display(), dest = %dest.display(), "zipping");
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).map_err(|e| IsolateError::io(parent, e))?;
    }

    let file = File::create(dest).map_err(|e| IsolateError::io(dest, e))?;
    let mut writer = ZipWriter::new(file);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    for entry in WalkDir::new(src).min_depth(1).sort_by_file_name() {
        let entry = entry.map_err(|e| IsolateError::archive(format!("Failed to walk {}: {e}", src.display())))?;
        let relative = entry
            .path()
            .strip_prefix(src)
            .map_err(|e| IsolateError::archive(e.to_string()))?;
        let name = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        if entry.file_type().is_dir() {
            writer
                .add_directory(format!("{name}/"), options)
                .map_err(|e| IsolateError::archive(format!("Failed to add {name}/: {e}")))?;
        } else if entry.file_type().is_file() {
            let mut file_options = options;
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                if let Ok(meta) = entry.metadata() {
                    file_options = file_options.unix_permissions(meta.permissions().mode());
                }
            }

            writer
                .start_file(name.clone(), file_options)
                .map_err(|e| IsolateError::archive(format!("Failed to add {name}: {e}")))?;
            let mut input = File::open(entry.path()).map_err(|e| IsolateError::io(entry.path(), e))?;
            io::copy(&mut input, &mut writer).map_err(|e| IsolateError::io(dest, e))?;
        }
    }

    writer
        .finish()
        .map_err(|e| IsolateError::archive(format!("Failed to finish {}: {e}", dest.display())))?;
    Ok(())
}
