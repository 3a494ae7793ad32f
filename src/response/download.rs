//! Saving a response body to disk.
//!
//! The body is streamed into `<target>.uxdt` and renamed over the target
//! once complete, so a failed download never leaves a truncated file under
//! the final name.

use std::path::{Path, PathBuf};

use futures_util::StreamExt;
use tokio::fs::{self, File};
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, info};

use super::chain::{Process, process_fn};
use super::{Body, Response};
use crate::error::Error;

/// Suffix of the in-progress file.
pub const TEMP_SUFFIX: &str = ".uxdt";

/// Terminal that saves the body to `path`, storing the final path in `saved`.
///
/// See [`save`] for how the target path is resolved.
pub fn to_file<'a>(path: PathBuf, overwrite: bool, saved: &'a mut Option<PathBuf>) -> Process<'a> {
    process_fn(move |resp: Response| async move {
        *saved = Some(save(resp, &path, overwrite).await?);
        Ok(())
    })
}

/// Saves the body to `path` and returns where it was written.
///
/// Parent directories are created. An existing directory at `path` means
/// "save inside it", using the directory's own name as the file name.
///
/// # Errors
///
/// Returns [`Error::Exists`] when the target exists and `overwrite` is
/// false, [`Error::Io`] for file system failures, or the body's read error.
pub async fn save(resp: Response, path: &Path, overwrite: bool) -> Result<PathBuf, Error> {
    let target = resolve_target(path, overwrite).await?;
    let temp = temp_path(&target);

    match fs::remove_file(&temp).await {
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => return Err(Error::io(&temp, e)),
        _ => {}
    }

    let file = File::create(&temp).await.map_err(|e| Error::io(&temp, e))?;
    let written = match stream_to_file(file, resp.into_body(), &temp).await {
        Ok(written) => written,
        Err(err) => {
            let _ = fs::remove_file(&temp).await;
            return Err(err);
        }
    };

    fs::rename(&temp, &target)
        .await
        .map_err(|e| Error::io(&target, e))?;
    info!(path = %target.display(), bytes = written, "download complete");
    Ok(target)
}

async fn resolve_target(path: &Path, overwrite: bool) -> Result<PathBuf, Error> {
    let mut target = path.to_path_buf();
    loop {
        if let Some(parent) = target.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::io(parent, e))?;
        }
        match fs::metadata(&target).await {
            Ok(meta) if meta.is_dir() => {
                let name = target
                    .file_name()
                    .map(ToOwned::to_owned)
                    .ok_or_else(|| Error::io(&target, std::io::ErrorKind::IsADirectory.into()))?;
                debug!(dir = %target.display(), "download target is a directory");
                target = target.join(name);
            }
            Ok(_) if !overwrite => return Err(Error::exists(target)),
            Ok(_) => return Ok(target),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(target),
            Err(e) => return Err(Error::io(&target, e)),
        }
    }
}

fn temp_path(target: &Path) -> PathBuf {
    let mut name = target.as_os_str().to_owned();
    name.push(TEMP_SUFFIX);
    PathBuf::from(name)
}

async fn stream_to_file(file: File, mut body: Body, file_path: &Path) -> Result<u64, Error> {
    let mut writer = BufWriter::new(file);
    let mut bytes_written: u64 = 0;

    while let Some(chunk) = body.next().await {
        let chunk = chunk?;
        writer
            .write_all(&chunk)
            .await
            .map_err(|e| Error::io(file_path, e))?;
        bytes_written += chunk.len() as u64;
    }

    writer.flush().await.map_err(|e| Error::io(file_path, e))?;
    Ok(bytes_written)
}
