//! Cached download of weight files.

use crate::common::*;
use std::{env, io};
use tempfile::NamedTempFile;

/// Overrides the cache root directory.
pub const ROOT_ENV: &str = "SSD_ZOO_ROOT";

/// The directory that keeps downloaded weight files.
pub fn model_cache_dir() -> Result<PathBuf> {
    let root = match env::var_os(ROOT_ENV) {
        Some(root) => PathBuf::from(root),
        None => dirs::cache_dir()
            .ok_or_else(|| format_err!("unable to locate the cache directory, set {}", ROOT_ENV))?
            .join("ssd-zoo"),
    };
    Ok(root.join("models"))
}

/// Download a file to the cache directory unless it is already cached, and return its path.
pub fn download_model(url: &str) -> Result<PathBuf> {
    download_model_to(url, model_cache_dir()?)
}

pub fn download_model_to(url: &str, dir: impl AsRef<Path>) -> Result<PathBuf> {
    let dir = dir.as_ref();
    let file_name = url
        .rsplit('/')
        .next()
        .filter(|name| !name.is_empty())
        .ok_or_else(|| format_err!("unable to derive a file name from '{}'", url))?;
    let path = dir.join(file_name);

    if path.is_file() {
        debug!("use cached file {}", path.display());
        return Ok(path);
    }

    fs::create_dir_all(dir)
        .with_context(|| format!("unable to create directory {}", dir.display()))?;
    info!("downloading {} to {}", url, path.display());

    let response = ureq::get(url)
        .call()
        .with_context(|| format!("unable to download {}", url))?;

    // an interrupted download never leaves a partial file under the final name
    let mut tmp = NamedTempFile::new_in(dir)?;
    io::copy(&mut response.into_reader(), &mut tmp)
        .with_context(|| format!("unable to download {}", url))?;
    tmp.persist(&path)?;

    Ok(path)
}
