//! Utility functions
//!
use std::{fs::File, io::Cursor, path::Path};

use anyhow::{Context, Result};
use reqwest::Client;

/// Download a file from a URL to a given filepath.
///
/// The content is written next to the target first and renamed when complete, so an aborted
/// download never leaves a truncated file at `filepath`. The partial file is removed on error.
pub async fn download_file(client: &Client, url: &str, filepath: impl AsRef<Path>) -> Result<()> {
    let filepath = filepath.as_ref();
    let resp = client.get(url).send().await?.error_for_status()?;

    let partial = filepath.with_extension("part");
    if let Err(e) = write_partial(resp, &partial).await {
        if partial.exists() {
            if let Err(remove_err) = std::fs::remove_file(&partial) {
                log::warn!("Could not remove {}: {remove_err}", partial.display());
            }
        }
        return Err(e);
    }
    std::fs::rename(&partial, filepath)?;

    Ok(())
}

async fn write_partial(resp: reqwest::Response, partial: &Path) -> Result<()> {
    let mut file = File::create(partial)
        .with_context(|| format!("failed to create {}", partial.display()))?;
    let mut content = Cursor::new(resp.bytes().await?);
    std::io::copy(&mut content, &mut file)?;
    Ok(())
}
