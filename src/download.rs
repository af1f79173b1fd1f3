use crate::error::{DroneError, Result};
use async_trait::async_trait;
use flate2::read::GzDecoder;
use futures_util::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tar::Archive;

/// Fetches a release archive and unpacks it into a directory.
#[async_trait]
pub trait ArchiveInstaller: Send + Sync {
    async fn download_and_unpack(&self, url: &str, archive_path: &Path, destination: &Path) -> Result<()>;
}

#[derive(Debug, Clone, Default)]
pub struct HttpArchiveInstaller {
    client: reqwest::Client,
}

#[async_trait]
impl ArchiveInstaller for HttpArchiveInstaller {
    async fn download_and_unpack(&self, url: &str, archive_path: &Path, destination: &Path) -> Result<()> {
        let _cleanup = RemoveOnDrop(archive_path.to_path_buf());
        download_file(&self.client, url, archive_path).await?;
        extract_tar_gz(archive_path, destination)
    }
}

/// Deletes the temporary archive however the install attempt ends.
struct RemoveOnDrop(PathBuf);

impl Drop for RemoveOnDrop {
    fn drop(&mut self) {
        if self.0.exists() {
            if let Err(e) = fs::remove_file(&self.0) {
                tracing::warn!("Could not remove {}: {}", self.0.display(), e);
            }
        }
    }
}

fn progress_bar(total_size: u64, filename: &str) -> ProgressBar {
    let pb = ProgressBar::new(total_size);
    let style = ProgressStyle::default_bar()
        .template("{msg} {spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})")
        .map(|style| style.progress_chars("#>-"))
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    pb.set_style(style);
    pb.set_message(format!("Downloading {}", filename));
    pb
}

pub async fn download_file(client: &reqwest::Client, url: &str, local_path: &Path) -> Result<()> {
    let filename = local_path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| url.to_string());
    tracing::info!("Downloading {} from {}", filename, url);

    if let Some(parent) = local_path.parent() {
        fs::create_dir_all(parent)?;
    }

    let response = client.get(url).send().await?;
    if !response.status().is_success() {
        return Err(DroneError::Fetch(format!(
            "Error downloading {}: {}",
            url,
            response.status()
        )));
    }
    let total_size = response.content_length().unwrap_or(0);
    let pb = progress_bar(total_size, &filename);

    let mut file = fs::File::create(local_path)?;
    let mut downloaded = 0u64;
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        file.write_all(&chunk)?;
        downloaded += chunk.len() as u64;
        pb.set_position(downloaded);
    }
    file.flush()?;

    pb.finish_with_message("Download complete");
    Ok(())
}

pub fn extract_tar_gz(archive_path: &Path, extract_dir: &Path) -> Result<()> {
    tracing::info!(
        "Extracting {} into {}",
        archive_path.display(),
        extract_dir.display()
    );
    let extract_error = |e: std::io::Error| DroneError::Extract {
        archive: archive_path.display().to_string(),
        message: e.to_string(),
    };

    fs::create_dir_all(extract_dir)?;
    let file = fs::File::open(archive_path).map_err(extract_error)?;
    let mut archive = Archive::new(GzDecoder::new(file));
    archive.unpack(extract_dir).map_err(extract_error)?;

    #[cfg(unix)]
    make_files_executable(extract_dir)?;

    Ok(())
}

#[cfg(unix)]
fn make_files_executable(dir: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    use walkdir::WalkDir;

    for entry in WalkDir::new(dir).into_iter().filter_map(|e| e.ok()) {
        let path = entry.path();
        if path.is_file() {
            let mut perms = fs::metadata(path)?.permissions();
            perms.set_mode(perms.mode() | 0o755);
            fs::set_permissions(path, perms)?;
        }
    }
    Ok(())
}
